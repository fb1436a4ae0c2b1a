//! Prompt definition for schema-constrained calls.

use serde_json::Value;

/// A system prompt paired with the JSON schema the answer must satisfy.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: String,
    pub schema: Value,
}

impl Prompt {
    pub fn new(system: impl Into<String>, schema: Value) -> Self {
        Self {
            system: system.into(),
            schema,
        }
    }
}
