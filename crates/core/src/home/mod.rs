//! Read-only registry view and the host-platform seam.
//!
//! The pipeline never talks to the automation platform directly; everything
//! goes through `HomePlatform`. Production wires the real platform in, tests
//! and local development use [`SimHome`].

mod sim;

pub use sim::{ServiceCall, SimHome};

use crate::error::Result;
use crate::stage_result::SpokenReply;
use crate::utterance::Utterance;
use crate::Slots;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Area {
    pub id: String,
    pub name: String,
    pub floor_id: Option<String>,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Floor {
    pub id: String,
    pub name: String,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    pub entity_id: String,
    /// User-assigned name, overrides `original_name` when present.
    pub name: Option<String>,
    pub original_name: Option<String>,
    pub area_id: Option<String>,
    pub disabled: bool,
}

impl EntityRecord {
    /// Domain prefix of the entity id ("light.kueche" → "light").
    pub fn domain(&self) -> &str {
        self.entity_id.split('.').next().unwrap_or("")
    }

    pub fn friendly_name(&self) -> Option<&str> {
        self.name.as_deref().or(self.original_name.as_deref())
    }
}

/// Snapshot of an entity's current state.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState {
    pub state: String,
    pub attributes: BTreeMap<String, Value>,
}

impl EntityState {
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self.state.as_str(), "unavailable" | "unknown")
    }

    pub fn num_attr(&self, key: &str) -> Option<f64> {
        self.attributes.get(key).and_then(Value::as_f64)
    }

    pub fn str_attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

/// One intent dispatch against the host platform.
#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub intent: String,
    /// Slot values; the target entity rides in the "name" slot.
    pub slots: Slots,
    pub text_input: String,
    pub language: String,
}

#[derive(Debug, Clone, Default)]
pub struct IntentResponse {
    /// Speech produced by the handler, if any.
    pub speech: Option<String>,
}

/// Result of the platform's rule-based recognizer (no LLM).
#[derive(Debug, Clone)]
pub struct NluMatch {
    pub intent: String,
    pub entities: BTreeMap<String, String>,
}

/// A mobile notify target usable for timers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyService {
    /// Full service id, e.g. "notify.mobile_app_phone_1".
    pub service: String,
    /// Human-readable device name, e.g. "Phone 1".
    pub name: String,
}

/// Host automation platform seam: registries, states, intent dispatch,
/// service calls and the default conversation agent.
#[async_trait]
pub trait HomePlatform: Send + Sync {
    fn areas(&self) -> Vec<Area>;
    fn floors(&self) -> Vec<Floor>;
    fn entities(&self) -> Vec<EntityRecord>;

    /// Current state of an entity, `None` if the entity does not exist.
    fn state(&self, entity_id: &str) -> Option<EntityState>;

    /// Dispatch an intent to the platform's handler.
    async fn handle_intent(&self, request: IntentRequest) -> Result<IntentResponse>;

    /// Fire a platform service (timer commands, scripts, calendar events).
    async fn call_service(&self, domain: &str, service: &str, data: Value) -> Result<()>;

    /// Last-resort fallback: hand the utterance to the platform's default
    /// conversation agent.
    async fn converse_default(&self, utterance: &Utterance) -> Result<SpokenReply>;

    /// Mobile notify services usable as timer targets.
    fn notify_services(&self) -> Vec<NotifyService>;

    /// Run the platform's rule-based recognizer against the utterance.
    async fn recognize(&self, utterance: &Utterance) -> Option<NluMatch>;
}
