//! LLM clients
//!
//! Two seams: `JsonLlm` for schema-constrained local calls (intent parsing,
//! clarification, probes) and `ChatLlm` for the cloud fallback. The JSON
//! client enforces the per-prompt schema and reports violations as a miss
//! (`Ok(None)`), never as an error — stages escalate on miss.

pub mod cloud;
pub mod json_client;
pub mod prompt;

pub use cloud::{ChatLlm, ChatTurn, ChatRole, CloudClient, CloudConfig};
pub use json_client::{JsonLlm, OllamaJsonClient, OllamaJsonConfig};
pub use prompt::Prompt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(String),

    #[error("api error: {0}")]
    Api(String),

    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("request timed out")]
    Timeout,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for heim_agent_core::Error {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::QuotaExhausted(msg) => heim_agent_core::Error::QuotaExhausted(msg),
            LlmError::Timeout => heim_agent_core::Error::Timeout,
            other => heim_agent_core::Error::Llm(other.to_string()),
        }
    }
}
