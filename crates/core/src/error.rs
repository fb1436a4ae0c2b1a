//! Workspace-wide error type.

use thiserror::Error;

/// Errors surfaced across the pipeline.
#[derive(Error, Debug)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("llm error: {0}")]
    Llm(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("reranker error: {0}")]
    Reranker(String),

    #[error("home platform error: {0}")]
    Home(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("request timed out")]
    Timeout,

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
