//! Persistent state: JSON snapshots and the learned-alias store.

pub mod alias;
pub mod store;

pub use alias::AliasStore;
pub use store::JsonStore;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Task(String),
}

impl From<StorageError> for heim_agent_core::Error {
    fn from(err: StorageError) -> Self {
        heim_agent_core::Error::Storage(err.to_string())
    }
}
