//! Semantic command cache
//!
//! Maps an utterance fingerprint (the embedding of its numerically
//! normalized text) to a previously verified `(intent, entity_ids, slots)`
//! resolution. Lookup is cosine top-K over an in-memory matrix followed by a
//! cross-encoder rerank gate; admission happens only after verified
//! execution. Anchors generated from the registry pre-seed the cache so the
//! common phrasings hit without any LLM involvement.

pub mod builder;
pub mod cache;
pub mod embeddings;
pub mod hybrid;
pub mod reranker;
pub mod types;

pub use builder::AnchorBuilder;
pub use cache::{AdmissionOutcome, CacheConfig, SemanticCache, StoreRequest};
pub use embeddings::{Embedder, HttpEmbedder, HttpEmbedderConfig};
pub use hybrid::{ngram_overlap, HybridConfig};
pub use reranker::{HttpReranker, HttpRerankerConfig, Reranker};
pub use types::{CacheEntry, CacheHit, CacheStats};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("reranker error: {0}")]
    Reranker(String),

    #[error("storage error: {0}")]
    Storage(#[from] heim_agent_persistence::StorageError),

    #[error("task failed: {0}")]
    Task(String),
}

impl From<CacheError> for heim_agent_core::Error {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Embedding(msg) => heim_agent_core::Error::Embedding(msg),
            CacheError::Reranker(msg) => heim_agent_core::Error::Reranker(msg),
            CacheError::Storage(err) => heim_agent_core::Error::Storage(err.to_string()),
            other => heim_agent_core::Error::Embedding(other.to_string()),
        }
    }
}
