//! Application settings.
//!
//! Loaded from an optional TOML file plus `HEIM_AGENT_*` environment
//! overrides. Every threshold is range-checked before the pipeline starts;
//! a bad value fails fast rather than degrading retrieval silently.

use crate::constants::{cache, pending, stages};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Local LLM endpoint (intent parsing, clarification, probes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

fn default_llm_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_llm_model() -> String {
    "qwen3:4b-instruct".to_string()
}

fn default_deadline_secs() -> u64 {
    stages::REMOTE_DEADLINE_SECS
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            deadline_secs: default_deadline_secs(),
        }
    }
}

/// Cloud LLM (final fallback stage). Inactive without an API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_cloud_model")]
    pub model: String,
    #[serde(default = "default_cloud_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

fn default_cloud_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_cloud_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_cloud_model(),
            endpoint: default_cloud_endpoint(),
            deadline_secs: default_deadline_secs(),
        }
    }
}

/// Embedding service for the semantic cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Must match the dimension of stored anchors.
    #[serde(default = "default_embedding_dim")]
    pub dim: usize,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

fn default_embedding_model() -> String {
    "bge-m3".to_string()
}

fn default_embedding_dim() -> usize {
    1024
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_embedding_model(),
            dim: default_embedding_dim(),
            deadline_secs: default_deadline_secs(),
        }
    }
}

/// Cross-encoder reranker service gating cache hits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerSettings {
    #[serde(default = "default_reranker_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_reranker_model")]
    pub model: String,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

fn default_reranker_endpoint() -> String {
    "http://localhost:8787".to_string()
}

fn default_reranker_model() -> String {
    "BAAI/bge-reranker-base".to_string()
}

impl Default for RerankerSettings {
    fn default() -> Self {
        Self {
            endpoint: default_reranker_endpoint(),
            model: default_reranker_model(),
            deadline_secs: default_deadline_secs(),
        }
    }
}

/// Semantic cache tuning, the expert knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_reranker_threshold")]
    pub reranker_threshold: f64,
    #[serde(default)]
    pub hybrid_enabled: bool,
    #[serde(default = "default_hybrid_alpha")]
    pub hybrid_alpha: f64,
    #[serde(default = "default_hybrid_ngram")]
    pub hybrid_ngram_size: usize,
    #[serde(default = "default_vector_threshold")]
    pub vector_search_threshold: f64,
    #[serde(default = "default_vector_top_k")]
    pub vector_search_top_k: usize,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_reranker_threshold() -> f64 {
    cache::DEFAULT_RERANKER_THRESHOLD
}

fn default_hybrid_alpha() -> f64 {
    cache::DEFAULT_HYBRID_ALPHA
}

fn default_hybrid_ngram() -> usize {
    cache::DEFAULT_HYBRID_NGRAM
}

fn default_vector_threshold() -> f64 {
    cache::DEFAULT_VECTOR_THRESHOLD
}

fn default_vector_top_k() -> usize {
    cache::DEFAULT_VECTOR_TOP_K
}

fn default_max_entries() -> usize {
    cache::DEFAULT_MAX_ENTRIES
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            reranker_threshold: default_reranker_threshold(),
            hybrid_enabled: false,
            hybrid_alpha: default_hybrid_alpha(),
            hybrid_ngram_size: default_hybrid_ngram(),
            vector_search_threshold: default_vector_threshold(),
            vector_search_top_k: default_vector_top_k(),
            max_entries: default_max_entries(),
        }
    }
}

/// Multi-turn pending state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingSettings {
    #[serde(default = "default_pending_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_pending_retries")]
    pub max_retries: u32,
}

fn default_pending_ttl() -> u64 {
    pending::TTL_SECS
}

fn default_pending_retries() -> u32 {
    pending::MAX_RETRIES
}

impl Default for PendingSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_pending_ttl(),
            max_retries: default_pending_retries(),
        }
    }
}

/// Main application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub stage1: LlmSettings,

    #[serde(default)]
    pub cloud: CloudSettings,

    #[serde(default)]
    pub embedding: EmbeddingSettings,

    #[serde(default)]
    pub reranker: RerankerSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub pending: PendingSettings,

    /// NLU-probe candidate count above which S0 escalates.
    #[serde(default = "default_early_filter_threshold")]
    pub early_filter_threshold: usize,

    /// Directory for snapshots (anchors, user cache, aliases).
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
}

fn default_early_filter_threshold() -> usize {
    stages::EARLY_FILTER_THRESHOLD
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from(".storage")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            stage1: LlmSettings::default(),
            cloud: CloudSettings::default(),
            embedding: EmbeddingSettings::default(),
            reranker: RerankerSettings::default(),
            cache: CacheSettings::default(),
            pending: PendingSettings::default(),
            early_filter_threshold: default_early_filter_threshold(),
            storage_dir: default_storage_dir(),
        }
    }
}

impl Settings {
    /// Load from an optional TOML file, then `HEIM_AGENT_*` env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let loaded = builder
            .add_source(Environment::with_prefix("HEIM_AGENT").separator("__"))
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        let settings: Settings = loaded
            .try_deserialize()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = |field: &str, value: f64| -> Result<(), ConfigError> {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("must be between 0.0 and 1.0, got {value}"),
                })
            }
        };

        unit("cache.reranker_threshold", self.cache.reranker_threshold)?;
        unit("cache.hybrid_alpha", self.cache.hybrid_alpha)?;
        unit(
            "cache.vector_search_threshold",
            self.cache.vector_search_threshold,
        )?;

        if !(1..=5).contains(&self.cache.hybrid_ngram_size) {
            return Err(ConfigError::InvalidValue {
                field: "cache.hybrid_ngram_size".to_string(),
                message: format!("must be 1..=5, got {}", self.cache.hybrid_ngram_size),
            });
        }

        if !(1..=100).contains(&self.cache.vector_search_top_k) {
            return Err(ConfigError::InvalidValue {
                field: "cache.vector_search_top_k".to_string(),
                message: format!("must be 1..=100, got {}", self.cache.vector_search_top_k),
            });
        }

        if self.cache.max_entries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.max_entries".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.embedding.dim == 0 {
            return Err(ConfigError::InvalidValue {
                field: "embedding.dim".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.pending.ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pending.ttl_secs".to_string(),
                message: "must be at least 1 second".to_string(),
            });
        }

        if self.cloud.api_key.is_none() {
            tracing::warn!("no cloud API key configured; the cloud stage will be inactive");
        }

        Ok(())
    }
}
