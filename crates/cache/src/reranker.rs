//! Remote cross-encoder reranker client.

use crate::CacheError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reranker seam: scores `(query, candidate)` pairs in `0..=1`.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f64>, CacheError>;
}

#[derive(Debug, Clone)]
pub struct HttpRerankerConfig {
    pub endpoint: String,
    pub model: String,
    pub deadline: Duration,
}

impl Default for HttpRerankerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8787".to_string(),
            model: "BAAI/bge-reranker-base".to_string(),
            deadline: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Serialize)]
struct RerankRequest {
    model: String,
    query: String,
    documents: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    scores: Vec<f64>,
}

/// HTTP reranker service client (`POST /rerank`).
pub struct HttpReranker {
    client: Client,
    config: HttpRerankerConfig,
}

impl HttpReranker {
    pub fn new(config: HttpRerankerConfig) -> Result<Self, CacheError> {
        let client = Client::builder()
            .timeout(config.deadline)
            .build()
            .map_err(|e| CacheError::Reranker(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f64>, CacheError> {
        let url = format!("{}/rerank", self.config.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&RerankRequest {
                model: self.config.model.clone(),
                query: query.to_string(),
                documents: documents.to_vec(),
            })
            .send()
            .await
            .map_err(|e| CacheError::Reranker(format!("rerank request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CacheError::Reranker(format!(
                "reranker returned {status}: {body}"
            )));
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| CacheError::Reranker(format!("invalid rerank response: {e}")))?;

        if parsed.scores.len() != documents.len() {
            return Err(CacheError::Reranker(format!(
                "score count mismatch: {} documents, {} scores",
                documents.len(),
                parsed.scores.len()
            )));
        }
        Ok(parsed.scores)
    }
}
