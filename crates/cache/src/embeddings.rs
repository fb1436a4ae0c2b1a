//! Remote embedding client.

use crate::CacheError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Embedding seam for the cache and the anchor builder.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CacheError>;

    /// Output dimension; must match the stored matrix.
    fn dim(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct HttpEmbedderConfig {
    pub endpoint: String,
    pub model: String,
    pub dim: usize,
    pub deadline: Duration,
}

impl Default for HttpEmbedderConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "bge-m3".to_string(),
            dim: 1024,
            deadline: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// HTTP embedding service client (`POST /api/embed`).
pub struct HttpEmbedder {
    client: Client,
    config: HttpEmbedderConfig,
}

impl HttpEmbedder {
    pub fn new(config: HttpEmbedderConfig) -> Result<Self, CacheError> {
        let client = Client::builder()
            .timeout(config.deadline)
            .build()
            .map_err(|e| CacheError::Embedding(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CacheError> {
        let url = format!("{}/api/embed", self.config.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest {
                model: self.config.model.clone(),
                input: vec![text.to_string()],
            })
            .send()
            .await
            .map_err(|e| CacheError::Embedding(format!("embedding request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CacheError::Embedding(format!(
                "embedding service returned {status}: {body}"
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| CacheError::Embedding(format!("invalid embedding response: {e}")))?;

        let embedding = parsed
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| CacheError::Embedding("no embedding returned".to_string()))?;

        if embedding.len() != self.config.dim {
            return Err(CacheError::DimensionMismatch {
                expected: self.config.dim,
                got: embedding.len(),
            });
        }
        Ok(embedding)
    }

    fn dim(&self) -> usize {
        self.config.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;

    async fn spawn_embed_server(dim: usize) -> String {
        let app = Router::new().route(
            "/api/embed",
            post(move || async move {
                Json(json!({"embeddings": [vec![0.5f32; dim]]}))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_embed_roundtrip() {
        let endpoint = spawn_embed_server(8).await;
        let embedder = HttpEmbedder::new(HttpEmbedderConfig {
            endpoint,
            dim: 8,
            ..HttpEmbedderConfig::default()
        })
        .unwrap();

        let embedding = embedder.embed("Schalte das Licht an").await.unwrap();
        assert_eq!(embedding.len(), 8);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_an_error() {
        let endpoint = spawn_embed_server(8).await;
        let embedder = HttpEmbedder::new(HttpEmbedderConfig {
            endpoint,
            dim: 384,
            ..HttpEmbedderConfig::default()
        })
        .unwrap();

        let err = embedder.embed("Schalte das Licht an").await.unwrap_err();
        assert!(matches!(err, CacheError::DimensionMismatch { .. }));
    }
}
