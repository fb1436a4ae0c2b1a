//! Schema-constrained local LLM client.

use crate::prompt::Prompt;
use crate::LlmError;
use async_trait::async_trait;
use jsonschema::JSONSchema;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Local JSON-mode LLM seam.
///
/// `Ok(None)` means the model answered but the answer did not conform to the
/// prompt's schema — callers treat that as a miss and escalate, never as a
/// hard failure.
#[async_trait]
pub trait JsonLlm: Send + Sync {
    async fn prompt_json(
        &self,
        prompt: &Prompt,
        payload: &Value,
        temperature: Option<f32>,
    ) -> Result<Option<Value>, LlmError>;
}

#[derive(Debug, Clone)]
pub struct OllamaJsonConfig {
    pub endpoint: String,
    pub model: String,
    pub deadline: Duration,
    /// Retries for transient failures, exponential backoff.
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for OllamaJsonConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "qwen3:4b-instruct".to_string(),
            deadline: Duration::from_secs(60),
            max_retries: 2,
            initial_backoff: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Ollama-backed implementation of [`JsonLlm`].
pub struct OllamaJsonClient {
    client: Client,
    config: OllamaJsonConfig,
}

impl OllamaJsonClient {
    pub fn new(config: OllamaJsonConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.deadline)
            .build()
            .map_err(|e| LlmError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn is_retryable(error: &LlmError) -> bool {
        matches!(error, LlmError::Network(_) | LlmError::Timeout)
    }

    async fn execute(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let url = format!("{}/api/chat", self.config.endpoint);
        let response = self.client.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(LlmError::Network(format!("server error {status}: {body}")));
            }
            return Err(LlmError::Api(format!("{status}: {body}")));
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }
}

/// Strip a fenced code block if the model wrapped its JSON in one.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(inner) = trimmed.strip_prefix("```") {
        let inner = inner.strip_prefix("json").unwrap_or(inner);
        if let Some(end) = inner.rfind("```") {
            return inner[..end].trim();
        }
    }
    trimmed
}

#[async_trait]
impl JsonLlm for OllamaJsonClient {
    async fn prompt_json(
        &self,
        prompt: &Prompt,
        payload: &Value,
        temperature: Option<f32>,
    ) -> Result<Option<Value>, LlmError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: prompt.system.clone(),
                },
                ChatMessage {
                    role: "user",
                    content: serde_json::to_string(payload)
                        .map_err(|e| LlmError::InvalidResponse(e.to_string()))?,
                },
            ],
            stream: false,
            format: "json",
            options: temperature.map(|t| ChatOptions { temperature: t }),
        };

        let mut backoff = self.config.initial_backoff;
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::warn!(
                    attempt,
                    max = self.config.max_retries,
                    "LLM request failed, retrying in {:?}",
                    backoff
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match self.execute(&request).await {
                Ok(response) => {
                    let raw = strip_code_fence(&response.message.content);
                    let parsed: Value = match serde_json::from_str(raw) {
                        Ok(value) => value,
                        Err(err) => {
                            tracing::debug!(%err, "LLM returned non-JSON content");
                            return Ok(None);
                        }
                    };

                    let compiled = JSONSchema::compile(&prompt.schema).map_err(|e| {
                        LlmError::Configuration(format!("invalid prompt schema: {e}"))
                    })?;
                    if compiled.is_valid(&parsed) {
                        return Ok(Some(parsed));
                    }
                    tracing::debug!("LLM response violated the prompt schema");
                    return Ok(None);
                }
                Err(err) if Self::is_retryable(&err) => last_error = Some(err),
                Err(err) => return Err(err),
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Network("max retries exceeded".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;

    async fn spawn_server(reply: Value) -> String {
        let app = Router::new().route(
            "/api/chat",
            post(move || {
                let reply = reply.clone();
                async move {
                    Json(json!({
                        "message": {"role": "assistant", "content": reply.to_string()},
                        "done": true,
                    }))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn intent_prompt() -> Prompt {
        Prompt::new(
            "pick an intent",
            json!({
                "type": "object",
                "properties": {"intent": {"type": ["string", "null"]}},
                "required": ["intent"],
            }),
        )
    }

    #[tokio::test]
    async fn test_valid_response_passes_schema() {
        let endpoint = spawn_server(json!({"intent": "HassTurnOn"})).await;
        let client = OllamaJsonClient::new(OllamaJsonConfig {
            endpoint,
            ..OllamaJsonConfig::default()
        })
        .unwrap();

        let result = client
            .prompt_json(&intent_prompt(), &json!({"user_input": "Licht an"}), None)
            .await
            .unwrap();
        assert_eq!(result.unwrap()["intent"], "HassTurnOn");
    }

    #[tokio::test]
    async fn test_schema_violation_is_a_miss() {
        let endpoint = spawn_server(json!({"wrong_field": 1})).await;
        let client = OllamaJsonClient::new(OllamaJsonConfig {
            endpoint,
            ..OllamaJsonConfig::default()
        })
        .unwrap();

        let result = client
            .prompt_json(&intent_prompt(), &json!({"user_input": "Licht an"}), None)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }
}
