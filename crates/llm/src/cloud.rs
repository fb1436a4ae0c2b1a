//! Cloud LLM client for the final fallback stage.

use crate::LlmError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

/// One turn of per-conversation chat history.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

/// Cloud chat seam: a single call with optional history.
#[async_trait]
pub trait ChatLlm: Send + Sync {
    async fn chat(&self, prompt: &str, history: &[ChatTurn]) -> Result<String, LlmError>;
}

#[derive(Debug, Clone)]
pub struct CloudConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub deadline: Duration,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl CloudConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com".to_string(),
            api_key: api_key.into(),
            model: "gemini-2.0-flash".to_string(),
            deadline: Duration::from_secs(60),
            max_output_tokens: 4096,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

/// generateContent-style cloud client.
pub struct CloudClient {
    client: Client,
    config: CloudConfig,
}

impl CloudClient {
    pub fn new(config: CloudConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.deadline)
            .build()
            .map_err(|e| LlmError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn format_history(history: &[ChatTurn]) -> Vec<Content> {
        history
            .iter()
            .map(|turn| Content {
                role: match turn.role {
                    ChatRole::User => "user".to_string(),
                    ChatRole::Assistant => "model".to_string(),
                },
                parts: vec![Part {
                    text: turn.content.clone(),
                }],
            })
            .collect()
    }
}

#[async_trait]
impl ChatLlm for CloudClient {
    async fn chat(&self, prompt: &str, history: &[ChatTurn]) -> Result<String, LlmError> {
        let mut contents = Self::format_history(history);
        contents.push(Content {
            role: "user".to_string(),
            parts: vec![Part {
                text: prompt.to_string(),
            }],
        });

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.config.endpoint, self.config.model, self.config.api_key
        );

        let response = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                contents,
                generation_config: GenerationConfig {
                    max_output_tokens: self.config.max_output_tokens,
                    temperature: self.config.temperature,
                },
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let lower = body.to_lowercase();
            if status.as_u16() == 429
                || lower.contains("quota")
                || lower.contains("resource_exhausted")
            {
                return Err(LlmError::QuotaExhausted(format!("{status}: {body}")));
            }
            return Err(LlmError::Api(format!("{status}: {body}")));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        parsed
            .candidates
            .and_then(|mut candidates| candidates.drain(..).next())
            .and_then(|candidate| candidate.content)
            .and_then(|content| content.parts.into_iter().next())
            .map(|part| part.text)
            .ok_or_else(|| LlmError::InvalidResponse("empty candidate list".to_string()))
    }
}
