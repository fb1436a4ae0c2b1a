//! S3 — cloud fallback: one call, chat or intent mode.

use crate::chat_history::ChatHistory;
use crate::services::Services;
use crate::stage::Stage;
use async_trait::async_trait;
use heim_agent_config::responses as messages;
use heim_agent_core::{Context, Slots, SpokenReply, StageResult, Utterance};
use heim_agent_llm::LlmError;
use serde_json::Value;
use std::sync::Arc;

const CHAT_SYSTEM_PROMPT: &str = "Du bist ein freundlicher Smart-Home-Assistent.\n\
    Antworte kurz und natürlich auf Deutsch (Du-Form).\n\
    Der Benutzer möchte plaudern, nicht Geräte steuern.";

pub struct CloudStage {
    services: Services,
    history: Arc<ChatHistory>,
}

impl CloudStage {
    pub fn new(services: Services, history: Arc<ChatHistory>) -> Self {
        Self { services, history }
    }

    fn intent_prompt(&self, utterance: &Utterance) -> String {
        let areas: Vec<String> = self
            .services
            .home
            .areas()
            .into_iter()
            .map(|a| a.name)
            .collect();
        let floors: Vec<String> = self
            .services
            .home
            .floors()
            .into_iter()
            .map(|f| f.name)
            .collect();
        format!(
            "Du bist ein Smart-Home-Assistent.\n\
             Analysiere die Benutzereingabe und extrahiere den Intent.\n\
             Verfügbare Intents: HassTurnOn, HassTurnOff, HassLightSet, HassSetPosition, \
             HassGetState, HassClimateSetTemperature, HassTemporaryControl, \
             HassDelayedControl, HassTimerSet.\n\
             Bei einer allgemeinen Frage antworte mit:\n\
             {{\"mode\": \"chat\", \"response\": \"Deine Antwort\"}}\n\
             Bei einem Smart-Home-Befehl antworte mit:\n\
             {{\"mode\": \"intent\", \"intent\": \"IntentName\", \"area\": \"Bereich\", \
             \"floor\": \"Etage\", \"domain\": \"light/cover/switch/climate\", \"params\": {{}}}}\n\
             Verfügbare Bereiche: {areas}\n\
             Verfügbare Etagen: {floors}\n\
             Benutzereingabe: {input}",
            areas = if areas.is_empty() {
                "Keine bekannt".to_string()
            } else {
                areas.join(", ")
            },
            floors = if floors.is_empty() {
                "Keine bekannt".to_string()
            } else {
                floors.join(", ")
            },
            input = utterance.text,
        )
    }

    fn parse_response(text: &str) -> Value {
        let mut trimmed = text.trim();
        if let Some(inner) = trimmed.strip_prefix("```") {
            let inner = inner.strip_prefix("json").unwrap_or(inner);
            if let Some(end) = inner.rfind("```") {
                trimmed = inner[..end].trim();
            }
        }
        serde_json::from_str(trimmed).unwrap_or_else(|_| {
            // Not JSON at all: treat the whole text as a chat answer.
            serde_json::json!({"mode": "chat", "response": text})
        })
    }

    async fn handle_chat(
        &self,
        cloud: &dyn heim_agent_llm::ChatLlm,
        utterance: &Utterance,
        context: &Context,
    ) -> StageResult {
        let history = self.history.get(&utterance.conversation_id);
        let prompt = format!("{CHAT_SYSTEM_PROMPT}\n\nBenutzer: {}", utterance.text);

        match cloud.chat(&prompt, &history).await {
            Ok(answer) => {
                self.history
                    .record(&utterance.conversation_id, &utterance.text, &answer);
                StageResult::chat_reply(
                    SpokenReply::say(answer),
                    context.clone(),
                    &utterance.text,
                )
            }
            Err(LlmError::QuotaExhausted(_)) => {
                StageResult::error(SpokenReply::say(messages::ERR_CLOUD_QUOTA))
            }
            Err(err) => {
                tracing::warn!(%err, "cloud chat failed");
                StageResult::error(SpokenReply::say(messages::ERR_CLOUD))
            }
        }
    }

    async fn handle_intent(
        &self,
        cloud: &dyn heim_agent_llm::ChatLlm,
        utterance: &Utterance,
        context: &Context,
    ) -> StageResult {
        let prompt = self.intent_prompt(utterance);
        let raw = match cloud.chat(&prompt, &[]).await {
            Ok(raw) => raw,
            Err(LlmError::QuotaExhausted(_)) => {
                return StageResult::error(SpokenReply::say(messages::ERR_CLOUD_QUOTA));
            }
            Err(err) => {
                tracing::warn!(%err, "cloud intent derivation failed");
                return StageResult::error(SpokenReply::say(messages::ERR_CLOUD));
            }
        };

        let parsed = Self::parse_response(&raw);
        match parsed.get("mode").and_then(Value::as_str) {
            Some("chat") => {
                let answer = parsed
                    .get("response")
                    .and_then(Value::as_str)
                    .unwrap_or(raw.as_str())
                    .to_string();
                StageResult::chat_reply(
                    SpokenReply::say(answer),
                    context.clone(),
                    &utterance.text,
                )
            }
            Some("intent") => {
                let Some(intent) = parsed
                    .get("intent")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                else {
                    return StageResult::error(SpokenReply::say(
                        "Entschuldigung, ich konnte das nicht verstehen.",
                    ));
                };

                let mut slots = Slots::new();
                for key in ["area", "floor", "domain"] {
                    if let Some(value) = parsed.get(key).and_then(Value::as_str) {
                        if !value.is_empty() {
                            slots.insert(key.to_string(), Value::from(value));
                        }
                    }
                }
                let mut params = Slots::new();
                if let Some(extra) = parsed.get("params").and_then(Value::as_object) {
                    for (k, v) in extra {
                        params.insert(k.clone(), v.clone());
                    }
                }

                let resolved = self
                    .services
                    .entity_resolver
                    .resolve(
                        self.services.home.as_ref(),
                        &slots,
                        &intent,
                        &utterance.text,
                    )
                    .await;

                let mut next_context = context.clone();
                next_context.insert("from_cloud".to_string(), Value::Bool(true));
                for key in ["area", "floor", "domain"] {
                    if let Some(value) = slots.get(key) {
                        next_context.insert(key.to_string(), value.clone());
                    }
                }
                if resolved.ids.is_empty() {
                    next_context.insert("no_entities_found".to_string(), Value::Bool(true));
                }

                StageResult::success(intent, resolved.ids, params, next_context, &utterance.text)
            }
            _ => StageResult::error(SpokenReply::say(
                "Entschuldigung, ich konnte das nicht verstehen.",
            )),
        }
    }
}

#[async_trait]
impl Stage for CloudStage {
    fn name(&self) -> &'static str {
        "cloud"
    }

    async fn process(&self, utterance: &Utterance, context: &Context) -> StageResult {
        let Some(cloud) = self.services.cloud.clone() else {
            // Unconfigured cloud keeps this stage permanently inactive.
            tracing::debug!("cloud stage inactive (no API key)");
            return StageResult::escalate(context.clone(), &utterance.text);
        };

        let chat_mode = context
            .get("chat_mode")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if chat_mode {
            self.handle_chat(cloud.as_ref(), utterance, context).await
        } else {
            self.handle_intent(cloud.as_ref(), utterance, context).await
        }
    }
}
