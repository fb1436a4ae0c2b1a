//! S0 — NLU probe. Pure rule-based recognition, no LLM.

use crate::services::Services;
use crate::stage::Stage;
use async_trait::async_trait;
use heim_agent_core::{intent as intents, Context, Slots, StageResult, Utterance};
use serde_json::Value;

pub struct NluProbeStage {
    services: Services,
}

impl NluProbeStage {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Stage for NluProbeStage {
    fn name(&self) -> &'static str {
        "nlu_probe"
    }

    async fn process(&self, utterance: &Utterance, context: &Context) -> StageResult {
        let Some(nlu_match) = self.services.home.recognize(utterance).await else {
            tracing::debug!("NLU probe produced no intent");
            return StageResult::escalate(context.clone(), &utterance.text);
        };

        let slots: Slots = nlu_match
            .entities
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
            .collect();
        let resolved = self
            .services
            .entity_resolver
            .resolve(
                self.services.home.as_ref(),
                &slots,
                &nlu_match.intent,
                &utterance.text,
            )
            .await;

        let mut next_context = context.clone();
        if resolved.ids.is_empty() {
            tracing::debug!(intent = %nlu_match.intent, "NLU probe resolved no entities");
            return StageResult::escalate(next_context, &utterance.text);
        }

        let threshold = self.services.settings.early_filter_threshold;
        if resolved.ids.len() > threshold {
            tracing::debug!(
                count = resolved.ids.len(),
                threshold,
                "too many candidates, escalating"
            );
            next_context.insert("nlu_too_many".to_string(), Value::Bool(true));
            return StageResult::escalate(next_context, &utterance.text);
        }

        if resolved.ids.len() == 1 && intents::is_host_intent(&nlu_match.intent) {
            // Single resolved entity and a standard host intent: execute
            // directly, no LLM involvement.
            let params: Slots = slots
                .iter()
                .filter(|(k, _)| {
                    !matches!(
                        k.as_str(),
                        "area" | "room" | "floor" | "name" | "domain" | "device_class"
                    )
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            return StageResult::success(
                nlu_match.intent,
                resolved.ids,
                params,
                next_context,
                &utterance.text,
            );
        }

        // Several candidates: remember them and let later stages decide.
        next_context.insert(
            "nlu_entity_ids".to_string(),
            Value::from(resolved.ids.clone()),
        );
        next_context.insert("nlu_intent".to_string(), Value::from(nlu_match.intent));
        StageResult::escalate(next_context, &utterance.text)
    }
}
