//! Shared execution pipeline.
//!
//! Receives a resolved `(intent, entity_ids, params)`, filters by state,
//! checks plurality, disambiguates when needed, resolves relative steps per
//! entity, dispatches, verifies the resulting state transitions, builds the
//! spoken confirmation, and finally offers the command to the cache.

use crate::response;
use crate::services::Services;
use heim_agent_cache::StoreRequest;
use heim_agent_config::responses as messages;
use heim_agent_core::{
    intent as intents, Candidate, Context, PendingData, PendingPayload, Slots, SpokenReply,
    IntentRequest, Utterance,
};
use heim_agent_resolve::{filter_by_state, PluralDetector, StepController};
use heim_agent_text_processing::join_names;
use serde_json::Value;
use std::collections::BTreeMap;

/// Keys used during resolution that must not reach the intent handler.
const RESOLUTION_KEYS: [&str; 8] = [
    "area",
    "room",
    "floor",
    "name",
    "device",
    "label",
    "domain",
    "device_class",
];

/// Result of sending a command through the pipeline.
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub reply: SpokenReply,
    /// True only when every dispatched entity verifiably reached its target
    /// state; gates cache admission.
    pub verified: bool,
    /// Set when the pipeline needs another user turn (disambiguation).
    pub pending: Option<PendingData>,
}

impl ExecutionOutcome {
    fn done(reply: SpokenReply, verified: bool) -> Self {
        Self {
            reply,
            verified,
            pending: None,
        }
    }

    fn ask(pending: PendingData) -> Self {
        Self {
            reply: SpokenReply::ask(pending.original_prompt.clone()),
            verified: false,
            pending: Some(pending),
        }
    }
}

/// Continuation verdict for a disambiguation answer.
#[derive(Debug)]
pub enum ContinuationOutcome {
    Done(ExecutionOutcome),
    /// The answer selected nothing and wasn't a cancellation; re-prompt.
    Reprompt,
    Cancelled,
}

pub struct ExecutionPipeline {
    services: Services,
}

impl ExecutionPipeline {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Execute a resolved command (§4.K steps 1–7).
    pub async fn execute(
        &self,
        utterance: &Utterance,
        intent: &str,
        entity_ids: &[String],
        params: &Slots,
        context: &Context,
    ) -> ExecutionOutcome {
        let home = self.services.home.as_ref();

        if entity_ids.is_empty() {
            return ExecutionOutcome::done(response::no_devices_reply(context), false);
        }

        // 1. State filtering.
        let candidates = if intents::is_state_dependent(intent) {
            let kept = filter_by_state(home, entity_ids, intent);
            if kept.is_empty() {
                tracing::debug!(intent, "all candidates already in target state");
                return ExecutionOutcome::done(SpokenReply::say("Das ist schon erledigt."), false);
            }
            kept
        } else {
            entity_ids.to_vec()
        };

        // 2. Plural check before addressing several entities at once.
        if candidates.len() > 1 && intent != intents::GET_STATE {
            let plural = match PluralDetector::detect_fast(&utterance.text) {
                Some(known) => known,
                None => self.services.plural.detect(&utterance.text).await,
            };
            if !plural {
                let names = response::friendly_names(home, &candidates);
                let question = format!("Ich habe mehrere gefunden: {}. Welches meinst du?",
                    join_names(&names));
                let pending = PendingData::new(
                    question,
                    PendingPayload::Disambiguation {
                        intent: intent.to_string(),
                        params: params.clone(),
                        candidates: candidates
                            .iter()
                            .zip(names.iter())
                            .map(|(entity_id, name)| Candidate {
                                entity_id: entity_id.clone(),
                                name: name.clone(),
                            })
                            .collect(),
                        original_text: utterance.text.clone(),
                        from_cache: context_flag(context, "from_cache"),
                    },
                );
                return ExecutionOutcome::ask(pending);
            }
        }

        self.dispatch_and_confirm(utterance, intent, &candidates, params, context, false, None)
            .await
    }

    /// Continue after the user answered a disambiguation question.
    pub async fn continue_disambiguation(
        &self,
        utterance: &Utterance,
        intent: &str,
        params: &Slots,
        candidates: &[Candidate],
        original_text: &str,
        from_cache: bool,
    ) -> ContinuationOutcome {
        let selected = self
            .services
            .selector
            .select(&utterance.text, candidates)
            .await;

        if selected.is_empty() {
            if heim_agent_text_processing::is_negative(&utterance.text) {
                return ContinuationOutcome::Cancelled;
            }
            return ContinuationOutcome::Reprompt;
        }

        let options: BTreeMap<String, String> = candidates
            .iter()
            .map(|c| (c.entity_id.clone(), c.name.clone()))
            .collect();
        let mut context = Context::new();
        if from_cache {
            context.insert("from_cache".to_string(), Value::Bool(true));
        }
        let original = utterance.with_text(original_text);
        let outcome = self
            .dispatch_and_confirm(
                &original,
                intent,
                &selected,
                params,
                &context,
                true,
                Some(options),
            )
            .await;
        ContinuationOutcome::Done(outcome)
    }

    /// Steps 3–7: step resolution, dispatch, verification, confirmation,
    /// cache admission.
    #[allow(clippy::too_many_arguments)]
    async fn dispatch_and_confirm(
        &self,
        utterance: &Utterance,
        intent: &str,
        entity_ids: &[String],
        params: &Slots,
        context: &Context,
        required_disambiguation: bool,
        disambiguation_options: Option<BTreeMap<String, String>>,
    ) -> ExecutionOutcome {
        let home = self.services.home.as_ref();
        let step_command = params
            .get("command")
            .and_then(Value::as_str)
            .filter(|c| matches!(*c, "step_up" | "step_down"))
            .map(str::to_string);

        let mut executed: Vec<(String, Option<String>, Slots)> = Vec::new();
        let mut any_failed = false;

        for entity_id in entity_ids {
            let Some(state) = home.state(entity_id) else {
                tracing::warn!(entity = %entity_id, "skipping unknown entity");
                continue;
            };
            if state.is_unavailable() {
                tracing::warn!(entity = %entity_id, "skipping unavailable entity");
                continue;
            }

            // 3. Per-entity step resolution; the increment is recomputed
            // from the current value on every replay.
            let mut effective = params.clone();
            if let Some(command) = &step_command {
                match StepController::compute(home, entity_id, command) {
                    Some(step) => {
                        effective.remove("command");
                        effective.insert(
                            step.attribute.to_string(),
                            Value::from(step.new_value),
                        );
                    }
                    None => {
                        // step_down from off is a no-op for this entity.
                        tracing::debug!(entity = %entity_id, "step has no effect, skipping");
                        continue;
                    }
                }
            }

            // 4. Dispatch.
            let mut slots = Slots::new();
            slots.insert("name".to_string(), Value::from(entity_id.as_str()));
            for (key, value) in &effective {
                if RESOLUTION_KEYS.contains(&key.as_str()) || key == "command" || key == "state" {
                    continue;
                }
                slots.insert(key.clone(), value.clone());
            }

            let request = IntentRequest {
                intent: intent.to_string(),
                slots,
                text_input: utterance.text.clone(),
                language: utterance.language.clone(),
            };
            match home.handle_intent(request).await {
                Ok(resp) => executed.push((entity_id.clone(), resp.speech, effective)),
                Err(err) => {
                    tracing::warn!(entity = %entity_id, %err, "intent dispatch failed");
                    any_failed = true;
                }
            }
        }

        if executed.is_empty() {
            let reply = if any_failed {
                SpokenReply::say(messages::ERR_ACTION_FAILED)
            } else {
                SpokenReply::say(messages::ERR_NOT_AVAILABLE)
            };
            return ExecutionOutcome::done(reply, false);
        }

        // 5. Verification: re-read each target's state.
        let verified = !any_failed
            && executed
                .iter()
                .all(|(entity_id, _, effective)| self.verify(entity_id, intent, effective));

        // 6. Response generation.
        let executed_ids: Vec<String> = executed.iter().map(|(id, _, _)| id.clone()).collect();
        let handler_speech = executed.iter().rev().find_map(|(_, s, _)| s.clone());
        let speech = match handler_speech {
            Some(speech) if !speech.trim().is_empty() => {
                heim_agent_text_processing::normalize_speech_for_tts(&speech)
            }
            _ => response::build_confirmation(home, intent, params, &executed_ids),
        };

        // 7. Cache admission, only on verified success and never for replays
        // that came from the cache themselves.
        if verified && !context_flag(context, "from_cache") {
            let mut store_slots = params.clone();
            for key in ["domain", "area", "floor"] {
                if let Some(value) = context.get(key) {
                    store_slots.entry(key.to_string()).or_insert(value.clone());
                }
            }
            let request = StoreRequest {
                text: utterance.text.clone(),
                intent: intent.to_string(),
                entity_ids: executed_ids,
                slots: store_slots,
                required_disambiguation,
                disambiguation_options,
                verified,
            };
            if let Err(err) = self.services.cache.store(request).await {
                tracing::warn!(%err, "cache admission failed");
            }
        }

        ExecutionOutcome::done(SpokenReply::say(speech), verified)
    }

    /// Did the entity reach the state the intent asked for?
    fn verify(&self, entity_id: &str, intent: &str, effective: &Slots) -> bool {
        const TOLERANCE: f64 = 5.0;
        let Some(state) = self.services.home.state(entity_id) else {
            return false;
        };
        let domain = entity_id.split('.').next().unwrap_or("");

        match intent {
            intents::TURN_ON => {
                if domain == "cover" {
                    state.state == "open" || state.state == "opening"
                } else {
                    state.state == "on"
                }
            }
            intents::TURN_OFF => {
                if domain == "cover" {
                    state.state == "closed" || state.state == "closing"
                } else {
                    state.state == "off"
                }
            }
            intents::LIGHT_SET => match effective.get("brightness").and_then(Value::as_f64) {
                Some(requested) => {
                    let actual = state
                        .num_attr("brightness")
                        .map(|raw| raw / 255.0 * 100.0)
                        .unwrap_or(0.0);
                    (actual - requested).abs() <= TOLERANCE
                }
                None => true,
            },
            intents::SET_POSITION => match effective.get("position").and_then(Value::as_f64) {
                Some(requested) => {
                    let actual = state.num_attr("current_position").unwrap_or(0.0);
                    (actual - requested).abs() <= TOLERANCE
                }
                None => true,
            },
            intents::CLIMATE_SET_TEMPERATURE => {
                match effective.get("temperature").and_then(Value::as_f64) {
                    Some(requested) => state
                        .num_attr("temperature")
                        .map(|actual| (actual - requested).abs() < f64::EPSILON)
                        .unwrap_or(false),
                    None => true,
                }
            }
            // Queries and everything else verify by being answerable.
            _ => !state.is_unavailable(),
        }
    }
}

fn context_flag(context: &Context, key: &str) -> bool {
    context.get(key).and_then(Value::as_bool).unwrap_or(false)
}
