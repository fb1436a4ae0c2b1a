//! Timer capability: slot-filling for duration and target device, then a
//! fire-and-forget platform command to the selected mobile device.

use super::CapabilityOutcome;
use crate::services::Services;
use heim_agent_config::responses as messages;
use heim_agent_core::{
    NotifyService, PendingData, PendingPayload, Slots, SpokenReply, TimerPending, TimerStep,
    Utterance,
};
use heim_agent_llm::Prompt;
use heim_agent_text_processing::{format_seconds_de, parse_duration_secs, token_set_ratio};
use serde_json::{json, Value};

pub struct TimerCapability {
    services: Services,
}

impl TimerCapability {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Start a timer flow from parsed slots.
    pub async fn start(&self, utterance: &Utterance, slots: &Slots) -> CapabilityOutcome {
        let duration_secs = slots
            .get("duration")
            .and_then(|v| match v {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => parse_duration_secs(s),
                _ => None,
            })
            .or_else(|| parse_duration_secs(&utterance.text));
        let requested_name = slots
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string);

        // Free-text description ("der mich an das Gulasch erinnert") is
        // extracted exactly once and carried through the pending record.
        let description = self.extract_description(&utterance.text).await;

        self.advance(
            TimerPending {
                step: TimerStep::AskDuration,
                duration_secs,
                device: None,
                requested_name,
                candidates: Vec::new(),
                description,
            },
            None,
        )
        .await
    }

    /// Continue a pending timer flow with the user's answer.
    pub async fn continue_flow(
        &self,
        utterance: &Utterance,
        mut pending: TimerPending,
    ) -> CapabilityOutcome {
        let mut learned: Option<(String, String)> = None;
        match pending.step {
            TimerStep::AskDuration => match parse_duration_secs(&utterance.text) {
                Some(secs) => pending.duration_secs = Some(secs),
                None => {
                    return CapabilityOutcome {
                        reply: SpokenReply::ask(
                            "Ich habe die Zeit nicht verstanden. Bitte sag z.B. '5 Minuten'.",
                        ),
                        pending: Some(PendingData::new(
                            messages::Q_TIMER_DURATION,
                            PendingPayload::Timer(pending),
                        )),
                    };
                }
            },
            TimerStep::AskDevice => {
                match Self::fuzzy_match_device(&utterance.text, &pending.candidates) {
                    Some(service) => {
                        // The user just taught us what that name means.
                        if let Some(requested) = &pending.requested_name {
                            learned = Some((requested.clone(), service.clone()));
                        }
                        pending.device = Some(service);
                    }
                    None => {
                        return CapabilityOutcome {
                            reply: SpokenReply::ask(
                                "Das habe ich nicht verstanden. Welches Gerät?",
                            ),
                            pending: Some(PendingData::new(
                                "Auf welchem Gerät?",
                                PendingPayload::Timer(pending),
                            )),
                        };
                    }
                }
            }
        }

        self.advance(pending, learned).await
    }

    /// Drive the state machine forward: ask for whatever is still missing,
    /// fire the timer once everything is known.
    async fn advance(
        &self,
        mut pending: TimerPending,
        learned: Option<(String, String)>,
    ) -> CapabilityOutcome {
        let Some(duration_secs) = pending.duration_secs else {
            pending.step = TimerStep::AskDuration;
            return CapabilityOutcome::ask(PendingData::new(
                messages::Q_TIMER_DURATION,
                PendingPayload::Timer(pending),
            ));
        };

        if pending.device.is_none() {
            let services = self.services.home.notify_services();
            if services.is_empty() {
                return CapabilityOutcome::done(SpokenReply::say("Keine mobilen Geräte gefunden."));
            }

            if let Some(requested) = &pending.requested_name {
                pending.device = Self::fuzzy_match_device(requested, &services);
            }

            if pending.device.is_none() {
                if services.len() == 1 {
                    pending.device = Some(services[0].service.clone());
                } else {
                    let names: Vec<&str> =
                        services.iter().map(|s| s.name.as_str()).collect();
                    let question = format!("Auf welchem Gerät? ({})", names.join(", "));
                    pending.step = TimerStep::AskDevice;
                    pending.candidates = services;
                    return CapabilityOutcome::ask(PendingData::new(
                        question,
                        PendingPayload::Timer(pending),
                    ));
                }
            }
        }

        let device = pending.device.clone().unwrap_or_default();
        if let Some((source, target)) = learned {
            if let Err(err) = self.services.aliases.learn_entity_alias(&source, &target).await {
                tracing::warn!(%err, "failed to persist learned timer device");
            }
        }

        if let Err(err) = self.fire_timer(&device, duration_secs).await {
            tracing::warn!(%err, device = %device, "timer command failed");
            return CapabilityOutcome::done(SpokenReply::say(
                "Der Timer konnte nicht gesetzt werden.",
            ));
        }

        let friendly = self
            .services
            .home
            .notify_services()
            .into_iter()
            .find(|s| s.service == device)
            .map(|s| s.name)
            .unwrap_or_else(|| device.clone());
        CapabilityOutcome::done(SpokenReply::say(format!(
            "Timer für {} auf {friendly} gestellt.",
            format_seconds_de(duration_secs)
        )))
    }

    async fn fire_timer(&self, service: &str, seconds: u64) -> heim_agent_core::Result<()> {
        let (domain, name) = service.split_once('.').unwrap_or(("notify", service));
        self.services
            .home
            .call_service(
                domain,
                name,
                json!({
                    "message": "command_activity",
                    "data": {
                        "intent_action": "android.intent.action.SET_TIMER",
                        "intent_extras": format!(
                            "android.intent.extra.alarm.LENGTH:{seconds},android.intent.extra.alarm.SKIP_UI:true"
                        ),
                    },
                }),
            )
            .await
    }

    fn fuzzy_match_device(query: &str, candidates: &[NotifyService]) -> Option<String> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return None;
        }
        let mut best: Option<(&NotifyService, u32)> = None;
        for candidate in candidates {
            let short = candidate
                .service
                .rsplit('.')
                .next()
                .unwrap_or(&candidate.service);
            let score = token_set_ratio(&query, &candidate.name.to_lowercase())
                .max(token_set_ratio(&query, short));
            if score > 70 && best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((candidate, score));
            }
        }
        best.map(|(c, _)| c.service.clone())
    }

    /// One-shot LLM extraction of an optional reminder description.
    async fn extract_description(&self, text: &str) -> Option<String> {
        let prompt = Prompt::new(
            "Extrahiere eine optionale Beschreibung aus einem Timer-Befehl.\n\
             Beispiel: \"Timer auf 15 Minuten der mich an das Gulasch erinnert\" \
             -> {\"description\": \"Gulasch\"}\n\
             Ohne Beschreibung: {\"description\": null}",
            json!({
                "type": "object",
                "properties": {"description": {"type": ["string", "null"]}},
                "required": ["description"],
            }),
        );
        match self
            .services
            .llm
            .prompt_json(&prompt, &json!({"user_input": text}), Some(0.0))
            .await
        {
            Ok(Some(data)) => data
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sim_services;
    use heim_agent_core::SimHome;
    use std::sync::Arc;

    fn home_with_phones(count: usize) -> Arc<SimHome> {
        let home = Arc::new(SimHome::new());
        for i in 1..=count {
            home.add_notify_service(
                &format!("notify.mobile_app_phone_{i}"),
                &format!("Phone {i}"),
            );
        }
        home
    }

    #[tokio::test]
    async fn test_asks_for_duration_first() {
        let dir = tempfile::tempdir().unwrap();
        let home = home_with_phones(2);
        let timer = TimerCapability::new(sim_services(home, dir.path(), vec![]));

        let outcome = timer
            .start(&Utterance::new("Stelle einen Timer", "c1"), &Slots::new())
            .await;
        let pending = outcome.pending.expect("must ask for duration");
        match pending.payload {
            PendingPayload::Timer(t) => assert_eq!(t.step, TimerStep::AskDuration),
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_two_devices_then_fuzzy_pick() {
        let dir = tempfile::tempdir().unwrap();
        let home = home_with_phones(2);
        let timer = TimerCapability::new(sim_services(home.clone(), dir.path(), vec![]));

        // Turn 1: no duration yet.
        let outcome = timer
            .start(&Utterance::new("Stelle einen Timer", "c1"), &Slots::new())
            .await;
        let PendingPayload::Timer(pending) = outcome.pending.unwrap().payload else {
            panic!("expected timer payload");
        };

        // Turn 2: duration arrives, two devices -> ask which.
        let outcome = timer
            .continue_flow(&Utterance::new("5 Minuten", "c1"), pending)
            .await;
        let PendingPayload::Timer(pending) = outcome.pending.unwrap().payload else {
            panic!("expected timer payload");
        };
        assert_eq!(pending.step, TimerStep::AskDevice);
        assert_eq!(pending.duration_secs, Some(300));
        assert_eq!(pending.candidates.len(), 2);

        // Turn 3: device picked, timer fires.
        let outcome = timer
            .continue_flow(&Utterance::new("Phone 1", "c1"), pending)
            .await;
        assert!(outcome.pending.is_none());
        assert!(outcome.reply.speech.contains("5 Minuten"));
        assert!(outcome.reply.speech.contains("Phone 1"));

        let calls = home.service_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].service, "mobile_app_phone_1");
    }

    #[tokio::test]
    async fn test_single_device_auto_selected() {
        let dir = tempfile::tempdir().unwrap();
        let home = home_with_phones(1);
        let timer = TimerCapability::new(sim_services(home.clone(), dir.path(), vec![]));

        let mut slots = Slots::new();
        slots.insert("duration".into(), Value::from("10 Minuten"));
        let outcome = timer
            .start(&Utterance::new("Timer auf 10 Minuten", "c1"), &slots)
            .await;

        assert!(outcome.pending.is_none());
        assert_eq!(home.service_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_description_extracted_once_at_start() {
        use crate::testing::{BagEmbedder, OverlapReranker, ScriptedLlm};
        use heim_agent_cache::{CacheConfig, SemanticCache};
        use heim_agent_config::Settings;
        use heim_agent_persistence::AliasStore;

        let dir = tempfile::tempdir().unwrap();
        let home = home_with_phones(2);
        let llm = Arc::new(ScriptedLlm::new(vec![Some(
            json!({"description": "Gulasch"}),
        )]));
        let settings = Arc::new(Settings::default());
        let embedder: Arc<dyn heim_agent_cache::Embedder> = Arc::new(BagEmbedder);
        let cache = Arc::new(SemanticCache::new(
            embedder.clone(),
            Arc::new(OverlapReranker),
            CacheConfig::from(&settings.cache),
            dir.path().join("semantic_cache.json"),
        ));
        let aliases = Arc::new(AliasStore::new(dir.path().join("memory.json")));
        let services =
            Services::new(home, cache, embedder, llm.clone(), None, aliases, settings);
        let timer = TimerCapability::new(services);

        let outcome = timer
            .start(
                &Utterance::new("Timer der mich an das Gulasch erinnert", "c1"),
                &Slots::new(),
            )
            .await;
        let PendingPayload::Timer(pending) = outcome.pending.unwrap().payload else {
            panic!("expected timer payload");
        };
        assert_eq!(pending.description.as_deref(), Some("Gulasch"));
        assert_eq!(llm.call_count(), 1);

        // Continuations never re-extract the description.
        let _ = timer
            .continue_flow(&Utterance::new("5 Minuten", "c1"), pending)
            .await;
        assert_eq!(llm.call_count(), 1);
    }
}
