//! S2 — local LLM stage: chat detection, compound clarification, keyword
//! intent parsing, resolver wiring, and the multi-turn capabilities.

use crate::capabilities::{CalendarCapability, CapabilityOutcome, TimerCapability, VacuumCapability};
use crate::services::Services;
use crate::stage::Stage;
use async_trait::async_trait;
use heim_agent_core::{
    Context, PendingData, PendingPayload, Slots, StageResult, Utterance,
};
use heim_agent_llm::Prompt;
use heim_agent_resolve::AreaResolution;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;

/// The user wants conversation, not device control.
static CHAT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\berzähl\b",
        r"\bwitz\b",
        r"\bjoke\b",
        r"\bstory\b",
        r"\bgeschichte\b",
        r"\bwer bist du\b",
        r"\bwas kannst du\b",
        r"\bhilfe\b",
        r"\bhelp\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

fn clarification_prompt() -> Prompt {
    Prompt::new(
        "Du zerlegst deutsche Smart-Home-Befehle in präzise atomare Einzelbefehle.\n\
         1. Teile die Eingabe nur auf, wenn mehrere Ziele angesprochen werden.\n\
         2. Jeder Befehl beschreibt genau eine Aktion (\"Schalte ... an\", \
         \"Fahre ... runter\", \"Mache ... heller\").\n\
         3. Behalte alle deutschen Wörter exakt wie gesprochen; erfinde keine Bereiche.\n\
         4. Indirekte Wünsche umformen: \"Im Wohnzimmer ist es zu dunkel\" -> \
         [\"Mache das Licht im Wohnzimmer heller\"].\n\
         5. Antworte nur mit einem JSON-Array von Strings.",
        json!({"type": "array", "items": {"type": "string"}}),
    )
}

pub struct LlmStage {
    services: Services,
    timer: Arc<TimerCapability>,
    calendar: Arc<CalendarCapability>,
    vacuum: Arc<VacuumCapability>,
}

impl LlmStage {
    pub fn new(
        services: Services,
        timer: Arc<TimerCapability>,
        calendar: Arc<CalendarCapability>,
        vacuum: Arc<VacuumCapability>,
    ) -> Self {
        Self {
            services,
            timer,
            calendar,
            vacuum,
        }
    }

    fn is_chat_request(text: &str) -> bool {
        let lower = text.to_lowercase();
        CHAT_PATTERNS.iter().any(|p| p.is_match(&lower))
    }

    /// Split compound utterances into atomic commands. The original text
    /// comes back unchanged when there is nothing to split.
    async fn clarify(&self, text: &str) -> Vec<String> {
        match self
            .services
            .llm
            .prompt_json(&clarification_prompt(), &json!({"user_input": text}), None)
            .await
        {
            Ok(Some(Value::Array(items))) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::trim).map(str::to_string))
                .filter(|s| !s.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }

    fn capability_result(outcome: CapabilityOutcome, raw_text: &str) -> StageResult {
        match outcome.pending {
            Some(pending) => StageResult::pending(pending, raw_text),
            None => StageResult::chat_reply(outcome.reply, Context::new(), raw_text),
        }
    }
}

#[async_trait]
impl Stage for LlmStage {
    fn name(&self) -> &'static str {
        "local_llm"
    }

    async fn process(&self, utterance: &Utterance, context: &Context) -> StageResult {
        if Self::is_chat_request(&utterance.text) {
            tracing::debug!("chat request detected");
            return StageResult::escalate_chat(context.clone(), &utterance.text);
        }

        // Clarification: split compounds, rewrite indirect phrasings.
        let clarified = self.clarify(&utterance.text).await;
        let original_norm = utterance.text.trim().to_lowercase();

        let effective = match clarified.len() {
            0 => utterance.clone(),
            1 if clarified[0].to_lowercase() == original_norm => utterance.clone(),
            1 => {
                tracing::debug!(clarified = %clarified[0], "using clarified command");
                utterance.with_text(clarified[0].clone())
            }
            _ => {
                tracing::debug!(count = clarified.len(), "compound split into atomic commands");
                return StageResult::multi_command(clarified, context.clone(), &utterance.text);
            }
        };

        // Keyword intent parsing.
        let Some(parsed) = self.services.intent_parser.parse(&effective.text).await else {
            tracing::debug!("no intent derived, escalating");
            let mut next = context.clone();
            next.insert("llm_failed".to_string(), Value::Bool(true));
            return StageResult::escalate(next, &utterance.text);
        };
        let mut slots = parsed.slots;

        // Multi-turn domains run their own state machines.
        match parsed.domain {
            "timer" => {
                return Self::capability_result(
                    self.timer.start(&effective, &slots).await,
                    &utterance.text,
                );
            }
            "calendar" => {
                return Self::capability_result(
                    self.calendar.start(&effective, &slots).await,
                    &utterance.text,
                );
            }
            "vacuum" => {
                return Self::capability_result(
                    self.vacuum.run(&effective, &slots).await,
                    &utterance.text,
                );
            }
            _ => {}
        }

        // Area alias resolution, with area-learning on failure.
        if let Some(area) = slots.get("area").and_then(Value::as_str).map(str::to_string) {
            match self
                .services
                .area_resolver
                .resolve_area(self.services.home.as_ref(), &area)
                .await
            {
                AreaResolution::Match(name) => {
                    if name != area {
                        tracing::debug!(from = %area, to = %name, "area alias resolved");
                    }
                    slots.insert("area".to_string(), Value::from(name));
                }
                AreaResolution::Global => {
                    slots.remove("area");
                    if slots.get("name").and_then(Value::as_str) == Some(area.as_str()) {
                        slots.remove("name");
                    }
                }
                AreaResolution::Unknown { query, candidates } => {
                    let question = format!(
                        "Ich kenne den Bereich '{query}' nicht. Meinst du {}?",
                        candidates.join(" oder ")
                    );
                    return StageResult::pending(
                        PendingData::new(
                            question,
                            PendingPayload::AreaLearning {
                                unknown_area: query,
                                candidates,
                                original_text: utterance.text.clone(),
                            },
                        ),
                        &utterance.text,
                    );
                }
            }
        }

        if let Some(floor) = slots.get("floor").and_then(Value::as_str).map(str::to_string) {
            if let AreaResolution::Match(name) = self
                .services
                .area_resolver
                .resolve_floor(self.services.home.as_ref(), &floor)
                .await
            {
                slots.insert("floor".to_string(), Value::from(name));
            }
        }

        // Entity resolution.
        let resolved = self
            .services
            .entity_resolver
            .resolve(
                self.services.home.as_ref(),
                &slots,
                &parsed.intent,
                &effective.text,
            )
            .await;

        let mut next_context = context.clone();
        next_context.insert("from_llm".to_string(), Value::Bool(true));
        next_context.insert("domain".to_string(), Value::from(parsed.domain));
        for key in ["area", "floor"] {
            if let Some(value) = slots.get(key) {
                next_context.insert(key.to_string(), value.clone());
            }
        }

        let params: Slots = slots
            .iter()
            .filter(|(k, _)| {
                !matches!(
                    k.as_str(),
                    "area" | "room" | "floor" | "name" | "entity" | "device" | "label" | "domain"
                        | "device_class" | "entity_id"
                )
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if resolved.ids.is_empty() {
            // A well-formed intent with no matching devices: the execution
            // pipeline owns the error reply.
            next_context.insert("no_entities_found".to_string(), Value::Bool(true));
            next_context.insert(
                "filtered_not_exposed".to_string(),
                Value::from(resolved.filtered_not_exposed.clone()),
            );
        }

        StageResult::success(
            parsed.intent,
            resolved.ids,
            params,
            next_context,
            &utterance.text,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sim_services;
    use heim_agent_core::SimHome;

    fn sim_home() -> Arc<SimHome> {
        let home = Arc::new(SimHome::new());
        home.add_area("kueche", "Küche", None);
        home.add_area("buero", "Büro", None);
        home.add_entity("light.kueche", "Küche", Some("kueche"));
        home.add_entity("light.buero", "Büro Licht", Some("buero"));
        home
    }

    fn stage_with(services: Services) -> LlmStage {
        let timer = Arc::new(TimerCapability::new(services.clone()));
        let calendar = Arc::new(CalendarCapability::new(services.clone()));
        let vacuum = Arc::new(VacuumCapability::new(services.clone()));
        LlmStage::new(services, timer, calendar, vacuum)
    }

    #[tokio::test]
    async fn test_chat_requests_escalate_chat() {
        let dir = tempfile::tempdir().unwrap();
        let stage = stage_with(sim_services(sim_home(), dir.path(), vec![]));

        let result = stage
            .process(
                &Utterance::new("Erzähl mir einen Witz", "c1"),
                &Context::new(),
            )
            .await;
        assert!(matches!(result, StageResult::EscalateChat { .. }));
    }

    #[tokio::test]
    async fn test_compound_becomes_multi_command() {
        let dir = tempfile::tempdir().unwrap();
        let services = sim_services(
            sim_home(),
            dir.path(),
            vec![Some(json!([
                "Schalte das Licht im Büro aus",
                "Schalte das Licht im Wohnzimmer an"
            ]))],
        );
        let stage = stage_with(services);

        let result = stage
            .process(
                &Utterance::new(
                    "Schalte das Licht im Büro aus und im Wohnzimmer an",
                    "c1",
                ),
                &Context::new(),
            )
            .await;
        match result {
            StageResult::MultiCommand { commands, .. } => assert_eq!(commands.len(), 2),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_single_command_resolves_entities() {
        let dir = tempfile::tempdir().unwrap();
        // Script: clarification echoes the text, then intent parsing.
        let services = sim_services(
            sim_home(),
            dir.path(),
            vec![
                Some(json!(["Schalte das Licht in der Küche an"])),
                Some(json!({"intent": "HassTurnOn", "slots": {"area": "Küche"}})),
            ],
        );
        let stage = stage_with(services);

        let result = stage
            .process(
                &Utterance::new("Schalte das Licht in der Küche an", "c1"),
                &Context::new(),
            )
            .await;
        match result {
            StageResult::Success {
                intent, entity_ids, ..
            } => {
                assert_eq!(intent.as_deref(), Some("HassTurnOn"));
                assert_eq!(entity_ids, vec!["light.kueche".to_string()]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_area_enters_learning_mode() {
        let dir = tempfile::tempdir().unwrap();
        // Clarification echo, intent parse with odd area, area resolver LLM
        // fails (None).
        let services = sim_services(
            sim_home(),
            dir.path(),
            vec![
                Some(json!(["Licht im Ki-Bad an"])),
                Some(json!({"intent": "HassTurnOn", "slots": {"area": "Ki-Bad", "domain": "light"}})),
                None,
            ],
        );
        let stage = stage_with(services);

        let result = stage
            .process(&Utterance::new("Licht im Ki-Bad an", "c1"), &Context::new())
            .await;
        match result {
            StageResult::Pending { data, .. } => match data.payload {
                PendingPayload::AreaLearning {
                    unknown_area,
                    candidates,
                    ..
                } => {
                    assert_eq!(unknown_area, "Ki-Bad");
                    assert!(candidates.contains(&"Küche".to_string()));
                }
                other => panic!("unexpected payload: {:?}", other),
            },
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_intent_escalates() {
        let dir = tempfile::tempdir().unwrap();
        // Clarification echoes, keyword parse finds nothing (script
        // exhausted → schema miss).
        let services = sim_services(
            sim_home(),
            dir.path(),
            vec![Some(json!(["Mach irgendwas Unverständliches"]))],
        );
        let stage = stage_with(services);

        let result = stage
            .process(
                &Utterance::new("Mach irgendwas Unverständliches", "c1"),
                &Context::new(),
            )
            .await;
        match result {
            StageResult::Escalate { context, .. } => {
                assert_eq!(context.get("llm_failed"), Some(&Value::Bool(true)));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
