//! Vacuum capability: one script invocation, fire-and-forget.

use super::CapabilityOutcome;
use crate::services::Services;
use heim_agent_config::vocab::has_global_keyword;
use heim_agent_core::{Slots, SpokenReply, Utterance};
use heim_agent_resolve::AreaResolution;
use serde_json::{json, Value};

/// The platform script handling room/floor/global targeting internally.
const SCRIPT_ENTITY_ID: &str = "script.vacuum_universal_clean";

pub struct VacuumCapability {
    services: Services,
}

impl VacuumCapability {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    pub async fn run(&self, utterance: &Utterance, slots: &Slots) -> CapabilityOutcome {
        let mode = slots
            .get("mode")
            .and_then(Value::as_str)
            .unwrap_or("vacuum")
            .to_string();
        let area = slots.get("area").and_then(Value::as_str);
        let floor = slots.get("floor").and_then(Value::as_str);

        let target = if area.map(has_global_keyword).unwrap_or(false)
            || has_global_keyword(&utterance.text)
        {
            Some("Alles".to_string())
        } else if let Some(floor) = floor {
            Some(floor.to_string())
        } else if let Some(area) = area {
            // Normalize aliases ("Bad" -> "Badezimmer") so the script finds
            // the room; fall back to the spoken name.
            match self
                .services
                .area_resolver
                .resolve_area(self.services.home.as_ref(), area)
                .await
            {
                AreaResolution::Match(name) => Some(name),
                AreaResolution::Global => Some("Alles".to_string()),
                AreaResolution::Unknown { .. } => Some(area.to_string()),
            }
        } else {
            None
        };

        let Some(target) = target else {
            return CapabilityOutcome::done(SpokenReply::say(
                "Ich habe kein Ziel (Raum oder Etage) verstanden.",
            ));
        };

        tracing::info!(target = %target, mode = %mode, "starting vacuum script");
        let result = self
            .services
            .home
            .call_service(
                "script",
                "turn_on",
                json!({
                    "entity_id": SCRIPT_ENTITY_ID,
                    "variables": {"target": target, "mode": mode},
                }),
            )
            .await;

        if let Err(err) = result {
            tracing::warn!(%err, "vacuum script failed");
            return CapabilityOutcome::done(SpokenReply::say(
                "Fehler beim Starten des Saugroboters.",
            ));
        }

        let action = if mode == "mop" { "wischen" } else { "saugen" };
        let spoken_target = if target == "Alles" {
            "das Haus".to_string()
        } else {
            target
        };
        CapabilityOutcome::done(SpokenReply::say(format!(
            "Alles klar, ich lasse {spoken_target} {action}."
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sim_services;
    use heim_agent_core::SimHome;
    use std::sync::Arc;

    fn slots(pairs: &[(&str, &str)]) -> Slots {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect()
    }

    #[tokio::test]
    async fn test_room_scope_uses_registry_name() {
        let dir = tempfile::tempdir().unwrap();
        let home = Arc::new(SimHome::new());
        home.add_area("kueche", "Küche", None);
        let vacuum = VacuumCapability::new(sim_services(home.clone(), dir.path(), vec![]));

        let outcome = vacuum
            .run(
                &Utterance::new("Staubsauge die Küche", "c1"),
                &slots(&[("area", "Küche")]),
            )
            .await;
        assert!(outcome.reply.speech.contains("Küche"));

        let calls = home.service_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].data["variables"]["target"], "Küche");
        assert_eq!(calls[0].data["variables"]["mode"], "vacuum");
    }

    #[tokio::test]
    async fn test_global_keyword_bypasses_area_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let home = Arc::new(SimHome::new());
        let vacuum = VacuumCapability::new(sim_services(home.clone(), dir.path(), vec![]));

        let outcome = vacuum
            .run(
                &Utterance::new("Sauge das ganze Haus", "c1"),
                &Slots::new(),
            )
            .await;
        assert!(outcome.reply.speech.contains("das Haus"));
        assert_eq!(
            home.service_calls()[0].data["variables"]["target"],
            "Alles"
        );
    }

    #[tokio::test]
    async fn test_missing_target_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let home = Arc::new(SimHome::new());
        let vacuum = VacuumCapability::new(sim_services(home, dir.path(), vec![]));

        let outcome = vacuum
            .run(&Utterance::new("Fang an zu saugen", "c1"), &Slots::new())
            .await;
        assert!(outcome.reply.speech.contains("kein Ziel"));
    }

    #[tokio::test]
    async fn test_mop_mode_wording() {
        let dir = tempfile::tempdir().unwrap();
        let home = Arc::new(SimHome::new());
        home.add_area("bad", "Badezimmer", None);
        let vacuum = VacuumCapability::new(sim_services(home.clone(), dir.path(), vec![]));

        let outcome = vacuum
            .run(
                &Utterance::new("Wische das Badezimmer", "c1"),
                &slots(&[("area", "Badezimmer"), ("mode", "mop")]),
            )
            .await;
        assert!(outcome.reply.speech.contains("wischen"));
    }
}
