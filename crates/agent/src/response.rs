//! Spoken confirmations and error replies.

use heim_agent_config::domain::domain_config;
use heim_agent_config::responses::{self, ResponseBucket};
use heim_agent_core::{intent as intents, Context, HomePlatform, Slots, SpokenReply};
use heim_agent_text_processing::{join_names, normalize_speech_for_tts};
use serde_json::Value;

/// Friendly names for a set of entities, falling back to the id.
pub fn friendly_names(home: &dyn HomePlatform, entity_ids: &[String]) -> Vec<String> {
    entity_ids
        .iter()
        .map(|eid| {
            home.entities()
                .into_iter()
                .find(|e| &e.entity_id == eid)
                .and_then(|e| e.friendly_name().map(str::to_string))
                .unwrap_or_else(|| eid.clone())
        })
        .collect()
}

fn bucket_for(intent: &str, domain: &str, params: &Slots) -> (ResponseBucket, String, String) {
    let command = params.get("command").and_then(Value::as_str);
    match intent {
        intents::TURN_ON if domain == "cover" => (ResponseBucket::Open, String::new(), String::new()),
        intents::TURN_OFF if domain == "cover" => {
            (ResponseBucket::Close, String::new(), String::new())
        }
        intents::TURN_ON => (ResponseBucket::Toggle, String::new(), "an".to_string()),
        intents::TURN_OFF => (ResponseBucket::Toggle, String::new(), "aus".to_string()),
        intents::LIGHT_SET => match command {
            Some("step_up") => (ResponseBucket::BrightnessUp, String::new(), String::new()),
            Some("step_down") => (ResponseBucket::BrightnessDown, String::new(), String::new()),
            _ => {
                let value = params
                    .get("brightness")
                    .map(value_to_display)
                    .unwrap_or_default();
                (ResponseBucket::ValueSet, value, String::new())
            }
        },
        intents::SET_POSITION => match command {
            Some("step_up") => (ResponseBucket::Open, String::new(), String::new()),
            Some("step_down") => (ResponseBucket::Close, String::new(), String::new()),
            _ => match params.get("position").and_then(Value::as_f64) {
                Some(p) if p >= 100.0 => (ResponseBucket::Open, String::new(), String::new()),
                Some(p) if p <= 0.0 => (ResponseBucket::Close, String::new(), String::new()),
                Some(p) => (ResponseBucket::ValueSet, format!("{p}"), String::new()),
                None => (ResponseBucket::Generic, String::new(), String::new()),
            },
        },
        intents::CLIMATE_SET_TEMPERATURE => {
            let value = params
                .get("temperature")
                .map(value_to_display)
                .unwrap_or_default();
            (ResponseBucket::SetTemperature, value, String::new())
        }
        _ => (ResponseBucket::Generic, String::new(), String::new()),
    }
}

fn value_to_display(value: &Value) -> String {
    match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build a spoken confirmation for an executed intent when no handler
/// produced speech. Template pick is random within the action's bucket.
pub fn build_confirmation(
    home: &dyn HomePlatform,
    intent: &str,
    params: &Slots,
    entity_ids: &[String],
) -> String {
    let domain = entity_ids
        .first()
        .and_then(|id| id.split('.').next())
        .unwrap_or("default");

    if intent == intents::GET_STATE {
        return build_state_answer(home, entity_ids);
    }

    let names = friendly_names(home, entity_ids);
    let name = if names.is_empty() {
        "das Gerät".to_string()
    } else {
        join_names(&names)
    };

    let (bucket, value, action) = bucket_for(intent, domain, params);
    let mut rng = rand::thread_rng();
    let message =
        responses::render_confirmation(&mut rng, domain, bucket, &name, &value, &action);
    normalize_speech_for_tts(&message)
}

/// Spoken answer to a state query, including sensor units.
pub fn build_state_answer(home: &dyn HomePlatform, entity_ids: &[String]) -> String {
    let mut parts: Vec<String> = Vec::new();
    for eid in entity_ids {
        let Some(state) = home.state(eid) else {
            continue;
        };
        if state.is_unavailable() {
            continue;
        }
        let name = friendly_names(home, std::slice::from_ref(eid))
            .into_iter()
            .next()
            .unwrap_or_else(|| eid.clone());
        let domain = eid.split('.').next().unwrap_or("");

        let spoken_state = match domain_config(domain) {
            Some(config) => config.state_word(&state.state).to_string(),
            None => state.state.clone(),
        };
        let unit = state.str_attr("unit_of_measurement").unwrap_or("");
        if unit.is_empty() {
            parts.push(format!("{name} ist {spoken_state}"));
        } else {
            // No space before the unit symbol; TTS normalization expands it
            // to " Grad Celsius" etc. with its own leading space.
            parts.push(format!("{name} ist {}{unit}", state.state));
        }
    }

    if parts.is_empty() {
        return "Der Wert ist derzeit nicht verfügbar.".to_string();
    }
    normalize_speech_for_tts(&format!("{}.", join_names(&parts)))
}

/// Reply when a well-formed intent resolved no entities, enriched with a
/// hint when matching devices exist but are not exposed.
pub fn no_devices_reply(context: &Context) -> SpokenReply {
    let not_exposed = context
        .get("filtered_not_exposed")
        .and_then(Value::as_array)
        .map(|a| !a.is_empty())
        .unwrap_or(false);
    if not_exposed {
        SpokenReply::say(format!(
            "Ich konnte kein passendes Gerät finden. {}",
            responses::ERR_NOT_EXPOSED
        ))
    } else {
        SpokenReply::say("Ich konnte kein passendes Gerät finden.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heim_agent_config::responses::template_pool;
    use heim_agent_core::{EntityState, SimHome};

    fn sim_home() -> SimHome {
        let home = SimHome::new();
        home.add_area("kueche", "Küche", None);
        home.add_entity("light.kueche", "Küche", Some("kueche"));
        home
    }

    #[test]
    fn test_confirmation_comes_from_pool() {
        let home = sim_home();
        let params = Slots::new();
        let pool = template_pool("light", ResponseBucket::Toggle);

        for _ in 0..10 {
            let message = build_confirmation(
                &home,
                intents::TURN_ON,
                &params,
                &["light.kueche".to_string()],
            );
            let matched = pool.iter().any(|t| {
                t.replace("{name}", "Küche").replace("{action}", "an") == message
            });
            assert!(matched, "unexpected confirmation: {message}");
            assert!(message.contains("Küche"));
            assert!(message.contains("an"));
        }
    }

    #[test]
    fn test_state_answer_with_unit_is_tts_safe() {
        let home = sim_home();
        home.add_entity("sensor.kueche_temp", "Küche Temperatur", Some("kueche"));
        home.set_state(
            "sensor.kueche_temp",
            EntityState::new("21.5").with_attr("unit_of_measurement", "°C"),
        );

        let answer = build_state_answer(&home, &["sensor.kueche_temp".to_string()]);
        assert_eq!(answer, "Küche Temperatur ist 21,5 Grad Celsius.");
    }

    #[test]
    fn test_state_answer_unavailable() {
        let home = sim_home();
        home.set_state("light.kueche", EntityState::new("unavailable"));
        let answer = build_state_answer(&home, &["light.kueche".to_string()]);
        assert_eq!(answer, "Der Wert ist derzeit nicht verfügbar.");
    }

    #[test]
    fn test_no_devices_reply_mentions_exposure() {
        let mut context = Context::new();
        context.insert(
            "filtered_not_exposed".into(),
            serde_json::json!(["light.versteckt"]),
        );
        let reply = no_devices_reply(&context);
        assert!(reply.speech.contains("nicht für Sprachbefehle"));
    }
}
