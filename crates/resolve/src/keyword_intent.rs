//! Keyword-driven intent parsing.
//!
//! Domain detection is a keyword table lookup (with a fuzzy pass that only
//! repairs same-length typos), then the local LLM fills `{intent, slots}`
//! constrained to the domain's intent whitelist.

use heim_agent_config::domain::{all_domains, detect_domain, domain_config};
use heim_agent_core::Slots;
use heim_agent_llm::{JsonLlm, Prompt};
use heim_agent_text_processing::fuzzy_match_distance;
use serde_json::{json, Value};
use std::sync::Arc;

/// Parsed intent for a detected domain.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordIntent {
    pub domain: &'static str,
    pub intent: String,
    pub slots: Slots,
}

/// Per-domain LLM guidance, mirroring the intent whitelists.
fn domain_rules(domain: &str) -> &'static str {
    match domain {
        "light" => "brightness: 'step_up'/'step_down' wenn keine Zahl genannt wird.",
        "sensor" => {
            "- device_class: erforderlich (temperature, humidity, power, energy, battery).\n\
             - name: LEER lassen, außer ein konkretes Gerät ist genannt."
        }
        "timer" => "- duration: Sekunden oder Text.\n- name: Zielgerät.",
        _ => "",
    }
}

pub struct KeywordIntentParser {
    llm: Arc<dyn JsonLlm>,
}

impl KeywordIntentParser {
    pub fn new(llm: Arc<dyn JsonLlm>) -> Self {
        Self { llm }
    }

    /// Detect the domain, repairing same-length typos against the keyword
    /// table when the plain lookup finds nothing.
    pub fn detect(&self, text: &str) -> Option<&'static str> {
        if let Some(domain) = detect_domain(text) {
            return Some(domain);
        }

        // Typo pass: a word is a keyword typo only if the lengths match and
        // at most two characters differ. "schalte" never becomes
        // "schalter".
        let lower = text.to_lowercase();
        for word in lower.split_whitespace() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric());
            // Short words collide with too many keywords to repair safely.
            if word.chars().count() < 5 {
                continue;
            }
            for config in all_domains() {
                for keyword in config.keywords() {
                    if let Some(distance) = fuzzy_match_distance(word, keyword) {
                        if distance > 0 && distance <= 2 {
                            tracing::debug!(word, keyword, distance, "keyword typo repaired");
                            return Some(config.domain);
                        }
                    }
                }
            }
        }
        None
    }

    /// Derive `(intent, slots)` for the utterance, `None` when no domain
    /// keyword matches or the LLM misses the schema.
    pub async fn parse(&self, text: &str) -> Option<KeywordIntent> {
        let domain = self.detect(text)?;
        let config = domain_config(domain)?;
        let intent_list = config.intents.join(", ");

        let system = format!(
            "Wähle den Home-Assistant-Intent für die Domäne '{domain}'.\n\
             Erlaubt: {intent_list}\n\
             Slots: area, name, domain, floor, device_class, duration.\n\
             Regeln: {rules}\n\
             WICHTIG: 'name' nur füllen, wenn ein konkretes Gerät genannt ist. \
             Bei generischen Begriffen 'name' LEER lassen.\n\
             Antworte als JSON: {{\"intent\": \"...\", \"slots\": {{...}}}}",
            rules = domain_rules(domain),
        );
        let mut allowed_intents: Vec<Value> =
            config.intents.iter().map(|i| Value::from(*i)).collect();
        allowed_intents.push(Value::Null);
        let prompt = Prompt::new(
            system,
            json!({
                "type": "object",
                "properties": {
                    "intent": {"type": ["string", "null"], "enum": allowed_intents},
                    "slots": {"type": "object"},
                },
                "required": ["intent"],
            }),
        );

        let data = self
            .llm
            .prompt_json(&prompt, &json!({"user_input": text}), None)
            .await
            .ok()
            .flatten()?;

        let intent = data.get("intent")?.as_str()?.to_string();
        let mut slots: Slots = data
            .get("slots")
            .and_then(Value::as_object)
            .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        slots
            .entry("domain".to_string())
            .or_insert_with(|| Value::from(domain));

        Some(KeywordIntent {
            domain,
            intent,
            slots,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_llm::ScriptedLlm;
    use pretty_assertions::assert_eq;

    fn parser(llm: ScriptedLlm) -> KeywordIntentParser {
        KeywordIntentParser::new(Arc::new(llm))
    }

    #[test]
    fn test_detect_plain_keyword() {
        let parser = parser(ScriptedLlm::empty());
        assert_eq!(parser.detect("Schalte das Licht an"), Some("light"));
        assert_eq!(parser.detect("Rollladen im Büro runter"), Some("cover"));
        assert_eq!(parser.detect("Wie spät ist es"), None);
    }

    #[test]
    fn test_detect_repairs_same_length_typo() {
        let parser = parser(ScriptedLlm::empty());
        // "lihct" (5) vs "licht" (5): swap, distance 2.
        assert_eq!(parser.detect("Schalte das lihct an"), Some("light"));
    }

    #[test]
    fn test_detect_rejects_length_mismatch() {
        let parser = parser(ScriptedLlm::empty());
        // "schalte" must not be read as the keyword "schalter".
        assert_eq!(parser.detect("schalte irgendwas"), None);
    }

    #[tokio::test]
    async fn test_parse_fills_domain_slot() {
        let llm = ScriptedLlm::new(vec![Some(serde_json::json!({
            "intent": "HassTurnOn",
            "slots": {"area": "Küche"},
        }))]);
        let parser = parser(llm);

        let parsed = parser
            .parse("Schalte das Licht in der Küche an")
            .await
            .unwrap();
        assert_eq!(parsed.domain, "light");
        assert_eq!(parsed.intent, "HassTurnOn");
        assert_eq!(
            parsed.slots.get("area").and_then(Value::as_str),
            Some("Küche")
        );
        assert_eq!(
            parsed.slots.get("domain").and_then(Value::as_str),
            Some("light")
        );
    }

    #[tokio::test]
    async fn test_schema_miss_is_none() {
        let parser = parser(ScriptedLlm::new(vec![None]));
        assert!(parser.parse("Schalte das Licht an").await.is_none());
    }
}
