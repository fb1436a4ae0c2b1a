//! Plural detection: word lists first, one LLM probe only when needed.

use heim_agent_config::vocab::{has_plural_cue, ENTITY_PLURALS};
use heim_agent_llm::{JsonLlm, Prompt};
use serde_json::json;
use std::sync::Arc;

pub struct PluralDetector {
    llm: Arc<dyn JsonLlm>,
}

impl PluralDetector {
    pub fn new(llm: Arc<dyn JsonLlm>) -> Self {
        Self { llm }
    }

    /// Fast path only; `None` when the word lists are inconclusive.
    pub fn detect_fast(text: &str) -> Option<bool> {
        if has_plural_cue(text) {
            return Some(true);
        }
        let lower = text.to_lowercase();
        // Plural noun forms decide before their singular prefix can match
        // ("die lichter" contains "licht" too).
        for (_, plural) in ENTITY_PLURALS.iter() {
            if lower.contains(plural) {
                return Some(true);
            }
        }
        for (singular, _) in ENTITY_PLURALS.iter() {
            if lower.contains(singular) {
                return Some(false);
            }
        }
        None
    }

    /// Full detection with the LLM probe as last resort.
    pub async fn detect(&self, text: &str) -> bool {
        if let Some(known) = Self::detect_fast(text) {
            return known;
        }

        let prompt = Prompt::new(
            "Erkenne Plural in deutschen Befehlen.\n\
             Pluralnomen oder 'alle' -> true. Singular -> false.\n\
             JSON: {\"multiple_entities\": boolean}",
            json!({
                "type": "object",
                "properties": {"multiple_entities": {"type": "boolean"}},
                "required": ["multiple_entities"],
            }),
        );
        match self
            .llm
            .prompt_json(&prompt, &json!({"user_input": text}), None)
            .await
        {
            Ok(Some(data)) => data
                .get("multiple_entities")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_llm::ScriptedLlm;

    #[test]
    fn test_plural_cues() {
        assert_eq!(
            PluralDetector::detect_fast("Schalte alle Rollläden zu"),
            Some(true)
        );
        assert_eq!(
            PluralDetector::detect_fast("Schalte die Lampen an"),
            Some(true)
        );
        assert_eq!(
            PluralDetector::detect_fast("Schalte das Licht aus"),
            Some(false)
        );
        assert_eq!(PluralDetector::detect_fast("Mach irgendwas"), None);
    }

    #[tokio::test]
    async fn test_llm_probe_only_on_unknown() {
        let llm = Arc::new(ScriptedLlm::new(vec![Some(
            serde_json::json!({"multiple_entities": true}),
        )]));
        let detector = PluralDetector::new(llm.clone());

        // Word lists decide; the LLM must not be consulted.
        assert!(!detector.detect("Schalte das Licht aus").await);
        assert_eq!(llm.call_count(), 0);

        // Inconclusive text falls through to the probe.
        assert!(detector.detect("Mach die Dinger an").await);
        assert_eq!(llm.call_count(), 1);
    }
}
