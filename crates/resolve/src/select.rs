//! Disambiguation answer selection.
//!
//! Four fast paths before any LLM call: "keine" → nothing, "alle"/"beide" →
//! everything, ordinals ("das zweite", "nr 2") → positional pick, then fuzzy
//! name matching. The LLM only sees answers none of these understood.

use heim_agent_config::vocab::{ALL_KEYWORDS, NONE_KEYWORDS, ORDINAL_MAP};
use heim_agent_core::Candidate;
use heim_agent_llm::{JsonLlm, Prompt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;

static NUMERIC_ORDINALS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^(\d+)\.?$",
        r"^nr\.?\s*(\d+)$",
        r"^nummer\s*(\d+)$",
        r"^die\s+(\d+)\.$",
        r"^das\s+(\d+)\.$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

pub struct DisambiguationSelector {
    llm: Arc<dyn JsonLlm>,
}

impl DisambiguationSelector {
    pub fn new(llm: Arc<dyn JsonLlm>) -> Self {
        Self { llm }
    }

    /// Map the user's follow-up answer to entity ids from the candidates.
    /// An empty result means "none of them" (or an answer nobody understood).
    pub async fn select(&self, text: &str, candidates: &[Candidate]) -> Vec<String> {
        let trimmed = text.trim().to_lowercase();
        if trimmed.is_empty() || candidates.is_empty() {
            return Vec::new();
        }

        if Self::is_none_answer(&trimmed) {
            tracing::debug!("selection fast path: none");
            return Vec::new();
        }

        if Self::is_all_answer(&trimmed, candidates.len()) {
            tracing::debug!("selection fast path: all");
            return candidates.iter().map(|c| c.entity_id.clone()).collect();
        }

        if let Some(ordinal) = Self::detect_ordinal(&trimmed) {
            let index = if ordinal == -1 {
                candidates.len()
            } else {
                ordinal as usize
            };
            if (1..=candidates.len()).contains(&index) {
                tracing::debug!(index, "selection fast path: ordinal");
                return vec![candidates[index - 1].entity_id.clone()];
            }
        }

        if let Some(entity_id) = Self::fuzzy_name_match(&trimmed, candidates) {
            tracing::debug!(entity = %entity_id, "selection fast path: fuzzy name");
            return vec![entity_id];
        }

        self.select_via_llm(text, candidates).await
    }

    fn is_none_answer(text: &str) -> bool {
        text.split_whitespace()
            .any(|w| NONE_KEYWORDS.contains(w.trim_matches(|c: char| !c.is_alphanumeric())))
    }

    fn is_all_answer(text: &str, count: usize) -> bool {
        let words: Vec<&str> = text
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .collect();
        // "beide" only means all when there really are exactly two.
        if words
            .iter()
            .any(|w| matches!(*w, "beide" | "beiden" | "beides"))
        {
            return count == 2;
        }
        words.iter().any(|w| ALL_KEYWORDS.contains(w))
    }

    /// 1-based ordinal, -1 for "last".
    fn detect_ordinal(text: &str) -> Option<i32> {
        for word in text.split_whitespace() {
            let clean = word.trim_end_matches(['.', ',', '!', '?']);
            if let Some(value) = ORDINAL_MAP.get(clean) {
                return Some(*value);
            }
        }
        for pattern in NUMERIC_ORDINALS.iter() {
            if let Some(caps) = pattern.captures(text) {
                return caps[1].parse().ok();
            }
        }
        None
    }

    fn normalize(text: &str) -> String {
        let folded = text
            .to_lowercase()
            .replace('ä', "ae")
            .replace('ö', "oe")
            .replace('ü', "ue")
            .replace('ß', "ss");
        static LEADING_ARTICLE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^(der|die|das|den|dem)\s+").unwrap());
        let stripped = LEADING_ARTICLE.replace(&folded, "");
        stripped
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace())
            .collect::<String>()
            .trim()
            .to_string()
    }

    /// Substring-based name match with a length-ratio confidence of ≥ 0.5.
    fn fuzzy_name_match(text: &str, candidates: &[Candidate]) -> Option<String> {
        let text_norm = Self::normalize(text);
        if text_norm.is_empty() {
            return None;
        }

        let mut best: Option<(&Candidate, f64)> = None;
        for candidate in candidates {
            let name_norm = Self::normalize(&candidate.name);
            if name_norm.is_empty() {
                continue;
            }
            if text_norm == name_norm {
                return Some(candidate.entity_id.clone());
            }
            let score = if name_norm.contains(&text_norm) {
                text_norm.len() as f64 / name_norm.len() as f64
            } else if text_norm.contains(&name_norm) {
                name_norm.len() as f64 / text_norm.len() as f64
            } else {
                continue;
            };
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((candidate, score));
            }
        }

        best.filter(|(_, score)| *score >= 0.5)
            .map(|(candidate, _)| candidate.entity_id.clone())
    }

    async fn select_via_llm(&self, text: &str, candidates: &[Candidate]) -> Vec<String> {
        let prompt = Prompt::new(
            "Du wählst aus, welche Kandidaten der Benutzer gemeint hat. Keine Erklärungen.\n\
             Eingabe: user_input (deutsche Antwort) und input_entities \
             (geordnete Liste aus entity_id, name, ordinal).\n\
             1. Ordinale: \"erste\" -> ordinal 1, \"letzte\" -> höchstes ordinal.\n\
             2. Namen unscharf vergleichen (Groß/Kleinschreibung, Umlaute egal).\n\
             3. \"alle\" -> alle entity_ids. \"beide\" -> alle, wenn es genau zwei sind.\n\
             4. \"keine\", \"nichts\", \"nein\" -> leeres Array.\n\
             5. Im Zweifel -> leeres Array.",
            json!({"type": "array", "items": {"type": "string"}}),
        );
        let input: Vec<Value> = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| {
                json!({"entity_id": c.entity_id, "name": c.name, "ordinal": i + 1})
            })
            .collect();

        match self
            .llm
            .prompt_json(
                &prompt,
                &json!({"user_input": text, "input_entities": input}),
                Some(0.0),
            )
            .await
        {
            Ok(Some(Value::Array(items))) => {
                let valid: Vec<String> = items
                    .into_iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .filter(|id| candidates.iter().any(|c| &c.entity_id == id))
                    .collect();
                valid
            }
            _ => Vec::new(),
        }
    }
}
