//! Area and floor resolution.
//!
//! Resolution order: learned alias → exact canonical name → registry
//! aliases → substring → LLM. Global keywords short-circuit to the GLOBAL
//! sentinel; an LLM failure surfaces the candidate list so the orchestrator
//! can enter area-learning mode.

use heim_agent_config::vocab::{FLOOR_ALIASES, GLOBAL_KEYWORDS};
use heim_agent_core::HomePlatform;
use heim_agent_llm::{JsonLlm, Prompt};
use heim_agent_persistence::AliasStore;
use heim_agent_text_processing::canonicalize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Outcome of resolving a location string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AreaResolution {
    /// Canonical area (or floor) name.
    Match(String),
    /// The whole installation ("Haus", "überall", ...).
    Global,
    /// Nothing matched; candidates for the learning question.
    Unknown { query: String, candidates: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationKind {
    Area,
    Floor,
}

fn resolver_prompt() -> Prompt {
    Prompt::new(
        "Du ordnest einen vom Benutzer gesprochenen Ort dem passenden internen Namen zu.\n\
         Eingabe: user_query (gesprochener Name) und candidates (verfügbare Namen).\n\
         1. Finde den Kandidaten, der am besten zu user_query passt.\n\
         2. Behandle Synonyme: \"Bad\" -> \"Badezimmer\", \"Keller\" -> \"Untergeschoss\".\n\
         3. Sagt der Benutzer \"Haus\", \"Wohnung\", \"Überall\" oder \"Alles\", gib \"GLOBAL\" zurück.\n\
         4. Passt kein Kandidat plausibel, gib null zurück.",
        json!({
            "type": "object",
            "properties": {"match": {"type": ["string", "null"]}},
            "required": ["match"],
        }),
    )
}

/// Maps location strings to registry areas/floors.
pub struct AreaResolver {
    aliases: Arc<AliasStore>,
    llm: Arc<dyn JsonLlm>,
}

impl AreaResolver {
    pub fn new(aliases: Arc<AliasStore>, llm: Arc<dyn JsonLlm>) -> Self {
        Self { aliases, llm }
    }

    /// Resolve an area name.
    pub async fn resolve_area(&self, home: &dyn HomePlatform, query: &str) -> AreaResolution {
        self.resolve(home, query, LocationKind::Area).await
    }

    /// Resolve a floor name, with German abbreviation expansion (EG/OG/...).
    pub async fn resolve_floor(&self, home: &dyn HomePlatform, query: &str) -> AreaResolution {
        self.resolve(home, query, LocationKind::Floor).await
    }

    async fn resolve(
        &self,
        home: &dyn HomePlatform,
        query: &str,
        kind: LocationKind,
    ) -> AreaResolution {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return AreaResolution::Unknown {
                query: String::new(),
                candidates: Vec::new(),
            };
        }

        if GLOBAL_KEYWORDS.contains(trimmed.to_lowercase().as_str()) {
            return AreaResolution::Global;
        }

        // Learned alias first; it exists because the user confirmed it once.
        if kind == LocationKind::Area {
            if let Ok(Some(learned)) = self.aliases.area_alias(trimmed).await {
                tracing::debug!(query = trimmed, area = %learned, "alias store hit");
                return AreaResolution::Match(learned);
            }
        }

        if let Some(name) = Self::registry_match(home, trimmed, kind) {
            return AreaResolution::Match(name);
        }

        let candidates: Vec<String> = match kind {
            LocationKind::Area => home.areas().into_iter().map(|a| a.name).collect(),
            LocationKind::Floor => home.floors().into_iter().map(|f| f.name).collect(),
        };
        if candidates.is_empty() {
            return AreaResolution::Unknown {
                query: trimmed.to_string(),
                candidates,
            };
        }

        // LLM fallback for synonyms and abbreviations the fast paths miss.
        let payload = json!({"user_query": trimmed, "candidates": candidates});
        match self.llm.prompt_json(&resolver_prompt(), &payload, None).await {
            Ok(Some(data)) => match data.get("match").and_then(Value::as_str) {
                Some("GLOBAL") => AreaResolution::Global,
                Some(matched) if candidates.iter().any(|c| c == matched) => {
                    tracing::debug!(query = trimmed, matched, "LLM mapped location");
                    AreaResolution::Match(matched.to_string())
                }
                _ => AreaResolution::Unknown {
                    query: trimmed.to_string(),
                    candidates,
                },
            },
            Ok(None) => AreaResolution::Unknown {
                query: trimmed.to_string(),
                candidates,
            },
            Err(err) => {
                tracing::warn!(%err, "area resolver LLM failed");
                AreaResolution::Unknown {
                    query: trimmed.to_string(),
                    candidates,
                }
            }
        }
    }

    fn registry_match(
        home: &dyn HomePlatform,
        query: &str,
        kind: LocationKind,
    ) -> Option<String> {
        let needle = canonicalize(query);

        // Floors additionally match through the German abbreviation table.
        let mut search_terms: HashSet<String> = HashSet::new();
        search_terms.insert(needle.clone());
        if kind == LocationKind::Floor {
            if let Some(expansions) = FLOOR_ALIASES.get(needle.as_str()) {
                for term in *expansions {
                    search_terms.insert((*term).to_string());
                }
            }
        }

        let named: Vec<(String, Vec<String>)> = match kind {
            LocationKind::Area => home
                .areas()
                .into_iter()
                .map(|a| (a.name, a.aliases))
                .collect(),
            LocationKind::Floor => home
                .floors()
                .into_iter()
                .map(|f| (f.name, f.aliases))
                .collect(),
        };

        // Exact canonical name.
        for (name, _) in &named {
            if search_terms.contains(&canonicalize(name)) {
                return Some(name.clone());
            }
        }
        // Registry aliases.
        for (name, aliases) in &named {
            for alias in aliases {
                if search_terms.contains(&canonicalize(alias)) {
                    tracing::debug!(query, name = %name, "registry alias match");
                    return Some(name.clone());
                }
            }
        }
        // Substring either way.
        for (name, _) in &named {
            let canon = canonicalize(name);
            for term in &search_terms {
                if !term.is_empty() && (canon.contains(term.as_str()) || term.contains(&canon)) {
                    tracing::debug!(query, name = %name, "partial match");
                    return Some(name.clone());
                }
            }
        }
        None
    }
}
