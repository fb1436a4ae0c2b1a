//! S1 — semantic cache stage.

use crate::services::Services;
use crate::stage::Stage;
use async_trait::async_trait;
use heim_agent_config::constants::cache as cache_constants;
use heim_agent_config::domain::detect_domain;
use heim_agent_core::{Context, Slots, StageResult, Utterance};
use heim_agent_text_processing::{extract_delay, extract_duration_secs};
use serde_json::Value;

/// Slot keys consumed during resolution; everything else becomes an
/// execution parameter.
const RESOLUTION_KEYS: [&str; 6] = ["area", "room", "floor", "name", "domain", "device_class"];

pub struct CacheStage {
    services: Services,
}

impl CacheStage {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Commands the cache must not serve: compounds (split first), timers
    /// and calendar entries (one-shot context), and temporally scoped
    /// commands (their numbers are stripped by normalization).
    fn is_bypassed(text: &str) -> bool {
        if cache_constants::is_compound(text) {
            tracing::debug!("cache bypass: compound command");
            return true;
        }
        if matches!(detect_domain(text), Some("timer") | Some("calendar")) {
            tracing::debug!("cache bypass: timer/calendar command");
            return true;
        }
        if extract_delay(text).is_some() || extract_duration_secs(text).is_some() {
            tracing::debug!("cache bypass: delayed/temporary command");
            return true;
        }
        false
    }
}

#[async_trait]
impl Stage for CacheStage {
    fn name(&self) -> &'static str {
        "semantic_cache"
    }

    async fn process(&self, utterance: &Utterance, context: &Context) -> StageResult {
        if Self::is_bypassed(&utterance.text) {
            return StageResult::escalate(context.clone(), &utterance.text);
        }

        let hit = match self.services.cache.lookup(&utterance.text).await {
            Ok(Some(hit)) => hit,
            Ok(None) => {
                return StageResult::escalate(context.clone(), &utterance.text);
            }
            Err(err) => {
                // Transient remote failure: the pipeline continues.
                tracing::warn!(%err, "cache lookup failed, escalating");
                return StageResult::escalate(context.clone(), &utterance.text);
            }
        };

        let mut next_context = context.clone();
        next_context.insert("from_cache".to_string(), Value::Bool(true));
        next_context.insert("cache_score".to_string(), Value::from(hit.score));
        for key in ["domain", "area", "floor"] {
            if let Some(value) = hit.slots.get(key) {
                next_context.insert(key.to_string(), value.clone());
            }
        }

        let params: Slots = hit
            .slots
            .iter()
            .filter(|(k, _)| !RESOLUTION_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        // Global anchors carry no entity ids; resolve them against the
        // registry now, with the entry's slots as the query.
        let entity_ids = if hit.entity_ids.is_empty() {
            let resolved = self
                .services
                .entity_resolver
                .resolve(
                    self.services.home.as_ref(),
                    &hit.slots,
                    &hit.intent,
                    &utterance.text,
                )
                .await;
            resolved.ids
        } else {
            hit.entity_ids
        };

        StageResult::success(hit.intent, entity_ids, params, next_context, &utterance.text)
    }
}
