//! Entity resolution from slot values.

use heim_agent_config::vocab::{has_global_keyword, has_plural_cue, GENERIC_NAMES};
use heim_agent_core::{intent as intents, EntityRecord, HomePlatform, Slots};
use heim_agent_persistence::AliasStore;
use heim_agent_text_processing::canonicalize;
use serde_json::Value;
use std::sync::Arc;

/// Resolution output: ordered, deduplicated entity ids plus anything that
/// matched but is not exposed to voice control.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedEntities {
    pub ids: Vec<String>,
    pub filtered_not_exposed: Vec<String>,
}

/// Remove candidates whose state already satisfies the intent: don't turn on
/// what is on, don't close what is closed. For covers, "off" means "closed".
pub fn filter_by_state(
    home: &dyn HomePlatform,
    entity_ids: &[String],
    intent: &str,
) -> Vec<String> {
    if !matches!(intent, intents::TURN_ON | intents::TURN_OFF) {
        return entity_ids.to_vec();
    }
    entity_ids
        .iter()
        .filter(|eid| {
            let Some(state) = home.state(eid) else {
                return false;
            };
            if state.is_unavailable() {
                return false;
            }
            let domain = eid.split('.').next().unwrap_or("");
            match intent {
                intents::TURN_OFF => {
                    if domain == "cover" {
                        state.state != "closed"
                    } else {
                        state.state != "off"
                    }
                }
                intents::TURN_ON => {
                    if domain == "cover" {
                        state.state != "open"
                    } else {
                        state.state != "on"
                    }
                }
                _ => true,
            }
        })
        .cloned()
        .collect()
}

/// True unless the light only supports on/off.
pub fn is_dimmable(home: &dyn HomePlatform, entity_id: &str) -> bool {
    let Some(state) = home.state(entity_id) else {
        return true;
    };
    match state.attributes.get("supported_color_modes") {
        Some(Value::Array(modes)) => !(modes.len() == 1 && modes[0].as_str() == Some("onoff")),
        _ => true,
    }
}

/// Resolves slot values (area/floor/name/domain/device_class) to entity ids.
pub struct EntityResolver {
    aliases: Arc<AliasStore>,
}

impl EntityResolver {
    pub fn new(aliases: Arc<AliasStore>) -> Self {
        Self { aliases }
    }

    fn slot_str<'a>(slots: &'a Slots, key: &str) -> Option<&'a str> {
        slots
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Resolve entities for an intent.
    ///
    /// `utterance_text` is consulted for plural/global cues only.
    pub async fn resolve(
        &self,
        home: &dyn HomePlatform,
        slots: &Slots,
        intent: &str,
        utterance_text: &str,
    ) -> ResolvedEntities {
        let area = Self::slot_str(slots, "area");
        let floor = Self::slot_str(slots, "floor");
        let name = Self::slot_str(slots, "name");
        let domain = Self::slot_str(slots, "domain");
        let device_class = Self::slot_str(slots, "device_class");

        let global_scope = area.map(has_global_keyword).unwrap_or(false)
            || (area.is_none() && floor.is_none() && has_global_keyword(utterance_text));

        // Learned entity alias is the fastest path, but only while the
        // target still exists.
        if let Some(name) = name {
            if let Ok(Some(known)) = self.aliases.entity_alias(name).await {
                if home.state(&known).is_some() {
                    tracing::debug!(name, entity = %known, "entity alias hit");
                    return ResolvedEntities {
                        ids: vec![known],
                        filtered_not_exposed: Vec::new(),
                    };
                }
                tracing::debug!(name, entity = %known, "learned entity no longer exists");
            }
        }

        // Generic-name guard: "die Spots" alone must not light up the whole
        // home. A generic noun needs an area, a plural/global cue, or global
        // scope to widen.
        let effective_name = match name {
            Some(n)
                if GENERIC_NAMES.contains(&canonicalize(n))
                    && area.is_none()
                    && floor.is_none()
                    && !global_scope
                    && !has_plural_cue(utterance_text) =>
            {
                tracing::debug!(name = n, "generic name without scope, refusing to resolve");
                return ResolvedEntities::default();
            }
            Some(n) if GENERIC_NAMES.contains(&canonicalize(n)) => None,
            other => other,
        };

        let entities = home.entities();
        let mut not_exposed: Vec<String> = Vec::new();

        let mut by_scope: Vec<String> = Vec::new();
        if global_scope {
            for entity in &entities {
                if Self::matches_domain(entity, domain) {
                    Self::push_entity(entity, &mut by_scope, &mut not_exposed);
                }
            }
        } else if let Some(area) = area {
            let area_id = Self::area_id_by_name(home, area);
            for entity in &entities {
                if entity.area_id.as_deref() == area_id.as_deref()
                    && area_id.is_some()
                    && Self::matches_domain(entity, domain)
                {
                    Self::push_entity(entity, &mut by_scope, &mut not_exposed);
                }
            }
        } else if let Some(floor) = floor {
            let area_ids = Self::area_ids_on_floor(home, floor);
            for entity in &entities {
                if entity
                    .area_id
                    .as_deref()
                    .map(|id| area_ids.iter().any(|a| a == id))
                    .unwrap_or(false)
                    && Self::matches_domain(entity, domain)
                {
                    Self::push_entity(entity, &mut by_scope, &mut not_exposed);
                }
            }
        }

        let mut by_name: Vec<String> = Vec::new();
        if let Some(name) = effective_name {
            let needle = canonicalize(name);
            for entity in &entities {
                if !Self::matches_domain(entity, domain) {
                    continue;
                }
                let friendly = entity.friendly_name().map(canonicalize).unwrap_or_default();
                if friendly == needle || (!needle.is_empty() && friendly.contains(&needle)) {
                    Self::push_entity(entity, &mut by_name, &mut not_exposed);
                }
            }
        }

        // Merge, preserving order, dropping duplicates.
        let mut merged: Vec<String> = Vec::new();
        for id in by_scope.into_iter().chain(by_name) {
            if !merged.contains(&id) {
                merged.push(id);
            }
        }

        if let Some(device_class) = device_class {
            merged.retain(|id| {
                home.state(id)
                    .and_then(|s| s.str_attr("device_class").map(str::to_string))
                    .map(|dc| dc.eq_ignore_ascii_case(device_class))
                    .unwrap_or(false)
            });
        }

        if intents::is_state_dependent(intent) {
            merged = filter_by_state(home, &merged, intent);
        }

        // Dimming needs dimmable targets.
        if intent == intents::LIGHT_SET {
            let requires_dimming = slots.contains_key("brightness")
                || matches!(
                    slots.get("command").and_then(Value::as_str),
                    Some("step_up") | Some("step_down")
                );
            if requires_dimming {
                merged.retain(|id| is_dimmable(home, id));
            }
        }

        ResolvedEntities {
            ids: merged,
            filtered_not_exposed: not_exposed,
        }
    }

    fn push_entity(entity: &EntityRecord, out: &mut Vec<String>, not_exposed: &mut Vec<String>) {
        if entity.disabled {
            if !not_exposed.contains(&entity.entity_id) {
                not_exposed.push(entity.entity_id.clone());
            }
        } else {
            out.push(entity.entity_id.clone());
        }
    }

    fn matches_domain(entity: &EntityRecord, domain: Option<&str>) -> bool {
        match domain {
            Some(domain) => entity.domain() == domain,
            None => true,
        }
    }

    fn area_id_by_name(home: &dyn HomePlatform, name: &str) -> Option<String> {
        let needle = canonicalize(name);
        home.areas()
            .into_iter()
            .find(|a| canonicalize(&a.name) == needle)
            .map(|a| a.id)
    }

    fn area_ids_on_floor(home: &dyn HomePlatform, floor: &str) -> Vec<String> {
        let needle = canonicalize(floor);
        let floor_id = home
            .floors()
            .into_iter()
            .find(|f| canonicalize(&f.name) == needle)
            .map(|f| f.id);
        match floor_id {
            Some(floor_id) => home
                .areas()
                .into_iter()
                .filter(|a| a.floor_id.as_deref() == Some(floor_id.as_str()))
                .map(|a| a.id)
                .collect(),
            None => Vec::new(),
        }
    }
}
