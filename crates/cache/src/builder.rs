//! Anchor generation.
//!
//! On a cold start (or when the registry diverged from the cached snapshot)
//! the builder renders anchor phrases for every domain it knows, embeds them
//! and persists the result to `anchors.json`. Four tiers:
//!
//! 1. AREA — "{device} in {area}" per area holding entities of the domain
//! 2. ENTITY — "{device} {entity_name} in {area}" per named entity
//! 3. FLOOR — area patterns re-rendered with the floor name
//! 4. GLOBAL — domain-wide phrasings ("Schalte alle Lichter aus")
//!
//! plus globally-unique entity names rendered without an area. Deduplication
//! is by rendered text, not by intent: several phrasings per action are the
//! point.

use crate::embeddings::Embedder;
use crate::types::{AnchorSnapshot, CacheEntry, ANCHOR_VERSION};
use crate::CacheError;
use heim_agent_config::constants::cache as cache_constants;
use heim_agent_config::domain::domain_config;
use heim_agent_core::{EntityState, HomePlatform, Slots};
use heim_agent_persistence::JsonStore;
use heim_agent_text_processing::normalize_for_cache;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashSet};
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
enum SlotVal {
    S(&'static str),
    N(i64),
}

struct AnchorPattern {
    template: &'static str,
    intent: &'static str,
    extra: &'static [(&'static str, SlotVal)],
}

macro_rules! pat {
    ($template:expr, $intent:expr) => {
        AnchorPattern {
            template: $template,
            intent: $intent,
            extra: &[],
        }
    };
    ($template:expr, $intent:expr, $extra:expr) => {
        AnchorPattern {
            template: $template,
            intent: $intent,
            extra: $extra,
        }
    };
}

const STEP_UP: &[(&str, SlotVal)] = &[("command", SlotVal::S("step_up"))];
const STEP_DOWN: &[(&str, SlotVal)] = &[("command", SlotVal::S("step_down"))];
const BRIGHTNESS_50: &[(&str, SlotVal)] = &[("brightness", SlotVal::N(50))];
const POSITION_0: &[(&str, SlotVal)] = &[("position", SlotVal::N(0))];
const POSITION_50: &[(&str, SlotVal)] = &[("position", SlotVal::N(50))];
const POSITION_100: &[(&str, SlotVal)] = &[("position", SlotVal::N(100))];
const STATE_ON: &[(&str, SlotVal)] = &[("state", SlotVal::S("on"))];
const STATE_OFF: &[(&str, SlotVal)] = &[("state", SlotVal::S("off"))];
const STATE_OPEN: &[(&str, SlotVal)] = &[("state", SlotVal::S("open"))];
const STATE_CLOSED: &[(&str, SlotVal)] = &[("state", SlotVal::S("closed"))];
const CMD_ON: &[(&str, SlotVal)] = &[("command", SlotVal::S("on"))];
const CMD_OFF: &[(&str, SlotVal)] = &[("command", SlotVal::S("off"))];

fn area_patterns(domain: &str) -> &'static [AnchorPattern] {
    match domain {
        "light" => &[
            // Turn on, several word orders and synonyms.
            pat!("Schalte {device} in {area} an", "HassTurnOn"),
            pat!("{device} in {area} an", "HassTurnOn"),
            pat!("{device} an in {area}", "HassTurnOn"),
            pat!("Mach {device} in {area} an", "HassTurnOn"),
            pat!("{area} {device} an", "HassTurnOn"),
            pat!("{device} {area} an", "HassTurnOn"),
            pat!("die Lampe in {area} an", "HassTurnOn"),
            pat!("Lampe in {area} anschalten", "HassTurnOn"),
            pat!("Mach die Lampe in {area} an", "HassTurnOn"),
            pat!("Beleuchtung in {area} an", "HassTurnOn"),
            pat!("Aktiviere Beleuchtung in {area}", "HassTurnOn"),
            pat!("Aktiviere {device} in {area}", "HassTurnOn"),
            pat!("{device} in {area} einschalten", "HassTurnOn"),
            pat!("Mach mal {device} in {area} an", "HassTurnOn"),
            pat!("Kannst du {device} in {area} anmachen", "HassTurnOn"),
            pat!("{device} in {area} anmachen", "HassTurnOn"),
            // Turn off.
            pat!("Schalte {device} in {area} aus", "HassTurnOff"),
            pat!("{device} in {area} aus", "HassTurnOff"),
            pat!("{device} aus in {area}", "HassTurnOff"),
            pat!("Mach {device} in {area} aus", "HassTurnOff"),
            pat!("{area} {device} aus", "HassTurnOff"),
            pat!("{device} {area} aus", "HassTurnOff"),
            pat!("die Lampe in {area} aus", "HassTurnOff"),
            pat!("Lampe in {area} ausschalten", "HassTurnOff"),
            pat!("Mach die Lampe in {area} aus", "HassTurnOff"),
            pat!("Beleuchtung in {area} aus", "HassTurnOff"),
            pat!("Deaktiviere Beleuchtung in {area}", "HassTurnOff"),
            pat!("Deaktiviere {device} in {area}", "HassTurnOff"),
            pat!("{device} in {area} ausschalten", "HassTurnOff"),
            pat!("Mach mal {device} in {area} aus", "HassTurnOff"),
            // Brightness. Dative after "von".
            pat!(
                "Erhöhe die Helligkeit von {device_dat} in {area}",
                "HassLightSet",
                STEP_UP
            ),
            pat!(
                "Reduziere die Helligkeit von {device_dat} in {area}",
                "HassLightSet",
                STEP_DOWN
            ),
            pat!(
                "Dimme {device} in {area} auf 50 Prozent",
                "HassLightSet",
                BRIGHTNESS_50
            ),
            pat!("Mach {device} in {area} heller", "HassLightSet", STEP_UP),
            pat!("Mach {device} in {area} dunkler", "HassLightSet", STEP_DOWN),
            pat!("{device} in {area} heller", "HassLightSet", STEP_UP),
            pat!("{device} in {area} dunkler", "HassLightSet", STEP_DOWN),
            pat!("Dimme {device} in {area}", "HassLightSet", STEP_DOWN),
            pat!("{device} heller in {area}", "HassLightSet", STEP_UP),
            pat!("{device} dunkler in {area}", "HassLightSet", STEP_DOWN),
            pat!("Mehr Licht in {area}", "HassLightSet", STEP_UP),
            pat!("Weniger Licht in {area}", "HassLightSet", STEP_DOWN),
            pat!("Mehr Helligkeit in {area}", "HassLightSet", STEP_UP),
            pat!("Weniger Helligkeit in {area}", "HassLightSet", STEP_DOWN),
            // State queries, nominative.
            pat!("Ist {device_nom} in {area} an?", "HassGetState"),
            pat!("Brennt {device_nom} in {area}?", "HassGetState"),
            // Delayed control; numbers are stripped by normalization.
            pat!("Schalte {device} in {area} in Minuten an", "HassDelayedControl", CMD_ON),
            pat!("Schalte {device} in {area} in Minuten aus", "HassDelayedControl", CMD_OFF),
            pat!("Mach {device} in {area} in Minuten an", "HassDelayedControl", CMD_ON),
            pat!("Mach {device} in {area} in Minuten aus", "HassDelayedControl", CMD_OFF),
            pat!("Schalte {device} in {area} um Uhr an", "HassDelayedControl", CMD_ON),
            pat!("Schalte {device} in {area} um Uhr aus", "HassDelayedControl", CMD_OFF),
            // Temporary control.
            pat!("Schalte {device} in {area} für Minuten an", "HassTemporaryControl", CMD_ON),
            pat!("Schalte {device} in {area} für Minuten aus", "HassTemporaryControl", CMD_OFF),
            pat!("Mach {device} in {area} für Minuten an", "HassTemporaryControl", CMD_ON),
            pat!("Mach {device} in {area} für Minuten aus", "HassTemporaryControl", CMD_OFF),
            pat!("{device} in {area} für Minuten an", "HassTemporaryControl", CMD_ON),
            pat!("{device} in {area} für Minuten aus", "HassTemporaryControl", CMD_OFF),
        ],
        "cover" => &[
            pat!("Öffne {device} in {area}", "HassSetPosition", POSITION_100),
            pat!("{device} in {area} öffnen", "HassSetPosition", POSITION_100),
            pat!("{device} in {area} hoch", "HassSetPosition", POSITION_100),
            pat!("Mach {device} in {area} auf", "HassSetPosition", POSITION_100),
            pat!("Schließe {device} in {area}", "HassSetPosition", POSITION_0),
            pat!("{device} in {area} schließen", "HassSetPosition", POSITION_0),
            pat!("{device} in {area} runter", "HassSetPosition", POSITION_0),
            pat!("Mach {device} in {area} zu", "HassSetPosition", POSITION_0),
            pat!("Fahre {device} in {area} weiter hoch", "HassSetPosition", STEP_UP),
            pat!("Fahre {device} in {area} weiter runter", "HassSetPosition", STEP_DOWN),
            pat!("Stelle {device} in {area} auf 50 Prozent", "HassSetPosition", POSITION_50),
            pat!("Öffne {device} in {area} ein bisschen mehr", "HassSetPosition", STEP_UP),
            pat!("Öffne {device} in {area} etwas mehr", "HassSetPosition", STEP_UP),
            pat!("{device} in {area} etwas mehr öffnen", "HassSetPosition", STEP_UP),
            pat!("Mach {device} in {area} etwas weiter auf", "HassSetPosition", STEP_UP),
            pat!("Schließe {device} in {area} ein bisschen mehr", "HassSetPosition", STEP_DOWN),
            pat!("Schließe {device} in {area} etwas mehr", "HassSetPosition", STEP_DOWN),
            pat!("{device} in {area} etwas mehr schließen", "HassSetPosition", STEP_DOWN),
            pat!("Mach {device} in {area} etwas weiter zu", "HassSetPosition", STEP_DOWN),
            pat!("Ist {device_nom} in {area} offen?", "HassGetState"),
            pat!("Sind {device} in {area} offen?", "HassGetState"),
        ],
        "climate" => &[
            pat!("Schalte {device} in {area} an", "HassTurnOn"),
            pat!("Schalte {device} in {area} aus", "HassTurnOff"),
            pat!("Stelle {device} in {area} auf 21 Grad", "HassClimateSetTemperature"),
            pat!("Mach es in {area} wärmer", "HassClimateSetTemperature", STEP_UP),
            pat!("Mach es in {area} kälter", "HassClimateSetTemperature", STEP_DOWN),
            pat!("Wie warm ist es in {area}", "HassGetState"),
        ],
        "switch" => &[
            pat!("Schalte {device} in {area} an", "HassTurnOn"),
            pat!("{device} in {area} an", "HassTurnOn"),
            pat!("Mach {device} in {area} an", "HassTurnOn"),
            pat!("Schalte {device} in {area} aus", "HassTurnOff"),
            pat!("{device} in {area} aus", "HassTurnOff"),
            pat!("Mach {device} in {area} aus", "HassTurnOff"),
            pat!("Ist {device_nom} in {area} an", "HassGetState"),
            pat!("Schalte {device} in {area} in Minuten an", "HassDelayedControl", CMD_ON),
            pat!("Schalte {device} in {area} in Minuten aus", "HassDelayedControl", CMD_OFF),
        ],
        "fan" => &[
            pat!("Schalte {device} in {area} an", "HassTurnOn"),
            pat!("Schalte {device} in {area} aus", "HassTurnOff"),
            pat!("Ist {device_nom} in {area} an", "HassGetState"),
        ],
        "media_player" => &[
            pat!("Schalte {device} in {area} an", "HassTurnOn"),
            pat!("Schalte {device} in {area} aus", "HassTurnOff"),
            pat!("Ist {device_nom} in {area} an", "HassGetState"),
        ],
        "automation" => &[
            pat!("Aktiviere {device} in {area}", "HassTurnOn"),
            pat!("Deaktiviere {device} in {area}", "HassTurnOff"),
            pat!("Ist {device_nom} in {area} aktiv", "HassGetState"),
        ],
        _ => &[],
    }
}

fn entity_patterns(domain: &str) -> &'static [AnchorPattern] {
    match domain {
        "light" => &[
            pat!("Schalte {device} {entity_name} in {area} an", "HassTurnOn"),
            pat!("Schalte {device} {entity_name} in {area} aus", "HassTurnOff"),
            pat!(
                "Erhöhe die Helligkeit von {device} {entity_name} in {area}",
                "HassLightSet",
                STEP_UP
            ),
            pat!(
                "Reduziere die Helligkeit von {device} {entity_name} in {area}",
                "HassLightSet",
                STEP_DOWN
            ),
            pat!(
                "Dimme {device} {entity_name} in {area} auf 50 Prozent",
                "HassLightSet",
                BRIGHTNESS_50
            ),
            pat!("Mach {device} {entity_name} in {area} heller", "HassLightSet", STEP_UP),
            pat!("Mach {device} {entity_name} in {area} dunkler", "HassLightSet", STEP_DOWN),
            pat!("{device} {entity_name} in {area} heller", "HassLightSet", STEP_UP),
            pat!("{device} {entity_name} in {area} dunkler", "HassLightSet", STEP_DOWN),
            pat!("Ist {device_nom} {entity_name} in {area} an?", "HassGetState"),
            // No area: used for globally unique names.
            pat!("Schalte {device} {entity_name} an", "HassTurnOn"),
            pat!("Schalte {device} {entity_name} aus", "HassTurnOff"),
            pat!("Mach {device} {entity_name} an", "HassTurnOn"),
            pat!("Mach {device} {entity_name} aus", "HassTurnOff"),
            pat!("{device} {entity_name} an", "HassTurnOn"),
            pat!("{device} {entity_name} aus", "HassTurnOff"),
            pat!("Erhöhe die Helligkeit von {device} {entity_name}", "HassLightSet", STEP_UP),
            pat!(
                "Reduziere die Helligkeit von {device} {entity_name}",
                "HassLightSet",
                STEP_DOWN
            ),
            pat!("Dimme {device} {entity_name} auf 50 Prozent", "HassLightSet", BRIGHTNESS_50),
            pat!("Mach {device} {entity_name} heller", "HassLightSet", STEP_UP),
            pat!("Mach {device} {entity_name} dunkler", "HassLightSet", STEP_DOWN),
            pat!("{device} {entity_name} heller", "HassLightSet", STEP_UP),
            pat!("{device} {entity_name} dunkler", "HassLightSet", STEP_DOWN),
            pat!("Ist {device_nom} {entity_name} an?", "HassGetState"),
            pat!("Ist {device_nom} {entity_name} aus?", "HassGetState"),
        ],
        "cover" => &[
            pat!("Öffne {device} {entity_name} in {area}", "HassTurnOn"),
            pat!("Schließe {device} {entity_name} in {area}", "HassTurnOff"),
            pat!(
                "Fahre {device} {entity_name} in {area} weiter hoch",
                "HassSetPosition",
                STEP_UP
            ),
            pat!(
                "Fahre {device} {entity_name} in {area} weiter runter",
                "HassSetPosition",
                STEP_DOWN
            ),
            pat!(
                "Stelle {device} {entity_name} in {area} auf 50 Prozent",
                "HassSetPosition",
                POSITION_50
            ),
            pat!("Ist {device_nom} {entity_name} in {area} offen?", "HassGetState", STATE_OPEN),
            pat!(
                "Ist {device_nom} {entity_name} in {area} geschlossen?",
                "HassGetState",
                STATE_CLOSED
            ),
            pat!("Öffne {device} {entity_name}", "HassTurnOn"),
            pat!("Schließe {device} {entity_name}", "HassTurnOff"),
            pat!("Mach {device} {entity_name} auf", "HassTurnOn"),
            pat!("Mach {device} {entity_name} zu", "HassTurnOff"),
            pat!("Fahre {device} {entity_name} hoch", "HassTurnOn"),
            pat!("Fahre {device} {entity_name} runter", "HassTurnOff"),
            pat!("Fahre {device} {entity_name} weiter hoch", "HassSetPosition", STEP_UP),
            pat!("Fahre {device} {entity_name} weiter runter", "HassSetPosition", STEP_DOWN),
            pat!("Stelle {device} {entity_name} auf 50 Prozent", "HassSetPosition", POSITION_50),
            pat!("Ist {device_nom} {entity_name} offen?", "HassGetState", STATE_OPEN),
            pat!("Ist {device_nom} {entity_name} geschlossen?", "HassGetState", STATE_CLOSED),
        ],
        "climate" => &[
            pat!("Schalte {device} {entity_name} in {area} an", "HassTurnOn"),
            pat!("Schalte {device} {entity_name} in {area} aus", "HassTurnOff"),
            pat!(
                "Stelle {device} {entity_name} in {area} auf 21 Grad",
                "HassClimateSetTemperature"
            ),
            pat!("Schalte {device} {entity_name} an", "HassTurnOn"),
            pat!("Schalte {device} {entity_name} aus", "HassTurnOff"),
            pat!("Stelle {device} {entity_name} auf 21 Grad", "HassClimateSetTemperature"),
        ],
        "switch" => &[
            pat!("Schalte {device} {entity_name} in {area} an", "HassTurnOn"),
            pat!("Schalte {device} {entity_name} in {area} aus", "HassTurnOff"),
            pat!("Ist {device_nom} {entity_name} in {area} an?", "HassGetState"),
            pat!("Schalte {device} {entity_name} an", "HassTurnOn"),
            pat!("Schalte {device} {entity_name} aus", "HassTurnOff"),
            pat!("Mach {device} {entity_name} an", "HassTurnOn"),
            pat!("Mach {device} {entity_name} aus", "HassTurnOff"),
            pat!("Ist {device_nom} {entity_name} an?", "HassGetState"),
            pat!("Ist {device_nom} {entity_name} aus?", "HassGetState"),
        ],
        "fan" => &[
            pat!("Schalte {device} {entity_name} in {area} an", "HassTurnOn"),
            pat!("Schalte {device} {entity_name} in {area} aus", "HassTurnOff"),
            pat!("Schalte {device} {entity_name} an", "HassTurnOn"),
            pat!("Schalte {device} {entity_name} aus", "HassTurnOff"),
        ],
        "media_player" => &[
            pat!("Schalte {device} {entity_name} in {area} an", "HassTurnOn"),
            pat!("Schalte {device} {entity_name} in {area} aus", "HassTurnOff"),
            pat!("Schalte {device} {entity_name} an", "HassTurnOn"),
            pat!("Schalte {device} {entity_name} aus", "HassTurnOff"),
        ],
        "automation" => &[
            pat!("Aktiviere {device} {entity_name} in {area}", "HassTurnOn"),
            pat!("Deaktiviere {device} {entity_name} in {area}", "HassTurnOff"),
            pat!("Aktiviere {device} {entity_name}", "HassTurnOn"),
            pat!("Deaktiviere {device} {entity_name}", "HassTurnOff"),
        ],
        _ => &[],
    }
}

fn global_patterns(domain: &str) -> &'static [AnchorPattern] {
    match domain {
        "light" => &[
            pat!("Schalte alle Lichter aus", "HassTurnOff"),
            pat!("Schalte alle Lichter an", "HassTurnOn"),
            pat!("Mach alle Lichter heller", "HassLightSet", STEP_UP),
            pat!("Mach alle Lichter dunkler", "HassLightSet", STEP_DOWN),
            pat!("Dimme alle Lichter auf 50 Prozent", "HassLightSet", BRIGHTNESS_50),
            pat!("Stelle alle Lichter auf 50 Prozent", "HassLightSet", BRIGHTNESS_50),
            pat!("Alle Lichter an", "HassTurnOn"),
            pat!("Alle Lichter aus", "HassTurnOff"),
            pat!("Welche Lichter sind an?", "HassGetState", STATE_ON),
            pat!("Welche Lichter sind aus?", "HassGetState", STATE_OFF),
            pat!("Sind alle Lichter an?", "HassGetState", STATE_ON),
            pat!("Sind alle Lichter aus?", "HassGetState", STATE_OFF),
        ],
        "cover" => &[
            pat!("Schließe alle Rollläden", "HassTurnOff"),
            pat!("Öffne alle Rollläden", "HassTurnOn"),
            pat!("Fahre alle Rollläden weiter hoch", "HassSetPosition", STEP_UP),
            pat!("Fahre alle Rollläden weiter runter", "HassSetPosition", STEP_DOWN),
            pat!("Stelle alle Rollläden auf 50 Prozent", "HassSetPosition", POSITION_50),
            pat!("Welche Rollläden sind offen?", "HassGetState", STATE_OPEN),
            pat!("Welche Rollläden sind geschlossen?", "HassGetState", STATE_CLOSED),
            pat!("Welche Rollläden sind zu?", "HassGetState", STATE_CLOSED),
            pat!("Sind alle Rollläden offen?", "HassGetState", STATE_OPEN),
            pat!("Sind alle Rollläden geschlossen?", "HassGetState", STATE_CLOSED),
            pat!("Sind alle Rollläden zu?", "HassGetState", STATE_CLOSED),
        ],
        "switch" => &[
            pat!("Schalte alle Schalter aus", "HassTurnOff"),
            pat!("Schalte alle Schalter an", "HassTurnOn"),
        ],
        "fan" => &[
            pat!("Schalte alle Ventilatoren aus", "HassTurnOff"),
            pat!("Schalte alle Ventilatoren an", "HassTurnOn"),
        ],
        "media_player" => &[
            pat!("Schalte alle Fernseher aus", "HassTurnOff"),
            pat!("Schalte alle Fernseher an", "HassTurnOn"),
        ],
        "automation" => &[
            pat!("Deaktiviere alle Automatisierungen", "HassTurnOff"),
            pat!("Aktiviere alle Automatisierungen", "HassTurnOn"),
        ],
        _ => &[],
    }
}

/// Domains the builder generates anchors for.
const ANCHOR_DOMAINS: [&str; 7] = [
    "light",
    "cover",
    "climate",
    "switch",
    "fan",
    "media_player",
    "automation",
];

fn render(
    pattern: &AnchorPattern,
    device: &str,
    device_nom: &str,
    device_dat: &str,
    area: Option<&str>,
    entity_name: Option<&str>,
) -> Option<String> {
    let mut text = pattern.template.to_string();
    text = text.replace("{device_nom}", device_nom);
    text = text.replace("{device_dat}", device_dat);
    text = text.replace("{device}", device);
    if let Some(area) = area {
        text = text.replace("{area}", area);
    }
    if let Some(name) = entity_name {
        text = text.replace("{entity_name}", name);
    }
    if text.contains('{') {
        // Placeholder without a value; this pattern does not apply here.
        return None;
    }
    Some(text.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn extra_slots(pattern: &AnchorPattern) -> Slots {
    let mut slots = Slots::new();
    for (key, value) in pattern.extra {
        let value = match value {
            SlotVal::S(s) => Value::from(*s),
            SlotVal::N(n) => Value::from(*n),
        };
        slots.insert((*key).to_string(), value);
    }
    slots
}

fn is_dimmable(state: Option<&EntityState>) -> bool {
    let Some(state) = state else {
        return true;
    };
    match state.attributes.get("supported_color_modes") {
        Some(Value::Array(modes)) => {
            !(modes.len() == 1 && modes[0].as_str() == Some("onoff"))
        }
        _ => true,
    }
}

/// Stable fingerprint of the registry contents anchors depend on.
fn registry_fingerprint(home: &dyn HomePlatform) -> String {
    let mut lines: Vec<String> = Vec::new();
    for area in home.areas() {
        lines.push(format!("area:{}:{}", area.id, area.name));
    }
    for floor in home.floors() {
        lines.push(format!("floor:{}:{}", floor.id, floor.name));
    }
    for entity in home.entities() {
        if !entity.disabled {
            lines.push(format!(
                "entity:{}:{}:{}",
                entity.entity_id,
                entity.friendly_name().unwrap_or(""),
                entity.area_id.as_deref().unwrap_or("")
            ));
        }
    }
    lines.sort();
    let mut hasher = DefaultHasher::new();
    lines.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Builds and persists the anchor tier of the semantic cache.
pub struct AnchorBuilder {
    embedder: Arc<dyn Embedder>,
    store: JsonStore,
}

impl AnchorBuilder {
    pub fn new(embedder: Arc<dyn Embedder>, snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            embedder,
            store: JsonStore::new(snapshot_path),
        }
    }

    /// Load cached anchors if the registry still matches, rebuild otherwise.
    pub async fn load_or_build(
        &self,
        home: &dyn HomePlatform,
    ) -> Result<Vec<CacheEntry>, CacheError> {
        let fingerprint = registry_fingerprint(home);
        if let Some(snapshot) = self.store.load::<AnchorSnapshot>().await? {
            if snapshot.version == ANCHOR_VERSION && snapshot.registry_fingerprint == fingerprint
            {
                tracing::info!(count = snapshot.anchors.len(), "loaded anchors from cache");
                return Ok(snapshot.anchors);
            }
            tracing::info!("anchor cache stale (registry changed), rebuilding");
        }

        let anchors = self.generate(home).await?;
        self.store
            .save(AnchorSnapshot {
                version: ANCHOR_VERSION,
                registry_fingerprint: fingerprint,
                anchors: anchors.clone(),
            })
            .await?;
        tracing::info!(count = anchors.len(), "generated and saved anchors");
        Ok(anchors)
    }

    async fn make_entry(
        &self,
        text: String,
        intent: &str,
        slots: Slots,
        entity_ids: Vec<String>,
        required_disambiguation: bool,
    ) -> Result<Option<CacheEntry>, CacheError> {
        if text.split_whitespace().count() < cache_constants::MIN_CACHE_WORDS {
            return Ok(None);
        }
        let normalized = normalize_for_cache(&text).text;
        let embedding = self.embedder.embed(&normalized).await?;
        Ok(Some(CacheEntry {
            text: normalized,
            embedding,
            intent: intent.to_string(),
            entity_ids,
            slots,
            required_disambiguation,
            disambiguation_options: None,
            hits: 0,
            last_hit: String::new(),
            verified: true,
            generated: true,
        }))
    }

    async fn generate(&self, home: &dyn HomePlatform) -> Result<Vec<CacheEntry>, CacheError> {
        let areas = home.areas();
        let floors = home.floors();
        let area_names: BTreeMap<String, String> = areas
            .iter()
            .map(|a| (a.id.clone(), a.name.clone()))
            .collect();
        let floor_names: BTreeMap<String, String> = floors
            .iter()
            .map(|f| (f.id.clone(), f.name.clone()))
            .collect();
        let area_to_floor: BTreeMap<String, String> = areas
            .iter()
            .filter_map(|a| {
                let floor_id = a.floor_id.as_ref()?;
                Some((a.id.clone(), floor_names.get(floor_id)?.clone()))
            })
            .collect();

        // Group enabled entities by (domain, area) and (domain, floor), and
        // count friendly names globally for the unique-entity tier.
        let mut by_domain_area: BTreeMap<(String, String), Vec<(String, String)>> =
            BTreeMap::new();
        let mut by_domain_floor: BTreeMap<(String, String), Vec<(String, String)>> =
            BTreeMap::new();
        let mut name_counts: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();

        for entity in home.entities() {
            if entity.disabled {
                continue;
            }
            let domain = entity.domain().to_string();
            if !ANCHOR_DOMAINS.contains(&domain.as_str()) {
                continue;
            }
            let Some(name) = entity.friendly_name().map(str::to_string) else {
                continue;
            };
            name_counts
                .entry(name.trim().to_string())
                .or_default()
                .push((domain.clone(), entity.entity_id.clone()));

            if let Some(area_id) = &entity.area_id {
                if let Some(area_name) = area_names.get(area_id) {
                    by_domain_area
                        .entry((domain.clone(), area_name.clone()))
                        .or_default()
                        .push((entity.entity_id.clone(), name.clone()));
                }
                if let Some(floor_name) = area_to_floor.get(area_id) {
                    by_domain_floor
                        .entry((domain.clone(), floor_name.clone()))
                        .or_default()
                        .push((entity.entity_id.clone(), name.clone()));
                }
            }
        }

        let mut anchors: Vec<CacheEntry> = Vec::new();
        let mut seen_texts: HashSet<String> = HashSet::new();

        // Tier: globally unique entity names, no area context.
        let forbidden: HashSet<String> = area_names
            .values()
            .chain(floor_names.values())
            .map(|n| n.to_lowercase())
            .collect();
        anchors.extend(
            self.unique_entity_anchors(home, &name_counts, &forbidden, &mut seen_texts)
                .await?,
        );

        // Tiers: area scope and entity scope.
        for ((domain, area_name), entity_list) in &by_domain_area {
            anchors.extend(
                self.area_anchors(home, domain, area_name, entity_list, &mut seen_texts)
                    .await?,
            );
            anchors.extend(
                self.entity_anchors(home, domain, area_name, entity_list, &mut seen_texts)
                    .await?,
            );
            tracing::debug!(domain, area = area_name, total = anchors.len(), "anchor tier done");
        }

        // Tier: floors, reusing the area patterns.
        for ((domain, floor_name), entity_list) in &by_domain_floor {
            anchors.extend(
                self.floor_anchors(home, domain, floor_name, entity_list, &mut seen_texts)
                    .await?,
            );
        }

        // Tier: domain-wide globals.
        for domain in ANCHOR_DOMAINS {
            for pattern in global_patterns(domain) {
                let Some(text) = render(pattern, "", "", "", None, None) else {
                    continue;
                };
                if !seen_texts.insert(text.clone()) {
                    continue;
                }
                let mut slots = extra_slots(pattern);
                slots.insert("domain".to_string(), Value::from(domain));
                if let Some(entry) = self
                    .make_entry(text, pattern.intent, slots, Vec::new(), false)
                    .await?
                {
                    anchors.push(entry);
                }
            }
        }

        Ok(anchors)
    }

    async fn area_anchors(
        &self,
        home: &dyn HomePlatform,
        domain: &str,
        area_name: &str,
        entity_list: &[(String, String)],
        seen: &mut HashSet<String>,
    ) -> Result<Vec<CacheEntry>, CacheError> {
        let Some(config) = domain_config(domain) else {
            return Ok(Vec::new());
        };
        let words = config.device_words();
        // Singular phrasing when the area holds exactly one entity.
        let device = if entity_list.len() == 1 {
            words.accusative.clone()
        } else {
            words.plural.clone()
        };

        let mut anchors = Vec::new();
        for pattern in area_patterns(domain) {
            let Some(text) = render(
                pattern,
                &device,
                &words.nominative,
                &words.dative,
                Some(area_name),
                None,
            ) else {
                continue;
            };
            if !seen.insert(text.clone()) {
                continue;
            }

            let mut entity_ids: Vec<String> =
                entity_list.iter().map(|(id, _)| id.clone()).collect();
            if domain == "light" && pattern.intent == "HassLightSet" {
                entity_ids.retain(|id| is_dimmable(home.state(id).as_ref()));
                if entity_ids.is_empty() {
                    continue;
                }
            }

            let mut slots = extra_slots(pattern);
            slots.insert("area".to_string(), Value::from(area_name));
            slots.insert("domain".to_string(), Value::from(domain));
            let required_disambiguation = entity_ids.len() > 1;
            if let Some(entry) = self
                .make_entry(text, pattern.intent, slots, entity_ids, required_disambiguation)
                .await?
            {
                anchors.push(entry);
            }
        }
        Ok(anchors)
    }

    async fn entity_anchors(
        &self,
        home: &dyn HomePlatform,
        domain: &str,
        area_name: &str,
        entity_list: &[(String, String)],
        seen: &mut HashSet<String>,
    ) -> Result<Vec<CacheEntry>, CacheError> {
        let Some(config) = domain_config(domain) else {
            return Ok(Vec::new());
        };
        let words = config.device_words();

        let mut anchors = Vec::new();
        for (entity_id, entity_name) in entity_list {
            // An entity named exactly like its area is already covered by the
            // area tier; "Küche Spots" is distinct and gets its own anchors.
            if entity_name.to_lowercase() == area_name.to_lowercase() {
                continue;
            }
            let dimmable =
                domain != "light" || is_dimmable(home.state(entity_id).as_ref());

            for pattern in entity_patterns(domain) {
                if pattern.intent == "HassLightSet" && !dimmable {
                    continue;
                }
                // Entity tier renders only patterns scoped to the area; the
                // area-less variants belong to the unique-name tier.
                if !pattern.template.contains("{area}") {
                    continue;
                }
                let Some(text) = render(
                    pattern,
                    &words.accusative,
                    &words.nominative,
                    &words.dative,
                    Some(area_name),
                    Some(entity_name),
                ) else {
                    continue;
                };
                if !seen.insert(text.clone()) {
                    continue;
                }

                let mut slots = extra_slots(pattern);
                slots.insert("area".to_string(), Value::from(area_name.to_string()));
                slots.insert("domain".to_string(), Value::from(domain));
                slots.insert("name".to_string(), Value::from(entity_name.clone()));
                if let Some(entry) = self
                    .make_entry(
                        text,
                        pattern.intent,
                        slots,
                        vec![entity_id.clone()],
                        false,
                    )
                    .await?
                {
                    anchors.push(entry);
                }
            }
        }
        Ok(anchors)
    }

    async fn floor_anchors(
        &self,
        home: &dyn HomePlatform,
        domain: &str,
        floor_name: &str,
        entity_list: &[(String, String)],
        seen: &mut HashSet<String>,
    ) -> Result<Vec<CacheEntry>, CacheError> {
        let Some(config) = domain_config(domain) else {
            return Ok(Vec::new());
        };
        let words = config.device_words();
        let device = if entity_list.len() == 1 {
            words.accusative.clone()
        } else {
            words.plural.clone()
        };

        let mut anchors = Vec::new();
        for pattern in area_patterns(domain) {
            let Some(text) = render(
                pattern,
                &device,
                &words.nominative,
                &words.dative,
                Some(floor_name),
                None,
            ) else {
                continue;
            };
            if !seen.insert(text.clone()) {
                continue;
            }

            let mut entity_ids: Vec<String> =
                entity_list.iter().map(|(id, _)| id.clone()).collect();
            if domain == "light" && pattern.intent == "HassLightSet" {
                entity_ids.retain(|id| is_dimmable(home.state(id).as_ref()));
                if entity_ids.is_empty() {
                    continue;
                }
            }

            let mut slots = extra_slots(pattern);
            slots.insert("floor".to_string(), Value::from(floor_name));
            slots.insert("domain".to_string(), Value::from(domain));
            let required_disambiguation = entity_ids.len() > 1;
            if let Some(entry) = self
                .make_entry(text, pattern.intent, slots, entity_ids, required_disambiguation)
                .await?
            {
                anchors.push(entry);
            }
        }
        Ok(anchors)
    }

    /// Anchors for entity names that are unique across the installation and
    /// don't collide with any area or floor name. Rendered without area; the
    /// device word shrinks to its article ("Schalte das Ambilight an").
    async fn unique_entity_anchors(
        &self,
        home: &dyn HomePlatform,
        name_counts: &BTreeMap<String, Vec<(String, String)>>,
        forbidden: &HashSet<String>,
        seen: &mut HashSet<String>,
    ) -> Result<Vec<CacheEntry>, CacheError> {
        let mut anchors = Vec::new();

        for (name, owners) in name_counts {
            if owners.len() != 1 || forbidden.contains(&name.to_lowercase()) {
                continue;
            }
            let (domain, entity_id) = &owners[0];
            let Some(config) = domain_config(domain) else {
                continue;
            };
            let words = config.device_words();
            let article = |phrase: &str| {
                phrase
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_string()
            };
            let (acc, nom, dat) = (
                article(&words.accusative),
                article(&words.nominative),
                article(&words.dative),
            );
            let dimmable =
                domain != "light" || is_dimmable(home.state(entity_id).as_ref());

            for pattern in entity_patterns(domain) {
                if pattern.template.contains("{area}") {
                    continue;
                }
                if pattern.intent == "HassLightSet" && !dimmable {
                    continue;
                }
                let Some(text) = render(pattern, &acc, &nom, &dat, None, Some(name)) else {
                    continue;
                };
                if !seen.insert(text.clone()) {
                    continue;
                }

                let mut slots = extra_slots(pattern);
                slots.insert("name".to_string(), Value::from(name.clone()));
                if let Some(entry) = self
                    .make_entry(text, pattern.intent, slots, vec![entity_id.clone()], false)
                    .await?
                {
                    anchors.push(entry);
                }
            }
        }

        tracing::debug!(count = anchors.len(), "unique entity anchors");
        Ok(anchors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_support::VocabEmbedder;
    use heim_agent_core::SimHome;

    fn sim_home() -> SimHome {
        let home = SimHome::new();
        home.add_floor("eg", "Erdgeschoss");
        home.add_area("kueche", "Küche", Some("eg"));
        home.add_area("buero", "Büro", Some("eg"));
        home.add_entity("light.kueche", "Küche", Some("kueche"));
        home.add_entity("light.kueche_spots", "Küche Spots", Some("kueche"));
        home.add_entity("light.buero", "Büro", Some("buero"));
        home.add_entity("light.ambilight", "Ambilight", None);
        home
    }

    fn builder(dir: &std::path::Path) -> AnchorBuilder {
        AnchorBuilder::new(Arc::new(VocabEmbedder::new()), dir.join("anchors.json"))
    }

    #[tokio::test]
    async fn test_generates_all_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let home = sim_home();
        let anchors = builder(dir.path()).load_or_build(&home).await.unwrap();

        assert!(!anchors.is_empty());
        // Area anchor with plural device word (two lights in the kitchen).
        assert!(anchors
            .iter()
            .any(|a| a.text == "Schalte die Lichter in Küche an"));
        // Area anchor with singular device word (one light in the office).
        assert!(anchors
            .iter()
            .any(|a| a.text == "Schalte das Licht in Büro an"));
        // Entity anchor for the distinctly named kitchen spots.
        assert!(anchors
            .iter()
            .any(|a| a.text.contains("Küche Spots")));
        // Floor anchor.
        assert!(anchors
            .iter()
            .any(|a| a.text.contains("Erdgeschoss")));
        // Global anchor.
        assert!(anchors.iter().any(|a| a.text == "Schalte alle Lichter aus"));
        // Unique-name anchor without any area.
        assert!(anchors.iter().any(|a| a.text == "Schalte das Ambilight an"));

        for anchor in &anchors {
            assert!(anchor.generated);
            assert!(anchor.verified);
            assert_eq!(anchor.hits, 0);
        }
    }

    #[tokio::test]
    async fn test_area_anchor_collects_all_entities() {
        let dir = tempfile::tempdir().unwrap();
        let home = sim_home();
        let anchors = builder(dir.path()).load_or_build(&home).await.unwrap();

        let kitchen_on = anchors
            .iter()
            .find(|a| a.text == "Schalte die Lichter in Küche an")
            .unwrap();
        assert_eq!(kitchen_on.entity_ids.len(), 2);
        assert!(kitchen_on.required_disambiguation);
    }

    #[tokio::test]
    async fn test_non_dimmable_lights_excluded_from_light_set() {
        let dir = tempfile::tempdir().unwrap();
        let home = SimHome::new();
        home.add_area("flur", "Flur", None);
        home.add_entity("light.flur", "Flurlicht", Some("flur"));
        home.set_state(
            "light.flur",
            EntityState::new("off")
                .with_attr("supported_color_modes", serde_json::json!(["onoff"])),
        );

        let anchors = builder(dir.path()).load_or_build(&home).await.unwrap();
        assert!(!anchors
            .iter()
            .any(|a| a.intent == "HassLightSet" && a.entity_ids.contains(&"light.flur".to_string())));
        // On/off anchors still exist.
        assert!(anchors
            .iter()
            .any(|a| a.intent == "HassTurnOn" && a.entity_ids.contains(&"light.flur".to_string())));
    }

    #[tokio::test]
    async fn test_entity_named_like_area_is_skipped_in_entity_tier() {
        let dir = tempfile::tempdir().unwrap();
        let home = sim_home();
        let anchors = builder(dir.path()).load_or_build(&home).await.unwrap();

        // "Küche" (the entity) must not get entity-tier anchors of the form
        // "Schalte das Licht Küche in Küche an".
        assert!(!anchors.iter().any(|a| a.text.contains("Küche in Küche")));
    }

    #[tokio::test]
    async fn test_rebuilds_on_registry_divergence() {
        let dir = tempfile::tempdir().unwrap();
        let home = sim_home();
        let first = builder(dir.path()).load_or_build(&home).await.unwrap();

        // Unchanged registry loads the snapshot as-is.
        let second = builder(dir.path()).load_or_build(&home).await.unwrap();
        assert_eq!(first.len(), second.len());

        // A new entity changes the fingerprint and forces a rebuild.
        home.add_entity("light.neu", "Neues Licht", Some("buero"));
        let third = builder(dir.path()).load_or_build(&home).await.unwrap();
        assert!(third.len() > second.len());
    }

    #[test]
    fn test_render_skips_unresolved_placeholders() {
        let pattern = pat!("Schalte {device} {entity_name} an", "HassTurnOn");
        assert_eq!(
            render(&pattern, "das Licht", "", "", None, None),
            None
        );
        assert_eq!(
            render(&pattern, "das", "", "", None, Some("Ambilight")),
            Some("Schalte das Ambilight an".to_string())
        );
    }
}
