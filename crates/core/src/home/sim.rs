//! In-memory home platform used by tests and local development.
//!
//! `SimHome` keeps registries and states in memory and applies intent
//! semantics to its own state table so that verification after dispatch sees
//! real transitions (turn on → "on", set position → "current_position", ...).

use super::{
    Area, EntityRecord, EntityState, Floor, HomePlatform, IntentRequest, IntentResponse, NluMatch,
    NotifyService,
};
use crate::error::{Error, Result};
use crate::stage_result::SpokenReply;
use crate::utterance::Utterance;
use crate::intent;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;

/// A recorded service call, for test assertions.
#[derive(Debug, Clone)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub data: Value,
}

#[derive(Default)]
struct SimState {
    areas: Vec<Area>,
    floors: Vec<Floor>,
    entities: Vec<EntityRecord>,
    states: BTreeMap<String, EntityState>,
    notify: Vec<NotifyService>,
    nlu: BTreeMap<String, NluMatch>,
    service_calls: Vec<ServiceCall>,
    handled: Vec<IntentRequest>,
    default_agent_calls: Vec<String>,
}

/// In-memory `HomePlatform` implementation.
#[derive(Default)]
pub struct SimHome {
    inner: RwLock<SimState>,
}

impl SimHome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_floor(&self, id: &str, name: &str) {
        self.inner.write().floors.push(Floor {
            id: id.to_string(),
            name: name.to_string(),
            aliases: Vec::new(),
        });
    }

    pub fn add_area(&self, id: &str, name: &str, floor_id: Option<&str>) {
        self.inner.write().areas.push(Area {
            id: id.to_string(),
            name: name.to_string(),
            floor_id: floor_id.map(str::to_string),
            aliases: Vec::new(),
        });
    }

    pub fn add_area_alias(&self, area_id: &str, alias: &str) {
        let mut state = self.inner.write();
        if let Some(area) = state.areas.iter_mut().find(|a| a.id == area_id) {
            area.aliases.push(alias.to_string());
        }
    }

    pub fn add_entity(&self, entity_id: &str, name: &str, area_id: Option<&str>) {
        let mut state = self.inner.write();
        state.entities.push(EntityRecord {
            entity_id: entity_id.to_string(),
            name: Some(name.to_string()),
            original_name: None,
            area_id: area_id.map(str::to_string),
            disabled: false,
        });
        let domain = entity_id.split('.').next().unwrap_or("");
        let initial = match domain {
            "cover" => EntityState::new("closed").with_attr("current_position", 0),
            _ => EntityState::new("off"),
        };
        state.states.insert(entity_id.to_string(), initial);
    }

    /// Mark an entity as disabled (not exposed to voice control).
    pub fn set_disabled(&self, entity_id: &str) {
        let mut state = self.inner.write();
        if let Some(entity) = state
            .entities
            .iter_mut()
            .find(|e| e.entity_id == entity_id)
        {
            entity.disabled = true;
        }
    }

    pub fn set_state(&self, entity_id: &str, entity_state: EntityState) {
        self.inner
            .write()
            .states
            .insert(entity_id.to_string(), entity_state);
    }

    pub fn add_notify_service(&self, service: &str, name: &str) {
        self.inner.write().notify.push(NotifyService {
            service: service.to_string(),
            name: name.to_string(),
        });
    }

    /// Teach the rule-based recognizer a canned result for an exact text.
    pub fn add_recognition(&self, text: &str, result: NluMatch) {
        self.inner.write().nlu.insert(text.to_string(), result);
    }

    pub fn service_calls(&self) -> Vec<ServiceCall> {
        self.inner.read().service_calls.clone()
    }

    pub fn handled_intents(&self) -> Vec<IntentRequest> {
        self.inner.read().handled.clone()
    }

    pub fn default_agent_calls(&self) -> Vec<String> {
        self.inner.read().default_agent_calls.clone()
    }

    fn apply_intent(state: &mut SimState, entity_id: &str, request: &IntentRequest) {
        let domain = entity_id.split('.').next().unwrap_or("").to_string();
        let Some(entity_state) = state.states.get_mut(entity_id) else {
            return;
        };
        match request.intent.as_str() {
            intent::TURN_ON => {
                if domain == "cover" {
                    entity_state.state = "open".to_string();
                    entity_state
                        .attributes
                        .insert("current_position".into(), Value::from(100));
                } else {
                    entity_state.state = "on".to_string();
                }
            }
            intent::TURN_OFF => {
                if domain == "cover" {
                    entity_state.state = "closed".to_string();
                    entity_state
                        .attributes
                        .insert("current_position".into(), Value::from(0));
                } else {
                    entity_state.state = "off".to_string();
                }
            }
            intent::LIGHT_SET => {
                if let Some(pct) = request.slots.get("brightness").and_then(Value::as_f64) {
                    let raw = (pct * 255.0 / 100.0).round();
                    entity_state
                        .attributes
                        .insert("brightness".into(), Value::from(raw));
                    entity_state.state = if pct > 0.0 { "on" } else { "off" }.to_string();
                }
            }
            intent::SET_POSITION => {
                if let Some(pos) = request.slots.get("position").and_then(Value::as_f64) {
                    entity_state
                        .attributes
                        .insert("current_position".into(), Value::from(pos));
                    entity_state.state =
                        if pos > 0.0 { "open" } else { "closed" }.to_string();
                }
            }
            intent::CLIMATE_SET_TEMPERATURE => {
                if let Some(temp) = request.slots.get("temperature").and_then(Value::as_f64) {
                    entity_state
                        .attributes
                        .insert("temperature".into(), Value::from(temp));
                }
            }
            _ => {}
        }
    }
}

#[async_trait]
impl HomePlatform for SimHome {
    fn areas(&self) -> Vec<Area> {
        self.inner.read().areas.clone()
    }

    fn floors(&self) -> Vec<Floor> {
        self.inner.read().floors.clone()
    }

    fn entities(&self) -> Vec<EntityRecord> {
        self.inner.read().entities.clone()
    }

    fn state(&self, entity_id: &str) -> Option<EntityState> {
        self.inner.read().states.get(entity_id).cloned()
    }

    async fn handle_intent(&self, request: IntentRequest) -> Result<IntentResponse> {
        let entity_id = request
            .slots
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Home("intent request without target".to_string()))?;

        let mut state = self.inner.write();
        if !state.states.contains_key(&entity_id) {
            return Err(Error::Home(format!("unknown entity: {entity_id}")));
        }
        Self::apply_intent(&mut state, &entity_id, &request);
        state.handled.push(request);
        Ok(IntentResponse::default())
    }

    async fn call_service(&self, domain: &str, service: &str, data: Value) -> Result<()> {
        self.inner.write().service_calls.push(ServiceCall {
            domain: domain.to_string(),
            service: service.to_string(),
            data,
        });
        Ok(())
    }

    async fn converse_default(&self, utterance: &Utterance) -> Result<SpokenReply> {
        self.inner
            .write()
            .default_agent_calls
            .push(utterance.text.clone());
        Ok(SpokenReply::say("Das habe ich nicht verstanden."))
    }

    fn notify_services(&self) -> Vec<NotifyService> {
        self.inner.read().notify.clone()
    }

    async fn recognize(&self, utterance: &Utterance) -> Option<NluMatch> {
        self.inner.read().nlu.get(&utterance.text).cloned()
    }
}
