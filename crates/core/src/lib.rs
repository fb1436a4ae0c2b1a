//! Core traits and types for the intent resolver
//!
//! This crate provides foundational types used across all other crates:
//! - `Utterance` and `SpokenReply` (one conversation turn in, one out)
//! - `StageResult`, the tagged result every pipeline stage returns
//! - Pending-state types for multi-turn dialogs
//! - The `HomePlatform` trait the pipeline consumes (registries, states,
//!   intent dispatch, service calls)
//! - `SimHome`, an in-memory platform for tests and local development
//! - Error types

pub mod error;
pub mod home;
pub mod intent;
pub mod pending;
pub mod stage_result;
pub mod utterance;

pub use error::{Error, Result};
pub use home::{
    Area, EntityRecord, EntityState, Floor, HomePlatform, IntentRequest, IntentResponse, NluMatch,
    NotifyService, SimHome,
};
pub use pending::{
    CalendarDraft, CalendarPending, CalendarStep, Candidate, PendingData, PendingHandler,
    PendingPayload, PendingRecord, TimerPending, TimerStep,
};
pub use stage_result::{SpokenReply, StageResult};
pub use utterance::Utterance;

use serde_json::Value;
use std::collections::BTreeMap;

/// Slot values attached to an intent (area, name, brightness, ...).
pub type Slots = BTreeMap<String, Value>;

/// Context map handed from stage to stage, merged as the pipeline cascades.
pub type Context = BTreeMap<String, Value>;
