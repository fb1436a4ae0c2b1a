//! Resolvers and small decision helpers.
//!
//! Everything between "the LLM produced slots" and "these entity ids":
//! area/floor resolution, entity resolution, keyword-driven intent parsing,
//! relative step computation, plural detection and disambiguation answers.

pub mod area;
pub mod entity;
pub mod keyword_intent;
pub mod plural;
pub mod select;
pub mod step;

pub use area::{AreaResolution, AreaResolver};
pub use entity::{filter_by_state, is_dimmable, EntityResolver, ResolvedEntities};
pub use keyword_intent::{KeywordIntent, KeywordIntentParser};
pub use plural::PluralDetector;
pub use select::DisambiguationSelector;
pub use step::{StepController, StepResult};
