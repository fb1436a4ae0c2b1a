//! The cascading stages, in pipeline order.

pub mod cache;
pub mod cloud;
pub mod llm;
pub mod nlu;

pub use cache::CacheStage;
pub use cloud::CloudStage;
pub use llm::LlmStage;
pub use nlu::NluProbeStage;
