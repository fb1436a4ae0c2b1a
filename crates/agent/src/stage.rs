//! The stage contract.

use async_trait::async_trait;
use heim_agent_core::{Context, StageResult, Utterance};

/// One resolver layer in the cascade.
///
/// Stages are stateless with respect to conversations: pending state lives
/// in the orchestrator's registry, and continuations are routed by the
/// pending payload's handler, not back through `process`.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Try to resolve the utterance. `context` accumulates across stages.
    async fn process(&self, utterance: &Utterance, context: &Context) -> StageResult;
}
