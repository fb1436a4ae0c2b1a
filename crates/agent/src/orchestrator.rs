//! Stage orchestrator: routing, pending registry, multi-command sequencing.

use crate::capabilities::{CalendarCapability, CapabilityOutcome, TimerCapability, VacuumCapability};
use crate::chat_history::ChatHistory;
use crate::execution::{ContinuationOutcome, ExecutionPipeline};
use crate::services::Services;
use crate::stage::Stage;
use crate::stages::{CacheStage, CloudStage, LlmStage, NluProbeStage};
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use heim_agent_config::responses as messages;
use heim_agent_core::{
    Context, PendingData, PendingPayload, PendingRecord, SpokenReply, StageResult, Utterance,
};
use heim_agent_text_processing::{canonicalize, is_negative, ratio};
use std::sync::Arc;

/// Runs the stage cascade and owns all per-conversation state.
pub struct Orchestrator {
    services: Services,
    stages: Vec<Arc<dyn Stage>>,
    execution: Arc<ExecutionPipeline>,
    timer: Arc<TimerCapability>,
    calendar: Arc<CalendarCapability>,
    pending: DashMap<String, PendingRecord>,
}

impl Orchestrator {
    pub fn new(services: Services) -> Self {
        let timer = Arc::new(TimerCapability::new(services.clone()));
        let calendar = Arc::new(CalendarCapability::new(services.clone()));
        let vacuum = Arc::new(VacuumCapability::new(services.clone()));
        let history = Arc::new(ChatHistory::new());

        let stages: Vec<Arc<dyn Stage>> = vec![
            Arc::new(NluProbeStage::new(services.clone())),
            Arc::new(CacheStage::new(services.clone())),
            Arc::new(LlmStage::new(
                services.clone(),
                timer.clone(),
                calendar.clone(),
                vacuum,
            )),
            Arc::new(CloudStage::new(services.clone(), history)),
        ];

        Self {
            execution: Arc::new(ExecutionPipeline::new(services.clone())),
            services,
            stages,
            timer,
            calendar,
            pending: DashMap::new(),
        }
    }

    /// True if a pending record exists for the conversation (test hook).
    pub fn has_pending(&self, conversation_id: &str) -> bool {
        self.pending.contains_key(conversation_id)
    }

    /// Process one utterance: continue a pending dialog or run the cascade.
    pub async fn handle(&self, utterance: &Utterance) -> SpokenReply {
        self.sweep_stale(&utterance.conversation_id);

        if let Some((_, record)) = self.pending.remove(&utterance.conversation_id) {
            let ttl = self.services.settings.pending.ttl_secs;
            if record.is_stale(ttl) {
                tracing::debug!(
                    conversation = %utterance.conversation_id,
                    "pending record expired, starting fresh"
                );
            } else {
                return self.continue_pending(utterance, record).await;
            }
        }

        self.run_pipeline(utterance).await
    }

    /// Drop stale records belonging to *other* conversations; the current
    /// one is checked on access.
    fn sweep_stale(&self, current_conversation: &str) {
        let ttl = self.services.settings.pending.ttl_secs;
        self.pending
            .retain(|conversation_id, record| {
                conversation_id.as_str() == current_conversation || !record.is_stale(ttl)
            });
    }

    fn store_pending(&self, conversation_id: &str, record: PendingRecord) {
        // At most one record per conversation; a new question replaces the
        // old one.
        self.pending.insert(conversation_id.to_string(), record);
    }

    /// Route the follow-up utterance to the owning continuation handler.
    async fn continue_pending(&self, utterance: &Utterance, record: PendingRecord) -> SpokenReply {
        let PendingRecord {
            data,
            retry_count,
            ..
        } = record;
        let remaining = data.remaining_commands.clone();

        match data.payload.clone() {
            PendingPayload::Disambiguation {
                intent,
                params,
                candidates,
                original_text,
                from_cache,
            } => {
                let outcome = self
                    .execution
                    .continue_disambiguation(
                        utterance,
                        &intent,
                        &params,
                        &candidates,
                        &original_text,
                        from_cache,
                    )
                    .await;
                match outcome {
                    ContinuationOutcome::Done(done) => {
                        self.resume_after(utterance, done.reply, remaining).await
                    }
                    ContinuationOutcome::Cancelled => SpokenReply::say(messages::MSG_CANCELLED),
                    ContinuationOutcome::Reprompt => {
                        self.reprompt(utterance, data, retry_count)
                    }
                }
            }
            PendingPayload::AreaLearning {
                unknown_area,
                candidates,
                original_text,
            } => {
                if is_negative(&utterance.text) {
                    return SpokenReply::say(messages::MSG_CANCELLED);
                }
                match Self::pick_area(&utterance.text, &candidates) {
                    Some(area) => {
                        if let Err(err) = self
                            .services
                            .aliases
                            .learn_area_alias(&unknown_area, &area)
                            .await
                        {
                            tracing::warn!(%err, "failed to persist area alias");
                        }
                        // Re-run the original command with the alias known.
                        let rerun = utterance.with_text(original_text);
                        let reply = self.run_pipeline(&rerun).await;
                        self.resume_after(utterance, reply, remaining).await
                    }
                    None => self.reprompt(utterance, data, retry_count),
                }
            }
            PendingPayload::Timer(timer_pending) => {
                let outcome = self.timer.continue_flow(utterance, timer_pending).await;
                self.finish_capability(utterance, data, retry_count, outcome, remaining)
                    .await
            }
            PendingPayload::Calendar(calendar_pending) => {
                let outcome = self
                    .calendar
                    .continue_flow(utterance, calendar_pending)
                    .await;
                self.finish_capability(utterance, data, retry_count, outcome, remaining)
                    .await
            }
        }
    }

    /// Re-ask the pending question, honoring the retry budget.
    fn reprompt(&self, utterance: &Utterance, data: PendingData, retry_count: u32) -> SpokenReply {
        let max_retries = self.services.settings.pending.max_retries;
        if retry_count >= max_retries {
            tracing::debug!("retry budget exhausted, aborting pending dialog");
            return SpokenReply::say(messages::MSG_CANCELLED);
        }
        let question = data.original_prompt.clone();
        let mut record = PendingRecord::new(data);
        record.retry_count = retry_count + 1;
        self.store_pending(&utterance.conversation_id, record);
        SpokenReply::ask(format!("{} {}", messages::ERR_NOT_UNDERSTOOD, question))
    }

    /// Store or finish a capability continuation, counting repeats of the
    /// same question against the retry budget.
    async fn finish_capability(
        &self,
        utterance: &Utterance,
        previous: PendingData,
        retry_count: u32,
        outcome: CapabilityOutcome,
        remaining: Vec<String>,
    ) -> SpokenReply {
        match outcome.pending {
            Some(mut next) => {
                let repeated = same_question(&previous.payload, &next.payload);
                let max_retries = self.services.settings.pending.max_retries;
                if repeated && retry_count >= max_retries {
                    return SpokenReply::say(messages::MSG_CANCELLED);
                }
                next.remaining_commands = remaining;
                let mut record = PendingRecord::new(next);
                record.retry_count = if repeated { retry_count + 1 } else { 0 };
                self.store_pending(&utterance.conversation_id, record);
                outcome.reply
            }
            None => self.resume_after(utterance, outcome.reply, remaining).await,
        }
    }

    /// After a pending dialog resolved: run any halted multi-command rest.
    /// Speech collected before the halt was already spoken with the
    /// question and is not repeated here.
    async fn resume_after(
        &self,
        utterance: &Utterance,
        reply: SpokenReply,
        remaining: Vec<String>,
    ) -> SpokenReply {
        if remaining.is_empty() {
            return reply;
        }
        tracing::debug!(count = remaining.len(), "resuming halted command sequence");
        self.run_sequence(utterance, remaining, vec![reply.speech])
            .await
    }

    fn pick_area(answer: &str, candidates: &[String]) -> Option<String> {
        let needle = canonicalize(answer);
        if needle.is_empty() {
            return None;
        }
        // Exact canonical match first, then containment, then edit ratio.
        for candidate in candidates {
            if canonicalize(candidate) == needle {
                return Some(candidate.clone());
            }
        }
        for candidate in candidates {
            let canon = canonicalize(candidate);
            if canon.contains(&needle) || needle.contains(&canon) {
                return Some(candidate.clone());
            }
        }
        candidates
            .iter()
            .map(|c| (c, ratio(&canonicalize(c), &needle)))
            .filter(|(_, score)| *score >= 70)
            .max_by_key(|(_, score)| *score)
            .map(|(c, _)| c.clone())
    }

    /// Run the stage cascade for one utterance. Boxed for the recursive
    /// multi-command case.
    pub fn run_pipeline<'a>(&'a self, utterance: &'a Utterance) -> BoxFuture<'a, SpokenReply> {
        async move {
            let mut context = Context::new();
            let mut index = 0;

            while index < self.stages.len() {
                let stage = &self.stages[index];
                tracing::debug!(stage = stage.name(), text = %utterance.text, "running stage");
                let result = stage.process(utterance, &context).await;

                match result {
                    StageResult::Escalate {
                        context: next_context,
                        ..
                    } => {
                        context = heim_agent_core::stage_result::merge_context(
                            &context,
                            &next_context,
                        );
                        index += 1;
                    }
                    StageResult::EscalateChat {
                        context: next_context,
                        ..
                    } => {
                        // Skip the remaining resolver stages entirely.
                        context = heim_agent_core::stage_result::merge_context(
                            &context,
                            &next_context,
                        );
                        index = self.stages.len() - 1;
                    }
                    StageResult::MultiCommand { commands, .. } => {
                        return self.run_sequence(utterance, commands, Vec::new()).await;
                    }
                    StageResult::Pending { data, .. } => {
                        let question = data.original_prompt.clone();
                        self.store_pending(&utterance.conversation_id, PendingRecord::new(data));
                        return SpokenReply::ask(question);
                    }
                    StageResult::Error { response, .. } => {
                        return response;
                    }
                    StageResult::Success {
                        intent,
                        entity_ids,
                        params,
                        context: result_context,
                        response,
                        ..
                    } => {
                        if let Some(reply) = response {
                            // Chat-mode completion carries its own answer.
                            return reply;
                        }
                        let Some(intent) = intent else {
                            tracing::error!("success without intent or response");
                            return SpokenReply::say(messages::ERR_INTERNAL);
                        };
                        let merged = heim_agent_core::stage_result::merge_context(
                            &context,
                            &result_context,
                        );
                        let outcome = self
                            .execution
                            .execute(utterance, &intent, &entity_ids, &params, &merged)
                            .await;
                        if let Some(pending) = outcome.pending {
                            self.store_pending(
                                &utterance.conversation_id,
                                PendingRecord::new(pending),
                            );
                        }
                        return outcome.reply;
                    }
                }
            }

            // Every stage escalated: the host platform's default agent has
            // the last word.
            match self.services.home.converse_default(utterance).await {
                Ok(reply) => reply,
                Err(err) => {
                    tracing::warn!(%err, "default agent fallback failed");
                    SpokenReply::say(messages::ERR_NOT_UNDERSTOOD)
                }
            }
        }
        .boxed()
    }

    /// Run atomic commands in order, halting when one parks the
    /// conversation; the halted pending record inherits the remainder.
    fn run_sequence<'a>(
        &'a self,
        utterance: &'a Utterance,
        commands: Vec<String>,
        collected: Vec<String>,
    ) -> BoxFuture<'a, SpokenReply> {
        async move {
            let mut collected = collected;
            for (position, command) in commands.iter().enumerate() {
                let sub_utterance = utterance.with_text(command.clone());
                let reply = self.run_pipeline(&sub_utterance).await;

                if let Some(mut record) =
                    self.pending.get_mut(&utterance.conversation_id)
                {
                    // This command paused the sequence; stash the rest on
                    // the pending record for resumption.
                    record.data.remaining_commands =
                        commands[position + 1..].to_vec();
                    record.data.collected_speech = collected.clone();
                    drop(record);
                    return reply.with_prefix(&collected);
                }

                collected.push(reply.speech);
            }

            if collected.is_empty() {
                SpokenReply::say(messages::ERR_NOT_UNDERSTOOD)
            } else {
                SpokenReply::say(collected.join(" "))
            }
        }
        .boxed()
    }
}

/// Do two pending payloads represent the same open question? Repeats count
/// against the retry budget; progress (a new question) resets it.
fn same_question(old: &PendingPayload, new: &PendingPayload) -> bool {
    match (old, new) {
        (PendingPayload::Disambiguation { .. }, PendingPayload::Disambiguation { .. }) => true,
        (PendingPayload::AreaLearning { .. }, PendingPayload::AreaLearning { .. }) => true,
        (PendingPayload::Timer(a), PendingPayload::Timer(b)) => a.step == b.step,
        (PendingPayload::Calendar(a), PendingPayload::Calendar(b)) => a.step == b.step,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_area() {
        let candidates = vec!["Küche".to_string(), "Kinder Badezimmer".to_string()];
        assert_eq!(
            Orchestrator::pick_area("Kinder Badezimmer", &candidates),
            Some("Kinder Badezimmer".to_string())
        );
        assert_eq!(
            Orchestrator::pick_area("kueche", &candidates),
            Some("Küche".to_string())
        );
        // Substring containment.
        assert_eq!(
            Orchestrator::pick_area("Badezimmer", &candidates),
            Some("Kinder Badezimmer".to_string())
        );
        assert_eq!(Orchestrator::pick_area("Garage", &candidates), None);
    }

    #[test]
    fn test_same_question() {
        use heim_agent_core::{TimerPending, TimerStep};
        let ask_duration = PendingPayload::Timer(TimerPending {
            step: TimerStep::AskDuration,
            duration_secs: None,
            device: None,
            requested_name: None,
            candidates: vec![],
            description: None,
        });
        let ask_device = PendingPayload::Timer(TimerPending {
            step: TimerStep::AskDevice,
            duration_secs: Some(300),
            device: None,
            requested_name: None,
            candidates: vec![],
            description: None,
        });
        assert!(same_question(&ask_duration, &ask_duration));
        // Progress to a different slot resets the retry budget.
        assert!(!same_question(&ask_duration, &ask_device));
    }
}
