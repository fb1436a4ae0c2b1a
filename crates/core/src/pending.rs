//! Multi-turn pending state.
//!
//! When a stage needs another user turn (disambiguation, area learning,
//! slot filling) it returns `StageResult::Pending` carrying a `PendingData`.
//! The orchestrator stores one record per conversation and routes the next
//! utterance of that conversation to the owning continuation handler.

use crate::home::NotifyService;
use crate::Slots;
use std::time::Instant;

/// Candidate entity offered during disambiguation, in spoken order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub entity_id: String,
    /// Friendly name as spoken to the user.
    pub name: String,
}

/// Which component continues a pending conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingHandler {
    Execution,
    AreaLearning,
    Timer,
    Calendar,
}

/// Typed payload of a pending record; the variant names the continuation
/// handler.
#[derive(Debug, Clone)]
pub enum PendingPayload {
    /// Multiple candidates for a singular phrasing; waiting for a pick.
    Disambiguation {
        intent: String,
        params: Slots,
        candidates: Vec<Candidate>,
        /// The command that triggered disambiguation, re-used for learning
        /// and cache admission once resolved.
        original_text: String,
        from_cache: bool,
    },
    /// The area resolver could not map a location; waiting for the user to
    /// name the real area so the alias can be learned.
    AreaLearning {
        unknown_area: String,
        candidates: Vec<String>,
        original_text: String,
    },
    /// Timer slot filling.
    Timer(TimerPending),
    /// Calendar slot filling and confirmation.
    Calendar(CalendarPending),
}

impl PendingPayload {
    pub fn handler(&self) -> PendingHandler {
        match self {
            PendingPayload::Disambiguation { .. } => PendingHandler::Execution,
            PendingPayload::AreaLearning { .. } => PendingHandler::AreaLearning,
            PendingPayload::Timer(_) => PendingHandler::Timer,
            PendingPayload::Calendar(_) => PendingHandler::Calendar,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerStep {
    AskDuration,
    AskDevice,
}

#[derive(Debug, Clone)]
pub struct TimerPending {
    pub step: TimerStep,
    pub duration_secs: Option<u64>,
    /// Resolved notify service, once known.
    pub device: Option<String>,
    /// The device name the user originally said, kept for alias learning.
    pub requested_name: Option<String>,
    pub candidates: Vec<NotifyService>,
    /// Free-text description, extracted once and never re-extracted.
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarStep {
    AskSummary,
    AskDatetime,
    AskCalendar,
    Confirm,
}

/// Accumulated calendar event fields across turns.
#[derive(Debug, Clone, Default)]
pub struct CalendarDraft {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    /// All-day events use dates, timed events use date-times.
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub start_date_time: Option<String>,
    pub end_date_time: Option<String>,
    pub duration_minutes: Option<u32>,
    pub is_all_day: bool,
    pub calendar_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CalendarPending {
    pub step: CalendarStep,
    pub event: CalendarDraft,
    /// Candidate calendar entity ids when more than one is exposed.
    pub calendars: Vec<String>,
}

/// Pending state emitted by a stage.
#[derive(Debug, Clone)]
pub struct PendingData {
    /// The question asked of the user, re-spoken on retries.
    pub original_prompt: String,
    pub payload: PendingPayload,
    /// Atomic commands still to run after this pending resolves
    /// (multi-command sequences halt on the first pending).
    pub remaining_commands: Vec<String>,
    /// Confirmations already produced by earlier commands in the sequence,
    /// prefixed to the next spoken reply.
    pub collected_speech: Vec<String>,
}

impl PendingData {
    pub fn new(original_prompt: impl Into<String>, payload: PendingPayload) -> Self {
        Self {
            original_prompt: original_prompt.into(),
            payload,
            remaining_commands: Vec::new(),
            collected_speech: Vec::new(),
        }
    }
}

/// A stored pending record, one per conversation at most.
#[derive(Debug, Clone)]
pub struct PendingRecord {
    pub data: PendingData,
    pub created_at: Instant,
    pub retry_count: u32,
}

impl PendingRecord {
    pub fn new(data: PendingData) -> Self {
        Self {
            data,
            created_at: Instant::now(),
            retry_count: 0,
        }
    }

    pub fn is_stale(&self, ttl_secs: u64) -> bool {
        self.created_at.elapsed().as_secs() >= ttl_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_routes_to_handler() {
        let disamb = PendingPayload::Disambiguation {
            intent: "HassTurnOff".into(),
            params: Slots::new(),
            candidates: vec![],
            original_text: "Licht aus".into(),
            from_cache: false,
        };
        assert_eq!(disamb.handler(), PendingHandler::Execution);

        let timer = PendingPayload::Timer(TimerPending {
            step: TimerStep::AskDuration,
            duration_secs: None,
            device: None,
            requested_name: None,
            candidates: vec![],
            description: None,
        });
        assert_eq!(timer.handler(), PendingHandler::Timer);
    }

    #[test]
    fn test_fresh_record_is_not_stale() {
        let record = PendingRecord::new(PendingData::new(
            "Welches Gerät meinst du?",
            PendingPayload::AreaLearning {
                unknown_area: "Ki-Bad".into(),
                candidates: vec!["Küche".into()],
                original_text: "Licht im Ki-Bad an".into(),
            },
        ));
        assert!(!record.is_stale(15));
        assert_eq!(record.retry_count, 0);
    }
}
