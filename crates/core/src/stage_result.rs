//! Unified stage result, the pipeline's universal currency.
//!
//! Every stage returns a `StageResult`; the orchestrator matches on the
//! variant to decide whether to execute, escalate, loop over sub-commands,
//! park the conversation, or reply with an error.

use crate::pending::PendingData;
use crate::{Context, Slots};
use serde_json::Value;

/// A spoken reply ready for the conversation transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpokenReply {
    pub speech: String,
    /// Whether the assistant expects another turn in this conversation.
    pub continue_conversation: bool,
}

impl SpokenReply {
    /// Terminal reply, conversation ends.
    pub fn say(speech: impl Into<String>) -> Self {
        Self {
            speech: speech.into(),
            continue_conversation: false,
        }
    }

    /// Question reply, conversation stays open for a follow-up.
    pub fn ask(speech: impl Into<String>) -> Self {
        Self {
            speech: speech.into(),
            continue_conversation: true,
        }
    }

    /// Prepend earlier confirmations so the user hears what already happened
    /// before the follow-up question.
    pub fn with_prefix(mut self, prefix: &[String]) -> Self {
        if !prefix.is_empty() {
            let mut parts: Vec<&str> = prefix.iter().map(String::as_str).collect();
            parts.push(&self.speech);
            self.speech = parts.join(" ");
        }
        self
    }
}

/// Outcome of one stage's attempt at an utterance.
#[derive(Debug, Clone)]
pub enum StageResult {
    /// Intent and entities resolved, ready for the execution pipeline.
    ///
    /// `response` is set (and `intent` empty) only for chat-mode completions
    /// that carry a pre-built answer; device commands always name an intent.
    Success {
        intent: Option<String>,
        entity_ids: Vec<String>,
        params: Slots,
        context: Context,
        response: Option<SpokenReply>,
        raw_text: Option<String>,
    },
    /// This stage cannot resolve the utterance; try the next one.
    Escalate {
        context: Context,
        raw_text: Option<String>,
    },
    /// User wants conversation, not control; skip straight to the cloud
    /// stage in chat mode.
    EscalateChat {
        context: Context,
        raw_text: Option<String>,
    },
    /// The utterance decomposed into atomic commands the orchestrator must
    /// run one by one.
    MultiCommand {
        commands: Vec<String>,
        context: Context,
        raw_text: Option<String>,
    },
    /// The user must answer a question before the command can proceed.
    Pending {
        data: PendingData,
        raw_text: Option<String>,
    },
    /// Terminal failure with a pre-built spoken reply.
    Error {
        response: SpokenReply,
        raw_text: Option<String>,
    },
}

impl StageResult {
    pub fn success(
        intent: impl Into<String>,
        entity_ids: Vec<String>,
        params: Slots,
        context: Context,
        raw_text: impl Into<String>,
    ) -> Self {
        StageResult::Success {
            intent: Some(intent.into()),
            entity_ids,
            params,
            context,
            response: None,
            raw_text: Some(raw_text.into()),
        }
    }

    /// Chat-mode completion: a finished answer with no device intent.
    pub fn chat_reply(response: SpokenReply, context: Context, raw_text: impl Into<String>) -> Self {
        StageResult::Success {
            intent: None,
            entity_ids: Vec::new(),
            params: Slots::new(),
            context,
            response: Some(response),
            raw_text: Some(raw_text.into()),
        }
    }

    pub fn escalate(context: Context, raw_text: impl Into<String>) -> Self {
        StageResult::Escalate {
            context,
            raw_text: Some(raw_text.into()),
        }
    }

    pub fn escalate_chat(mut context: Context, raw_text: impl Into<String>) -> Self {
        context.insert("chat_mode".to_string(), Value::Bool(true));
        StageResult::EscalateChat {
            context,
            raw_text: Some(raw_text.into()),
        }
    }

    pub fn multi_command(
        commands: Vec<String>,
        context: Context,
        raw_text: impl Into<String>,
    ) -> Self {
        StageResult::MultiCommand {
            commands,
            context,
            raw_text: Some(raw_text.into()),
        }
    }

    pub fn pending(data: PendingData, raw_text: impl Into<String>) -> Self {
        StageResult::Pending {
            data,
            raw_text: Some(raw_text.into()),
        }
    }

    pub fn error(response: SpokenReply) -> Self {
        StageResult::Error {
            response,
            raw_text: None,
        }
    }

    /// The context carried by this result, if the variant has one.
    pub fn context(&self) -> Option<&Context> {
        match self {
            StageResult::Success { context, .. }
            | StageResult::Escalate { context, .. }
            | StageResult::EscalateChat { context, .. }
            | StageResult::MultiCommand { context, .. } => Some(context),
            _ => None,
        }
    }
}

/// Merge `overlay` into `base`, overlay keys winning.
pub fn merge_context(base: &Context, overlay: &Context) -> Context {
    let mut merged = base.clone();
    for (k, v) in overlay {
        merged.insert(k.clone(), v.clone());
    }
    merged
}
