//! Per-conversation chat history for the cloud stage's chat mode.

use dashmap::DashMap;
use heim_agent_config::constants::stages::CHAT_HISTORY_WORD_BUDGET;
use heim_agent_llm::{ChatRole, ChatTurn};

/// Bounded chat history, oldest turns trimmed once the word budget is
/// exceeded.
#[derive(Default)]
pub struct ChatHistory {
    sessions: DashMap<String, Vec<ChatTurn>>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, conversation_id: &str) -> Vec<ChatTurn> {
        self.sessions
            .get(conversation_id)
            .map(|turns| turns.clone())
            .unwrap_or_default()
    }

    pub fn record(&self, conversation_id: &str, user: &str, assistant: &str) {
        let mut entry = self.sessions.entry(conversation_id.to_string()).or_default();
        entry.push(ChatTurn {
            role: ChatRole::User,
            content: user.to_string(),
        });
        entry.push(ChatTurn {
            role: ChatRole::Assistant,
            content: assistant.to_string(),
        });
        Self::trim(&mut entry);
    }

    pub fn clear(&self, conversation_id: &str) {
        self.sessions.remove(conversation_id);
    }

    fn trim(turns: &mut Vec<ChatTurn>) {
        let mut word_count: usize = turns.iter().map(|t| t.content.split_whitespace().count()).sum();
        while word_count > CHAT_HISTORY_WORD_BUDGET && !turns.is_empty() {
            let removed = turns.remove(0);
            word_count -= removed.content.split_whitespace().count();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_get() {
        let history = ChatHistory::new();
        history.record("c1", "Hallo", "Hi, wie kann ich helfen?");
        let turns = history.get("c1");
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, ChatRole::User);
        // Conversations are isolated.
        assert!(history.get("c2").is_empty());
    }

    #[test]
    fn test_trims_oldest_beyond_budget() {
        let history = ChatHistory::new();
        let long = "wort ".repeat(200);
        history.record("c1", &long, &long);
        history.record("c1", &long, "kurz");
        let turns = history.get("c1");
        let words: usize = turns.iter().map(|t| t.content.split_whitespace().count()).sum();
        assert!(words <= CHAT_HISTORY_WORD_BUDGET);
        // The newest turn survives.
        assert_eq!(turns.last().unwrap().content, "kurz");
    }
}
