//! One user input turn.

/// A single utterance from the user, immutable within a request.
#[derive(Debug, Clone)]
pub struct Utterance {
    /// Raw spoken/typed text.
    pub text: String,
    /// Conversation this turn belongs to; pending state is keyed by it.
    pub conversation_id: String,
    /// Device that captured the utterance, if known.
    pub device_id: Option<String>,
    /// BCP-47 language tag, defaults to "de".
    pub language: String,
}

impl Utterance {
    pub fn new(text: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            conversation_id: conversation_id.into(),
            device_id: None,
            language: "de".to_string(),
        }
    }

    /// Clone this utterance with different text but identical metadata.
    ///
    /// Used when clarification rewrites or splits a command.
    pub fn with_text(&self, new_text: impl Into<String>) -> Self {
        Self {
            text: new_text.into(),
            conversation_id: self.conversation_id.clone(),
            device_id: self.device_id.clone(),
            language: self.language.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_text_keeps_metadata() {
        let mut u = Utterance::new("Licht an", "conv-1");
        u.device_id = Some("satellite.kueche".into());

        let clone = u.with_text("Schalte das Licht an");
        assert_eq!(clone.text, "Schalte das Licht an");
        assert_eq!(clone.conversation_id, "conv-1");
        assert_eq!(clone.device_id.as_deref(), Some("satellite.kueche"));
        assert_eq!(clone.language, "de");
    }
}
