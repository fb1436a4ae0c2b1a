//! Conversation front-end: one entry point per utterance.

use crate::orchestrator::Orchestrator;
use crate::services::Services;
use heim_agent_cache::AnchorBuilder;
use heim_agent_core::{SpokenReply, Utterance};
use heim_agent_text_processing::normalize_speech_for_tts;
use std::sync::Arc;

/// The conversation agent the host platform talks to.
pub struct ConversationAgent {
    services: Services,
    orchestrator: Arc<Orchestrator>,
}

impl ConversationAgent {
    pub fn new(services: Services) -> Self {
        Self {
            orchestrator: Arc::new(Orchestrator::new(services.clone())),
            services,
        }
    }

    /// Startup work: load the user cache and seed anchors, rebuilding them
    /// when the registry diverged from the cached snapshot.
    pub async fn startup(&self) -> heim_agent_core::Result<()> {
        self.services
            .cache
            .load()
            .await
            .map_err(heim_agent_core::Error::from)?;
        let anchor_path = self.services.settings.storage_dir.join("anchors.json");
        let builder = AnchorBuilder::new(self.services.embedder.clone(), anchor_path);
        let anchors = builder
            .load_or_build(self.services.home.as_ref())
            .await
            .map_err(heim_agent_core::Error::from)?;
        self.services.cache.seed_anchors(anchors);
        Ok(())
    }

    /// Handle one utterance and return a TTS-safe spoken reply.
    pub async fn handle(&self, utterance: &Utterance) -> SpokenReply {
        tracing::info!(
            conversation = %utterance.conversation_id,
            text = %utterance.text,
            "received utterance"
        );
        let mut reply = self.orchestrator.handle(utterance).await;
        reply.speech = normalize_speech_for_tts(&reply.speech);
        reply
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }
}
