//! Shared service bundle handed to stages and the execution pipeline.

use heim_agent_cache::{Embedder, SemanticCache};
use heim_agent_config::Settings;
use heim_agent_core::HomePlatform;
use heim_agent_llm::{ChatLlm, JsonLlm};
use heim_agent_persistence::AliasStore;
use heim_agent_resolve::{
    AreaResolver, DisambiguationSelector, EntityResolver, KeywordIntentParser, PluralDetector,
};
use std::sync::Arc;

/// Everything a stage may need, wired once at startup. Cloning is cheap;
/// each field is shared.
#[derive(Clone)]
pub struct Services {
    pub home: Arc<dyn HomePlatform>,
    pub cache: Arc<SemanticCache>,
    /// Shared with the cache; the anchor builder embeds through it too.
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn JsonLlm>,
    /// Absent when no API key is configured; the cloud stage then always
    /// escalates.
    pub cloud: Option<Arc<dyn ChatLlm>>,
    pub aliases: Arc<AliasStore>,
    pub area_resolver: Arc<AreaResolver>,
    pub entity_resolver: Arc<EntityResolver>,
    pub intent_parser: Arc<KeywordIntentParser>,
    pub plural: Arc<PluralDetector>,
    pub selector: Arc<DisambiguationSelector>,
    pub settings: Arc<Settings>,
}

impl Services {
    /// Wire the standard service graph from its leaves.
    pub fn new(
        home: Arc<dyn HomePlatform>,
        cache: Arc<SemanticCache>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn JsonLlm>,
        cloud: Option<Arc<dyn ChatLlm>>,
        aliases: Arc<AliasStore>,
        settings: Arc<Settings>,
    ) -> Self {
        let area_resolver = Arc::new(AreaResolver::new(aliases.clone(), llm.clone()));
        let entity_resolver = Arc::new(EntityResolver::new(aliases.clone()));
        let intent_parser = Arc::new(KeywordIntentParser::new(llm.clone()));
        let plural = Arc::new(PluralDetector::new(llm.clone()));
        let selector = Arc::new(DisambiguationSelector::new(llm.clone()));
        Self {
            home,
            cache,
            embedder,
            llm,
            cloud,
            aliases,
            area_resolver,
            entity_resolver,
            intent_parser,
            plural,
            selector,
            settings,
        }
    }
}
