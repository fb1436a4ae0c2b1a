//! Deterministic fixtures for tests and local development.
//!
//! Remote services (embedding, reranker, LLMs) are replaced with
//! deterministic in-process stand-ins so the whole pipeline can run against
//! a [`SimHome`] without any network.

use crate::services::Services;
use async_trait::async_trait;
use heim_agent_cache::{
    ngram_overlap, CacheConfig, CacheError, Embedder, Reranker, SemanticCache,
};
use heim_agent_config::Settings;
use heim_agent_core::SimHome;
use heim_agent_llm::{ChatLlm, ChatTurn, JsonLlm, LlmError, Prompt};
use heim_agent_persistence::AliasStore;
use heim_agent_text_processing::canonicalize;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;

const BAG_DIM: usize = 64;

/// Hashed bag-of-words embedder: identical normalized texts embed
/// identically, shared words give partial cosine similarity.
pub struct BagEmbedder;

#[async_trait]
impl Embedder for BagEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CacheError> {
        let mut vector = vec![0.0f32; BAG_DIM];
        for word in canonicalize(text).split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            vector[(hasher.finish() % BAG_DIM as u64) as usize] += 1.0;
        }
        Ok(vector)
    }

    fn dim(&self) -> usize {
        BAG_DIM
    }
}

/// Reranker scoring by unigram overlap; an exact (canonicalized) match
/// scores 1.0.
pub struct OverlapReranker;

#[async_trait]
impl Reranker for OverlapReranker {
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f64>, CacheError> {
        Ok(documents
            .iter()
            .map(|doc| {
                if canonicalize(doc) == canonicalize(query) {
                    1.0
                } else {
                    ngram_overlap(query, doc, 1)
                }
            })
            .collect())
    }
}

/// Scripted JSON LLM: pops canned answers in order, `None` simulating a
/// schema violation; an exhausted script always misses.
pub struct ScriptedLlm {
    answers: Mutex<Vec<Option<Value>>>,
    calls: Mutex<u32>,
}

impl ScriptedLlm {
    pub fn new(answers: Vec<Option<Value>>) -> Self {
        Self {
            answers: Mutex::new(answers),
            calls: Mutex::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock()
    }
}

#[async_trait]
impl JsonLlm for ScriptedLlm {
    async fn prompt_json(
        &self,
        _prompt: &Prompt,
        _payload: &Value,
        _temperature: Option<f32>,
    ) -> Result<Option<Value>, LlmError> {
        *self.calls.lock() += 1;
        let mut answers = self.answers.lock();
        if answers.is_empty() {
            Ok(None)
        } else {
            Ok(answers.remove(0))
        }
    }
}

/// Scripted cloud chat; errors once the script runs out.
pub struct ScriptedChat {
    replies: Mutex<Vec<String>>,
}

impl ScriptedChat {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies),
        }
    }
}

#[async_trait]
impl ChatLlm for ScriptedChat {
    async fn chat(&self, _prompt: &str, _history: &[ChatTurn]) -> Result<String, LlmError> {
        let mut replies = self.replies.lock();
        if replies.is_empty() {
            Err(LlmError::Api("script exhausted".to_string()))
        } else {
            Ok(replies.remove(0))
        }
    }
}

/// Wire a full service bundle around a [`SimHome`], deterministic fakes for
/// everything remote. `llm_answers` scripts the local JSON LLM.
pub fn sim_services(
    home: Arc<SimHome>,
    storage_dir: &Path,
    llm_answers: Vec<Option<Value>>,
) -> Services {
    sim_services_with_cloud(home, storage_dir, llm_answers, None)
}

pub fn sim_services_with_cloud(
    home: Arc<SimHome>,
    storage_dir: &Path,
    llm_answers: Vec<Option<Value>>,
    cloud: Option<Arc<dyn ChatLlm>>,
) -> Services {
    let settings = Arc::new(Settings::default());
    let embedder: Arc<dyn Embedder> = Arc::new(BagEmbedder);
    let cache = Arc::new(SemanticCache::new(
        embedder.clone(),
        Arc::new(OverlapReranker),
        CacheConfig::from(&settings.cache),
        storage_dir.join("semantic_cache.json"),
    ));
    let aliases = Arc::new(AliasStore::new(storage_dir.join("memory.json")));
    Services::new(
        home,
        cache,
        embedder,
        Arc::new(ScriptedLlm::new(llm_answers)),
        cloud,
        aliases,
        settings,
    )
}
