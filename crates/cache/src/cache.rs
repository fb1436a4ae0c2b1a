//! The semantic cache proper: lookup, admission, retention, snapshots.

use crate::embeddings::Embedder;
use crate::hybrid::{ngram_overlap, HybridConfig};
use crate::reranker::Reranker;
use crate::types::{
    CacheEntry, CacheHit, CacheStats, UserCacheSnapshot, USER_CACHE_VERSION,
};
use crate::CacheError;
use heim_agent_config::constants::cache as cache_constants;
use heim_agent_config::settings::CacheSettings;
use heim_agent_core::{intent as intents, Slots};
use heim_agent_persistence::JsonStore;
use heim_agent_text_processing::normalize_for_cache;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub vector_threshold: f64,
    pub top_k: usize,
    /// Scalar fallback; per-domain thresholds win where present.
    pub reranker_threshold: f64,
    pub max_entries: usize,
    pub hybrid: Option<HybridConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            vector_threshold: cache_constants::DEFAULT_VECTOR_THRESHOLD,
            top_k: cache_constants::DEFAULT_VECTOR_TOP_K,
            reranker_threshold: cache_constants::DEFAULT_RERANKER_THRESHOLD,
            max_entries: cache_constants::DEFAULT_MAX_ENTRIES,
            hybrid: None,
        }
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            vector_threshold: settings.vector_search_threshold,
            top_k: settings.vector_search_top_k,
            reranker_threshold: settings.reranker_threshold,
            max_entries: settings.max_entries,
            hybrid: settings.hybrid_enabled.then_some(HybridConfig {
                alpha: settings.hybrid_alpha,
                ngram_size: settings.hybrid_ngram_size,
            }),
        }
    }
}

/// A resolution to admit after verified execution.
#[derive(Debug, Clone)]
pub struct StoreRequest {
    /// Raw utterance text (normalization happens inside).
    pub text: String,
    pub intent: String,
    pub entity_ids: Vec<String>,
    pub slots: Slots,
    pub required_disambiguation: bool,
    pub disambiguation_options: Option<BTreeMap<String, String>>,
    /// Only verified executions are admissible.
    pub verified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// Not admissible (unverified, non-repeatable, too short, compound, or
    /// a relative step command).
    Skipped,
    /// A near-duplicate existed; its bookkeeping was refreshed instead.
    Updated,
    Inserted,
}

struct CacheState {
    entries: Vec<CacheEntry>,
    /// L2-normalized embedding rows, parallel to `entries`.
    matrix: Arc<Vec<Vec<f32>>>,
    stats: CacheStats,
}

/// Semantic command cache.
///
/// All mutation goes through one lock; lookups hold it only long enough to
/// clone the matrix handle and candidate texts, the cosine scan runs on the
/// blocking pool.
pub struct SemanticCache {
    embedder: Arc<dyn Embedder>,
    reranker: Arc<dyn Reranker>,
    config: CacheConfig,
    store: JsonStore,
    state: Mutex<CacheState>,
}

fn l2_normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm <= f32::EPSILON {
        return vector.to_vec();
    }
    vector.iter().map(|x| x / norm).collect()
}

fn cosine_scores(matrix: &[Vec<f32>], query: &[f32]) -> Vec<f64> {
    matrix
        .iter()
        .map(|row| {
            row.iter()
                .zip(query.iter())
                .map(|(a, b)| (a * b) as f64)
                .sum()
        })
        .collect()
}

fn now_iso() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

impl SemanticCache {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn Reranker>,
        config: CacheConfig,
        snapshot_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            embedder,
            reranker,
            config,
            store: JsonStore::new(snapshot_path),
            state: Mutex::new(CacheState {
                entries: Vec::new(),
                matrix: Arc::new(Vec::new()),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Seed pre-generated anchors, placed ahead of user entries.
    pub fn seed_anchors(&self, anchors: Vec<CacheEntry>) {
        let mut state = self.state.lock();
        let user_entries: Vec<CacheEntry> =
            state.entries.drain(..).filter(|e| !e.generated).collect();
        state.entries = anchors;
        state.entries.extend(user_entries);
        Self::rebuild_matrix(&mut state);
        tracing::info!(total = state.entries.len(), "seeded cache anchors");
    }

    /// Load user-learned entries and stats from the snapshot file.
    pub async fn load(&self) -> Result<(), CacheError> {
        let Some(snapshot) = self.store.load::<UserCacheSnapshot>().await? else {
            return Ok(());
        };
        let mut state = self.state.lock();
        state.stats = snapshot.stats;
        state
            .entries
            .extend(snapshot.entries.into_iter().filter(|e| !e.generated));
        Self::rebuild_matrix(&mut state);
        tracing::info!(total = state.entries.len(), "loaded semantic cache");
        Ok(())
    }

    fn rebuild_matrix(state: &mut CacheState) {
        let rows: Vec<Vec<f32>> = state
            .entries
            .iter()
            .map(|e| l2_normalize(&e.embedding))
            .collect();
        state.matrix = Arc::new(rows);
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats.clone()
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        {
            let mut state = self.state.lock();
            state.entries.clear();
            state.matrix = Arc::new(Vec::new());
            state.stats = CacheStats::default();
        }
        self.persist().await
    }

    /// Find a cached resolution for a similar command.
    pub async fn lookup(&self, text: &str) -> Result<Option<CacheHit>, CacheError> {
        let normalized = normalize_for_cache(text).text;

        {
            let mut state = self.state.lock();
            state.stats.total_lookups += 1;
            if state.entries.is_empty() {
                state.stats.cache_misses += 1;
                return Ok(None);
            }
        }

        let query = self.embedder.embed(&normalized).await?;

        let (matrix, texts_domains) = {
            let state = self.state.lock();
            let meta: Vec<(String, Option<String>)> = state
                .entries
                .iter()
                .map(|e| (e.text.clone(), e.domain().map(str::to_string)))
                .collect();
            (Arc::clone(&state.matrix), meta)
        };

        let query_norm = l2_normalize(&query);
        let scores = tokio::task::spawn_blocking(move || cosine_scores(&matrix, &query_norm))
            .await
            .map_err(|e| CacheError::Task(e.to_string()))?;

        let mut candidates: Vec<(usize, f64)> = scores
            .iter()
            .enumerate()
            .filter(|(_, score)| **score >= self.config.vector_threshold)
            .map(|(idx, score)| (idx, *score))
            .collect();
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        candidates.truncate(self.config.top_k);

        if candidates.is_empty() {
            self.record_miss(&normalized, None);
            return Ok(None);
        }

        let documents: Vec<String> = candidates
            .iter()
            .map(|(idx, _)| texts_domains[*idx].0.clone())
            .collect();
        let rerank_scores = self.reranker.rerank(&normalized, &documents).await?;

        let mut best: Option<(usize, f64)> = None;
        for ((idx, _vector_score), rerank_score) in candidates.iter().zip(rerank_scores.iter()) {
            let final_score = match &self.config.hybrid {
                Some(hybrid) => hybrid.combine(
                    *rerank_score,
                    ngram_overlap(&normalized, &texts_domains[*idx].0, hybrid.ngram_size),
                ),
                None => *rerank_score,
            };
            if best.map(|(_, s)| final_score > s).unwrap_or(true) {
                best = Some((*idx, final_score));
            }
        }

        let Some((best_idx, best_score)) = best else {
            self.record_miss(&normalized, None);
            return Ok(None);
        };

        let domain = texts_domains[best_idx].1.as_deref();
        let threshold =
            cache_constants::reranker_threshold_for(domain, self.config.reranker_threshold);
        if best_score < threshold {
            self.record_miss(&normalized, Some((best_score, threshold)));
            return Ok(None);
        }

        let mut state = self.state.lock();
        state.stats.cache_hits += 1;
        let entry = &mut state.entries[best_idx];
        entry.hits += 1;
        entry.last_hit = now_iso();
        tracing::info!(
            score = best_score,
            text = %normalized,
            matched = %entry.text,
            intent = %entry.intent,
            "cache hit"
        );
        Ok(Some(CacheHit {
            intent: entry.intent.clone(),
            entity_ids: entry.entity_ids.clone(),
            slots: entry.slots.clone(),
            score: best_score,
            required_disambiguation: entry.required_disambiguation,
            disambiguation_options: entry.disambiguation_options.clone(),
            matched_text: entry.text.clone(),
        }))
    }

    fn record_miss(&self, text: &str, gate: Option<(f64, f64)>) {
        let mut state = self.state.lock();
        state.stats.cache_misses += 1;
        match gate {
            Some((score, threshold)) => tracing::debug!(
                score,
                threshold,
                text = %text,
                "cache miss: best candidate below rerank gate"
            ),
            None => tracing::debug!(text = %text, "cache miss: no vector candidates"),
        }
    }

    fn is_admissible(&self, request: &StoreRequest, normalized: &str) -> bool {
        if !request.verified {
            tracing::debug!("skipping cache store: unverified execution");
            return false;
        }
        if intents::is_non_repeatable(&request.intent) {
            tracing::debug!(intent = %request.intent, "skipping cache store: non-repeatable");
            return false;
        }
        // Relative steps must be recomputed on every replay; caching the
        // command would freeze the increment at one value.
        if matches!(
            request.slots.get("command").and_then(|v| v.as_str()),
            Some("step_up") | Some("step_down")
        ) {
            tracing::debug!("skipping cache store: relative step command");
            return false;
        }
        if cache_constants::is_compound(&request.text) {
            tracing::debug!("skipping cache store: compound command");
            return false;
        }
        if normalized.split_whitespace().count() < cache_constants::MIN_CACHE_WORDS {
            tracing::debug!(text = %normalized, "skipping cache store: too short");
            return false;
        }
        true
    }

    /// Admit a verified resolution. Near-duplicates update the existing
    /// entry; new fingerprints insert and may trigger LRU eviction of
    /// user-learned entries (anchors are never evicted).
    pub async fn store(&self, request: StoreRequest) -> Result<AdmissionOutcome, CacheError> {
        let normalized = normalize_for_cache(&request.text).text;
        if !self.is_admissible(&request, &normalized) {
            return Ok(AdmissionOutcome::Skipped);
        }

        let embedding = self.embedder.embed(&normalized).await?;
        let embedding_norm = l2_normalize(&embedding);

        let duplicate = {
            let state = self.state.lock();
            let scores = cosine_scores(&state.matrix, &embedding_norm);
            scores
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .filter(|(_, score)| **score >= cache_constants::DUPLICATE_SIMILARITY)
                .map(|(idx, _)| idx)
        };

        if let Some(idx) = duplicate {
            {
                let mut state = self.state.lock();
                let entry = &mut state.entries[idx];
                entry.hits += 1;
                entry.last_hit = now_iso();
                tracing::debug!(matched = %entry.text, "near-duplicate, refreshed existing entry");
            }
            self.persist().await?;
            return Ok(AdmissionOutcome::Updated);
        }

        {
            let mut state = self.state.lock();
            state.entries.push(CacheEntry {
                text: normalized.clone(),
                embedding,
                intent: request.intent.clone(),
                entity_ids: request.entity_ids.clone(),
                slots: request.slots.clone(),
                required_disambiguation: request.required_disambiguation,
                disambiguation_options: request.disambiguation_options.clone(),
                hits: 1,
                last_hit: now_iso(),
                verified: true,
                generated: false,
            });
            let mut rows = (*state.matrix).clone();
            rows.push(embedding_norm);
            state.matrix = Arc::new(rows);
            self.evict_if_needed(&mut state);
        }
        self.persist().await?;
        tracing::info!(text = %normalized, intent = %request.intent, "stored in semantic cache");
        Ok(AdmissionOutcome::Inserted)
    }

    /// Drop the least recently hit user entries above the budget.
    fn evict_if_needed(&self, state: &mut CacheState) {
        let user_count = state.entries.iter().filter(|e| !e.generated).count();
        if user_count <= self.config.max_entries {
            return;
        }

        let (anchors, mut users): (Vec<CacheEntry>, Vec<CacheEntry>) =
            state.entries.drain(..).partition(|e| e.generated);
        users.sort_by(|a, b| b.last_hit.cmp(&a.last_hit));
        let evicted = users.len() - self.config.max_entries;
        users.truncate(self.config.max_entries);

        state.entries = anchors;
        state.entries.extend(users);
        Self::rebuild_matrix(state);
        tracing::debug!(evicted, "evicted least recently used cache entries");
    }

    async fn persist(&self) -> Result<(), CacheError> {
        let snapshot = {
            let state = self.state.lock();
            UserCacheSnapshot {
                version: USER_CACHE_VERSION,
                entries: state
                    .entries
                    .iter()
                    .filter(|e| !e.generated)
                    .cloned()
                    .collect(),
                stats: state.stats.clone(),
            }
        };
        self.store.save(snapshot).await?;
        Ok(())
    }
}
