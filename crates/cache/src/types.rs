//! Cache entry and snapshot types.

use heim_agent_core::Slots;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A cached command resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    /// Normalized command text.
    pub text: String,
    /// Embedding of `text`.
    pub embedding: Vec<f32>,
    /// Resolved intent.
    pub intent: String,
    /// Resolved entity ids.
    pub entity_ids: Vec<String>,
    /// Resolved slots.
    pub slots: Slots,
    /// True if the user had to choose between candidates.
    pub required_disambiguation: bool,
    /// Options offered if disambiguation happened (entity_id → name).
    pub disambiguation_options: Option<BTreeMap<String, String>>,
    /// Times this entry was reused.
    pub hits: u64,
    /// ISO-8601 timestamp (second precision) of the last hit, empty if never.
    pub last_hit: String,
    /// True if execution was verified successful.
    pub verified: bool,
    /// True for pre-seeded anchors, false for user-learned entries.
    #[serde(default)]
    pub generated: bool,
}

impl CacheEntry {
    /// Domain this entry belongs to, if its slots carry one.
    pub fn domain(&self) -> Option<&str> {
        self.slots.get("domain").and_then(|v| v.as_str())
    }
}

/// Lookup hit handed back to the cache stage.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub intent: String,
    pub entity_ids: Vec<String>,
    pub slots: Slots,
    /// Final gate score of the winning candidate.
    pub score: f64,
    pub required_disambiguation: bool,
    pub disambiguation_options: Option<BTreeMap<String, String>>,
    /// Stored text of the matching entry.
    pub matched_text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheStats {
    pub total_lookups: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.total_lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.total_lookups as f64 * 100.0
        }
    }
}

/// On-disk layout of the user cache (`semantic_cache.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCacheSnapshot {
    pub version: u32,
    pub entries: Vec<CacheEntry>,
    pub stats: CacheStats,
}

pub const USER_CACHE_VERSION: u32 = 1;

/// On-disk layout of the anchor cache (`anchors.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorSnapshot {
    pub version: u32,
    /// Hash of the registry contents the anchors were generated from; a
    /// divergent registry forces a rebuild.
    pub registry_fingerprint: String,
    pub anchors: Vec<CacheEntry>,
}

pub const ANCHOR_VERSION: u32 = 2;
