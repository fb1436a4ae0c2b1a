//! German text utilities
//!
//! Canonicalization, article/case handling, date and duration parsing,
//! numeric normalization for cache keys, TTS normalization, and bounded
//! fuzzy matching. Everything here is pure and synchronous.

pub mod dates;
pub mod duration;
pub mod fuzzy;
pub mod german;
pub mod normalize;

pub use dates::{
    format_date_german, format_datetime_german, next_weekday, parse_relative_date, parse_weekday,
    resolve_relative_date_str, weekday_name,
};
pub use duration::{
    extract_delay, extract_duration_secs, format_seconds_de, parse_duration_secs, DelaySpec,
};
pub use fuzzy::{fuzzy_match_distance, levenshtein, ratio, token_set_ratio};
pub use german::{
    canonicalize, capitalize_article_phrase, is_affirmative, is_negative,
    nominative_to_accusative, nominative_to_dative, remove_articles,
    remove_articles_and_prepositions, remove_prepositions,
};
pub use normalize::{join_names, normalize_for_cache, normalize_speech_for_tts, NormalizedText};
