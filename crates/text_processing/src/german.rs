//! German articles, cases and canonicalization.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

pub static GERMAN_ARTICLES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "der", "die", "das", "den", "dem", "des", "ein", "eine", "einen", "einem", "einer",
        "eines",
    ]
    .into_iter()
    .collect()
});

pub static GERMAN_PREPOSITIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "im", "in", "auf", "unter", "über", "an", "am", "bei", "zum", "zur", "vom", "von", "für",
        "mit", "nach",
    ]
    .into_iter()
    .collect()
});

static AFFIRMATIVE_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "ja", "ok", "okay", "genau", "richtig", "passt", "korrekt", "stimmt", "gut", "jawohl",
        "jep", "jup", "sicher", "natürlich", "gerne", "bitte", "mach", "tu", "los",
    ]
    .into_iter()
    .collect()
});

static NEGATIVE_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "nein", "nicht", "abbrechen", "stop", "stopp", "falsch", "cancel", "weg", "vergiss",
        "lass", "ende", "beenden",
    ]
    .into_iter()
    .collect()
});

/// Convert a nominative article phrase to accusative case.
///
/// Only masculine articles change (der → den); neuter and feminine/plural
/// stay the same.
pub fn nominative_to_accusative(phrase: &str) -> String {
    let mut words: Vec<String> = phrase.split_whitespace().map(str::to_string).collect();
    if let Some(first) = words.first_mut() {
        if first.eq_ignore_ascii_case("der") {
            *first = if first.chars().next().is_some_and(char::is_lowercase) {
                "den".to_string()
            } else {
                "Den".to_string()
            };
        }
    }
    words.join(" ")
}

/// Convert a nominative article phrase to dative case.
///
/// der → dem, das → dem, die → der (feminine singular assumed; entity
/// patterns never use the plural "die" here).
pub fn nominative_to_dative(phrase: &str) -> String {
    let mut words: Vec<String> = phrase.split_whitespace().map(str::to_string).collect();
    if let Some(first) = words.first_mut() {
        let lower = first.to_lowercase();
        let dative = match lower.as_str() {
            "der" | "das" => Some("dem"),
            "die" => Some("der"),
            _ => None,
        };
        if let Some(dative) = dative {
            *first = if first.chars().next().is_some_and(char::is_lowercase) {
                dative.to_string()
            } else {
                let mut capitalized = dative.to_string();
                capitalized.replace_range(0..1, &dative[0..1].to_uppercase());
                capitalized
            };
        }
    }
    words.join(" ")
}

/// Capitalize an article+noun phrase: article keeps its case, nouns get
/// capitalized ("der rollladen" → "der Rollladen").
pub fn capitalize_article_phrase(phrase: &str) -> String {
    let words: Vec<&str> = phrase.split_whitespace().collect();
    if words.len() < 2 {
        return phrase.to_string();
    }
    let mut out = vec![words[0].to_string()];
    for word in &words[1..] {
        let mut chars = word.chars();
        match chars.next() {
            Some(first) => out.push(first.to_uppercase().chain(chars).collect()),
            None => out.push(String::new()),
        }
    }
    out.join(" ")
}

pub fn remove_articles(text: &str) -> String {
    text.split_whitespace()
        .filter(|w| !GERMAN_ARTICLES.contains(w.to_lowercase().as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn remove_prepositions(text: &str) -> String {
    text.split_whitespace()
        .filter(|w| !GERMAN_PREPOSITIONS.contains(w.to_lowercase().as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn remove_articles_and_prepositions(text: &str) -> String {
    text.split_whitespace()
        .filter(|w| {
            let lower = w.to_lowercase();
            !GERMAN_ARTICLES.contains(lower.as_str()) && !GERMAN_PREPOSITIONS.contains(lower.as_str())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]+").unwrap());
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Canonicalize text for fuzzy comparison: lowercase, umlauts folded
/// (ä→ae, ö→oe, ü→ue, ß→ss), punctuation stripped, whitespace collapsed.
///
/// Idempotent: `canonicalize(canonicalize(x)) == canonicalize(x)`.
pub fn canonicalize(text: &str) -> String {
    let lower = text.to_lowercase();
    let folded = lower
        .replace('ä', "ae")
        .replace('ö', "oe")
        .replace('ü', "ue")
        .replace('ß', "ss");
    let stripped = NON_WORD.replace_all(&folded, " ");
    MULTI_SPACE.replace_all(&stripped, " ").trim().to_string()
}

pub fn is_affirmative(text: &str) -> bool {
    text.to_lowercase()
        .split_whitespace()
        .any(|w| AFFIRMATIVE_WORDS.contains(w.trim_matches(|c: char| !c.is_alphanumeric())))
}

pub fn is_negative(text: &str) -> bool {
    text.to_lowercase()
        .split_whitespace()
        .any(|w| NEGATIVE_WORDS.contains(w.trim_matches(|c: char| !c.is_alphanumeric())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_accusative_only_changes_masculine() {
        assert_eq!(nominative_to_accusative("der Rollladen"), "den Rollladen");
        assert_eq!(nominative_to_accusative("das Licht"), "das Licht");
        assert_eq!(nominative_to_accusative("die Lampe"), "die Lampe");
    }

    #[test]
    fn test_dative_conversion() {
        assert_eq!(nominative_to_dative("das Licht"), "dem Licht");
        assert_eq!(nominative_to_dative("der Rollladen"), "dem Rollladen");
        assert_eq!(nominative_to_dative("die Lampe"), "der Lampe");
    }

    #[test]
    fn test_capitalize_article_phrase() {
        assert_eq!(capitalize_article_phrase("der rollladen"), "der Rollladen");
        assert_eq!(capitalize_article_phrase("die rollläden"), "die Rollläden");
        assert_eq!(capitalize_article_phrase("licht"), "licht");
    }

    #[test]
    fn test_canonicalize() {
        assert_eq!(canonicalize("Küche"), "kueche");
        assert_eq!(canonicalize("Gäste-Bad"), "gaeste bad");
        assert_eq!(canonicalize("  Büro  "), "buero");
    }

    #[test]
    fn test_canonicalize_is_idempotent() {
        for input in ["Küche", "Gäste-Bad", "das Licht im Büro!", "Straße 12"] {
            let once = canonicalize(input);
            assert_eq!(canonicalize(&once), once);
        }
    }

    #[test]
    fn test_remove_articles() {
        assert_eq!(remove_articles("den Keller"), "Keller");
        assert_eq!(remove_articles("die Küche"), "Küche");
        assert_eq!(
            remove_articles_and_prepositions("im den Keller"),
            "Keller"
        );
    }

    #[test]
    fn test_affirmative_and_negative() {
        assert!(is_affirmative("ja"));
        assert!(is_affirmative("ok, machen wir"));
        assert!(!is_affirmative("auf keinen fall"));
        assert!(is_negative("nein"));
        assert!(is_negative("abbrechen bitte"));
        assert!(!is_negative("ja"));
    }
}
