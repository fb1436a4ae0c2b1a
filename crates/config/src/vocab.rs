//! German keyword vocabulary shared across resolvers and stages.

use crate::domain::all_domains;
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

/// Words that widen the scope to the whole installation.
pub static GLOBAL_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "haus",
        "wohnung",
        "daheim",
        "zuhause",
        "überall",
        "alles",
        "ganze haus",
        "ganzes haus",
        "alle bereiche",
        "alle räume",
    ]
    .into_iter()
    .collect()
});

/// Selection keywords for disambiguation answers.
pub static ALL_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["alle", "alles", "beide", "beiden", "beides"].into_iter().collect()
});

pub static NONE_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["keine", "keines", "keinen", "nichts", "nein", "nee", "keins"]
        .into_iter()
        .collect()
});

/// Plural cues that make disambiguation unnecessary.
pub static PLURAL_CUES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "alle",
        "sämtliche",
        "mehrere",
        "beide",
        "beiden",
        "viele",
        "verschiedene",
        "ganze",
        "gesamte",
    ]
    .into_iter()
    .collect()
});

/// German ordinal words to 1-based index; -1 means "last".
/// Covers all gender/case endings (erste/ersten/erstes/erster).
pub static ORDINAL_MAP: Lazy<HashMap<String, i32>> = Lazy::new(|| {
    let mut map = HashMap::new();
    let words: [(&str, i32); 11] = [
        ("erste", 1),
        ("zweite", 2),
        ("dritte", 3),
        ("vierte", 4),
        ("fünfte", 5),
        ("sechste", 6),
        ("siebte", 7),
        ("achte", 8),
        ("neunte", 9),
        ("zehnte", 10),
        ("letzte", -1),
    ];
    for (stem, value) in words {
        for suffix in ["", "n", "s", "r"] {
            map.insert(format!("{stem}{suffix}"), value);
        }
    }
    map
});

/// Singular → plural device noun pairs across all domains, used by plural
/// detection ("die lichter" in the text is a plural reference).
pub static ENTITY_PLURALS: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    let mut pairs: Vec<(&'static str, &'static str)> = Vec::new();
    for config in all_domains() {
        pairs.extend_from_slice(config.keyword_pairs);
    }
    pairs.extend_from_slice(&[
        ("das fenster", "die fenster"),
        ("die tür", "die türen"),
        ("das tor", "die tore"),
        ("das gerät", "die geräte"),
    ]);
    pairs
});

/// Purely generic device nouns. A name slot holding one of these, with no
/// area and no plural/global cue, must not resolve to anything — otherwise
/// "Schalte die Spots an" would address every spot in the home.
pub static GENERIC_NAMES: Lazy<HashSet<String>> = Lazy::new(|| {
    let mut names: HashSet<String> = HashSet::new();
    for config in all_domains() {
        if matches!(config.domain, "timer" | "calendar" | "automation" | "vacuum") {
            continue;
        }
        for (singular, plural) in config.keyword_pairs {
            if let Some(noun) = singular.split_whitespace().last() {
                names.insert(noun.to_string());
            }
            if let Some(noun) = plural.split_whitespace().last() {
                names.insert(noun.to_string());
            }
        }
    }
    for extra in ["gerät", "geräte", "ding", "alles", "alle", "etwas"] {
        names.insert(extra.to_string());
    }
    names
});

/// German floor abbreviations and synonyms (canonicalized keys).
pub static FLOOR_ALIASES: Lazy<HashMap<&'static str, &'static [&'static str]>> =
    Lazy::new(|| {
        let mut map: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
        map.insert("eg", &["erdgeschoss", "ground floor", "parterre"]);
        map.insert("erdgeschoss", &["eg", "ground floor", "parterre", "unten"]);
        map.insert("og", &["obergeschoss", "first floor", "oben"]);
        map.insert("obergeschoss", &["og", "first floor", "oben", "1og", "1. og"]);
        map.insert("ug", &["untergeschoss", "basement", "keller"]);
        map.insert("untergeschoss", &["ug", "basement", "keller"]);
        map.insert("keller", &["ug", "untergeschoss", "basement"]);
        map.insert("dg", &["dachgeschoss", "attic"]);
        map.insert("dachgeschoss", &["dg", "attic", "dach"]);
        map.insert("oben", &["obergeschoss", "og"]);
        map.insert("unten", &["erdgeschoss", "eg"]);
        map.insert("dach", &["dachgeschoss", "dg"]);
        map
    });

/// True if the text contains a keyword widening scope to the whole home.
pub fn has_global_keyword(text: &str) -> bool {
    let lower = text.to_lowercase();
    GLOBAL_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// True if the text carries an explicit plural or all-of-them cue.
pub fn has_plural_cue(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower
        .split_whitespace()
        .any(|w| PLURAL_CUES.contains(w.trim_matches(|c: char| !c.is_alphanumeric())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinal_variants() {
        assert_eq!(ORDINAL_MAP.get("erste"), Some(&1));
        assert_eq!(ORDINAL_MAP.get("ersten"), Some(&1));
        assert_eq!(ORDINAL_MAP.get("zweiter"), Some(&2));
        assert_eq!(ORDINAL_MAP.get("letzte"), Some(&-1));
        assert_eq!(ORDINAL_MAP.get("nullte"), None);
    }

    #[test]
    fn test_generic_names() {
        assert!(GENERIC_NAMES.contains("licht"));
        assert!(GENERIC_NAMES.contains("spots"));
        assert!(GENERIC_NAMES.contains("rollladen"));
        assert!(!GENERIC_NAMES.contains("spiegellicht"));
    }

    #[test]
    fn test_cues() {
        assert!(has_plural_cue("Schalte alle Lichter aus"));
        assert!(!has_plural_cue("Schalte das Licht aus"));
        assert!(has_global_keyword("Mach das ganze Haus dunkel"));
        assert!(!has_global_keyword("Mach die Küche dunkel"));
    }
}
