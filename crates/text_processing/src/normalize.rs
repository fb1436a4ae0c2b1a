//! Numeric normalization for cache keys and TTS speech normalization.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Result of numeric normalization: the canonical text plus the raw values
/// that were replaced, in match order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    pub text: String,
    pub extracted: Vec<String>,
}

static PERCENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*(?:%|prozent|Prozent)").unwrap());
static TEMPERATURE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*(?:grad|Grad)").unwrap());
static DELAY_IN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bin\s+(\d+|eine[rn]?)\s+(Minuten?|Stunden?|Sekunden?)\b").unwrap());
static TIME_AT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bum\s+(\d{1,2}(?::\d{2})?)\s*Uhr\b").unwrap());
static DURATION_FOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bfür\s+(\d+|eine[rn]?)\s+(Minuten?|Stunden?|Sekunden?)\b").unwrap());
static TIMER_ON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bauf\s+(\d+|eine[rn]?)\s+(Minuten?|Stunden?|Sekunden?)\b").unwrap());

/// Normalize numeric values so that variants of the same command share one
/// cache fingerprint:
///
/// - percentages → "50 Prozent"
/// - temperatures → "20 Grad"
/// - "in 3 Minuten" → "in Minuten" (delay stripped)
/// - "um 15:30 Uhr" → "um Uhr" (time stripped)
/// - "für 5 Minuten" / "auf 5 Minuten" → "für Minuten" / "auf Minuten"
///
/// The replaced raw values are returned alongside so callers can still act
/// on the concrete number.
pub fn normalize_for_cache(text: &str) -> NormalizedText {
    let mut extracted: Vec<String> = Vec::new();

    let mut capture = |caps: &Captures, replacement: String| -> String {
        extracted.push(caps[1].to_string());
        replacement
    };

    let step = PERCENT.replace_all(text, |caps: &Captures| capture(caps, "50 Prozent".into()));
    let step = TEMPERATURE.replace_all(&step, |caps: &Captures| capture(caps, "20 Grad".into()));
    let step = DELAY_IN.replace_all(&step, |caps: &Captures| {
        let unit = caps[2].to_string();
        capture(caps, format!("in {unit}"))
    });
    let step = TIME_AT.replace_all(&step, |caps: &Captures| capture(caps, "um Uhr".into()));
    let step = DURATION_FOR.replace_all(&step, |caps: &Captures| {
        let unit = caps[2].to_string();
        capture(caps, format!("für {unit}"))
    });
    let step = TIMER_ON.replace_all(&step, |caps: &Captures| {
        let unit = caps[2].to_string();
        capture(caps, format!("auf {unit}"))
    });

    NormalizedText {
        text: step.into_owned(),
        extracted,
    }
}

static DECIMAL_DOT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\.(\d+)").unwrap());

/// Unit symbols expanded to spoken German, longest symbols first so "kWh"
/// is not eaten by "kW" or "W". Symbols are only replaced at word ends, so
/// the "V" in "Volumen" survives.
static UNIT_WORDS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        ("°C", " Grad Celsius"),
        ("°", " Grad"),
        ("%", " Prozent"),
        ("kWh", " Kilowattstunden"),
        ("kW", " Kilowatt"),
        ("W", " Watt"),
        ("V", " Volt"),
        ("A", " Ampere"),
        ("lx", " Lux"),
        ("lm", " Lumen"),
    ]
    .into_iter()
    .map(|(symbol, spoken)| {
        let pattern = format!(r"{}(?:$|(?P<tail>\s|[.,!?]))", regex::escape(symbol));
        (Regex::new(&pattern).unwrap(), spoken)
    })
    .collect()
});

/// Normalize text for German TTS: decimal dots become commas and unit
/// symbols become spoken words ("21.5°C" → "21,5 Grad Celsius").
pub fn normalize_speech_for_tts(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let mut out = DECIMAL_DOT.replace_all(text, "$1,$2").into_owned();
    for (re, spoken) in UNIT_WORDS.iter() {
        out = re
            .replace_all(&out, |caps: &Captures| {
                let tail = caps.name("tail").map(|m| m.as_str()).unwrap_or("");
                format!("{spoken}{tail}")
            })
            .into_owned();
    }
    out.trim().to_string()
}

/// Join names the way a German sentence would: "A", "A und B",
/// "A, B und C".
pub fn join_names(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [single] => single.clone(),
        [init @ .., last] => format!(
            "{} und {}",
            init.iter().map(String::as_str).collect::<Vec<_>>().join(", "),
            last
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_percentages_share_fingerprint() {
        let a = normalize_for_cache("Dimme das Licht auf 30%");
        let b = normalize_for_cache("Dimme das Licht auf 40 Prozent");
        assert_eq!(a.text, b.text);
        assert_eq!(a.text, "Dimme das Licht auf 50 Prozent");
        assert_eq!(a.extracted, vec!["30".to_string()]);
    }

    #[test]
    fn test_temperature_normalization() {
        let a = normalize_for_cache("Heizung auf 22 Grad");
        let b = normalize_for_cache("Heizung auf 19 Grad");
        assert_eq!(a.text, b.text);
        assert_eq!(a.text, "Heizung auf 20 Grad");
    }

    #[test]
    fn test_delay_and_time_stripped() {
        assert_eq!(
            normalize_for_cache("Schalte das Licht in 3 Minuten aus").text,
            "Schalte das Licht in Minuten aus"
        );
        assert_eq!(
            normalize_for_cache("Mach das Licht um 15:30 Uhr an").text,
            "Mach das Licht um Uhr an"
        );
        assert_eq!(
            normalize_for_cache("Licht für 5 Minuten an").text,
            "Licht für Minuten an"
        );
    }

    #[test]
    fn test_tts_normalization() {
        assert_eq!(
            normalize_speech_for_tts("Wohnzimmer ist 21.5 °C"),
            "Wohnzimmer ist 21,5 Grad Celsius"
        );
        assert_eq!(
            normalize_speech_for_tts("Verbrauch: 3.5 kWh"),
            "Verbrauch: 3,5 Kilowattstunden"
        );
        // "V" inside a word must survive.
        assert_eq!(normalize_speech_for_tts("Volumen hoch"), "Volumen hoch");
    }

    #[test]
    fn test_join_names() {
        assert_eq!(join_names(&[]), "");
        assert_eq!(join_names(&["Küche".to_string()]), "Küche");
        assert_eq!(
            join_names(&["Küche".to_string(), "Büro".to_string()]),
            "Küche und Büro"
        );
        assert_eq!(
            join_names(&[
                "Küche".to_string(),
                "Büro".to_string(),
                "Bad".to_string()
            ]),
            "Küche, Büro und Bad"
        );
    }
}
