//! German duration and delay parsing.

use once_cell::sync::Lazy;
use regex::Regex;

static HOURS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*(h|std|stunden?)").unwrap());
static MINUTES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*(m|min|minuten?)").unwrap());
static SECONDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*(s|sec|sek|sekunden?)").unwrap());
static CLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,2}):(\d{2})$").unwrap());

/// Parse a German duration expression to seconds.
///
/// Accepts "5 Minuten", "2 Stunden", "90 Sekunden", combinations thereof,
/// "M:SS", and bare digits (interpreted as seconds).
pub fn parse_duration_secs(text: &str) -> Option<u64> {
    let trimmed = text.trim().to_lowercase();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(secs) = trimmed.parse::<u64>() {
        return if secs > 0 { Some(secs) } else { None };
    }

    if let Some(caps) = CLOCK.captures(&trimmed) {
        let minutes: u64 = caps[1].parse().ok()?;
        let seconds: u64 = caps[2].parse().ok()?;
        let total = minutes * 60 + seconds;
        return if total > 0 { Some(total) } else { None };
    }

    let mut total: u64 = 0;
    if let Some(caps) = HOURS.captures(&trimmed) {
        total += caps[1].parse::<u64>().ok()? * 3600;
    }
    if let Some(caps) = MINUTES.captures(&trimmed) {
        total += caps[1].parse::<u64>().ok()? * 60;
    }
    if let Some(caps) = SECONDS.captures(&trimmed) {
        total += caps[1].parse::<u64>().ok()?;
    }
    if total > 0 {
        Some(total)
    } else {
        None
    }
}

/// Spoken form of a duration.
pub fn format_seconds_de(seconds: u64) -> String {
    if seconds >= 3600 {
        let hours = seconds as f64 / 3600.0;
        if (hours - hours.round()).abs() < f64::EPSILON {
            format!("{} Stunden", hours as u64)
        } else {
            format!("{:.1} Stunden", hours).replace('.', ",")
        }
    } else if seconds >= 60 {
        format!("{} Minuten", seconds / 60)
    } else {
        format!("{} Sekunden", seconds)
    }
}

/// A delayed execution specification extracted from an utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelaySpec {
    /// "in 10 Minuten": execute after the delay.
    After(u64),
    /// "um 15:30 Uhr": execute at the given wall-clock time.
    At(String),
}

static DELAY_IN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bin\s+(\d+)\s+(minuten?|stunden?|sekunden?)\b").unwrap());
static DELAY_AT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bum\s+(\d{1,2}(?::\d{2})?)\s*uhr\b").unwrap());
static DURATION_FOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bfür\s+(\d+)\s+(minuten?|stunden?|sekunden?)\b").unwrap());

fn unit_secs(value: u64, unit: &str) -> u64 {
    let unit_lower = unit.to_lowercase();
    if unit_lower.starts_with("stunde") {
        value * 3600
    } else if unit_lower.starts_with("minute") {
        value * 60
    } else {
        value
    }
}

/// Detect a delayed-control fragment ("in 10 Minuten", "um 15:30 Uhr").
///
/// Commands carrying one are never cacheable; the delay would be replayed
/// against a different clock.
pub fn extract_delay(text: &str) -> Option<DelaySpec> {
    if let Some(caps) = DELAY_IN.captures(text) {
        let value: u64 = caps[1].parse().ok()?;
        return Some(DelaySpec::After(unit_secs(value, &caps[2])));
    }
    if let Some(caps) = DELAY_AT.captures(text) {
        return Some(DelaySpec::At(caps[1].to_string()));
    }
    None
}

/// Detect a temporary-control duration ("für 10 Minuten") in seconds.
pub fn extract_duration_secs(text: &str) -> Option<u64> {
    let caps = DURATION_FOR.captures(text)?;
    let value: u64 = caps[1].parse().ok()?;
    Some(unit_secs(value, &caps[2]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration_secs("5 Minuten"), Some(300));
        assert_eq!(parse_duration_secs("2 Stunden"), Some(7200));
        assert_eq!(parse_duration_secs("1 Stunde 30 Minuten"), Some(5400));
        assert_eq!(parse_duration_secs("90"), Some(90));
        assert_eq!(parse_duration_secs("1:30"), Some(90));
        assert_eq!(parse_duration_secs("gleich"), None);
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds_de(300), "5 Minuten");
        assert_eq!(format_seconds_de(45), "45 Sekunden");
        assert_eq!(format_seconds_de(7200), "2 Stunden");
        assert_eq!(format_seconds_de(5400), "1,5 Stunden");
    }

    #[test]
    fn test_extract_delay() {
        assert_eq!(
            extract_delay("Schalte das Licht in 10 Minuten aus"),
            Some(DelaySpec::After(600))
        );
        assert_eq!(
            extract_delay("Mach das Licht um 15:30 Uhr an"),
            Some(DelaySpec::At("15:30".to_string()))
        );
        assert_eq!(extract_delay("Schalte das Licht aus"), None);
    }

    #[test]
    fn test_extract_duration() {
        assert_eq!(
            extract_duration_secs("Schalte das Licht für 10 Minuten an"),
            Some(600)
        );
        assert_eq!(extract_duration_secs("Licht an"), None);
    }
}
