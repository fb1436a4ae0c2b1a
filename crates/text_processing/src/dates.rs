//! German weekday and relative date handling.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

const WEEKDAYS_DE: [(&str, u32); 7] = [
    ("montag", 0),
    ("dienstag", 1),
    ("mittwoch", 2),
    ("donnerstag", 3),
    ("freitag", 4),
    ("samstag", 5),
    ("sonntag", 6),
];

const WEEKDAY_NAMES: [&str; 7] = [
    "Montag",
    "Dienstag",
    "Mittwoch",
    "Donnerstag",
    "Freitag",
    "Samstag",
    "Sonntag",
];

/// Relative day terms, longest first so "übermorgen" wins over "morgen".
const RELATIVE_DATES: [(&str, i64); 3] = [("übermorgen", 2), ("morgen", 1), ("heute", 0)];

/// Parse a German weekday name to 0=Monday .. 6=Sunday.
pub fn parse_weekday(text: &str) -> Option<u32> {
    let lower = text.to_lowercase();
    WEEKDAYS_DE
        .iter()
        .find(|(name, _)| lower.contains(name))
        .map(|(_, num)| *num)
}

pub fn weekday_name(weekday: u32) -> &'static str {
    WEEKDAY_NAMES[(weekday % 7) as usize]
}

/// Next occurrence of `weekday` strictly after `from`.
pub fn next_weekday(weekday: u32, from: NaiveDate) -> NaiveDate {
    let current = from.weekday().num_days_from_monday();
    let mut ahead = weekday as i64 - current as i64;
    if ahead <= 0 {
        ahead += 7;
    }
    from + Duration::days(ahead)
}

static IN_DAYS: Lazy<Regex> = Lazy::new(|| Regex::new(r"in\s+(\d+)\s+tag").unwrap());
static BARE_DAYS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\s+tag").unwrap());
static NUMBER_WORDS: [(&str, i64); 10] = [
    ("einem", 1),
    ("zwei", 2),
    ("drei", 3),
    ("vier", 4),
    ("fünf", 5),
    ("sechs", 6),
    ("sieben", 7),
    ("acht", 8),
    ("neun", 9),
    ("zehn", 10),
];

/// Resolve German relative date expressions against a reference date.
///
/// Supports heute/morgen/übermorgen, "in X Tagen" (numeric or spelled out),
/// "X Tage", and weekday names ("nächsten Montag", "am Dienstag").
pub fn parse_relative_date(text: &str, from: NaiveDate) -> Option<NaiveDate> {
    let lower = text.to_lowercase();
    let trimmed = lower.trim();

    for (term, offset) in RELATIVE_DATES {
        if trimmed.contains(term) {
            return Some(from + Duration::days(offset));
        }
    }

    if let Some(caps) = IN_DAYS.captures(trimmed) {
        let days: i64 = caps[1].parse().ok()?;
        return Some(from + Duration::days(days));
    }

    if trimmed.contains("tag") {
        for (word, days) in NUMBER_WORDS {
            if trimmed.contains(&format!("in {word} tag")) {
                return Some(from + Duration::days(days));
            }
        }
    }

    if let Some(caps) = BARE_DAYS.captures(trimmed) {
        let days: i64 = caps[1].parse().ok()?;
        return Some(from + Duration::days(days));
    }

    parse_weekday(trimmed).map(|weekday| next_weekday(weekday, from))
}

/// Resolve a possibly-relative date string to YYYY-MM-DD; returns the input
/// unchanged if already formatted or not parseable.
pub fn resolve_relative_date_str(value: &str, from: NaiveDate) -> String {
    static ISO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
    if value.is_empty() || ISO_DATE.is_match(value) {
        return value.to_string();
    }
    match parse_relative_date(value, from) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => value.to_string(),
    }
}

/// German date formatting: "DD.MM.YYYY".
pub fn format_date_german(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}

/// German datetime formatting: "DD.MM.YYYY um HH:MM Uhr".
pub fn format_datetime_german(datetime: NaiveDateTime) -> String {
    datetime.format("%d.%m.%Y um %H:%M Uhr").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn wednesday() -> NaiveDate {
        // 2024-12-11 is a Wednesday
        NaiveDate::from_ymd_opt(2024, 12, 11).unwrap()
    }

    #[test]
    fn test_parse_weekday() {
        assert_eq!(parse_weekday("montag"), Some(0));
        assert_eq!(parse_weekday("am Sonntag"), Some(6));
        assert_eq!(parse_weekday("irgendwann"), None);
    }

    #[test]
    fn test_next_weekday_is_strictly_future() {
        let from = wednesday();
        let next_monday = next_weekday(0, from);
        assert_eq!(next_monday, NaiveDate::from_ymd_opt(2024, 12, 16).unwrap());
        // Same weekday jumps a full week ahead.
        let next_wednesday = next_weekday(2, from);
        assert_eq!(next_wednesday, NaiveDate::from_ymd_opt(2024, 12, 18).unwrap());
    }

    #[test]
    fn test_relative_terms() {
        let from = wednesday();
        assert_eq!(
            parse_relative_date("morgen", from),
            Some(NaiveDate::from_ymd_opt(2024, 12, 12).unwrap())
        );
        assert_eq!(
            parse_relative_date("übermorgen", from),
            Some(NaiveDate::from_ymd_opt(2024, 12, 13).unwrap())
        );
        assert_eq!(
            parse_relative_date("in 5 Tagen", from),
            Some(NaiveDate::from_ymd_opt(2024, 12, 16).unwrap())
        );
        assert_eq!(
            parse_relative_date("in drei tagen", from),
            Some(NaiveDate::from_ymd_opt(2024, 12, 14).unwrap())
        );
    }

    #[test]
    fn test_resolve_relative_date_str() {
        let from = wednesday();
        assert_eq!(resolve_relative_date_str("morgen", from), "2024-12-12");
        assert_eq!(resolve_relative_date_str("2024-12-25", from), "2024-12-25");
        assert_eq!(resolve_relative_date_str("kein datum", from), "kein datum");
    }

    #[test]
    fn test_format_german() {
        assert_eq!(format_date_german(wednesday()), "11.12.2024");
    }
}
