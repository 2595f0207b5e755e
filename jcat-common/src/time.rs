//! Timestamp and date normalization
//!
//! Edge timestamps (position of a jingle inside a fabrica) arrive as
//! `HH:MM:SS`, `MM:SS` or plain seconds, either as strings or JSON numbers.
//! Fabrica dates arrive as ISO dates or date-times in a few spellings.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Parse an in-container timestamp into seconds
///
/// Accepts `HH:MM:SS`, `MM:SS` (each with optional fractional seconds),
/// integer or decimal seconds as a string, or a JSON number. Negative values
/// and out-of-range minute/second fields are rejected.
pub fn parse_timestamp_seconds(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|s| s.is_finite() && *s >= 0.0),
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

/// String form of [`parse_timestamp_seconds`]
pub fn parse_timestamp_str(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let parts: Vec<&str> = s.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [secs] => (0u64, 0u64, *secs),
        [mins, secs] => (0, parse_field(mins)?, *secs),
        [hours, mins, secs] => (parse_field(hours)?, parse_field(mins)?, *secs),
        _ => return None,
    };

    let secs: f64 = seconds.parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }

    if parts.len() > 1 {
        if secs >= 60.0 {
            return None;
        }
        if parts.len() == 3 && minutes >= 60 {
            return None;
        }
    }

    let whole = hours.checked_mul(3600)?.checked_add(minutes.checked_mul(60)?)?;
    Some(whole as f64 + secs)
}

fn parse_field(field: &str) -> Option<u64> {
    if field.is_empty() || !field.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

/// Parse a fabrica date into a comparable date-time
///
/// Accepts RFC 3339 (`2023-04-01T20:00:00Z`), `YYYY-MM-DD HH:MM:SS`,
/// `YYYY-MM-DDTHH:MM:SS` and plain `YYYY-MM-DD` (midnight).
pub fn parse_date(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// [`parse_date`] over a JSON property value
pub fn parse_date_value(value: &Value) -> Option<NaiveDateTime> {
    value.as_str().and_then(parse_date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01 00:00:00 UTC
    }

    #[test]
    fn test_hh_mm_ss() {
        assert_eq!(parse_timestamp_str("00:05:00"), Some(300.0));
        assert_eq!(parse_timestamp_str("00:02:30"), Some(150.0));
        assert_eq!(parse_timestamp_str("00:10:15"), Some(615.0));
        assert_eq!(parse_timestamp_str("1:00:00"), Some(3600.0));
        assert_eq!(parse_timestamp_str("02:03:04.5"), Some(7384.5));
    }

    #[test]
    fn test_overflowing_hours_are_unparsed() {
        assert_eq!(parse_timestamp_str("5124095576030432:00:00"), None);
        assert_eq!(parse_timestamp_str("99999999999999999999:00:00"), None);
        assert_eq!(parse_timestamp_str("307445734561825861:00"), None);
    }

    #[test]
    fn test_mm_ss() {
        assert_eq!(parse_timestamp_str("5:30"), Some(330.0));
        assert_eq!(parse_timestamp_str("90:00"), Some(5400.0));
    }

    #[test]
    fn test_plain_seconds() {
        assert_eq!(parse_timestamp_str("42"), Some(42.0));
        assert_eq!(parse_timestamp_str(" 12.25 "), Some(12.25));
        assert_eq!(parse_timestamp_seconds(&json!(615)), Some(615.0));
        assert_eq!(parse_timestamp_seconds(&json!(1.5)), Some(1.5));
    }

    #[test]
    fn test_rejects_malformed() {
        for s in ["", "abc", "1:2:3:4", "00:61", "00:60:00", "-5", "1:-2", ":30", "1::30"] {
            assert_eq!(parse_timestamp_str(s), None, "{:?} should not parse", s);
        }
        assert_eq!(parse_timestamp_seconds(&json!(null)), None);
        assert_eq!(parse_timestamp_seconds(&json!(-3)), None);
        assert_eq!(parse_timestamp_seconds(&json!(true)), None);
    }

    #[test]
    fn test_parse_dates() {
        let d = parse_date("2023-04-01").unwrap();
        assert_eq!(d.to_string(), "2023-04-01 00:00:00");

        let d = parse_date("2023-04-01T20:30:00Z").unwrap();
        assert_eq!(d.to_string(), "2023-04-01 20:30:00");

        let d = parse_date("2023-04-01T20:30:00-03:00").unwrap();
        assert_eq!(d.to_string(), "2023-04-01 23:30:00");

        let d = parse_date("2023-04-01 08:15:00").unwrap();
        assert_eq!(d.to_string(), "2023-04-01 08:15:00");

        assert!(parse_date("01/04/2023").is_none());
        assert!(parse_date_value(&json!(20230401)).is_none());
    }

    #[test]
    fn test_date_ordering() {
        let older = parse_date("2022-12-31").unwrap();
        let newer = parse_date("2023-01-01T00:00:01Z").unwrap();
        assert!(newer > older);
    }
}
