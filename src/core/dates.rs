use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Storage format for every timestamp column.
pub const STORAGE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format(STORAGE_FORMAT).to_string()
}

/// Parses a user supplied date and returns it in [`STORAGE_FORMAT`].
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`,
/// RFC 3339 and RFC 2822. Offsets are converted to UTC; naive values are
/// taken as UTC.
pub fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(format_timestamp(parsed.with_timezone(&Utc)));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(raw) {
        return Some(format_timestamp(parsed.with_timezone(&Utc)));
    }
    for pattern in [STORAGE_FORMAT, "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, pattern) {
            return Some(parsed.format(STORAGE_FORMAT).to_string());
        }
    }
    parse_day(raw).map(|day| format!("{} 00:00:00", day.format("%Y-%m-%d")))
}

/// Parses a calendar day in `YYYY-MM-DD` form.
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}
