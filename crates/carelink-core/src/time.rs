//! Timestamp helpers.
//!
//! Persisted and wire timestamps are RFC 3339 UTC strings with microsecond
//! precision and a `Z` suffix. The fixed width makes them sort
//! lexicographically in the same order as chronologically.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp in the canonical wire form.
#[must_use]
pub fn format_micros(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time in the canonical wire form.
#[must_use]
pub fn now_micros() -> String {
    format_micros(Utc::now())
}

/// Parse any RFC 3339 timestamp (any offset, any precision).
pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a client-supplied timestamp and re-emit it in canonical form.
pub fn normalize(raw: &str) -> Option<String> {
    parse(raw).map(format_micros)
}
