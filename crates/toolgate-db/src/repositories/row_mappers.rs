//! Shared conversions between `SQLite` text columns and domain values.

use base64::Engine;
use chrono::{DateTime, NaiveDateTime, Utc};

/// Render a timestamp for storage.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Parse a stored timestamp.
///
/// Accepts RFC 3339 and `SQLite`'s `datetime('now')` format; anything else
/// maps to the Unix epoch rather than failing the whole row.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    NaiveDateTime::parse_from_str(s.trim_end_matches(" UTC"), "%Y-%m-%d %H:%M:%S%.f")
        .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Encode an environment variable value to base64.
pub fn encode_env_value(value: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

/// Decode a base64-encoded environment variable value.
pub fn decode_env_value(encoded: &str) -> Result<String, String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| format!("Failed to decode env var: {e}"))?;

    String::from_utf8(bytes).map_err(|e| format!("Invalid UTF-8 in env var: {e}"))
}
