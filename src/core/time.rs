//! Shared timestamp helpers.
//!
//! All timestamps the core writes to state files and manifests are ISO-8601
//! UTC (§3, §6), unlike a compact epoch format — records need to be readable
//! without a decoder.

use chrono::{DateTime, Utc};

/// Current time as an ISO-8601 UTC string, e.g. `2025-01-01T00:00:00.123456Z`.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Timestamp suitable for backup directory names: `YYYYMMDD_HHMMSS`.
pub fn backup_timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Parse an ISO-8601 string back into a `DateTime<Utc>`, for tests and ordering checks.
pub fn parse_iso(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_iso_round_trips() {
        let s = now_iso();
        assert!(parse_iso(&s).is_some());
    }

    #[test]
    fn test_backup_timestamp_format() {
        let ts = backup_timestamp();
        assert_eq!(ts.len(), 15);
        assert_eq!(ts.as_bytes()[8], b'_');
    }
}
