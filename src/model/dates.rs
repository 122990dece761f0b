//! Date literal parsing.
//!
//! ISO-8601 dates and datetimes, normalised to UTC. Bare dates are taken at
//! midnight UTC.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateParseError {
    #[error("invalid date literal: {0}")]
    Invalid(String),
}

/// Parse an ISO-8601 date or datetime literal
pub fn parse_date(s: &str) -> Result<DateTime<Utc>, DateParseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let dt = d
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| DateParseError::Invalid(s.to_string()))?;
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc));
    }
    Err(DateParseError::Invalid(s.to_string()))
}

/// Seconds since the Unix epoch for a parsed date
pub fn to_epoch(dt: &DateTime<Utc>) -> i64 {
    dt.timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_date_is_midnight_utc() {
        let dt = parse_date("2024-03-01").unwrap();
        assert_eq!(to_epoch(&dt) % 86400, 0);
    }

    #[test]
    fn rfc3339_roundtrip() {
        let dt = parse_date("2021-06-28T00:00:00Z").unwrap();
        assert_eq!(to_epoch(&dt), 1624838400);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_date("not-a-date").is_err());
    }
}
