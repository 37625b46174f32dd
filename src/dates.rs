//! Canonicalisation of date-like input into calendar nights.
//!
//! Accepted forms:
//! - `YYYY-MM-DD` is returned as-is.
//! - RFC 3339 instants (`Z` or `±HH:MM` offset) are converted into the
//!   property zone before the time of day is dropped.
//! - Naive `YYYY-MM-DDTHH:MM:SS[.fff]` timestamps are taken as wall-clock
//!   time in the property zone.
//!
//! Anything else is rejected. There is no "take the first ten characters"
//! fallback: a malformed value never turns into a guessed night.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;

use crate::limits::{MAX_VALID_YEAR, MIN_VALID_YEAR};
use crate::model::Night;

const NIGHT_FORMAT: &str = "%Y-%m-%d";
const NAIVE_TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DateError {
    #[error("invalid date: {0:?}")]
    Invalid(String),
    #[error("date out of range: {0}")]
    OutOfRange(Night),
}

/// Normalize a date-like string into the night it falls on in `tz`.
pub fn normalize(input: &str, tz: Tz) -> Result<Night, DateError> {
    let trimmed = input.trim();

    let night = if let Ok(night) = NaiveDate::parse_from_str(trimmed, NIGHT_FORMAT) {
        night
    } else if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
        instant.with_timezone(&tz).date_naive()
    } else if let Some(local) = parse_naive_timestamp(trimmed) {
        local.date()
    } else {
        return Err(DateError::Invalid(input.to_string()));
    };

    check_range(night)
}

/// The night an instant falls on in `tz`.
pub fn night_of(instant: DateTime<Utc>, tz: Tz) -> Night {
    instant.with_timezone(&tz).date_naive()
}

/// Canonical text form of a night.
pub fn format_night(night: Night) -> String {
    night.format(NIGHT_FORMAT).to_string()
}

fn parse_naive_timestamp(s: &str) -> Option<NaiveDateTime> {
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

fn check_range(night: Night) -> Result<Night, DateError> {
    if night.year() < MIN_VALID_YEAR || night.year() > MAX_VALID_YEAR {
        return Err(DateError::OutOfRange(night));
    }
    Ok(night)
}
