use std::time::Duration as StdDuration;

use chrono::{Duration as ChronoDuration, NaiveDateTime};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DurationParseError {
    #[error("invalid keep_age expression {0:?}: {1}")]
    Invalid(String, String),
}

/// Parse a `keep_age` expression such as `7d`, `2w`, `90min` into a
/// `Duration`. The exact grammar is delegated to whatever the
/// interval-expression collaborator exposes; `humantime`'s duration syntax
/// (days/weeks/hours/minutes, optionally combined) is used here as that
/// collaborator.
pub fn parse_keep_age(expr: &str) -> Result<StdDuration, DurationParseError> {
    humantime::parse_duration(expr)
        .map_err(|e| DurationParseError::Invalid(expr.to_string(), e.to_string()))
}

/// The oldest timestamp still covered by `age`, measured back from `now`.
/// Re-derived every tick against the current wall time so aging always uses
/// a fresh cutoff.
pub fn interval_to_oldest_datetime(now: NaiveDateTime, age: StdDuration) -> NaiveDateTime {
    let age = ChronoDuration::from_std(age).unwrap_or_else(|_| ChronoDuration::zero());
    now - age
}
