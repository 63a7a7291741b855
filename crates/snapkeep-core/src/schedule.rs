use chrono::{NaiveDateTime, Utc};
use croner::Cron;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid schedule expression {0:?}: {1}")]
    InvalidExpression(String, String),
}

/// Wraps a cron-style schedule expression (minute hour day-of-month month
/// day-of-week) behind a pure `matches`/`next_fire`/`is_due` interface. The
/// cron field parsing itself is delegated to `croner`; this type only owns
/// the "is this snapshot class already satisfied for the current tick"
/// comparison, which the evaluator crate has no notion of.
///
/// Schedules are evaluated against naive (local) timestamps: `croner`
/// requires a timezone-aware type, so `NaiveDateTime` values are attached to
/// UTC purely as a carrier — no timezone conversion is implied or performed.
pub struct IntervalClock {
    cron: Cron,
}

impl IntervalClock {
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let cron = Cron::new(expr)
            .parse()
            .map_err(|e| ScheduleError::InvalidExpression(expr.to_string(), e.to_string()))?;
        Ok(Self { cron })
    }

    pub fn matches(&self, t: NaiveDateTime) -> bool {
        self.cron.is_time_matching(&t.and_utc()).unwrap_or(false)
    }

    /// Next time at or after `after` the schedule matches.
    pub fn next_fire(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        self.cron
            .find_next_occurrence(&after.and_utc(), true)
            .ok()
            .map(|dt| dt.naive_utc())
    }

    /// A class is due at `t` iff the schedule matches `t` and no existing
    /// snapshot of that class already has timestamp `t` — ticks run at
    /// one-minute cadence and cron fields bottom out at minute resolution,
    /// so two matches of the same schedule are always at least a minute
    /// apart and "the same matching window" collapses to "the same minute".
    pub fn is_due(&self, t: NaiveDateTime, last_snapshot: Option<NaiveDateTime>) -> bool {
        if !self.matches(t) {
            return false;
        }
        last_snapshot != Some(t)
    }
}

/// Placeholder "now" helper kept out of `IntervalClock` itself so the clock
/// stays a pure function of its inputs; callers in `snapkeep-daemon` supply
/// real wall-clock time.
pub fn now_naive() -> NaiveDateTime {
    Utc::now().naive_utc()
}
