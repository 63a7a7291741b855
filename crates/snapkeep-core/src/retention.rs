use chrono::{Duration as ChronoDuration, NaiveDateTime};

use crate::types::{IntervalClass, Snapshot};

/// Split `snapshots` (all tagged with `class`, any order) into `(keepers,
/// expired)`: a snapshot is a keeper if it is among the `keep_count` most
/// recent, or its timestamp is no older than `keep_age` measured from `now`
/// — whichever condition is configured and satisfied.
///
/// This operates purely within one class's own tagged entries. The
/// cross-class union rule — a physical snapshot aliased into another class
/// survives if that other class still keeps its alias — falls out for free
/// at execution time: each class's alias has its own catalog entry and is
/// classified independently by its own class here, and
/// `ExpirationExecutor`/[`crate::plan_expiration`] resolves the aliasing
/// relationship when an entry on one side is actually removed.
pub fn classify<'a>(
    snapshots: &[&'a Snapshot],
    class: &IntervalClass,
    now: NaiveDateTime,
) -> (Vec<&'a Snapshot>, Vec<&'a Snapshot>) {
    let mut by_recency: Vec<&Snapshot> = snapshots.to_vec();
    by_recency.sort_by(|a, b| b.name.timestamp.cmp(&a.name.timestamp));

    let cutoff = class
        .keep_age
        .map(|age| now - ChronoDuration::from_std(age).unwrap_or_else(|_| ChronoDuration::zero()));

    let mut keepers = Vec::new();
    let mut expired = Vec::new();
    for (idx, snapshot) in by_recency.into_iter().enumerate() {
        let within_count = class.keep_count.is_some_and(|n| (idx as u32) < n);
        let within_age = cutoff.is_some_and(|c| snapshot.name.timestamp >= c);
        if within_count || within_age {
            keepers.push(snapshot);
        } else {
            expired.push(snapshot);
        }
    }
    (keepers, expired)
}
