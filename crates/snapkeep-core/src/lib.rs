//! Pure scheduling, catalog, and retention logic for the snapkeep backup
//! scheduler. Nothing in this crate spawns a subprocess, parses a config
//! file, or blocks on a sleep — it owns the decisions (`is this class due`,
//! `which snapshots have expired`, `what should the overlap plan look
//! like`), leaving execution (mounting, rsync invocation, filesystem
//! mutation, the tick loop itself) to `snapkeep-daemon`.

pub mod catalog;
pub mod duration;
pub mod expiration;
pub mod filter;
pub mod overlap;
pub mod retention;
pub mod schedule;
pub mod types;

pub use catalog::SnapshotCatalog;
pub use duration::{interval_to_oldest_datetime, parse_keep_age, DurationParseError};
pub use expiration::{plan as plan_expiration, ExpirationAction};
pub use filter::{rules_to_args, FilterRule};
pub use overlap::{resolve as resolve_overlap, AliasMode, MaterializationPlan, OverlapPolicy};
pub use retention::classify;
pub use schedule::{now_naive, IntervalClock, ScheduleError};
pub use types::{
    BackupParams, IntervalClass, MountSpec, PartitionSpec, ReadOnlyCompanion, Repository,
    Snapshot, SnapshotKind, SnapshotName, SyncLogfileOptions, LATEST_NAME,
};
