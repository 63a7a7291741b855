use std::path::PathBuf;

use chrono::NaiveDateTime;

use crate::filter::FilterRule;
use crate::overlap::OverlapPolicy;

/// Name of the symlink each repository keeps pointing at its most recently
/// completed physical snapshot.
pub const LATEST_NAME: &str = "latest";

/// `strftime`-style format used both to render and to parse the timestamp
/// suffix of a snapshot directory name.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// The parsed identity of a snapshot directory name:
/// `<task_name>_<interval>_<YYYY-MM-DDTHH-MM-SS>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotName {
    pub task_name: String,
    pub interval: String,
    pub timestamp: NaiveDateTime,
}

impl SnapshotName {
    pub fn new(task_name: impl Into<String>, interval: impl Into<String>, timestamp: NaiveDateTime) -> Self {
        Self {
            task_name: task_name.into(),
            interval: interval.into(),
            timestamp,
        }
    }

    /// Parse a directory/symlink entry name. Interval names are assumed not
    /// to contain underscores (they are short identifiers like `hourly` or
    /// `daily`), so the rightmost two underscore-delimited fields are always
    /// the interval and the timestamp, with everything else — including any
    /// underscores a task name may itself contain — folding into
    /// `task_name`.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.rsplitn(3, '_');
        let ts_str = parts.next()?;
        let interval = parts.next()?;
        let task_name = parts.next()?;
        if task_name.is_empty() || interval.is_empty() {
            return None;
        }
        let timestamp = NaiveDateTime::parse_from_str(ts_str, TIMESTAMP_FORMAT).ok()?;
        Some(Self::new(task_name, interval, timestamp))
    }

    /// Render the canonical directory/symlink entry name.
    pub fn format(&self) -> String {
        format!(
            "{}_{}_{}",
            self.task_name,
            self.interval,
            self.timestamp.format(TIMESTAMP_FORMAT)
        )
    }
}

/// Whether a catalog entry is a real directory or a symlink aliasing another
/// entry. A hard-link fan-out copy is, once on disk, indistinguishable from
/// a physical snapshot — the catalog only ever sees `Physical` for it, same
/// as for the "real" snapshot it was cloned from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotKind {
    Physical,
    /// `target` is the symlink's resolved (canonicalized where possible)
    /// destination path, used for alias-graph lookups.
    Symlink { target: PathBuf },
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub name: SnapshotName,
    pub path: PathBuf,
    pub kind: SnapshotKind,
}

impl Snapshot {
    pub fn is_symlink(&self) -> bool {
        matches!(self.kind, SnapshotKind::Symlink { .. })
    }
}

/// `(name, schedule_expression, keep_count, keep_age)`. Position within a
/// `Repository::intervals` list is the declared priority order used by
/// `OverlapResolver`.
#[derive(Debug, Clone)]
pub struct IntervalClass {
    pub name: String,
    pub schedule: String,
    pub keep_count: Option<u32>,
    pub keep_age: Option<std::time::Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionSpec {
    Uuid(String),
    Label(String),
    Path(PathBuf),
}

impl PartitionSpec {
    pub fn parse(raw: &str) -> Option<Self> {
        if let Some(uuid) = raw.strip_prefix("UUID=") {
            Some(Self::Uuid(uuid.to_string()))
        } else if let Some(label) = raw.strip_prefix("LABEL=") {
            Some(Self::Label(label.to_string()))
        } else if raw.is_empty() {
            None
        } else {
            Some(Self::Path(PathBuf::from(raw)))
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReadOnlyCompanion {
    pub mountpoint: PathBuf,
    pub create: bool,
    pub options: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MountSpec {
    pub partition: PartitionSpec,
    pub mountpoint: PathBuf,
    pub mountpoint_create: bool,
    pub options: Vec<String>,
    pub readonly_companion: Option<ReadOnlyCompanion>,
}

#[derive(Debug, Clone)]
pub struct SyncLogfileOptions {
    pub name_template: String,
    pub format: Option<String>,
}

/// Ephemeral parameters handed to the snapshot builder for exactly one
/// materialization (one source, one destination folder name).
#[derive(Debug, Clone)]
pub struct BackupParams {
    pub sources: Vec<PathBuf>,
    pub destination_dir: PathBuf,
    pub folder_name: String,
    pub link_ref_folder: Option<String>,
    pub filter_rules: Vec<FilterRule>,
    pub sync_args: Vec<String>,
    pub sync_logfile: Option<SyncLogfileOptions>,
}

/// Immutable, process-lifetime configuration for one backup task. Mutable
/// state (which snapshots exist) lives entirely in `SnapshotCatalog`, which
/// is rebuilt from disk every tick.
#[derive(Debug, Clone)]
pub struct Repository {
    pub task_name: String,
    pub destination: PathBuf,
    pub sources: Vec<PathBuf>,
    /// Declared order is priority order: earlier classes win overlap ties.
    pub intervals: Vec<IntervalClass>,
    pub filter_rules: Vec<FilterRule>,
    pub sync_args: Vec<String>,
    pub ssh_args: Option<Vec<String>>,
    pub one_file_system: bool,
    pub overlap_policy: OverlapPolicy,
    pub rsync_logfile: Option<SyncLogfileOptions>,
    pub create_destination: bool,
}
