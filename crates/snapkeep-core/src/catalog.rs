use std::fs;
use std::io;
use std::path::Path;

use crate::types::{Snapshot, SnapshotKind, SnapshotName, LATEST_NAME};

/// The set of snapshots for one repository, as currently present on disk.
/// Rebuilt from scratch every tick via [`SnapshotCatalog::scan`] — there is
/// no incremental update and no cached state carried between ticks.
#[derive(Debug, Default)]
pub struct SnapshotCatalog {
    snapshots: Vec<Snapshot>,
}

impl SnapshotCatalog {
    /// Scan `destination` for entries belonging to `task_name`. Returns the
    /// catalog plus the raw names of any entries that looked like snapshots
    /// (not `latest`, not obviously foreign) but failed to parse — the
    /// caller logs these at warning level.
    pub fn scan(destination: &Path, task_name: &str) -> io::Result<(Self, Vec<String>)> {
        let mut entries: Vec<_> = fs::read_dir(destination)?.filter_map(|e| e.ok()).collect();
        entries.sort_by_key(|e| e.file_name());

        let mut snapshots = Vec::new();
        let mut warnings = Vec::new();

        for entry in entries {
            let file_name = entry.file_name();
            let name_str = file_name.to_string_lossy().into_owned();
            if name_str == LATEST_NAME {
                continue;
            }

            let path = entry.path();
            match SnapshotName::parse(&name_str) {
                Some(name) if name.task_name == task_name => {
                    snapshots.push(Snapshot {
                        kind: classify(&path, destination),
                        name,
                        path,
                    });
                }
                Some(_) => {
                    // Belongs to a different task sharing this destination
                    // directory; not this repository's concern.
                }
                None => warnings.push(name_str),
            }
        }

        snapshots.sort_by(|a, b| a.name.timestamp.cmp(&b.name.timestamp));
        Ok((Self { snapshots }, warnings))
    }

    pub fn all(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// Snapshots tagged with `class`, ascending timestamp order.
    pub fn list(&self, class: &str) -> Vec<&Snapshot> {
        self.snapshots
            .iter()
            .filter(|s| s.name.interval == class)
            .collect()
    }

    pub fn latest_physical(&self) -> Option<&Snapshot> {
        self.snapshots.iter().rev().find(|s| !s.is_symlink())
    }

    /// Symlink entries whose resolved target is `physical`'s path, in
    /// catalog (ascending-timestamp) order — used by `ExpirationExecutor`
    /// to decide which alias to promote first.
    pub fn aliases_of<'a>(&'a self, physical: &Snapshot) -> Vec<&'a Snapshot> {
        let physical_real = fs::canonicalize(&physical.path).unwrap_or_else(|_| physical.path.clone());
        self.snapshots
            .iter()
            .filter(|s| match &s.kind {
                SnapshotKind::Symlink { target } => *target == physical_real,
                SnapshotKind::Physical => false,
            })
            .collect()
    }
}

fn classify(path: &Path, destination: &Path) -> SnapshotKind {
    if !path.is_symlink() {
        return SnapshotKind::Physical;
    }
    let target = fs::canonicalize(path).unwrap_or_else(|_| {
        // Dangling symlink: fall back to joining the raw (possibly
        // relative) target against the destination directory.
        let raw = fs::read_link(path).unwrap_or_default();
        if raw.is_absolute() {
            raw
        } else {
            destination.join(raw)
        }
    });
    SnapshotKind::Symlink { target }
}
