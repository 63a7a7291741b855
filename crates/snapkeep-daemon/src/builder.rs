use std::path::Path;

use chrono::NaiveDateTime;
use snapkeep_core::{BackupParams, Repository, SnapshotName, LATEST_NAME};
use snapkeep_sync::{build_args, SyncExecutor};
use thiserror::Error;

use crate::fsops;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("sync tool failed: {0}")]
    Sync(#[from] snapkeep_sync::SyncError),
    #[error("filesystem error updating latest pointer: {0}")]
    Io(#[from] std::io::Error),
}

/// Materializes one physical snapshot for `repo`'s `interval` class at
/// `timestamp`, hard-linking against `link_ref` (the prior physical
/// snapshot's folder name, if any) and then atomically repointing `latest`.
/// The only thing left to the caller is deciding *which* class is due and
/// what to link against (`OverlapResolver`, `SnapshotCatalog::latest_physical`).
pub fn build_snapshot(
    executor: &SyncExecutor,
    repo: &Repository,
    interval: &str,
    timestamp: NaiveDateTime,
    link_ref: Option<&str>,
) -> Result<String, BuildError> {
    let folder_name = SnapshotName::new(&repo.task_name, interval, timestamp).format();

    let params = BackupParams {
        sources: repo.sources.clone(),
        destination_dir: repo.destination.clone(),
        folder_name: folder_name.clone(),
        link_ref_folder: link_ref.map(str::to_string),
        filter_rules: repo.filter_rules.clone(),
        sync_args: repo.sync_args.clone(),
        sync_logfile: repo.rsync_logfile.clone(),
    };

    for source in &params.sources {
        tracing::info!(folder = %folder_name, source = %source.display(), "creating snapshot");
        let args = build_args(&params, source);
        executor.run(&args)?;
    }

    replace_latest(&repo.destination, &folder_name)?;
    tracing::info!(folder = %folder_name, "snapshot finished successfully");
    Ok(folder_name)
}

fn replace_latest(destination: &Path, folder_name: &str) -> std::io::Result<()> {
    let latest = destination.join(LATEST_NAME);
    let target = destination.join(folder_name);
    if latest.is_symlink() || latest.exists() {
        fsops::remove_symlink(&latest)?;
    }
    fsops::create_symlink(&target, &latest)
}
