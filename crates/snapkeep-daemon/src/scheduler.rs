use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration as StdDuration;

use chrono::{NaiveDateTime, Timelike};
use snapkeep_core::{
    now_naive, plan_expiration, resolve_overlap, classify as classify_retention, ExpirationAction,
    IntervalClock, Repository, Snapshot, SnapshotCatalog, LATEST_NAME,
};
use snapkeep_sync::SyncExecutor;

use crate::builder;
use crate::fsops;

/// Exit code returned when the loop was stopped by a keyboard interrupt
/// rather than a fatal runtime error.
pub const KEYBOARD_INTERRUPT: i32 = crate::errors::exit_code::KEYBOARD_INTERRUPT;
pub const SYNC_FAILED: i32 = crate::errors::exit_code::SYNC_FAILED;

/// Drives the per-tick REFRESH -> SCHEDULE -> BUILD -> EXPIRE cycle over
/// every configured repository. Single-threaded, cooperative: one
/// repository's cycle runs to completion before the next begins.
pub struct Scheduler {
    repositories: Vec<Repository>,
    executor: SyncExecutor,
    interrupted: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(repositories: Vec<Repository>, executor: SyncExecutor) -> Self {
        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = interrupted.clone();
        let _ = ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
        });
        Self {
            repositories,
            executor,
            interrupted,
        }
    }

    /// Runs ticks forever until interrupted or a fatal runtime error occurs.
    /// Returns the process exit code the caller should use.
    pub fn run(&self) -> i32 {
        loop {
            if self.interrupted.load(Ordering::SeqCst) {
                tracing::info!("keyboard interrupt, stopping");
                return KEYBOARD_INTERRUPT;
            }

            for repo in &self.repositories {
                if let Err(code) = self.run_repository(repo) {
                    return code;
                }
                if self.interrupted.load(Ordering::SeqCst) {
                    tracing::info!("keyboard interrupt, stopping");
                    return KEYBOARD_INTERRUPT;
                }
            }

            sleep_to_next_minute();
        }
    }

    fn run_repository(&self, repo: &Repository) -> Result<(), i32> {
        let now = now_naive();

        // REFRESH
        let (catalog, warnings) = match SnapshotCatalog::scan(&repo.destination, &repo.task_name) {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(task = %repo.task_name, error = %e, "failed to scan snapshot catalog, skipping this tick");
                return Ok(());
            }
        };
        for w in warnings {
            tracing::warn!(task = %repo.task_name, "{w}");
        }

        // SCHEDULE
        let mut due = Vec::new();
        for class in &repo.intervals {
            let clock = match IntervalClock::parse(&class.schedule) {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!(task = %repo.task_name, class = %class.name, error = %e, "invalid schedule, skipping class");
                    continue;
                }
            };
            let last = catalog
                .list(&class.name)
                .last()
                .map(|s| s.name.timestamp);
            if clock.is_due(now, last) {
                due.push(class.name.clone());
            }
        }

        // BUILD
        if due.is_empty() {
            tracing::info!(task = %repo.task_name, "no backup necessary");
        } else if let Some(plan) = resolve_overlap(&due, repo.overlap_policy) {
            let link_ref = catalog.latest_physical().map(|s| s.name.format());
            let physical_folder = match builder::build_snapshot(
                &self.executor,
                repo,
                &plan.physical_class,
                now,
                link_ref.as_deref(),
            ) {
                Ok(folder) => folder,
                Err(e) => {
                    tracing::error!(task = %repo.task_name, error = %e, "sync tool failed, aborting");
                    return Err(SYNC_FAILED);
                }
            };

            let physical_path = repo.destination.join(&physical_folder);
            for alias_class in &plan.alias_classes {
                let alias_name =
                    snapkeep_core_name(&repo.task_name, alias_class, now);
                let alias_path = repo.destination.join(&alias_name);
                let result = match plan.alias_mode {
                    Some(snapkeep_core::AliasMode::Hardlink) => {
                        tracing::info!(from = %physical_folder, to = %alias_name, "hardlinking snapshot");
                        fsops::copy_hardlinks(&physical_path, &alias_path)
                    }
                    Some(snapkeep_core::AliasMode::Symlink) | None => {
                        tracing::info!(from = %physical_folder, to = %alias_name, "symlinking snapshot");
                        fsops::create_symlink(&physical_path, &alias_path)
                    }
                };
                if let Err(e) = result {
                    tracing::error!(task = %repo.task_name, alias = %alias_name, error = %e, "failed to materialize alias");
                }
            }
        }

        // EXPIRE
        let (catalog, _) = match SnapshotCatalog::scan(&repo.destination, &repo.task_name) {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(task = %repo.task_name, error = %e, "failed to rescan catalog before expiration");
                return Ok(());
            }
        };
        run_expiration(repo, &catalog, now);

        Ok(())
    }
}

fn snapkeep_core_name(task_name: &str, interval: &str, timestamp: NaiveDateTime) -> String {
    snapkeep_core::SnapshotName::new(task_name, interval, timestamp).format()
}

/// Runs `RetentionPolicy` per class, unions the expired sets (a snapshot
/// only truly expires once every class that tags it agrees), then runs
/// `ExpirationExecutor` oldest-first.
pub fn run_expiration(repo: &Repository, catalog: &SnapshotCatalog, now: NaiveDateTime) {
    use std::collections::HashSet;

    let mut keeper_names: HashSet<_> = HashSet::new();
    let mut candidates: Vec<&Snapshot> = Vec::new();

    for class in &repo.intervals {
        let class_snapshots = catalog.list(&class.name);
        let (keepers, expired) = classify_retention(&class_snapshots, class, now);
        for k in keepers {
            keeper_names.insert(k.name.clone());
        }
        for e in expired {
            if !candidates.iter().any(|c| c.name == e.name) {
                candidates.push(e);
            }
        }
    }

    let mut expired: Vec<&Snapshot> = candidates
        .into_iter()
        .filter(|s| !keeper_names.contains(&s.name))
        .collect();
    expired.sort_by(|a, b| a.name.timestamp.cmp(&b.name.timestamp));

    if expired.is_empty() {
        tracing::info!(task = %repo.task_name, "no expired backups");
        return;
    }

    for snapshot in expired {
        tracing::info!(task = %repo.task_name, snapshot = %snapshot.name.format(), "expired backup");
        let aliases = catalog.aliases_of(snapshot);
        let action = plan_expiration(snapshot, &aliases);
        if let Err(e) = execute_expiration(&action) {
            tracing::error!(task = %repo.task_name, error = %e, "failed to execute expiration, continuing");
        }
    }

    if let Err(e) = fix_latest_pointer(repo) {
        tracing::error!(task = %repo.task_name, error = %e, "failed to repoint latest after expiration");
    }
}

/// Expiration can remove or rename the directory `latest` points at
/// (`RemoveDirectory` deletes it outright; `PromoteAlias` renames it onto
/// an alias path). Either way `latest` is left dangling. Rescans the
/// catalog and repoints `latest` at the newest remaining physical snapshot,
/// or removes it entirely if none remain.
fn fix_latest_pointer(repo: &Repository) -> std::io::Result<()> {
    let latest = repo.destination.join(LATEST_NAME);
    if !latest.is_symlink() || latest.exists() {
        return Ok(());
    }

    let (catalog, _) = match SnapshotCatalog::scan(&repo.destination, &repo.task_name) {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(task = %repo.task_name, error = %e, "failed to rescan catalog to repoint latest");
            return Ok(());
        }
    };

    fsops::remove_symlink(&latest)?;
    if let Some(physical) = catalog.latest_physical() {
        fsops::create_symlink(&physical.path, &latest)?;
    }
    Ok(())
}

fn execute_expiration(action: &ExpirationAction) -> std::io::Result<()> {
    match action {
        ExpirationAction::RemoveSymlink(path) => fsops::remove_symlink(path),
        ExpirationAction::RemoveDirectory(path) => fsops::remove_recursive(path),
        ExpirationAction::PromoteAlias {
            expired_physical,
            promote_to,
            relink,
        } => {
            fsops::remove_symlink(promote_to)?;
            fsops::move_path(expired_physical, promote_to)?;
            for alias in relink {
                fsops::remove_symlink(alias)?;
                fsops::create_symlink(promote_to, alias)?;
            }
            Ok(())
        }
    }
}

/// Sleeps until just past the next wall-clock minute boundary: if
/// `now.minute == 59` sleeps `60 - now.second`, else sleeps to the start of
/// the next minute plus a one-second guard.
fn sleep_to_next_minute() {
    let now = now_naive();
    let remaining = 60 - now.second() as i64;
    let wait_seconds = if now.minute() == 59 {
        remaining
    } else {
        remaining + 1
    };
    thread::sleep(StdDuration::from_secs(wait_seconds.max(0) as u64));
}
