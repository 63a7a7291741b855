//! End-to-end scenarios over a real temp filesystem, standing in for
//! rsync with a fake executable so the test suite doesn't depend on the
//! real binary being installed.

use std::fs;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use snapkeep_core::{
    classify, plan_expiration, resolve_overlap, AliasMode, IntervalClass, OverlapPolicy,
    Repository, SnapshotCatalog,
};
use snapkeep_daemon::{builder, config, fsops, scheduler};
use snapkeep_sync::SyncExecutor;

/// Writes a fake `rsync` that copies the source tree's contents into the
/// destination (the last two positional arguments), so `build_snapshot`
/// exercises real directory/hard-link semantics without a real sync tool.
fn fake_rsync(dir: &Path) -> PathBuf {
    let path = dir.join("fake-rsync.sh");
    fs::write(
        &path,
        "#!/bin/sh\nset -e\nn=$#\ni=0\nfor a in \"$@\"; do\n  i=$((i+1))\n  if [ \"$i\" -eq \"$((n-1))\" ]; then SRC=\"$a\"; fi\n  if [ \"$i\" -eq \"$n\" ]; then DST=\"$a\"; fi\ndone\nmkdir -p \"$DST\"\ncp -a \"$SRC\"/. \"$DST\"/\n",
    )
    .unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn failing_rsync(dir: &Path, code: i32) -> PathBuf {
    let path = dir.join("failing-rsync.sh");
    fs::write(&path, format!("#!/bin/sh\nexit {code}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn base_repo(destination: PathBuf, sources: Vec<PathBuf>, overlap: OverlapPolicy) -> Repository {
    Repository {
        task_name: "t".into(),
        destination,
        sources,
        intervals: Vec::new(),
        filter_rules: Vec::new(),
        sync_args: Vec::new(),
        ssh_args: None,
        one_file_system: false,
        overlap_policy: overlap,
        rsync_logfile: None,
        create_destination: false,
    }
}

fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d).unwrap().and_hms_opt(h, mi, s).unwrap()
}

#[test]
fn scenario_a_first_snapshot() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("source");
    fs::create_dir_all(&source).unwrap();
    fs::write(source.join("file.txt"), b"hello").unwrap();
    let destination = tmp.path().join("dest");
    fs::create_dir_all(&destination).unwrap();

    let script = fake_rsync(tmp.path());
    let executor = SyncExecutor::new(script.to_string_lossy().into_owned());
    let repo = base_repo(destination.clone(), vec![source], OverlapPolicy::Single);

    let timestamp = ts(2024, 1, 1, 3, 0, 0);
    let folder = builder::build_snapshot(&executor, &repo, "daily", timestamp, None).unwrap();

    assert_eq!(folder, "t_daily_2024-01-01T03-00-00");
    let folder_path = destination.join(&folder);
    assert!(folder_path.join("file.txt").exists());

    let latest = destination.join("latest");
    assert!(latest.is_symlink());
    assert_eq!(fs::read_link(&latest).unwrap(), PathBuf::from(&folder));
}

#[test]
fn scenario_b_overlap_single_materializes_only_the_winner() {
    // Goes through real config parsing rather than hand-building `due`, so
    // this proves declared order (not alphabetical order) decides the
    // overlap winner: "daily" is declared before "hourly" here, and with
    // overlap=single the *first declared* class must win the physical slot.
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("source");
    fs::create_dir_all(&source).unwrap();
    fs::write(source.join("a"), b"x").unwrap();
    let destination = tmp.path().join("dest");
    fs::create_dir_all(&destination).unwrap();

    let ini_path = tmp.path().join("snapkeep.ini");
    fs::write(
        &ini_path,
        format!(
            "[logging]\n\
             logfile_path = {dir}/snapkeep.log\n\
             loglevel = default\n\
             \n\
             [task]\n\
             taskname = t\n\
             source = {source}\n\
             destination = {destination}\n\
             interval_daily = 0 0 * * *\n\
             keep_daily = 7\n\
             interval_hourly = 0 * * * *\n\
             keep_hourly = 24\n\
             overlapping = single\n",
            dir = tmp.path().display(),
            source = source.display(),
            destination = destination.display(),
        ),
    )
    .unwrap();

    let conf = config::load(&ini_path).unwrap();
    let repo = &conf.repositories[0];
    assert_eq!(repo.intervals[0].name, "daily");
    assert_eq!(repo.intervals[1].name, "hourly");

    let due = vec!["daily".to_string(), "hourly".to_string()];
    let plan = resolve_overlap(&due, repo.overlap_policy).unwrap();
    assert_eq!(plan.physical_class, "daily");
    assert!(plan.alias_classes.is_empty());

    let script = fake_rsync(tmp.path());
    let executor = SyncExecutor::new(script.to_string_lossy().into_owned());
    let timestamp = ts(2024, 1, 1, 0, 0, 0);
    builder::build_snapshot(&executor, repo, &plan.physical_class, timestamp, None).unwrap();

    assert!(destination.join("t_daily_2024-01-01T00-00-00").exists());
    assert!(!destination.join("t_hourly_2024-01-01T00-00-00").exists());
}

#[test]
fn scenario_c_overlap_hardlink_shares_inodes() {
    let due = vec!["hourly".to_string(), "daily".to_string()];
    let plan = resolve_overlap(&due, OverlapPolicy::Hardlink).unwrap();
    assert_eq!(plan.alias_mode, Some(AliasMode::Hardlink));

    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("source");
    fs::create_dir_all(&source).unwrap();
    fs::write(source.join("a"), b"payload").unwrap();
    let destination = tmp.path().join("dest");
    fs::create_dir_all(&destination).unwrap();

    let script = fake_rsync(tmp.path());
    let executor = SyncExecutor::new(script.to_string_lossy().into_owned());
    let repo = base_repo(destination.clone(), vec![source], OverlapPolicy::Hardlink);
    let timestamp = ts(2024, 1, 1, 0, 0, 0);
    let physical = builder::build_snapshot(&executor, &repo, &plan.physical_class, timestamp, None).unwrap();

    for alias_class in &plan.alias_classes {
        let alias_name = format!("t_{alias_class}_2024-01-01T00-00-00");
        fsops::copy_hardlinks(&destination.join(&physical), &destination.join(&alias_name)).unwrap();
    }

    use std::os::unix::fs::MetadataExt;
    let physical_meta = fs::metadata(destination.join(&physical).join("a")).unwrap();
    let alias_meta = fs::metadata(destination.join("t_daily_2024-01-01T00-00-00").join("a")).unwrap();
    assert_eq!(physical_meta.ino(), alias_meta.ino());
}

#[test]
fn scenario_d_expiration_promotes_alias() {
    let tmp = tempfile::tempdir().unwrap();
    let destination = tmp.path();
    let physical_name = "t_hourly_2024-01-01T00-00-00";
    let alias_name = "t_daily_2024-01-01T00-00-00";

    fs::create_dir_all(destination.join(physical_name)).unwrap();
    fs::write(destination.join(physical_name).join("f"), b"x").unwrap();
    symlink(destination.join(physical_name), destination.join(alias_name)).unwrap();

    let (catalog, _) = SnapshotCatalog::scan(destination, "t").unwrap();
    let physical = catalog
        .all()
        .iter()
        .find(|s| s.name.interval == "hourly")
        .unwrap();
    let aliases = catalog.aliases_of(physical);
    assert_eq!(aliases.len(), 1);

    let action = plan_expiration(physical, &aliases);
    match &action {
        snapkeep_core::ExpirationAction::PromoteAlias {
            expired_physical,
            promote_to,
            relink,
        } => {
            assert_eq!(expired_physical, &destination.join(physical_name));
            assert_eq!(promote_to, &destination.join(alias_name));
            assert!(relink.is_empty());
        }
        other => panic!("expected PromoteAlias, got {other:?}"),
    }

    if let snapkeep_core::ExpirationAction::PromoteAlias {
        expired_physical,
        promote_to,
        relink,
    } = action
    {
        fsops::remove_symlink(&promote_to).unwrap();
        fsops::move_path(&expired_physical, &promote_to).unwrap();
        for alias in relink {
            fsops::remove_symlink(&alias).unwrap();
            fsops::create_symlink(&promote_to, &alias).unwrap();
        }
    }

    assert!(!destination.join(physical_name).exists());
    let promoted = destination.join(alias_name);
    assert!(promoted.is_dir() && !promoted.is_symlink());
    assert!(promoted.join("f").exists());
}

#[test]
fn scenario_e_retention_by_age_expires_the_oldest() {
    let class = IntervalClass {
        name: "daily".into(),
        schedule: "0 0 * * *".into(),
        keep_count: None,
        keep_age: Some(Duration::from_secs(7 * 86400)),
    };
    let now = ts(2024, 1, 11, 0, 0, 0);

    let snapshots: Vec<snapkeep_core::Snapshot> = (1..=10)
        .map(|d| snapkeep_core::Snapshot {
            name: snapkeep_core::SnapshotName::new("t", "daily", ts(2024, 1, d, 0, 0, 0)),
            path: PathBuf::from(format!("/repo/t_daily_{d}")),
            kind: snapkeep_core::SnapshotKind::Physical,
        })
        .collect();
    let refs: Vec<&snapkeep_core::Snapshot> = snapshots.iter().collect();

    let (keepers, expired) = classify(&refs, &class, now);
    assert_eq!(keepers.len(), 7);
    assert_eq!(expired.len(), 3);
    use chrono::Datelike;
    for s in &expired {
        assert!(s.name.timestamp.day() <= 3);
    }
}

#[test]
fn scenario_g_expiration_repoints_dangling_latest() {
    let tmp = tempfile::tempdir().unwrap();
    let destination = tmp.path();

    let old_name = "t_hourly_2024-01-01T00-00-00";
    let new_name = "t_hourly_2024-01-02T00-00-00";
    fs::create_dir_all(destination.join(old_name)).unwrap();
    fs::write(destination.join(old_name).join("f"), b"x").unwrap();
    fs::create_dir_all(destination.join(new_name)).unwrap();
    fs::write(destination.join(new_name).join("f"), b"y").unwrap();
    fsops::create_symlink(&destination.join(old_name), &destination.join("latest")).unwrap();

    let repo = Repository {
        intervals: vec![IntervalClass {
            name: "hourly".into(),
            schedule: "0 * * * *".into(),
            keep_count: Some(1),
            keep_age: None,
        }],
        ..base_repo(destination.to_path_buf(), Vec::new(), OverlapPolicy::Single)
    };

    let (catalog, _) = SnapshotCatalog::scan(destination, "t").unwrap();
    let now = ts(2024, 1, 3, 0, 0, 0);
    scheduler::run_expiration(&repo, &catalog, now);

    assert!(!destination.join(old_name).exists());
    let latest = destination.join("latest");
    assert!(latest.is_symlink());
    assert!(latest.exists(), "latest must not be left dangling");
    assert_eq!(
        fs::canonicalize(&latest).unwrap(),
        fs::canonicalize(destination.join(new_name)).unwrap()
    );
}

#[test]
fn scenario_f_sync_failure_leaves_no_latest_pointer() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("source");
    fs::create_dir_all(&source).unwrap();
    let destination = tmp.path().join("dest");
    fs::create_dir_all(&destination).unwrap();

    let script = failing_rsync(tmp.path(), 23);
    let executor = SyncExecutor::new(script.to_string_lossy().into_owned());
    let repo = base_repo(destination.clone(), vec![source], OverlapPolicy::Single);

    let err = builder::build_snapshot(&executor, &repo, "daily", ts(2024, 1, 1, 0, 0, 0), None)
        .unwrap_err();
    assert!(matches!(err, builder::BuildError::Sync(_)));
    assert!(!destination.join("latest").exists());
}
