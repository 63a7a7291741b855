use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use snapkeep_core::{MountSpec, PartitionSpec};
use thiserror::Error;

use crate::errors::StartupError;

#[derive(Debug, Error)]
pub enum MountError {
    #[error("partition {0:?} has no matching device node under /dev/disk")]
    PartitionNotFound(PartitionSpec),
    #[error("mount(8) exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
    #[error("io error launching mount(8): {0}")]
    Io(#[from] io::Error),
}

/// Resolves `spec` to a concrete device node path, the way `mount(8)` and
/// `blkid` do: `UUID=`/`LABEL=` specs are symlinks under `/dev/disk/by-uuid`
/// and `/dev/disk/by-label` respectively; a bare path is used as-is.
pub fn resolve_partition(spec: &PartitionSpec) -> Result<PathBuf, MountError> {
    let link = match spec {
        PartitionSpec::Uuid(uuid) => Some(PathBuf::from("/dev/disk/by-uuid").join(uuid)),
        PartitionSpec::Label(label) => Some(PathBuf::from("/dev/disk/by-label").join(label)),
        PartitionSpec::Path(path) => return Ok(path.clone()),
    };
    let link = link.expect("non-Path variants always produce a link path");
    fs::canonicalize(&link).map_err(|_| MountError::PartitionNotFound(spec.clone()))
}

/// True if `mountpoint` already appears as a mounted target in `/proc/mounts`.
/// Consults the kernel's live mount table rather than tracking state itself,
/// so a mount established outside this process is still detected.
pub fn is_mounted(mountpoint: &Path) -> io::Result<bool> {
    let table = fs::read_to_string("/proc/mounts")?;
    let target = mountpoint.to_string_lossy();
    Ok(table.lines().any(|line| {
        line.split_whitespace()
            .nth(1)
            .is_some_and(|mounted_at| mounted_at == target)
    }))
}

fn run_mount(args: &[String]) -> Result<(), MountError> {
    let output = Command::new("mount").args(args).output()?;
    if !output.status.success() {
        return Err(MountError::Failed {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(())
}

/// Establishes every configured mount before scheduling begins.
/// Already-mounted targets are logged and treated as success rather than
/// retried. Mounting itself is delegated to the `mount(8)` binary rather
/// than the raw syscall, since `-t auto` filesystem-type detection (via
/// `blkid`) has no equivalent at the syscall layer.
pub fn establish(spec: &MountSpec) -> Result<(), StartupError> {
    ensure_mountpoint(&spec.mountpoint, spec.mountpoint_create)?;

    let device = resolve_partition(&spec.partition)
        .map_err(|_| StartupError::InvalidPartitionSpec(format!("{:?}", spec.partition)))?;

    match &spec.readonly_companion {
        Some(ro) => {
            ensure_mountpoint(&ro.mountpoint, ro.create)?;

            if is_mounted(&ro.mountpoint).unwrap_or(false) {
                tracing::warn!(mountpoint = %ro.mountpoint.display(), "already in use, skipping mount");
            } else {
                mount_device(&device, &ro.mountpoint, &ro.options);
            }

            if is_mounted(&spec.mountpoint).unwrap_or(false) {
                tracing::warn!(mountpoint = %spec.mountpoint.display(), "already in use, skipping mount");
            } else {
                bind_mount(&ro.mountpoint, &spec.mountpoint);
            }

            remount_rw(&spec.mountpoint);
        }
        None => {
            if is_mounted(&spec.mountpoint).unwrap_or(false) {
                tracing::warn!(mountpoint = %spec.mountpoint.display(), "already in use, skipping mount");
            } else {
                mount_device(&device, &spec.mountpoint, &spec.options);
            }
        }
    }

    Ok(())
}

fn ensure_mountpoint(path: &Path, create: bool) -> Result<(), StartupError> {
    if path.exists() {
        return Ok(());
    }
    if create {
        fs::create_dir_all(path).map_err(|_| StartupError::MountpointMissing(path.to_path_buf()))?;
        Ok(())
    } else {
        Err(StartupError::MountpointMissing(path.to_path_buf()))
    }
}

fn mount_device(device: &Path, mountpoint: &Path, options: &[String]) {
    let args = vec![
        "-t".to_string(),
        "auto".to_string(),
        "-o".to_string(),
        options.join(","),
        device.display().to_string(),
        mountpoint.display().to_string(),
    ];
    if let Err(e) = run_mount(&args) {
        tracing::error!(device = %device.display(), mountpoint = %mountpoint.display(), error = %e, "mount failed");
    }
}

/// Bind-mounts `source` onto `target`, preserving whatever ro/rw state
/// `source` currently has.
fn bind_mount(source: &Path, target: &Path) {
    let args = vec![
        "--bind".to_string(),
        source.display().to_string(),
        target.display().to_string(),
    ];
    if let Err(e) = run_mount(&args) {
        tracing::error!(source = %source.display(), target = %target.display(), error = %e, "bind mount failed");
    }
}

/// Remounts `target` with `(rw, relatime, noexec, nosuid)`.
fn remount_rw(target: &Path) {
    let args = vec![
        "-o".to_string(),
        "remount,rw,relatime,noexec,nosuid".to_string(),
        target.display().to_string(),
    ];
    if let Err(e) = run_mount(&args) {
        tracing::error!(target = %target.display(), error = %e, "remount failed");
    }
}
