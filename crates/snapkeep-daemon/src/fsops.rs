use std::fs;
use std::io;
use std::os::unix::fs as unix_fs;
use std::path::{Path, PathBuf};

/// Recursively hard-links every regular file under `source` into the same
/// relative position under `destination`, creating directories as needed.
/// Used by the `hardlink` overlap policy to fan a physical snapshot out into
/// sibling snapshots that share every inode.
pub fn copy_hardlinks(source: &Path, destination: &Path) -> io::Result<()> {
    fs::create_dir_all(destination)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let dest_path = destination.join(entry.file_name());
        if file_type.is_dir() {
            copy_hardlinks(&entry.path(), &dest_path)?;
        } else if file_type.is_symlink() {
            let target = fs::read_link(entry.path())?;
            unix_fs::symlink(target, &dest_path)?;
        } else {
            fs::hard_link(entry.path(), &dest_path)?;
        }
    }
    Ok(())
}

/// Creates a relative symlink at `link_path` pointing at `target` — relative
/// so the aliasing relationship survives the whole repository being moved.
pub fn create_symlink(target: &Path, link_path: &Path) -> io::Result<()> {
    let relative = relative_target(target, link_path);
    unix_fs::symlink(relative, link_path)
}

fn relative_target(target: &Path, link_path: &Path) -> PathBuf {
    let link_dir = link_path.parent().unwrap_or_else(|| Path::new("."));
    if Some(link_dir) == target.parent() {
        PathBuf::from(target.file_name().unwrap_or(target.as_os_str()))
    } else {
        target.to_path_buf()
    }
}

pub fn remove_symlink(link_path: &Path) -> io::Result<()> {
    fs::remove_file(link_path)
}

pub fn remove_recursive(path: &Path) -> io::Result<()> {
    fs::remove_dir_all(path)
}

/// Moves `from` to `to`, falling back to a copy-then-remove if they sit on
/// different filesystems (rare: snapshots live under one repository
/// destination, but mount boundaries inside a destination are possible).
pub fn move_path(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc_exdev()) => {
            copy_recursive(from, to)?;
            fs::remove_dir_all(from)
        }
        Err(e) => Err(e),
    }
}

fn libc_exdev() -> i32 {
    18
}

fn copy_recursive(source: &Path, destination: &Path) -> io::Result<()> {
    fs::create_dir_all(destination)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let dest_path = destination.join(entry.file_name());
        if file_type.is_dir() {
            copy_recursive(&entry.path(), &dest_path)?;
        } else if file_type.is_symlink() {
            let target = fs::read_link(entry.path())?;
            unix_fs::symlink(target, &dest_path)?;
        } else {
            fs::copy(entry.path(), &dest_path)?;
        }
    }
    Ok(())
}
