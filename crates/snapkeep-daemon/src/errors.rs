use std::path::PathBuf;

use thiserror::Error;

/// Stable process exit codes. Values are part of the external contract —
/// do not renumber once assigned.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const KEYBOARD_INTERRUPT: i32 = 1;
    pub const CONFIG_FILE_NOT_FOUND: i32 = 2;
    pub const INVALID_CONFIG_FILE: i32 = 3;
    pub const INCLUDE_EXCLUDE_FILE_NOT_FOUND: i32 = 4;
    pub const INVALID_DESTINATION: i32 = 5;
    pub const NO_MOUNTPOINT_CREATE: i32 = 6;
    pub const SYNC_FAILED: i32 = 7;
}

/// Errors that abort startup before the scheduler loop ever begins, each
/// mapped to one of the exit codes above.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("config file not found: {0}")]
    ConfigFileNotFound(PathBuf),

    #[error("invalid config file: {0}")]
    InvalidConfig(String),

    #[error("missing required key \"{key}\" in section [{section}]")]
    MissingKey { section: String, key: String },

    #[error("filter file \"{0}\" not found")]
    FilterFileNotFound(PathBuf),

    #[error("filter file \"{0}\" is not a regular file")]
    FilterFileInvalid(PathBuf),

    #[error("destination \"{0}\" exists but is not a directory")]
    InvalidDestination(PathBuf),

    #[error("destination \"{0}\" does not exist and auto-create is disabled")]
    DestinationMissing(PathBuf),

    #[error("key \"mountpoint_ro_create\" required when \"mountpoint_ro\" is set")]
    NoMountpointCreate,

    #[error("mountpoint \"{0}\" does not exist and auto-create is disabled")]
    MountpointMissing(PathBuf),

    #[error("invalid partition specification: {0}")]
    InvalidPartitionSpec(String),
}

impl StartupError {
    pub fn exit_code(&self) -> i32 {
        match self {
            StartupError::ConfigFileNotFound(_) => exit_code::CONFIG_FILE_NOT_FOUND,
            StartupError::InvalidConfig(_)
            | StartupError::MissingKey { .. }
            | StartupError::InvalidPartitionSpec(_) => exit_code::INVALID_CONFIG_FILE,
            StartupError::FilterFileNotFound(_) | StartupError::FilterFileInvalid(_) => {
                exit_code::INCLUDE_EXCLUDE_FILE_NOT_FOUND
            }
            StartupError::InvalidDestination(_) => exit_code::INVALID_DESTINATION,
            // Not a startup-abort condition — the caller skips the repository
            // and keeps going, so this code is never actually surfaced to
            // process exit; it exists so `?` still type-checks uniformly.
            StartupError::DestinationMissing(_) => exit_code::INVALID_DESTINATION,
            StartupError::NoMountpointCreate | StartupError::MountpointMissing(_) => {
                exit_code::NO_MOUNTPOINT_CREATE
            }
        }
    }
}
