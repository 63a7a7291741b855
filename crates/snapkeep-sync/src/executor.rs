use std::process::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync tool exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
    #[error("sync tool binary not found")]
    NotFound,
    #[error("io error launching sync tool: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub stdout: String,
    pub stderr: String,
}

/// Synchronous executor for the external file-sync tool (rsync). Each call
/// spawns a fresh process and blocks until it exits — the scheduler never
/// invokes it concurrently, so there is no persistent child handle or
/// interior mutability to manage.
pub struct SyncExecutor {
    bin: String,
}

impl SyncExecutor {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// Run the sync tool with `args`, returning `Ok` only on exit code 0.
    /// Any other exit code is `SyncError::Failed` — the caller is
    /// responsible for logging stderr at critical level and aborting the
    /// whole daemon; this executor only reports it.
    pub fn run(&self, args: &[String]) -> Result<SyncOutcome, SyncError> {
        let output = Command::new(&self.bin).args(args).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SyncError::NotFound
            } else {
                SyncError::Io(e)
            }
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(SyncError::Failed {
                code: output.status.code(),
                stderr,
            });
        }

        Ok(SyncOutcome { stdout, stderr })
    }
}
