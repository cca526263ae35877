/// Core types shared across the taskbox system
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Final status of one sandbox run, as reported to the caller.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The VM layer hit the hard wall-clock timeout.
    Timeout,
    /// The VM exited cleanly and the task reported exit code 0.
    Finished,
    /// Nonzero or unextractable exit code, VM process failure, or launch failure.
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Timeout => "timeout",
            RunStatus::Finished => "finished",
            RunStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Named artifacts pulled out of a run's output archive.
///
/// Every field except `vm_log` is optional inside the archive; a missing or
/// unreadable optional entry yields an empty string, never an error.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OutputBundle {
    pub test_output: String,
    pub stdout: String,
    pub stderr: String,
    pub valgrind: String,
    pub validations: String,
    pub vm_log: String,
}

/// Classified result of one sandbox run, delivered exactly once per
/// accepted `start()`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: RunStatus,
    pub exit_code: Option<i32>,
    pub output: OutputBundle,
}

/// Custom error types for taskbox
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Slot is busy with another run")]
    Busy,
}

impl From<nix::errno::Errno> for SandboxError {
    fn from(err: nix::errno::Errno) -> Self {
        SandboxError::Process(err.to_string())
    }
}

/// Result type alias for taskbox operations
pub type Result<T> = std::result::Result<T, SandboxError>;
