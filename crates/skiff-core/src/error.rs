use skiff_model::{ModelError, StatusError};
use thiserror::Error;

/// Failure reported by one of the collaborators the orchestrator drives.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("create failed: {0}")]
    Create(String),
    #[error("labels: {0}")]
    Labels(String),
    #[error("task: {0}")]
    Task(String),
    #[error("console: {0}")]
    Console(String),
    #[error("signal: {0}")]
    Signal(String),
    #[error("remove failed: {0}")]
    Remove(String),
    #[error("exit status already requested for this task")]
    WaitAlreadyRequested,
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

/// Why a run did not end with a zero exit code or a detach.
#[derive(Debug, Error)]
pub enum RunError {
    /// Conflicting or invalid options; nothing was created.
    #[error(transparent)]
    Config(#[from] ModelError),
    /// Container creation failed.
    #[error(transparent)]
    Create(CoreError),
    /// The console could not be acquired or switched to raw mode.
    #[error(transparent)]
    Console(CoreError),
    /// Task creation, start or wait failed.
    #[error(transparent)]
    Task(CoreError),
    /// The exit status could not be retrieved.
    #[error(transparent)]
    Status(#[from] StatusError),
    /// The process exited with a nonzero code.
    #[error("exit code: {0}")]
    ExitCode(u32),
    #[error("got a nil IO from the task")]
    NilIo,
    #[error("cancelled")]
    Cancelled,
    #[error("write container id: {0}")]
    Output(#[from] std::io::Error),
}

impl RunError {
    /// Exit code the calling process should use for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::ExitCode(code) => i32::try_from(*code).unwrap_or(i32::MAX),
            _ => 1,
        }
    }
}
