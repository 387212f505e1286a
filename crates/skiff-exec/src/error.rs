use skiff_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("signal {signal} not delivered: {reason}")]
    Signal { signal: i32, reason: String },
    #[error("task not started")]
    NotStarted,
    #[error("task already started")]
    AlreadyStarted,
    #[error("unsupported by the process runtime: {0}")]
    Unsupported(&'static str),
    #[error("container {0} not found")]
    NotFound(String),
}

pub type ExecResult<T> = Result<T, ExecError>;

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}

impl From<ExecError> for CoreError {
    fn from(e: ExecError) -> Self {
        match e {
            ExecError::Unsupported(what) => CoreError::Unsupported(what),
            ExecError::Signal { .. } => CoreError::Signal(e.to_string()),
            ExecError::NotFound(_) => CoreError::Remove(e.to_string()),
            ExecError::Spawn(_)
            | ExecError::Io(_)
            | ExecError::NotStarted
            | ExecError::AlreadyStarted => CoreError::Task(e.to_string()),
        }
    }
}
