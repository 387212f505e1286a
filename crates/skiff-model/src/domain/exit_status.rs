use thiserror::Error;
use time::OffsetDateTime;

/// Exit code reported when the real one could not be obtained.
pub const UNKNOWN_EXIT_STATUS: u32 = 255;

/// Failure to obtain a task's exit status.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct StatusError(pub String);

/// Result of a completed task.
///
/// Produced once per task, unless the task is deleted before it completes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExitStatus {
    code: u32,
    exited_at: Option<OffsetDateTime>,
    error: Option<StatusError>,
}

impl ExitStatus {
    /// Status of a task that exited with `code` just now.
    pub fn new(code: u32) -> Self {
        Self {
            code,
            exited_at: Some(OffsetDateTime::now_utc()),
            error: None,
        }
    }

    /// Status whose retrieval failed.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            code: UNKNOWN_EXIT_STATUS,
            exited_at: None,
            error: Some(StatusError(reason.into())),
        }
    }

    pub fn with_exited_at(mut self, at: OffsetDateTime) -> Self {
        self.exited_at = Some(at);
        self
    }

    #[inline]
    pub fn code(&self) -> u32 {
        self.code
    }

    #[inline]
    pub fn exited_at(&self) -> Option<OffsetDateTime> {
        self.exited_at
    }

    #[inline]
    pub fn error(&self) -> Option<&StatusError> {
        self.error.as_ref()
    }

    /// Exit code, or the error that prevented reading it.
    pub fn result(&self) -> Result<u32, StatusError> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(self.code),
        }
    }
}
