use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("invalid stream specified with -a flag. Valid streams are STDIN, STDOUT, and STDERR")]
    InvalidAttachStream(String),
    #[error("flags -d and --rm cannot be specified together")]
    DetachWithRm,
    #[error("flags -d and -a cannot be specified together")]
    DetachWithAttach,
    #[error("invalid detach keys {keys:?}: unknown character {key:?}")]
    InvalidDetachKeys { keys: String, key: String },
    #[error("invalid value for label {key}: {reason}")]
    InvalidLabel { key: &'static str, reason: String },
}
