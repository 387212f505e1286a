use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Standard stream that can be attached to a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttachStream {
    Stdin,
    Stdout,
    Stderr,
}

impl AttachStream {
    pub const ALL: [AttachStream; 3] = [Self::Stdin, Self::Stdout, Self::Stderr];

    /// Normalized (uppercase) name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachStream::Stdin => "STDIN",
            AttachStream::Stdout => "STDOUT",
            AttachStream::Stderr => "STDERR",
        }
    }
}

impl fmt::Display for AttachStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttachStream {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STDIN" => Ok(AttachStream::Stdin),
            "STDOUT" => Ok(AttachStream::Stdout),
            "STDERR" => Ok(AttachStream::Stderr),
            _ => Err(ModelError::InvalidAttachStream(s.to_string())),
        }
    }
}
