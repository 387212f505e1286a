use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{AttachStream, DEFAULT_DETACH_KEYS, ModelError};

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Configuration of a single `run` invocation.
///
/// Resolved once from the caller's flags and never mutated by the orchestrator.
/// Call [`RunOptions::validate`] before creating anything.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunOptions {
    /// Start the task and return immediately, printing the container id.
    pub detach: bool,
    /// Remove the container once its task has finished.
    pub rm: bool,
    /// Streams to attach. Empty means "the runtime decides" (all of them when attached).
    pub attach: BTreeSet<AttachStream>,
    /// Keep stdin open.
    pub interactive: bool,
    /// Allocate a terminal for the task.
    pub tty: bool,
    /// Forward host signals to the task (ignored with `tty`).
    pub sig_proxy: bool,
    /// Key sequence the IO layer watches to detach. Passed through untouched.
    pub detach_keys: String,
    /// Namespace handed to the task factory.
    pub namespace: String,
    /// Optional container name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            detach: false,
            rm: false,
            attach: BTreeSet::new(),
            interactive: false,
            tty: false,
            sig_proxy: true,
            detach_keys: DEFAULT_DETACH_KEYS.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            name: None,
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detach(mut self, detach: bool) -> Self {
        self.detach = detach;
        self
    }

    pub fn with_rm(mut self, rm: bool) -> Self {
        self.rm = rm;
        self
    }

    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn with_tty(mut self, tty: bool) -> Self {
        self.tty = tty;
        self
    }

    pub fn with_sig_proxy(mut self, sig_proxy: bool) -> Self {
        self.sig_proxy = sig_proxy;
        self
    }

    pub fn with_detach_keys(mut self, keys: impl Into<String>) -> Self {
        self.detach_keys = keys.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_attach(mut self, stream: AttachStream) -> Self {
        self.attach.insert(stream);
        self
    }

    /// Parse raw `-a` values (case-insensitive) and add them to the attach set.
    ///
    /// Every value is checked; the first invalid one is reported.
    pub fn with_attach_names<I, S>(mut self, names: I) -> Result<Self, ModelError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            self.attach.insert(name.as_ref().parse()?);
        }
        Ok(self)
    }

    /// Check the flag combinations that cannot work together.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.detach && self.rm {
            return Err(ModelError::DetachWithRm);
        }
        if self.detach && !self.attach.is_empty() {
            return Err(ModelError::DetachWithAttach);
        }
        Ok(())
    }
}
