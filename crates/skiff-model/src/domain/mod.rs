mod attach;
pub use attach::AttachStream;

mod run_options;
pub use run_options::{DEFAULT_NAMESPACE, RunOptions};

mod detach_keys;
pub use detach_keys::{DEFAULT_DETACH_KEYS, DetachKeys};

mod exit_status;
pub use exit_status::{ExitStatus, StatusError, UNKNOWN_EXIT_STATUS};

mod task_state;
pub use task_state::TaskState;

/// Container labels: unique keys, order irrelevant.
pub type Labels = std::collections::HashMap<String, String>;

/// Container identifier.
pub type ContainerId = String;
