use serde::{Deserialize, Serialize};

/// Lifecycle of a task bound to a container.
///
/// `Created → Running → Exited | Detached → Deleted`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskState {
    /// Task exists but its process has not been started.
    Created,
    /// Process is executing.
    Running,
    /// Process has exited and its status is known.
    Exited,
    /// IO was detached; the process keeps running.
    Detached,
    /// Task was deleted from the runtime.
    Deleted,
}

impl TaskState {
    /// Returns `true` if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Deleted)
    }

    /// Returns `true` if the process may still be executing.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskState::Running | TaskState::Detached)
    }

    /// Returns `true` if `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Created, Running)
                | (Created, Deleted)
                | (Running, Exited)
                | (Running, Detached)
                | (Running, Deleted)
                | (Detached, Exited)
                | (Detached, Deleted)
                | (Exited, Deleted)
        )
    }
}
