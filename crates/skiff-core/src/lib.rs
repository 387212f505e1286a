pub mod error;
pub use error::{CoreError, RunError};

pub mod console;
pub use console::{Console, ConsoleGuard, ConsoleProvider, ResizeRelay, WinSize};

pub mod runtime;
pub use runtime::{
    BoxFuture, Container, CreateFailure, Creator, DetachNotifier, DetachReceiver, IoConfig,
    PartialCleanup, RemoveOptions, Runtime, Task, TaskIo, detach_channel,
};

pub mod signal;
pub use signal::{SignalForwarder, SignalSource};

pub mod run;
pub use run::{Disposition, Orchestrator};

#[cfg(test)]
mod testing;
