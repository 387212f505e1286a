mod error;
pub use error::{ExecError, ExecResult};

pub mod util;

pub mod console;
pub use console::{HostConsole, HostConsoleProvider};

pub mod signals;
pub use signals::HostSignals;

#[cfg(feature = "proc")]
pub mod proc;
#[cfg(feature = "proc")]
pub use proc::{ProcContainer, ProcCreator, ProcRuntime, ProcSpec, ProcStore, ProcTask};

pub mod prelude {
    pub use crate::error::{ExecError, ExecResult};
    pub use crate::{HostConsoleProvider, HostSignals};
    #[cfg(feature = "proc")]
    pub use crate::{ProcCreator, ProcRuntime, ProcSpec, ProcStore};
}
