//! Controlling terminal of the current process.
//!
//! Raw mode is a scoped resource: [`ConsoleGuard`] enters it and restores the terminal
//! when dropped, on every exit path including unwinding.

use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{error::CoreError, runtime::Task};

/// Terminal size in character cells.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WinSize {
    pub cols: u16,
    pub rows: u16,
}

pub trait Console: Send + Sync {
    fn make_raw(&self) -> Result<(), CoreError>;

    /// Restore the mode saved before [`Console::make_raw`].
    fn reset(&self) -> Result<(), CoreError>;

    fn size(&self) -> Result<WinSize, CoreError>;

    /// Subscribe to terminal size changes.
    fn resize_events(&self) -> Result<mpsc::UnboundedReceiver<WinSize>, CoreError>;
}

pub trait ConsoleProvider: Send + Sync {
    /// The terminal attached to this process.
    fn current(&self) -> Result<Arc<dyn Console>, CoreError>;
}

/// Console held in raw mode until dropped.
pub struct ConsoleGuard {
    console: Arc<dyn Console>,
}

impl ConsoleGuard {
    /// Acquire the current console and switch it to raw mode.
    ///
    /// If raw mode cannot be entered the console is reset before the error is returned.
    pub fn acquire(provider: &dyn ConsoleProvider) -> Result<Self, CoreError> {
        let guard = Self {
            console: provider.current()?,
        };
        guard.console.make_raw()?;
        debug!(target: "skiff.console", "console in raw mode");
        Ok(guard)
    }

    pub fn console(&self) -> &Arc<dyn Console> {
        &self.console
    }
}

impl Drop for ConsoleGuard {
    fn drop(&mut self) {
        match self.console.reset() {
            Ok(()) => debug!(target: "skiff.console", "console restored"),
            Err(e) => warn!(target: "skiff.console", error = %e, "failed to restore console"),
        }
    }
}

/// Forwards terminal size changes to a task until stopped.
pub struct ResizeRelay {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ResizeRelay {
    /// Send the current size once, then every change. Failures are logged.
    pub fn start(task: Arc<dyn Task>, console: Arc<dyn Console>) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            match console.size() {
                Ok(size) => resize(task.as_ref(), size).await,
                Err(e) => warn!(target: "skiff.console", error = %e, "failed to read console size"),
            }

            let mut events = match console.resize_events() {
                Ok(rx) => rx,
                Err(e) => {
                    warn!(target: "skiff.console", error = %e, "console resize events unavailable");
                    return;
                }
            };

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    ev = events.recv() => match ev {
                        Some(size) => resize(task.as_ref(), size).await,
                        None => break,
                    },
                }
            }
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Stop relaying and wait for the relay to finish. Safe to call more than once.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ResizeRelay {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn resize(task: &dyn Task, size: WinSize) {
    if let Err(e) = task.resize(size).await {
        warn!(target: "skiff.console", cols = size.cols, rows = size.rows, error = %e, "console resize");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockConsole, MockConsoleProvider, MockTask};

    #[test]
    fn guard_resets_on_drop() {
        let console = MockConsole::new();
        let provider = MockConsoleProvider::new(Arc::clone(&console));

        let guard = ConsoleGuard::acquire(&provider).unwrap();
        assert_eq!(console.raw_calls(), 1);
        assert_eq!(console.reset_calls(), 0);

        drop(guard);
        assert_eq!(console.reset_calls(), 1);
    }

    #[test]
    fn guard_resets_when_raw_mode_fails() {
        let console = MockConsole::failing_raw();
        let provider = MockConsoleProvider::new(Arc::clone(&console));

        assert!(ConsoleGuard::acquire(&provider).is_err());
        assert_eq!(console.reset_calls(), 1);
    }

    #[test]
    fn no_reset_without_console() {
        let provider = MockConsoleProvider::unavailable();
        assert!(matches!(
            ConsoleGuard::acquire(&provider),
            Err(CoreError::Console(_))
        ));
    }

    #[tokio::test]
    async fn relay_forwards_initial_size_and_changes() {
        let console = MockConsole::new();
        let task = MockTask::new("t1");

        let mut relay = ResizeRelay::start(task.clone(), console.clone());
        console
            .wait_subscribed()
            .await
            .send(WinSize { cols: 120, rows: 40 })
            .unwrap();
        task.wait_resizes(2).await;
        relay.stop().await;
        relay.stop().await;

        assert_eq!(
            task.resizes(),
            vec![WinSize { cols: 80, rows: 24 }, WinSize { cols: 120, rows: 40 }]
        );
    }
}
