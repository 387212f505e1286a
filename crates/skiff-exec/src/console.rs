//! Controlling terminal of this process, driven through termios.

use std::{
    io::{self, IsTerminal},
    os::fd::{AsFd, AsRawFd, BorrowedFd},
    sync::{Arc, Mutex, PoisonError},
};

use nix::sys::termios::{self, SetArg, Termios};
use skiff_core::{Console, ConsoleProvider, CoreError, WinSize};
use tokio::{
    signal::unix::{SignalKind, signal},
    sync::mpsc,
};
use tracing::{debug, trace, warn};

type Tty = Arc<dyn AsFd + Send + Sync>;

/// Finds the terminal among the standard streams.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostConsoleProvider;

impl ConsoleProvider for HostConsoleProvider {
    fn current(&self) -> Result<Arc<dyn Console>, CoreError> {
        let tty: Tty = if io::stdin().is_terminal() {
            Arc::new(io::stdin())
        } else if io::stdout().is_terminal() {
            Arc::new(io::stdout())
        } else if io::stderr().is_terminal() {
            Arc::new(io::stderr())
        } else {
            return Err(CoreError::Console(
                "no terminal on stdin, stdout or stderr".into(),
            ));
        };

        debug!(target: "skiff.console", fd = tty.as_fd().as_raw_fd(), "using terminal");
        Ok(Arc::new(HostConsole { tty, saved: Mutex::new(None) }))
    }
}

/// Terminal behind one file descriptor.
pub struct HostConsole {
    tty: Tty,
    saved: Mutex<Option<Termios>>,
}

impl HostConsole {
    pub fn new(tty: impl AsFd + Send + Sync + 'static) -> Self {
        Self {
            tty: Arc::new(tty),
            saved: Mutex::new(None),
        }
    }
}

impl Console for HostConsole {
    fn make_raw(&self) -> Result<(), CoreError> {
        let mut saved = self.saved.lock().unwrap_or_else(PoisonError::into_inner);
        if saved.is_some() {
            return Ok(());
        }

        let fd = self.tty.as_fd();
        let original = termios::tcgetattr(fd).map_err(console_err("tcgetattr"))?;
        let mut raw = original.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(fd, SetArg::TCSANOW, &raw).map_err(console_err("tcsetattr"))?;

        *saved = Some(original);
        Ok(())
    }

    fn reset(&self) -> Result<(), CoreError> {
        let mut saved = self.saved.lock().unwrap_or_else(PoisonError::into_inner);
        match saved.take() {
            Some(term) => termios::tcsetattr(self.tty.as_fd(), SetArg::TCSANOW, &term)
                .map_err(console_err("tcsetattr")),
            None => Ok(()),
        }
    }

    fn size(&self) -> Result<WinSize, CoreError> {
        window_size(self.tty.as_fd()).map_err(console_err("TIOCGWINSZ"))
    }

    fn resize_events(&self) -> Result<mpsc::UnboundedReceiver<WinSize>, CoreError> {
        let mut sigwinch =
            signal(SignalKind::window_change()).map_err(console_err("SIGWINCH handler"))?;
        let (tx, rx) = mpsc::unbounded_channel();
        let tty = Arc::clone(&self.tty);

        tokio::spawn(async move {
            while sigwinch.recv().await.is_some() {
                match window_size(tty.as_fd()) {
                    Ok(size) => {
                        trace!(target: "skiff.console", cols = size.cols, rows = size.rows, "window changed");
                        if tx.send(size).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(target: "skiff.console", error = %e, "failed to read window size"),
                }
            }
        });

        Ok(rx)
    }
}

fn console_err<E: std::fmt::Display>(op: &'static str) -> impl Fn(E) -> CoreError {
    move |e| CoreError::Console(format!("{op}: {e}"))
}

fn window_size(fd: BorrowedFd<'_>) -> io::Result<WinSize> {
    let mut ws = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    // SAFETY: TIOCGWINSZ only writes into the winsize it is handed.
    if unsafe { libc::ioctl(fd.as_raw_fd(), libc::TIOCGWINSZ, &mut ws) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(WinSize {
        cols: ws.ws_col,
        rows: ws.ws_row,
    })
}
