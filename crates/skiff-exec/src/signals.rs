//! Host signals eligible for forwarding.

use nix::sys::signal::Signal;
use skiff_core::{CoreError, SignalSource};
use tokio::{
    signal::unix::{SignalKind, signal},
    sync::mpsc,
};
use tracing::trace;

/// Signals relayed to the task. SIGCHLD, SIGURG and SIGWINCH are left to the host.
pub const FORWARDED: &[Signal] = &[
    Signal::SIGHUP,
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTERM,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
    Signal::SIGALRM,
    Signal::SIGCONT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
    Signal::SIGPIPE,
    Signal::SIGPROF,
    Signal::SIGXCPU,
    Signal::SIGXFSZ,
    Signal::SIGVTALRM,
];

/// Receives [`FORWARDED`] signals through tokio's signal driver.
///
/// Once a handler is installed the signal no longer has its default effect on this process,
/// so subscribing is what turns Ctrl-C into "interrupt the container".
#[derive(Clone, Copy, Debug, Default)]
pub struct HostSignals;

impl SignalSource for HostSignals {
    fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<i32>, CoreError> {
        let (tx, rx) = mpsc::unbounded_channel();

        for &sig in FORWARDED {
            let signo = sig as i32;
            let mut stream = signal(SignalKind::from_raw(signo))
                .map_err(|e| CoreError::Signal(format!("install handler for {sig}: {e}")))?;
            let tx = tx.clone();

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tx.closed() => break,
                        got = stream.recv() => {
                            if got.is_none() || tx.send(signo).is_err() {
                                break;
                            }
                            trace!(target: "skiff.signal", signal = signo, "received");
                        }
                    }
                }
            });
        }

        Ok(rx)
    }
}
