//! Host signal forwarding (sig-proxy).

use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{error::CoreError, runtime::Task};

/// Source of signals received by the host process.
pub trait SignalSource: Send + Sync {
    /// Start receiving signal numbers. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<i32>, CoreError>;
}

/// Relays host signals to a task while running.
///
/// Once [`SignalForwarder::stop`] has returned no further signal reaches the task.
pub struct SignalForwarder {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SignalForwarder {
    pub fn start(source: &dyn SignalSource, task: Arc<dyn Task>) -> Result<Self, CoreError> {
        let mut signals = source.subscribe()?;
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    sig = signals.recv() => {
                        let Some(sig) = sig else { break };
                        debug!(target: "skiff.signal", signal = sig, task = task.id(), "forwarding signal");
                        if let Err(e) = task.kill(sig).await {
                            warn!(target: "skiff.signal", signal = sig, error = %e, "failed to forward signal");
                        }
                    }
                }
            }
            trace!(target: "skiff.signal", "signal forwarding stopped");
        });

        Ok(Self {
            cancel,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop forwarding and wait until the forwarding loop has exited. Idempotent.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            warn!(target: "skiff.signal", error = %e, "signal forwarder panicked");
        }
    }
}

impl Drop for SignalForwarder {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
