use std::sync::Arc;

use skiff_model::{Labels, labels};
use tracing::{debug, error, warn};

use crate::{
    console::{ConsoleGuard, ResizeRelay},
    error::RunError,
    run::Disposition,
    runtime::{Container, RemoveOptions},
    signal::SignalForwarder,
};

/// Deferred work, unwound in reverse registration order once the run's result is known.
pub(crate) enum Step {
    /// Record the error text on the container if the run failed.
    ErrorLabel,
    /// Remove the container unless the run ended detached.
    AutoRemove,
    RestoreConsole(ConsoleGuard),
    StopResize(ResizeRelay),
    StopSignals(SignalForwarder),
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::ErrorLabel => "error-label",
            Step::AutoRemove => "auto-remove",
            Step::RestoreConsole(_) => "restore-console",
            Step::StopResize(_) => "stop-resize",
            Step::StopSignals(_) => "stop-signals",
        }
    }
}

/// Ordered cleanup list of one run.
///
/// If it is dropped without [`Cleanup::unwind`] (a panic), only the `Drop` impls run:
/// the console is restored and background loops are cancelled without being joined.
pub(crate) struct Cleanup {
    container: Arc<dyn Container>,
    steps: Vec<Step>,
}

impl Cleanup {
    pub(crate) fn new(container: Arc<dyn Container>) -> Self {
        Self {
            container,
            steps: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, step: Step) {
        debug!(target: "skiff.run", step = step.name(), "cleanup registered");
        self.steps.push(step);
    }

    pub(crate) async fn unwind(mut self, result: &Result<Disposition, RunError>) {
        while let Some(step) = self.steps.pop() {
            debug!(target: "skiff.run", step = step.name(), "cleanup");
            match step {
                Step::StopSignals(mut forwarder) => forwarder.stop().await,
                Step::StopResize(mut relay) => relay.stop().await,
                Step::RestoreConsole(guard) => drop(guard),
                Step::ErrorLabel => {
                    if let Err(err) = result {
                        self.label_error(err).await;
                    }
                }
                Step::AutoRemove => match result {
                    Ok(Disposition::Detached | Disposition::Background { .. }) => {
                        debug!(target: "skiff.run", id = self.container.id(), "detached; auto-remove skipped");
                    }
                    _ => self.remove().await,
                },
            }
        }
    }

    async fn label_error(&self, err: &RunError) {
        let text = err.to_string();
        let update = Labels::from([(labels::ERROR.to_string(), text)]);
        if let Err(e) = self.container.set_labels(update).await {
            warn!(target: "skiff.run", id = self.container.id(), error = %e, "failed to set error label");
        }
    }

    async fn remove(&self) {
        let id = self.container.id();
        match self.container.remove(RemoveOptions::default()).await {
            Ok(()) => debug!(target: "skiff.run", id, "container removed"),
            Err(e) => error!(target: "skiff.run", id, error = %e, "failed to remove container"),
        }
    }
}
