//! Run orchestrator: container creation → task start → attach/detach → wait → cleanup.
//!
//! The orchestrator owns the container and the task for the duration of one call to
//! [`Orchestrator::run`] and is the only thing driving the task's transitions. Everything
//! that must happen after the outcome is known (error labelling, auto-removal, stopping
//! background relays, restoring the console) goes through an ordered cleanup list that is
//! unwound once, with the final result in hand.

mod cleanup;

use std::{
    future::Future,
    io::Write,
    sync::{Arc, Mutex},
};

use skiff_model::{ContainerId, ExitStatus, RunOptions, labels};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    console::{ConsoleGuard, ConsoleProvider, ResizeRelay},
    error::RunError,
    runtime::{Container, CreateFailure, Creator, IoConfig, Runtime, Task, detach_channel},
    signal::{SignalForwarder, SignalSource},
};
use cleanup::{Cleanup, Step};

/// How a successful run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// The task exited with code 0.
    Exited,
    /// The user detached; the container keeps running.
    Detached,
    /// Started with `detach`; the id was printed and nothing was awaited.
    Background { id: ContainerId },
}

pub struct Orchestrator {
    creator: Arc<dyn Creator>,
    runtime: Arc<dyn Runtime>,
    console: Arc<dyn ConsoleProvider>,
    signals: Arc<dyn SignalSource>,
    stdout: Mutex<Box<dyn Write + Send>>,
}

impl Orchestrator {
    pub fn new(
        creator: Arc<dyn Creator>,
        runtime: Arc<dyn Runtime>,
        console: Arc<dyn ConsoleProvider>,
        signals: Arc<dyn SignalSource>,
    ) -> Self {
        Self {
            creator,
            runtime,
            console,
            signals,
            stdout: Mutex::new(Box::new(std::io::stdout())),
        }
    }

    /// Where the container id is printed in detached mode.
    pub fn with_stdout(mut self, out: impl Write + Send + 'static) -> Self {
        self.stdout = Mutex::new(Box::new(out));
        self
    }

    /// Run one container to completion (or detachment).
    ///
    /// `cancel` aborts creation and task start; once the task runs, interrupts reach it
    /// through signal forwarding instead.
    #[instrument(level = "debug", skip_all, fields(detach = opts.detach, rm = opts.rm, tty = opts.tty))]
    pub async fn run(
        &self,
        opts: &RunOptions,
        cancel: &CancellationToken,
    ) -> Result<Disposition, RunError> {
        opts.validate()?;

        let container = self.create(opts, cancel).await?;

        let mut cleanup = Cleanup::new(Arc::clone(&container));
        if opts.rm {
            cleanup.push(Step::AutoRemove);
        }
        cleanup.push(Step::ErrorLabel);

        let result = self.drive(opts, &container, &mut cleanup, cancel).await;
        match &result {
            Ok(disposition) => debug!(target: "skiff.run", id = container.id(), ?disposition, "run finished"),
            Err(e) => debug!(target: "skiff.run", id = container.id(), error = %e, "run failed"),
        }
        cleanup.unwind(&result).await;
        result
    }

    async fn create(
        &self,
        opts: &RunOptions,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn Container>, RunError> {
        match cancellable(cancel, self.creator.create(opts)).await? {
            Ok(container) => {
                info!(target: "skiff.run", id = container.id(), "container created");
                Ok(container)
            }
            Err(CreateFailure { error, cleanup }) => {
                if let Some(gc) = cleanup {
                    debug!(target: "skiff.run", "running partial cleanup of failed creation");
                    gc.run().await;
                }
                Err(RunError::Create(error))
            }
        }
    }

    async fn drive(
        &self,
        opts: &RunOptions,
        container: &Arc<dyn Container>,
        cleanup: &mut Cleanup,
        cancel: &CancellationToken,
    ) -> Result<Disposition, RunError> {
        let console = if opts.tty && !opts.detach {
            let guard = ConsoleGuard::acquire(self.console.as_ref()).map_err(RunError::Console)?;
            let console = Arc::clone(guard.console());
            cleanup.push(Step::RestoreConsole(guard));
            Some(console)
        } else {
            None
        };

        let log_uri = container
            .labels()
            .await
            .map_err(RunError::Task)?
            .remove(labels::LOG_URI);

        let (notifier, detached) = detach_channel();
        let io = IoConfig::from_options(opts)
            .with_console(console.clone())
            .with_log_uri(log_uri);
        let task = cancellable(
            cancel,
            self.runtime.new_task(Arc::clone(container), io, notifier),
        )
        .await?
        .map_err(RunError::Task)?;

        cancellable(cancel, task.start())
            .await?
            .map_err(RunError::Task)?;
        info!(target: "skiff.run", id = container.id(), task = task.id(), pid = ?task.pid(), "task started");

        if opts.detach {
            let id = container.id().to_string();
            let mut out = self.stdout.lock().unwrap_or_else(|p| p.into_inner());
            writeln!(out, "{id}")?;
            out.flush()?;
            return Ok(Disposition::Background { id });
        }

        if let Some(console) = console {
            cleanup.push(Step::StopResize(ResizeRelay::start(
                Arc::clone(&task),
                console,
            )));
        } else if opts.sig_proxy {
            match SignalForwarder::start(self.signals.as_ref(), Arc::clone(&task)) {
                Ok(forwarder) => cleanup.push(Step::StopSignals(forwarder)),
                Err(e) => warn!(target: "skiff.run", error = %e, "signal forwarding unavailable"),
            }
        }

        let status = task.wait().await.map_err(RunError::Task)?;

        tokio::select! {
            _ = detached.detached() => {
                debug!(target: "skiff.run", id = container.id(), "detach requested");
                let io = task.io().ok_or(RunError::NilIo)?;
                io.wait().await;
                info!(target: "skiff.run", id = container.id(), "detached");
                Ok(Disposition::Detached)
            }
            status = status => {
                let status = status
                    .unwrap_or_else(|_| ExitStatus::failed("task exit status channel closed"));
                finish(task.as_ref(), opts, status).await
            }
        }
    }
}

async fn finish(
    task: &dyn Task,
    opts: &RunOptions,
    status: ExitStatus,
) -> Result<Disposition, RunError> {
    if opts.rm
        && let Err(e) = task.delete().await
    {
        error!(target: "skiff.run", task = task.id(), error = %e, "failed to delete task");
    }

    let code = status.result()?;
    debug!(target: "skiff.run", task = task.id(), code, "task exited");
    if code != 0 {
        return Err(RunError::ExitCode(code));
    }
    Ok(Disposition::Exited)
}

async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, RunError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RunError::Cancelled),
        out = fut => Ok(out),
    }
}
