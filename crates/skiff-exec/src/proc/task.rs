use std::{
    io::Read,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use nix::sys::signal::Signal;
use skiff_core::{CoreError, DetachNotifier, Task, TaskIo, WinSize, detach_channel};
use skiff_model::{DetachKeys, ExitStatus, TaskState};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    process::{ChildStdin, Command},
    sync::oneshot,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{
    detach::{DetachScanner, copy_input},
    input::ThreadReader,
};
use crate::{
    error::ExecError,
    util::{exit_code_of, send_signal},
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Lifecycle {
    state: TaskState,
    pid: Option<u32>,
    status: Option<ExitStatus>,
    waiter: Option<oneshot::Sender<ExitStatus>>,
    wait_requested: bool,
    /// Input of a detached process, held so it does not see EOF.
    parked_stdin: Option<ChildStdin>,
}

impl Lifecycle {
    fn advance(&mut self, next: TaskState) {
        if self.state.can_transition_to(next) {
            self.state = next;
        } else {
            trace!(target: "skiff.exec.proc", from = ?self.state, to = ?next, "transition ignored");
        }
    }

    fn exited(&mut self, status: ExitStatus) {
        self.advance(TaskState::Exited);
        if let Some(tx) = self.waiter.take() {
            let _ = tx.send(status.clone());
        }
        self.status = Some(status);
        self.parked_stdin = None;
    }
}

/// Child process of a process container.
///
/// Detaching only ends the attachment inside this process. The child's input and the
/// drain of its output are held by skiff, so once skiff exits a detached child sees EOF
/// on stdin and `SIGPIPE` on its next write to an attached stream.
pub struct ProcTask {
    id: String,
    keys: DetachKeys,
    command: Mutex<Option<Command>>,
    detach: Mutex<Option<DetachNotifier>>,
    life: Arc<Mutex<Lifecycle>>,
    io: Mutex<Option<Arc<ProcIo>>>,
    input: Mutex<Option<Box<dyn Read + Send>>>,
}

impl ProcTask {
    pub(crate) fn new(id: &str, command: Command, keys: DetachKeys, detach: DetachNotifier) -> Self {
        Self {
            id: id.to_string(),
            keys,
            command: Mutex::new(Some(command)),
            detach: Mutex::new(Some(detach)),
            life: Arc::new(Mutex::new(Lifecycle {
                state: TaskState::Created,
                pid: None,
                status: None,
                waiter: None,
                wait_requested: false,
                parked_stdin: None,
            })),
            io: Mutex::new(None),
            input: Mutex::new(None),
        }
    }

    /// Read attached input from `input` instead of this process's stdin.
    pub fn with_input(self, input: impl Read + Send + 'static) -> Self {
        *lock(&self.input) = Some(Box::new(input));
        self
    }

    pub fn state(&self) -> TaskState {
        lock(&self.life).state
    }

    fn spawn_stdin(
        &self,
        stdin: ChildStdin,
        exited: CancellationToken,
        detached: CancellationToken,
    ) -> std::io::Result<JoinHandle<()>> {
        let input = lock(&self.input)
            .take()
            .unwrap_or_else(|| Box::new(std::io::stdin()) as Box<dyn Read + Send>);
        let reader = ThreadReader::spawn(input)?;
        let notifier = lock(&self.detach)
            .take()
            .unwrap_or_else(|| detach_channel().0);
        let scanner = DetachScanner::new(self.keys.as_bytes());
        let life = Arc::clone(&self.life);

        Ok(tokio::spawn(async move {
            let parked = copy_input(reader, stdin, scanner, notifier, exited).await;
            if let Some(stdin) = parked {
                let mut life = lock(&life);
                life.advance(TaskState::Detached);
                life.parked_stdin = Some(stdin);
                detached.cancel();
            }
        }))
    }
}

/// Copy child output to the host until EOF or detach. After a detach the rest of the
/// output is drained and discarded so the process never blocks on a full pipe.
fn spawn_output<R, W>(mut src: R, mut dst: W, detached: CancellationToken) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = detached.cancelled() => {
                tokio::spawn(async move {
                    let _ = tokio::io::copy(&mut src, &mut tokio::io::sink()).await;
                });
            }
            res = tokio::io::copy(&mut src, &mut dst) => {
                if let Err(e) = res {
                    debug!(target: "skiff.exec.proc", error = %e, "output copy failed");
                }
            }
        }
    })
}

#[async_trait]
impl Task for ProcTask {
    fn id(&self) -> &str {
        &self.id
    }

    fn pid(&self) -> Option<u32> {
        lock(&self.life).pid
    }

    async fn start(&self) -> Result<(), CoreError> {
        let mut cmd = lock(&self.command)
            .take()
            .ok_or(ExecError::AlreadyStarted)?;
        let mut child = cmd.spawn().map_err(|e| ExecError::Spawn(e.to_string()))?;
        let pid = child.id();
        {
            let mut life = lock(&self.life);
            life.pid = pid;
            life.advance(TaskState::Running);
        }

        let exited = CancellationToken::new();
        let detached = CancellationToken::new();
        let mut copiers = Vec::new();
        if let Some(stdin) = child.stdin.take() {
            match self.spawn_stdin(stdin, exited.clone(), detached.clone()) {
                Ok(copier) => copiers.push(copier),
                Err(e) => warn!(target: "skiff.exec.proc", error = %e, "input not attached"),
            }
        }
        if let Some(out) = child.stdout.take() {
            copiers.push(spawn_output(out, tokio::io::stdout(), detached.clone()));
        }
        if let Some(err) = child.stderr.take() {
            copiers.push(spawn_output(err, tokio::io::stderr(), detached.clone()));
        }
        *lock(&self.io) = Some(Arc::new(ProcIo {
            copiers: Mutex::new(copiers),
        }));

        let life = Arc::clone(&self.life);
        let id = self.id.clone();
        tokio::spawn(async move {
            let status = match child.wait().await {
                Ok(s) => ExitStatus::new(exit_code_of(s)),
                Err(e) => ExitStatus::failed(format!("wait: {e}")),
            };
            debug!(target: "skiff.exec.proc", %id, code = status.code(), "process exited");
            exited.cancel();
            lock(&life).exited(status);
        });

        info!(target: "skiff.exec.proc", id = %self.id, ?pid, "process started");
        Ok(())
    }

    async fn wait(&self) -> Result<oneshot::Receiver<ExitStatus>, CoreError> {
        let mut life = lock(&self.life);
        if life.wait_requested {
            return Err(CoreError::WaitAlreadyRequested);
        }
        life.wait_requested = true;

        let (tx, rx) = oneshot::channel();
        match &life.status {
            Some(status) => {
                let _ = tx.send(status.clone());
            }
            None => life.waiter = Some(tx),
        }
        Ok(rx)
    }

    fn io(&self) -> Option<Arc<dyn TaskIo>> {
        lock(&self.io).clone().map(|io| io as Arc<dyn TaskIo>)
    }

    async fn kill(&self, signal: i32) -> Result<(), CoreError> {
        let life = lock(&self.life);
        match life.pid {
            None => Err(ExecError::NotStarted.into()),
            Some(pid) if life.state.is_active() && life.status.is_none() => {
                trace!(target: "skiff.exec.proc", pid, signal, "kill");
                Ok(send_signal(pid, signal)?)
            }
            Some(_) => Err(ExecError::Signal {
                signal,
                reason: format!("process is {:?}", life.state),
            }
            .into()),
        }
    }

    async fn resize(&self, _size: WinSize) -> Result<(), CoreError> {
        Err(ExecError::Unsupported("resize").into())
    }

    async fn delete(&self) -> Result<Option<ExitStatus>, CoreError> {
        let mut life = lock(&self.life);
        if life.state.is_terminal() {
            return Ok(life.status.clone());
        }
        if let Some(pid) = life.pid
            && life.state.is_active()
            && life.status.is_none()
            && let Err(e) = send_signal(pid, Signal::SIGKILL as i32)
        {
            warn!(target: "skiff.exec.proc", pid, error = %e, "failed to kill process on delete");
        }
        life.parked_stdin = None;
        life.advance(TaskState::Deleted);
        debug!(target: "skiff.exec.proc", id = %self.id, "task deleted");
        Ok(life.status.clone())
    }
}

/// Stream copiers of a started [`ProcTask`].
pub struct ProcIo {
    copiers: Mutex<Vec<JoinHandle<()>>>,
}

#[async_trait]
impl TaskIo for ProcIo {
    async fn wait(&self) {
        let copiers = std::mem::take(&mut *lock(&self.copiers));
        for handle in copiers {
            if let Err(e) = handle.await {
                warn!(target: "skiff.exec.proc", error = %e, "stream copier panicked");
            }
        }
    }
}
