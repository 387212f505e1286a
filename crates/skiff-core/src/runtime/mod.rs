//! Collaborators the orchestrator drives: the container creator, the container handle,
//! the task factory and the task itself.
//!
//! The orchestrator never knows how a container is built or how a process is attached to
//! the host's standard streams; it only sequences these calls.

use std::{collections::BTreeSet, future::Future, pin::Pin, sync::Arc};

use async_trait::async_trait;
use skiff_model::{AttachStream, ExitStatus, Labels, RunOptions};
use tokio::sync::oneshot;

use crate::{
    console::{Console, WinSize},
    error::CoreError,
};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Cleanup handed back by a creator whose creation failed halfway.
pub struct PartialCleanup(Box<dyn FnOnce() -> BoxFuture<()> + Send>);

impl PartialCleanup {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self(Box::new(move || Box::pin(f())))
    }

    pub async fn run(self) {
        (self.0)().await
    }
}

/// Failed container creation, with whatever cleanup the creator needs run.
pub struct CreateFailure {
    pub error: CoreError,
    pub cleanup: Option<PartialCleanup>,
}

impl CreateFailure {
    pub fn with_cleanup(error: CoreError, cleanup: PartialCleanup) -> Self {
        Self {
            error,
            cleanup: Some(cleanup),
        }
    }
}

impl From<CoreError> for CreateFailure {
    fn from(error: CoreError) -> Self {
        Self {
            error,
            cleanup: None,
        }
    }
}

/// Options for container removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Remove even if a task is still attached.
    pub force: bool,
    /// Also remove anonymous volumes.
    pub volumes: bool,
}

impl Default for RemoveOptions {
    fn default() -> Self {
        Self {
            force: true,
            volumes: true,
        }
    }
}

/// Created container.
#[async_trait]
pub trait Container: Send + Sync + 'static {
    fn id(&self) -> &str;

    /// Current labels.
    async fn labels(&self) -> Result<Labels, CoreError>;

    /// Merge `labels` into the container's labels and return the result.
    async fn set_labels(&self, labels: Labels) -> Result<Labels, CoreError>;

    async fn remove(&self, opts: RemoveOptions) -> Result<(), CoreError>;
}

/// Builds containers from run options.
#[async_trait]
pub trait Creator: Send + Sync + 'static {
    async fn create(&self, opts: &RunOptions) -> Result<Arc<dyn Container>, CreateFailure>;
}

/// How the task's standard streams are wired.
#[derive(Clone)]
pub struct IoConfig {
    pub attach: BTreeSet<AttachStream>,
    pub interactive: bool,
    pub tty: bool,
    pub detach: bool,
    /// Console in raw mode, present only for attached TTY runs.
    pub console: Option<Arc<dyn Console>>,
    pub log_uri: Option<String>,
    pub detach_keys: String,
    pub namespace: String,
}

impl IoConfig {
    pub fn from_options(opts: &RunOptions) -> Self {
        Self {
            attach: opts.attach.clone(),
            interactive: opts.interactive,
            tty: opts.tty,
            detach: opts.detach,
            console: None,
            log_uri: None,
            detach_keys: opts.detach_keys.clone(),
            namespace: opts.namespace.clone(),
        }
    }

    pub fn with_console(mut self, console: Option<Arc<dyn Console>>) -> Self {
        self.console = console;
        self
    }

    pub fn with_log_uri(mut self, log_uri: Option<String>) -> Self {
        self.log_uri = log_uri;
        self
    }

    /// Returns `true` if `stream` is wired to the host.
    ///
    /// Without an explicit `-a` selection stdout and stderr are attached; stdin is
    /// attached only for interactive runs. A detached run attaches nothing.
    pub fn attaches(&self, stream: AttachStream) -> bool {
        if self.detach {
            return false;
        }
        if stream == AttachStream::Stdin && self.interactive {
            return true;
        }
        if self.attach.is_empty() {
            return stream != AttachStream::Stdin;
        }
        self.attach.contains(&stream)
    }
}

/// Creates tasks bound to containers.
#[async_trait]
pub trait Runtime: Send + Sync + 'static {
    /// Create (but do not start) the task for `container`.
    ///
    /// The runtime keeps `detach` and fires it when the user types the detach sequence.
    async fn new_task(
        &self,
        container: Arc<dyn Container>,
        io: IoConfig,
        detach: DetachNotifier,
    ) -> Result<Arc<dyn Task>, CoreError>;
}

/// Started or startable runtime process bound to one container.
#[async_trait]
pub trait Task: Send + Sync + 'static {
    fn id(&self) -> &str;

    fn pid(&self) -> Option<u32>;

    async fn start(&self) -> Result<(), CoreError>;

    /// Exit-status feed. Fires once; may be requested only once per task.
    async fn wait(&self) -> Result<oneshot::Receiver<ExitStatus>, CoreError>;

    /// IO handle, if the task has attached streams.
    fn io(&self) -> Option<Arc<dyn TaskIo>>;

    async fn kill(&self, signal: i32) -> Result<(), CoreError>;

    async fn resize(&self, size: WinSize) -> Result<(), CoreError>;

    /// Delete the task from the runtime, returning its status if it had exited.
    async fn delete(&self) -> Result<Option<ExitStatus>, CoreError>;
}

/// Task IO plumbing.
#[async_trait]
pub trait TaskIo: Send + Sync {
    /// Resolves once every stream is closed and flushed.
    async fn wait(&self);
}

/// Sending half of the detach notification. Fires at most once.
pub struct DetachNotifier(oneshot::Sender<()>);

impl DetachNotifier {
    /// Signal the detach. Returns `false` if nobody is listening any more.
    pub fn notify(self) -> bool {
        self.0.send(()).is_ok()
    }
}

/// Receiving half of the detach notification.
pub struct DetachReceiver(oneshot::Receiver<()>);

impl DetachReceiver {
    /// Resolves when the notifier fires. Never resolves if the notifier is dropped unfired.
    pub async fn detached(self) {
        if self.0.await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub fn detach_channel() -> (DetachNotifier, DetachReceiver) {
    let (tx, rx) = oneshot::channel();
    (DetachNotifier(tx), DetachReceiver(rx))
}
