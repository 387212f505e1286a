//! In-memory collaborators for orchestrator tests.

use std::{
    io::Write,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use skiff_model::{ExitStatus, Labels, RunOptions};
use tokio::sync::{mpsc, oneshot};

use crate::{
    console::{Console, ConsoleProvider, WinSize},
    error::CoreError,
    runtime::{
        Container, CreateFailure, Creator, DetachNotifier, IoConfig, PartialCleanup,
        RemoveOptions, Runtime, Task, TaskIo,
    },
    signal::SignalSource,
};

/// Poll `cond` until it holds; panics after a second.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap()
}

pub struct MockContainer {
    id: String,
    labels: Mutex<Labels>,
    label_writes: Mutex<Vec<Labels>>,
    calls: Mutex<Vec<&'static str>>,
    removed: AtomicUsize,
    fail_remove: AtomicBool,
    fail_set_labels: AtomicBool,
}

impl MockContainer {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            labels: Mutex::new(Labels::new()),
            label_writes: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            removed: AtomicUsize::new(0),
            fail_remove: AtomicBool::new(false),
            fail_set_labels: AtomicBool::new(false),
        })
    }

    pub fn with_label(self: Arc<Self>, key: &str, value: &str) -> Arc<Self> {
        lock(&self.labels).insert(key.to_string(), value.to_string());
        self
    }

    pub fn fail_remove(&self) {
        self.fail_remove.store(true, Ordering::SeqCst);
    }

    pub fn fail_set_labels(&self) {
        self.fail_set_labels.store(true, Ordering::SeqCst);
    }

    pub fn removed(&self) -> usize {
        self.removed.load(Ordering::SeqCst)
    }

    pub fn label_writes(&self) -> Vec<Labels> {
        lock(&self.label_writes).clone()
    }

    pub fn label(&self, key: &str) -> Option<String> {
        lock(&self.labels).get(key).cloned()
    }

    /// Mutating calls in the order they arrived.
    pub fn calls(&self) -> Vec<&'static str> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl Container for MockContainer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn labels(&self) -> Result<Labels, CoreError> {
        Ok(lock(&self.labels).clone())
    }

    async fn set_labels(&self, labels: Labels) -> Result<Labels, CoreError> {
        lock(&self.calls).push("set_labels");
        lock(&self.label_writes).push(labels.clone());
        if self.fail_set_labels.load(Ordering::SeqCst) {
            return Err(CoreError::Labels("store unavailable".into()));
        }
        let mut current = lock(&self.labels);
        current.extend(labels);
        Ok(current.clone())
    }

    async fn remove(&self, _opts: RemoveOptions) -> Result<(), CoreError> {
        lock(&self.calls).push("remove");
        self.removed.fetch_add(1, Ordering::SeqCst);
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(CoreError::Remove("container is gone".into()));
        }
        Ok(())
    }
}

pub struct MockCreator {
    container: Arc<MockContainer>,
    fail: AtomicBool,
    calls: AtomicUsize,
    gc_runs: Arc<AtomicUsize>,
}

impl MockCreator {
    pub fn new(container: Arc<MockContainer>) -> Arc<Self> {
        Arc::new(Self {
            container,
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            gc_runs: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Fail creation and hand back a partial cleanup.
    pub fn failing(container: Arc<MockContainer>) -> Arc<Self> {
        let creator = Self::new(container);
        creator.fail.store(true, Ordering::SeqCst);
        creator
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn gc_runs(&self) -> usize {
        self.gc_runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Creator for MockCreator {
    async fn create(&self, _opts: &RunOptions) -> Result<Arc<dyn Container>, CreateFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            let runs = Arc::clone(&self.gc_runs);
            return Err(CreateFailure::with_cleanup(
                CoreError::Create("image not found".into()),
                PartialCleanup::new(move || async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                }),
            ));
        }
        Ok(self.container.clone())
    }
}

/// What a [`MockTask`] does once its exit status is requested.
#[derive(Clone)]
pub enum Script {
    /// Stay running until the test intervenes.
    Hang,
    Exit(ExitStatus),
    /// Fire the detach notifier; the process keeps running.
    Detach,
    /// Exit with `128 + signal` when a signal arrives.
    ExitOnSignal,
}

pub struct MockIo {
    waited: AtomicUsize,
}

#[async_trait]
impl TaskIo for MockIo {
    async fn wait(&self) {
        self.waited.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MockTask {
    id: String,
    script: Mutex<Script>,
    io: Option<Arc<MockIo>>,
    detach: Mutex<Option<DetachNotifier>>,
    status_tx: Mutex<Option<oneshot::Sender<ExitStatus>>>,
    starts: AtomicUsize,
    waits: AtomicUsize,
    deletes: AtomicUsize,
    kills: Mutex<Vec<i32>>,
    resizes: Mutex<Vec<WinSize>>,
    fail_start: AtomicBool,
    block_start: AtomicBool,
    fail_kill: AtomicBool,
    fail_delete: AtomicBool,
}

impl MockTask {
    pub fn new(id: &str) -> Arc<Self> {
        Self::build(id, Script::Hang, true)
    }

    pub fn scripted(id: &str, script: Script) -> Arc<Self> {
        Self::build(id, script, true)
    }

    pub fn without_io(id: &str, script: Script) -> Arc<Self> {
        Self::build(id, script, false)
    }

    fn build(id: &str, script: Script, with_io: bool) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            script: Mutex::new(script),
            io: with_io.then(|| {
                Arc::new(MockIo {
                    waited: AtomicUsize::new(0),
                })
            }),
            detach: Mutex::new(None),
            status_tx: Mutex::new(None),
            starts: AtomicUsize::new(0),
            waits: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            kills: Mutex::new(Vec::new()),
            resizes: Mutex::new(Vec::new()),
            fail_start: AtomicBool::new(false),
            block_start: AtomicBool::new(false),
            fail_kill: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
        })
    }

    fn bind(&self, detach: DetachNotifier) {
        *lock(&self.detach) = Some(detach);
    }

    pub fn fail_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    /// Make `start` never complete.
    pub fn block_start(&self) {
        self.block_start.store(true, Ordering::SeqCst);
    }

    pub fn fail_kills(&self) {
        self.fail_kill.store(true, Ordering::SeqCst);
    }

    pub fn fail_delete(&self) {
        self.fail_delete.store(true, Ordering::SeqCst);
    }

    /// Deliver an exit status to whoever waits on the task.
    pub fn exit(&self, status: ExitStatus) {
        if let Some(tx) = lock(&self.status_tx).take() {
            let _ = tx.send(status);
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn waits(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn io_waited(&self) -> usize {
        self.io
            .as_ref()
            .map_or(0, |io| io.waited.load(Ordering::SeqCst))
    }

    pub fn kills(&self) -> Vec<i32> {
        lock(&self.kills).clone()
    }

    pub fn resizes(&self) -> Vec<WinSize> {
        lock(&self.resizes).clone()
    }

    pub async fn wait_kills(&self, n: usize) {
        eventually(|| lock(&self.kills).len() >= n).await
    }

    pub async fn wait_resizes(&self, n: usize) {
        eventually(|| lock(&self.resizes).len() >= n).await
    }
}

#[async_trait]
impl Task for MockTask {
    fn id(&self) -> &str {
        &self.id
    }

    fn pid(&self) -> Option<u32> {
        Some(4242)
    }

    async fn start(&self) -> Result<(), CoreError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(CoreError::Task("runtime refused to start".into()));
        }
        if self.block_start.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn wait(&self) -> Result<oneshot::Receiver<ExitStatus>, CoreError> {
        if self.waits.fetch_add(1, Ordering::SeqCst) > 0 {
            return Err(CoreError::WaitAlreadyRequested);
        }
        let (tx, rx) = oneshot::channel();
        *lock(&self.status_tx) = Some(tx);

        let script = lock(&self.script).clone();
        match script {
            Script::Exit(status) => self.exit(status),
            Script::Detach => {
                if let Some(detach) = lock(&self.detach).take() {
                    detach.notify();
                }
            }
            Script::Hang | Script::ExitOnSignal => {}
        }
        Ok(rx)
    }

    fn io(&self) -> Option<Arc<dyn TaskIo>> {
        self.io.clone().map(|io| io as Arc<dyn TaskIo>)
    }

    async fn kill(&self, signal: i32) -> Result<(), CoreError> {
        lock(&self.kills).push(signal);
        if self.fail_kill.load(Ordering::SeqCst) {
            return Err(CoreError::Task("no such process".into()));
        }
        if matches!(*lock(&self.script), Script::ExitOnSignal) {
            self.exit(ExitStatus::new(128 + signal as u32));
        }
        Ok(())
    }

    async fn resize(&self, size: WinSize) -> Result<(), CoreError> {
        lock(&self.resizes).push(size);
        Ok(())
    }

    async fn delete(&self) -> Result<Option<ExitStatus>, CoreError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(CoreError::Task("task not found".into()));
        }
        Ok(None)
    }
}

pub struct MockRuntime {
    task: Arc<MockTask>,
    calls: AtomicUsize,
    last_io: Mutex<Option<IoConfig>>,
}

impl MockRuntime {
    pub fn new(task: Arc<MockTask>) -> Arc<Self> {
        Arc::new(Self {
            task,
            calls: AtomicUsize::new(0),
            last_io: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_io(&self) -> Option<IoConfig> {
        lock(&self.last_io).clone()
    }
}

#[async_trait]
impl Runtime for MockRuntime {
    async fn new_task(
        &self,
        _container: Arc<dyn Container>,
        io: IoConfig,
        detach: DetachNotifier,
    ) -> Result<Arc<dyn Task>, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_io) = Some(io);
        self.task.bind(detach);
        Ok(self.task.clone())
    }
}

pub struct MockConsole {
    raw: AtomicUsize,
    reset: AtomicUsize,
    fail_raw: bool,
    events: Mutex<Option<mpsc::UnboundedSender<WinSize>>>,
}

impl MockConsole {
    pub fn new() -> Arc<Self> {
        Self::build(false)
    }

    pub fn failing_raw() -> Arc<Self> {
        Self::build(true)
    }

    fn build(fail_raw: bool) -> Arc<Self> {
        Arc::new(Self {
            raw: AtomicUsize::new(0),
            reset: AtomicUsize::new(0),
            fail_raw,
            events: Mutex::new(None),
        })
    }

    pub fn raw_calls(&self) -> usize {
        self.raw.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) -> usize {
        self.reset.load(Ordering::SeqCst)
    }

    /// Sender for resize events, once someone subscribed.
    pub async fn wait_subscribed(&self) -> mpsc::UnboundedSender<WinSize> {
        eventually(|| lock(&self.events).is_some()).await;
        lock(&self.events).clone().unwrap()
    }
}

impl Console for MockConsole {
    fn make_raw(&self) -> Result<(), CoreError> {
        self.raw.fetch_add(1, Ordering::SeqCst);
        if self.fail_raw {
            return Err(CoreError::Console("not a terminal".into()));
        }
        Ok(())
    }

    fn reset(&self) -> Result<(), CoreError> {
        self.reset.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn size(&self) -> Result<WinSize, CoreError> {
        Ok(WinSize { cols: 80, rows: 24 })
    }

    fn resize_events(&self) -> Result<mpsc::UnboundedReceiver<WinSize>, CoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.events) = Some(tx);
        Ok(rx)
    }
}

pub struct MockConsoleProvider {
    console: Option<Arc<MockConsole>>,
}

impl MockConsoleProvider {
    pub fn new(console: Arc<MockConsole>) -> Self {
        Self {
            console: Some(console),
        }
    }

    pub fn unavailable() -> Self {
        Self { console: None }
    }
}

impl ConsoleProvider for MockConsoleProvider {
    fn current(&self) -> Result<Arc<dyn Console>, CoreError> {
        match &self.console {
            Some(c) => Ok(c.clone()),
            None => Err(CoreError::Console("no terminal attached".into())),
        }
    }
}

pub struct MockSignals {
    tx: Mutex<Option<mpsc::UnboundedSender<i32>>>,
    pending: Mutex<Vec<i32>>,
    subscriptions: AtomicUsize,
}

impl MockSignals {
    pub fn new() -> Self {
        Self {
            tx: Mutex::new(None),
            pending: Mutex::new(Vec::new()),
            subscriptions: AtomicUsize::new(0),
        }
    }

    /// Signals delivered as soon as someone subscribes.
    pub fn with_pending(signals: &[i32]) -> Self {
        let source = Self::new();
        lock(&source.pending).extend_from_slice(signals);
        source
    }

    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    /// Returns `true` while a subscriber still holds its receiver.
    pub fn listening(&self) -> bool {
        lock(&self.tx).as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Simulate the host receiving `signal`. Dropped if nobody listens.
    pub fn raise(&self, signal: i32) {
        if let Some(tx) = lock(&self.tx).as_ref() {
            let _ = tx.send(signal);
        }
    }
}

impl SignalSource for MockSignals {
    fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<i32>, CoreError> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        for sig in lock(&self.pending).drain(..) {
            let _ = tx.send(sig);
        }
        *lock(&self.tx) = Some(tx);
        Ok(rx)
    }
}

#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&lock(&self.0)).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        lock(&self.0).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
