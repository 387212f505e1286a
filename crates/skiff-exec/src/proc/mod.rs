//! Container collaborators backed by plain host processes.
//!
//! A "container" here is a registered [`ProcSpec`] plus its labels; its task is a child
//! process spawned with `tokio::process`. There is no isolation and no image handling.
//! Useful for development and for exercising the orchestrator end to end.

mod detach;
mod input;
mod task;
pub use task::{ProcIo, ProcTask};

use std::{
    collections::HashMap,
    fs::OpenOptions,
    path::PathBuf,
    process::Stdio,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use async_trait::async_trait;
use skiff_core::{
    Container, CoreError, CreateFailure, Creator, DetachNotifier, IoConfig, PartialCleanup,
    RemoveOptions, Runtime, Task,
};
use skiff_model::{AttachStream, ContainerId, DetachKeys, Labels, RunOptions, labels};
use tokio::process::Command;
use tracing::{debug, info, trace, warn};

use crate::{
    error::{ExecError, ExecResult},
    util::cmd_program,
};

/// Process to run as a container.
#[derive(Clone, Debug, Default)]
pub struct ProcSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    /// Where output goes when it is not attached. Only `file://` is understood.
    pub log_uri: Option<String>,
}

impl ProcSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_log_uri(mut self, uri: impl Into<String>) -> Self {
        self.log_uri = Some(uri.into());
        self
    }
}

struct ProcEntry {
    spec: ProcSpec,
    labels: Labels,
}

/// In-memory registry of process containers.
#[derive(Clone, Default)]
pub struct ProcStore {
    inner: Arc<RwLock<HashMap<ContainerId, ProcEntry>>>,
}

impl ProcStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ContainerId, ProcEntry>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ContainerId, ProcEntry>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, id: ContainerId, spec: ProcSpec, labels: Labels) {
        self.write().insert(id, ProcEntry { spec, labels });
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn spec(&self, id: &str) -> Option<ProcSpec> {
        self.read().get(id).map(|e| e.spec.clone())
    }

    pub fn labels(&self, id: &str) -> Option<Labels> {
        self.read().get(id).map(|e| e.labels.clone())
    }

    /// Returns `true` if some container already carries `name`.
    fn name_taken(&self, name: &str) -> bool {
        self.read()
            .values()
            .any(|e| e.labels.get(labels::NAME).is_some_and(|n| n == name))
    }

    fn merge_labels(&self, id: &str, update: Labels) -> ExecResult<Labels> {
        let mut inner = self.write();
        let entry = inner
            .get_mut(id)
            .ok_or_else(|| ExecError::NotFound(id.to_string()))?;
        entry.labels.extend(update);
        Ok(entry.labels.clone())
    }

    fn remove(&self, id: &str) -> ExecResult<()> {
        self.write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ExecError::NotFound(id.to_string()))
    }
}

/// 64 hex characters, like a content-addressed container id.
fn new_container_id() -> ContainerId {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

/// Registers one [`ProcSpec`] per `create` call.
pub struct ProcCreator {
    store: ProcStore,
    spec: ProcSpec,
}

impl ProcCreator {
    pub fn new(store: ProcStore, spec: ProcSpec) -> Self {
        Self { store, spec }
    }

    fn labels_for(&self, id: &str, opts: &RunOptions) -> Labels {
        let name = opts
            .name
            .clone()
            .unwrap_or_else(|| format!("{}-{}", program_stem(&self.spec.program), &id[..8]));

        let mut out = Labels::from([
            (labels::NAME.to_string(), name),
            (labels::NAMESPACE.to_string(), opts.namespace.clone()),
            (labels::CONTAINER_AUTO_REMOVE.to_string(), opts.rm.to_string()),
        ]);
        if let Some(uri) = &self.spec.log_uri {
            out.insert(labels::LOG_URI.to_string(), uri.clone());
        }
        out
    }
}

fn program_stem(program: &str) -> &str {
    program.rsplit('/').next().unwrap_or(program)
}

#[async_trait]
impl Creator for ProcCreator {
    async fn create(&self, opts: &RunOptions) -> Result<Arc<dyn Container>, CreateFailure> {
        if self.spec.program.is_empty() {
            return Err(CoreError::Create("program is empty".into()).into());
        }
        if let Some(name) = &opts.name
            && self.store.name_taken(name)
        {
            return Err(CoreError::Create(format!("name {name:?} is already in use")).into());
        }

        let id = new_container_id();
        let labels = self.labels_for(&id, opts);
        self.store.insert(id.clone(), self.spec.clone(), labels);
        trace!(target: "skiff.exec.proc", %id, "container registered");

        if let Some(cwd) = &self.spec.cwd
            && !cwd.is_dir()
        {
            let store = self.store.clone();
            let gc_id = id.clone();
            return Err(CreateFailure::with_cleanup(
                CoreError::Create(format!("working directory {} does not exist", cwd.display())),
                PartialCleanup::new(move || async move {
                    let _ = store.remove(&gc_id);
                    debug!(target: "skiff.exec.proc", id = %gc_id, "registration rolled back");
                }),
            ));
        }

        info!(target: "skiff.exec.proc", %id, program = %self.spec.program, "container created");
        Ok(Arc::new(ProcContainer {
            id,
            store: self.store.clone(),
        }))
    }
}

/// Handle to a registered process container.
pub struct ProcContainer {
    id: ContainerId,
    store: ProcStore,
}

#[async_trait]
impl Container for ProcContainer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn labels(&self) -> Result<Labels, CoreError> {
        self.store
            .labels(&self.id)
            .ok_or_else(|| CoreError::Labels(format!("container {} not found", self.id)))
    }

    async fn set_labels(&self, labels: Labels) -> Result<Labels, CoreError> {
        self.store
            .merge_labels(&self.id, labels)
            .map_err(|e| CoreError::Labels(e.to_string()))
    }

    async fn remove(&self, opts: RemoveOptions) -> Result<(), CoreError> {
        self.store.remove(&self.id)?;
        debug!(target: "skiff.exec.proc", id = %self.id, force = opts.force, volumes = opts.volumes, "container removed");
        Ok(())
    }
}

/// Spawns the processes of containers registered in a [`ProcStore`].
pub struct ProcRuntime {
    store: ProcStore,
}

impl ProcRuntime {
    pub fn new(store: ProcStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Runtime for ProcRuntime {
    async fn new_task(
        &self,
        container: Arc<dyn Container>,
        io: IoConfig,
        detach: DetachNotifier,
    ) -> Result<Arc<dyn Task>, CoreError> {
        if io.tty {
            return Err(ExecError::Unsupported("tty").into());
        }
        let id = container.id();
        let spec = self
            .store
            .spec(id)
            .ok_or_else(|| ExecError::NotFound(id.to_string()))?;
        let keys = DetachKeys::parse(&io.detach_keys).map_err(|e| CoreError::Task(e.to_string()))?;

        let mut cmd = cmd_program(&spec.program, &spec.args, &spec.env, spec.cwd.as_deref());
        wire_stdio(&mut cmd, &io)?;
        trace!(target: "skiff.exec.proc", id, namespace = %io.namespace, program = %spec.program, args = ?spec.args, "task created");

        Ok(Arc::new(ProcTask::new(id, cmd, keys, detach)))
    }
}

fn wire_stdio(cmd: &mut Command, io: &IoConfig) -> ExecResult<()> {
    cmd.stdin(if io.attaches(AttachStream::Stdin) {
        Stdio::piped()
    } else {
        Stdio::null()
    });

    let log = log_file(io.log_uri.as_deref())?;
    let sink = |attach: bool| -> ExecResult<Stdio> {
        if attach {
            return Ok(Stdio::piped());
        }
        Ok(match &log {
            Some(file) => Stdio::from(file.try_clone()?),
            None => Stdio::null(),
        })
    };
    cmd.stdout(sink(io.attaches(AttachStream::Stdout))?);
    cmd.stderr(sink(io.attaches(AttachStream::Stderr))?);
    Ok(())
}

fn log_file(uri: Option<&str>) -> ExecResult<Option<std::fs::File>> {
    let Some(uri) = uri else { return Ok(None) };
    match uri.strip_prefix("file://") {
        Some(path) => Ok(Some(OpenOptions::new().create(true).append(true).open(path)?)),
        None => {
            warn!(target: "skiff.exec.proc", uri, "unsupported log uri; unattached output is discarded");
            Ok(None)
        }
    }
}
