//! Run command implementation.

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::{ArgAction, Args};
use skiff_core::{Disposition, Orchestrator, RunError};
use skiff_exec::{HostConsoleProvider, HostSignals, ProcCreator, ProcRuntime, ProcSpec, ProcStore};
use skiff_model::{DEFAULT_DETACH_KEYS, DEFAULT_NAMESPACE, RunOptions};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Arguments for the run command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Program to execute, followed by its arguments
    #[arg(
        value_name = "COMMAND",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,

    /// Run in the background and print the container ID
    #[arg(short, long)]
    pub detach: bool,

    /// Remove the container when it exits
    #[arg(long)]
    pub rm: bool,

    /// Attach STDIN, STDOUT or STDERR
    #[arg(short, long = "attach", value_name = "STREAM")]
    pub attach: Vec<String>,

    /// Keep STDIN open even if not attached
    #[arg(short, long)]
    pub interactive: bool,

    /// Allocate a pseudo-TTY
    #[arg(short, long)]
    pub tty: bool,

    /// Proxy received signals to the process
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    pub sig_proxy: bool,

    /// Key sequence for detaching a container
    #[arg(long, default_value = DEFAULT_DETACH_KEYS)]
    pub detach_keys: String,

    /// Namespace recorded on the container
    #[arg(long, default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Container name
    #[arg(long)]
    pub name: Option<String>,

    /// Set environment variables (KEY=VALUE, or KEY to copy from the host)
    #[arg(short, long, value_parser = parse_env)]
    pub env: Vec<(String, String)>,

    /// Working directory of the process
    #[arg(short, long)]
    pub workdir: Option<PathBuf>,

    /// Destination of unattached output, e.g. file:///var/log/app.log
    #[arg(long)]
    pub log_uri: Option<String>,
}

impl RunArgs {
    fn options(&self) -> Result<RunOptions> {
        let mut opts = RunOptions::new()
            .with_detach(self.detach)
            .with_rm(self.rm)
            .with_interactive(self.interactive)
            .with_tty(self.tty)
            .with_sig_proxy(self.sig_proxy)
            .with_detach_keys(&self.detach_keys)
            .with_namespace(&self.namespace)
            .with_attach_names(&self.attach)?;
        if let Some(name) = &self.name {
            opts = opts.with_name(name);
        }
        Ok(opts)
    }

    fn spec(&self) -> ProcSpec {
        let (program, args) = self.command.split_first().unzip();
        let mut spec = ProcSpec::new(program.cloned().unwrap_or_default())
            .with_args(args.unwrap_or_default().iter().cloned());
        spec.env = self.env.clone();
        spec.cwd = self.workdir.clone();
        spec.log_uri = self.log_uri.clone();
        spec
    }
}

fn parse_env(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some(("", _)) => Err(format!("invalid environment variable: {raw:?}")),
        Some((k, v)) => Ok((k.to_string(), v.to_string())),
        None if raw.is_empty() => Err("empty environment variable".into()),
        None => Ok((raw.to_string(), std::env::var(raw).unwrap_or_default())),
    }
}

/// Executes the run command.
pub async fn execute(args: RunArgs) -> Result<()> {
    let opts = args.options()?;

    let store = ProcStore::new();
    let orchestrator = Orchestrator::new(
        Arc::new(ProcCreator::new(store.clone(), args.spec())),
        Arc::new(ProcRuntime::new(store)),
        Arc::new(HostConsoleProvider),
        Arc::new(HostSignals),
    );

    let cancel = CancellationToken::new();
    // Without sig-proxy, SIGINT keeps its default action and ends skiff outright.
    if opts.sig_proxy {
        let token = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!(target: "skiff.run", "interrupt received");
                token.cancel();
            }
        });
    }

    match orchestrator.run(&opts, &cancel).await {
        Ok(Disposition::Detached) => {
            info!(target: "skiff.run", "detached from container");
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(e @ RunError::ExitCode(_)) => std::process::exit(e.exit_code()),
        Err(e) => Err(e.into()),
    }
}
