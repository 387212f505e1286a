use std::{os::unix::process::ExitStatusExt, path::Path, process::ExitStatus};

use nix::{
    sys::signal::{Signal, kill},
    unistd::Pid,
};
use tokio::process::Command;

use crate::error::{ExecError, ExecResult};

/// Offset added to a signal number when a process is terminated by it.
const SIGNAL_EXIT_BASE: u32 = 128;

pub fn cmd_program(
    program: &str,
    args: &[String],
    env: &[(String, String)],
    cwd: Option<&Path>,
) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args.iter().map(|s| s.as_str()));
    for (k, v) in env {
        cmd.env(k, v);
    }
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    cmd
}

/// Deliver `signal` to the process `pid`. Signal 0 only checks that the process exists.
pub fn send_signal(pid: u32, signal: i32) -> ExecResult<()> {
    let failed = |reason: String| ExecError::Signal { signal, reason };

    let pid = i32::try_from(pid).map_err(|_| failed(format!("pid {pid} out of range")))?;
    let sig = match signal {
        0 => None,
        n => Some(Signal::try_from(n).map_err(|e| failed(e.desc().to_string()))?),
    };
    kill(Pid::from_raw(pid), sig).map_err(|e| failed(e.desc().to_string()))
}

/// Shell-style exit code: the process's own code, or `128 + signal` when it was killed.
pub fn exit_code_of(status: ExitStatus) -> u32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code as u32 & 0xff,
        (None, Some(sig)) => SIGNAL_EXIT_BASE + sig as u32,
        (None, None) => skiff_model::UNKNOWN_EXIT_STATUS,
    }
}
