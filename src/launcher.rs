//! # Worker process launching.
//!
//! [`Launcher::spawn`] is fire-and-forget: it only starts the process.
//! Readiness is observed through the registry, never through the child handle.
//!
//! [`CommandLauncher`] runs a worker program with:
//! - `--idle-timeout-ms <ms> --registry-dir <dir>` appended to its arguments
//! - `DAEMONLINK_IDLE_TIMEOUT_MS` and the request's extra environment
//! - null stdio and its own process group, so it outlives the client

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::config::IdleTimeout;
use crate::error::LaunchError;

/// Environment variable carrying the idle timeout to the worker.
pub const IDLE_TIMEOUT_ENV: &str = "DAEMONLINK_IDLE_TIMEOUT_MS";

/// Everything a launcher needs to start one worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpawnRequest {
    /// Working directory of the new process.
    pub working_dir: PathBuf,
    /// Idle timeout the worker must honor.
    pub idle_timeout: IdleTimeout,
    /// Extra environment.
    pub env: BTreeMap<String, String>,
    /// Registry the worker must register in.
    pub registry_dir: PathBuf,
}

/// Result of a launch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessHandle {
    /// OS pid, when the platform reports it.
    pub pid: Option<u32>,
}

/// Starts worker processes.
pub trait Launcher: Send + Sync + 'static {
    /// Starts one worker for `request`. Must not wait for it to become ready.
    fn spawn(&self, request: &SpawnRequest) -> Result<ProcessHandle, LaunchError>;
}

/// Launches a worker executable.
#[derive(Clone, Debug)]
pub struct CommandLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandLauncher {
    /// Launcher for `program` with no extra arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Adds a leading argument (placed before the generated ones).
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn command(&self, request: &SpawnRequest) -> Command {
        let idle_ms = request.idle_timeout.as_millis().to_string();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--idle-timeout-ms")
            .arg(&idle_ms)
            .arg("--registry-dir")
            .arg(&request.registry_dir)
            .current_dir(&request.working_dir)
            .envs(&request.env)
            .env(IDLE_TIMEOUT_ENV, &idle_ms)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false)
            .process_group(0);
        cmd
    }
}

impl Launcher for CommandLauncher {
    fn spawn(&self, request: &SpawnRequest) -> Result<ProcessHandle, LaunchError> {
        let child = self
            .command(request)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        let pid = child.id();
        debug!(program = %self.program.display(), pid = ?pid, "worker process started");
        // the child is detached; dropping the handle does not kill it
        drop(child);
        Ok(ProcessHandle { pid })
    }
}
