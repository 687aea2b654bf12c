//! Server child process and its three pipes.

use crate::config::ServerConfig;
use crate::error::McpError;
use std::io;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

/// Lifecycle of the child. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProcessState {
    Spawned,
    Running,
    Terminating,
    Terminated,
}

/// The three pipes of a freshly spawned server, handed out exactly once.
pub struct ProcessStreams {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Owns a spawned server process.
///
/// The shutdown controller is the only caller of the `pub(crate)` lifecycle
/// methods, so process state has a single writer.
pub struct ProcessHandle {
    command: String,
    pid: Option<u32>,
    child: Child,
    streams: Option<ProcessStreams>,
    state: ProcessState,
    exit_status: Option<ExitStatus>,
}

impl ProcessHandle {
    /// Spawn the configured server with all three stdio streams piped.
    ///
    /// The inherited environment is kept; `config.env` is layered on top.
    pub fn spawn(config: &ServerConfig) -> Result<Self, McpError> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let spawn_failed = |source: io::Error| McpError::SpawnFailed {
            command: config.command.clone(),
            source,
        };

        let mut child = cmd.spawn().map_err(spawn_failed)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_failed(io::Error::other("stdin was not captured")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_failed(io::Error::other("stdout was not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| spawn_failed(io::Error::other("stderr was not captured")))?;

        let pid = child.id();
        tracing::info!(command = %config.command, pid, "spawned MCP server");

        Ok(Self {
            command: config.command.clone(),
            pid,
            child,
            streams: Some(ProcessStreams {
                stdin,
                stdout,
                stderr,
            }),
            state: ProcessState::Spawned,
            exit_status: None,
        })
    }

    /// Hand the pipes to their consumers. Returns `None` on a second call.
    pub fn take_streams(&mut self) -> Option<ProcessStreams> {
        let streams = self.streams.take()?;
        self.advance(ProcessState::Running);
        Some(streams)
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Exit status, once the process has been reaped.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    pub(crate) fn advance(&mut self, next: ProcessState) {
        if next < self.state {
            tracing::warn!(from = ?self.state, to = ?next, "ignoring backward process transition");
            return;
        }
        self.state = next;
    }

    /// Reap the child if it has already exited, without blocking.
    pub(crate) fn try_reap(&mut self) -> io::Result<Option<ExitStatus>> {
        if self.exit_status.is_some() {
            return Ok(self.exit_status);
        }
        let status = self.child.try_wait()?;
        self.exit_status = status;
        Ok(status)
    }

    /// Wait for the child to exit. Cancel-safe; may be wrapped in a timeout.
    pub(crate) async fn wait(&mut self) -> io::Result<ExitStatus> {
        if let Some(status) = self.exit_status {
            return Ok(status);
        }
        let status = self.child.wait().await?;
        self.exit_status = Some(status);
        Ok(status)
    }

    /// Ask the child to exit (SIGTERM on Unix).
    #[cfg(unix)]
    pub(crate) fn terminate(&self) -> io::Result<()> {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let pid = self
            .pid
            .ok_or_else(|| io::Error::other("process has already been reaped"))?;
        let pid = i32::try_from(pid).map_err(io::Error::other)?;
        kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(io::Error::from)
    }

    /// Windows has no graceful signal for console children.
    #[cfg(not(unix))]
    pub(crate) fn terminate(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    /// Send an unconditional kill without waiting.
    pub(crate) fn kill(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    /// Drop any pipes that were never handed out and mark the process
    /// terminated.
    pub(crate) fn release(&mut self) {
        self.streams = None;
        self.advance(ProcessState::Terminated);
    }

    #[cfg(test)]
    pub(crate) fn set_pid(&mut self, pid: Option<u32>) {
        self.pid = pid;
    }

    #[cfg(test)]
    pub(crate) fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("command", &self.command)
            .field("pid", &self.pid)
            .field("state", &self.state)
            .field("exit_status", &self.exit_status)
            .finish()
    }
}
