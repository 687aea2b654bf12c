//! Graceful-then-forceful termination of the server process.

use crate::process::{ProcessHandle, ProcessState};
use std::time::Duration;

/// Where the controller is in the termination sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    GracePeriod,
    ForceKill,
    Terminated,
}

/// How the server process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationOutcome {
    /// It had already exited before we asked.
    ExitedVoluntarily,
    /// It exited within the grace period after the terminate signal.
    TerminatedGracefully,
    /// It ignored the terminate signal and was killed.
    KilledForcefully,
    /// A signal could not be delivered or the exit could not be observed.
    /// Cleanup still ran.
    TerminationError(String),
}

impl std::fmt::Display for TerminationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExitedVoluntarily => f.write_str("exited-voluntarily"),
            Self::TerminatedGracefully => f.write_str("terminated-gracefully"),
            Self::KilledForcefully => f.write_str("killed-forcefully"),
            Self::TerminationError(e) => write!(f, "termination-error: {e}"),
        }
    }
}

/// Drives one process from running to reaped.
///
/// Send a terminate signal, wait up to `grace` for the exit, then kill and
/// wait without a bound. If the kill itself fails, the wait is bounded by
/// `grace` instead. Stream resources are released on every path.
#[derive(Debug)]
pub struct ShutdownController {
    grace: Duration,
    state: ShutdownState,
}

impl ShutdownController {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            state: ShutdownState::Running,
        }
    }

    pub fn state(&self) -> ShutdownState {
        self.state
    }

    /// Terminate `process` and report how it ended.
    pub async fn shutdown(&mut self, process: &mut ProcessHandle) -> TerminationOutcome {
        let pid = process.pid();
        process.advance(ProcessState::Terminating);

        let outcome = match process.try_reap() {
            Ok(Some(status)) => {
                tracing::info!(pid, %status, "MCP server already exited");
                TerminationOutcome::ExitedVoluntarily
            }
            Ok(None) => self.escalate(process).await,
            Err(e) => {
                tracing::warn!(pid, "could not poll MCP server status: {e}");
                self.escalate(process).await
            }
        };

        process.release();
        self.state = ShutdownState::Terminated;
        outcome
    }

    async fn escalate(&mut self, process: &mut ProcessHandle) -> TerminationOutcome {
        let pid = process.pid();
        self.state = ShutdownState::GracePeriod;

        let signal_error = match process.terminate() {
            Ok(()) => {
                tracing::debug!(pid, grace_ms = self.grace.as_millis(), "sent terminate signal");
                None
            }
            Err(e) => {
                tracing::warn!(pid, "failed to send terminate signal: {e}");
                Some(format!("terminate signal failed: {e}"))
            }
        };

        match tokio::time::timeout(self.grace, process.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(pid, %status, "MCP server terminated");
                return match signal_error {
                    Some(e) => TerminationOutcome::TerminationError(e),
                    None => TerminationOutcome::TerminatedGracefully,
                };
            }
            Ok(Err(e)) => tracing::warn!(pid, "wait failed after terminate signal: {e}"),
            Err(_) => tracing::warn!(pid, "MCP server did not exit within grace period"),
        }

        self.force_kill(process, signal_error).await
    }

    async fn force_kill(
        &mut self,
        process: &mut ProcessHandle,
        signal_error: Option<String>,
    ) -> TerminationOutcome {
        let pid = process.pid();
        self.state = ShutdownState::ForceKill;

        let kill_error = match process.kill() {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(pid, "failed to kill MCP server: {e}");
                Some(format!("kill failed: {e}"))
            }
        };

        // After a failed kill the exit may never come; bound that wait.
        let waited = if kill_error.is_none() {
            process.wait().await.map(Some)
        } else {
            match tokio::time::timeout(self.grace, process.wait()).await {
                Ok(result) => result.map(Some),
                Err(_) => Ok(None),
            }
        };

        match waited {
            Ok(Some(status)) => tracing::info!(pid, %status, "MCP server killed"),
            Ok(None) => tracing::warn!(pid, "MCP server not reaped after failed kill"),
            Err(e) => {
                tracing::error!(pid, "wait failed after kill: {e}");
                return TerminationOutcome::TerminationError(format!(
                    "wait after kill failed: {e}"
                ));
            }
        }

        match kill_error.or(signal_error) {
            Some(e) => TerminationOutcome::TerminationError(e),
            None => TerminationOutcome::KilledForcefully,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn sh(script: &str) -> ProcessHandle {
        ProcessHandle::spawn(&ServerConfig::new("sh").with_args(["-c", script])).unwrap()
    }

    #[tokio::test]
    async fn cooperative_child_terminates_gracefully() {
        let mut process = sh("exec sleep 30");
        let mut controller = ShutdownController::new(Duration::from_secs(5));
        assert_eq!(controller.state(), ShutdownState::Running);

        let outcome = controller.shutdown(&mut process).await;
        assert_eq!(outcome, TerminationOutcome::TerminatedGracefully);
        assert_eq!(controller.state(), ShutdownState::Terminated);
        assert_eq!(process.state(), ProcessState::Terminated);
        assert!(process.exit_status().is_some());
    }

    /// Wait until the child has printed its first stdout line.
    async fn wait_ready(process: &mut ProcessHandle) -> crate::process::ProcessStreams {
        use tokio::io::AsyncBufReadExt;

        let mut streams = process.take_streams().unwrap();
        let mut line = String::new();
        {
            let mut stdout = tokio::io::BufReader::new(&mut streams.stdout);
            stdout.read_line(&mut line).await.unwrap();
        }
        assert_eq!(line, "ready\n");
        streams
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stubborn_child_is_killed() {
        // Ignored signals stay ignored across exec.
        let mut process = sh("trap '' TERM; echo ready; exec sleep 30");
        let _streams = wait_ready(&mut process).await;
        let mut controller = ShutdownController::new(Duration::from_millis(200));

        let started = std::time::Instant::now();
        let outcome = controller.shutdown(&mut process).await;
        assert_eq!(outcome, TerminationOutcome::KilledForcefully);
        assert_eq!(controller.state(), ShutdownState::Terminated);
        assert!(started.elapsed() < Duration::from_secs(10));

        use std::os::unix::process::ExitStatusExt;
        assert_eq!(process.exit_status().unwrap().signal(), Some(9));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_terminate_signal_still_kills_and_reaps() {
        let mut process = sh("echo ready; exec sleep 30");
        let _streams = wait_ready(&mut process).await;
        // No such process: SIGTERM fails with ESRCH, the real child never sees it.
        process.set_pid(Some(i32::MAX as u32));
        let mut controller = ShutdownController::new(Duration::from_millis(200));

        let outcome = controller.shutdown(&mut process).await;
        match &outcome {
            TerminationOutcome::TerminationError(e) => {
                assert!(e.contains("terminate signal failed"), "got: {e}")
            }
            other => panic!("Expected TerminationError, got: {other:?}"),
        }
        assert_eq!(controller.state(), ShutdownState::Terminated);
        assert_eq!(process.state(), ProcessState::Terminated);

        use std::os::unix::process::ExitStatusExt;
        assert_eq!(process.exit_status().unwrap().signal(), Some(9));
    }

    #[tokio::test]
    async fn failed_kill_still_collects_exit_status() {
        let mut process = sh("exit 0");
        process.child_mut().wait().await.unwrap();
        assert!(process.exit_status().is_none());
        let mut controller = ShutdownController::new(Duration::from_millis(200));

        // The child is already reaped underneath the handle, so the kill fails.
        let outcome = controller.force_kill(&mut process, None).await;
        match &outcome {
            TerminationOutcome::TerminationError(e) => {
                assert!(e.contains("kill failed"), "got: {e}")
            }
            other => panic!("Expected TerminationError, got: {other:?}"),
        }
        assert_eq!(controller.state(), ShutdownState::ForceKill);
        assert_eq!(process.exit_status().unwrap().code(), Some(0));
    }

    #[tokio::test]
    async fn already_exited_child_is_voluntary() {
        let mut process = sh("exit 3");
        // Let it exit on its own before shutting down.
        for _ in 0..100 {
            if process.try_reap().unwrap().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let mut controller = ShutdownController::new(Duration::from_secs(1));

        let outcome = controller.shutdown(&mut process).await;
        assert_eq!(outcome, TerminationOutcome::ExitedVoluntarily);
        assert_eq!(process.exit_status().unwrap().code(), Some(3));
        assert_eq!(process.state(), ProcessState::Terminated);
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(
            TerminationOutcome::TerminatedGracefully.to_string(),
            "terminated-gracefully"
        );
        assert_eq!(
            TerminationOutcome::TerminationError("ESRCH".into()).to_string(),
            "termination-error: ESRCH"
        );
    }
}
