//! One complete session: spawn, drain stderr, handshake, call, shut down.

use crate::config::ServerConfig;
use crate::drain::{DiagnosticSink, DrainReport, StderrDrain};
use crate::error::McpError;
use crate::process::ProcessHandle;
use crate::session::{
    ContentBlock, ProtocolSession, ServerCapabilities, SessionRequest, SessionResult,
};
use crate::shutdown::{ShutdownController, TerminationOutcome};
use crate::transport::StdioTransport;
use std::io;
use tokio_util::sync::CancellationToken;

/// What the caller gets back from a session.
///
/// `ToolFailure` is content: the server answered, and the answer is that the
/// tool failed. `TransportFailure` means there was no usable answer.
#[derive(Debug)]
pub enum SessionOutcome {
    Success(Vec<ContentBlock>),
    ToolFailure(Vec<ContentBlock>),
    TransportFailure(McpError),
}

impl SessionOutcome {
    pub fn is_session_failure(&self) -> bool {
        matches!(self, Self::TransportFailure(_))
    }
}

impl From<Result<SessionResult, McpError>> for SessionOutcome {
    fn from(result: Result<SessionResult, McpError>) -> Self {
        match result {
            Ok(SessionResult::Success(blocks)) => Self::Success(blocks),
            Ok(SessionResult::ToolFailure(blocks)) => Self::ToolFailure(blocks),
            Err(e) => Self::TransportFailure(e),
        }
    }
}

/// Everything observed during one session.
#[derive(Debug)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    /// `None` if the process never started.
    pub termination: Option<TerminationOutcome>,
    /// `None` if the drain never ran or its task panicked.
    pub drain: Option<DrainReport>,
    pub server: Option<ServerCapabilities>,
}

impl SessionReport {
    fn spawn_failed(err: McpError) -> Self {
        Self {
            outcome: SessionOutcome::TransportFailure(err),
            termination: None,
            drain: None,
            server: None,
        }
    }
}

/// Runs exactly one spawn → handshake → call → shutdown cycle.
pub struct SessionCoordinator<S> {
    config: ServerConfig,
    sink: S,
}

impl<S> SessionCoordinator<S>
where
    S: DiagnosticSink + 'static,
{
    pub fn new(config: ServerConfig, sink: S) -> Self {
        Self { config, sink }
    }

    /// Run the session to completion.
    ///
    /// Never returns before the server has been shut down and reaped, whether
    /// the call succeeded, failed, or `cancel` fired. The stderr drain starts
    /// before the handshake and is joined (or, past the drain timeout,
    /// cancelled and joined) before returning.
    pub async fn run(self, request: &SessionRequest, cancel: CancellationToken) -> SessionReport {
        let Self { config, sink } = self;

        let mut process = match ProcessHandle::spawn(&config) {
            Ok(process) => process,
            Err(e) => return SessionReport::spawn_failed(e),
        };
        let mut controller = ShutdownController::new(config.shutdown_grace);

        let Some(streams) = process.take_streams() else {
            let termination = controller.shutdown(&mut process).await;
            return SessionReport {
                termination: Some(termination),
                ..SessionReport::spawn_failed(McpError::Io(io::Error::other(
                    "server streams were already taken",
                )))
            };
        };

        let drain_cancel = cancel.child_token();
        let mut drain_task = tokio::spawn(
            StderrDrain::new(sink).run(streams.stderr, drain_cancel.clone()),
        );

        let transport = StdioTransport::new(streams.stdin, streams.stdout, config.request_timeout);
        let mut session = ProtocolSession::new(transport);

        let exchange = async {
            session.initialize().await?;
            tracing::info!(tool = request.tool(), "calling tool");
            session.call(request).await
        };
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("session cancelled");
                Err(McpError::Cancelled)
            }
            result = exchange => result,
        };

        let server = session.capabilities().cloned();
        // Closes stdin and stops the transport tasks.
        drop(session);

        let termination = controller.shutdown(&mut process).await;

        let drain = match tokio::time::timeout(config.drain_timeout, &mut drain_task).await {
            Ok(joined) => joined.ok(),
            Err(_) => {
                tracing::debug!("stderr still open after shutdown, cancelling drain");
                drain_cancel.cancel();
                drain_task.await.ok()
            }
        };

        if let Err(e) = &result {
            tracing::warn!(kind = %e.kind(), "session failed: {e}");
        }
        SessionReport {
            outcome: result.into(),
            termination: Some(termination),
            drain,
            server,
        }
    }
}
