//! Single-session MCP client for stdio language servers.
//!
//! A session spawns the server as a child process, drains its stderr in the
//! background, performs the MCP `initialize` handshake over newline-delimited
//! JSON-RPC 2.0 on stdin/stdout, issues one `tools/call`, and then terminates
//! the server: terminate signal first, kill after a grace period.
//!
//! [`SessionCoordinator`] ties the pieces together and is the usual entry
//! point; the components are public for callers that need finer control.

pub mod config;
pub mod coordinator;
pub mod drain;
pub mod error;
pub mod jsonrpc;
pub mod process;
pub mod session;
pub mod shutdown;
pub mod transport;

pub use config::ServerConfig;
pub use coordinator::{SessionCoordinator, SessionOutcome, SessionReport};
pub use drain::{CollectingSink, DiagnosticSink, DrainReport, StderrDrain, TracingSink};
pub use error::{FailureKind, McpError, ProtocolErrorKind};
pub use process::{ProcessHandle, ProcessState, ProcessStreams};
pub use session::{
    ArgValue, ContentBlock, ProtocolSession, ServerCapabilities, SessionRequest, SessionResult,
};
pub use shutdown::{ShutdownController, ShutdownState, TerminationOutcome};
pub use transport::{StdioTransport, Transport};
