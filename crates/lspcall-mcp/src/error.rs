//! Error types for MCP session operations.

use std::fmt;
use thiserror::Error;

/// Why the protocol exchange failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    /// The transport closed before a response arrived.
    ConnectionClosed,
    /// A response arrived but could not be understood.
    MalformedResponse,
    /// No response arrived within the request timeout.
    Timeout,
}

impl fmt::Display for ProtocolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ConnectionClosed => "connection-closed",
            Self::MalformedResponse => "malformed-response",
            Self::Timeout => "timeout",
        };
        f.write_str(label)
    }
}

/// Coarse classification of a session-level failure, for callers that only
/// need to report what went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Spawn,
    Protocol(ProtocolErrorKind),
    Rejected,
    Sequencing,
    InvalidRequest,
    Cancelled,
    Io,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn => f.write_str("spawn"),
            Self::Protocol(kind) => write!(f, "protocol/{kind}"),
            Self::Rejected => f.write_str("rejected"),
            Self::Sequencing => f.write_str("sequencing"),
            Self::InvalidRequest => f.write_str("invalid-request"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Io => f.write_str("io"),
        }
    }
}

/// Errors from MCP server communication.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Failed to spawn MCP server '{command}': {source}")]
    SpawnFailed {
        command: String,
        source: std::io::Error,
    },

    #[error("MCP protocol error ({kind}): {message}")]
    Protocol {
        kind: ProtocolErrorKind,
        message: String,
    },

    #[error("JSON-RPC error from server (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("Out-of-order session call: {0}")]
    Sequencing(&'static str),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Session cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    pub(crate) fn connection_closed(message: impl Into<String>) -> Self {
        Self::Protocol {
            kind: ProtocolErrorKind::ConnectionClosed,
            message: message.into(),
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::Protocol {
            kind: ProtocolErrorKind::MalformedResponse,
            message: message.into(),
        }
    }

    pub(crate) fn timeout(method: &str, timeout_ms: u128) -> Self {
        Self::Protocol {
            kind: ProtocolErrorKind::Timeout,
            message: format!("'{method}' got no response after {timeout_ms}ms"),
        }
    }

    /// Classify this error for reporting.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::SpawnFailed { .. } => FailureKind::Spawn,
            Self::Protocol { kind, .. } => FailureKind::Protocol(*kind),
            Self::Rejected { .. } => FailureKind::Rejected,
            Self::Sequencing(_) => FailureKind::Sequencing,
            Self::InvalidRequest(_) => FailureKind::InvalidRequest,
            Self::Cancelled => FailureKind::Cancelled,
            Self::Io(_) => FailureKind::Io,
            // Serialization of our own requests failing, or a reply we
            // could not decode.
            Self::Json(_) => FailureKind::Protocol(ProtocolErrorKind::MalformedResponse),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_kind_labels() {
        assert_eq!(
            ProtocolErrorKind::ConnectionClosed.to_string(),
            "connection-closed"
        );
        assert_eq!(
            FailureKind::Protocol(ProtocolErrorKind::Timeout).to_string(),
            "protocol/timeout"
        );
    }

    #[test]
    fn kind_classifies_each_variant() {
        assert_eq!(McpError::Cancelled.kind(), FailureKind::Cancelled);
        assert_eq!(
            McpError::Sequencing("tools/call before initialize").kind(),
            FailureKind::Sequencing
        );
        assert_eq!(
            McpError::connection_closed("eof").kind(),
            FailureKind::Protocol(ProtocolErrorKind::ConnectionClosed)
        );
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(
            McpError::Json(json_err).kind(),
            FailureKind::Protocol(ProtocolErrorKind::MalformedResponse)
        );
    }

    #[test]
    fn timeout_message_names_method() {
        let err = McpError::timeout("initialize", 250);
        assert_eq!(
            err.to_string(),
            "MCP protocol error (timeout): 'initialize' got no response after 250ms"
        );
    }
}
