//! Launch configuration for an MCP server session.

use std::collections::HashMap;
use std::time::Duration;

/// Default time to wait for any single response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Default bounded wait between the terminate signal and a forced kill.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(5_000);

/// Default time the stderr drain is given to reach end-of-stream after the
/// server has been reaped.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_millis(1_000);

/// Everything needed to launch and talk to one server process.
///
/// Built once before spawning and never mutated afterwards; the builder
/// methods consume and return `self`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Executable to run (e.g. "mcp-language-server").
    pub command: String,
    /// Ordered argument list.
    pub args: Vec<String>,
    /// Variables layered over the inherited environment.
    pub env: HashMap<String, String>,
    pub request_timeout: Duration,
    pub shutdown_grace: Duration,
    pub drain_timeout: Duration,
}

impl ServerConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }
}
