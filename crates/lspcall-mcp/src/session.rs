//! MCP protocol session: the `initialize` handshake and a single `tools/call`.

use crate::error::McpError;
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// MCP protocol version we speak.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// A typed tool argument.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for ArgValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// One tool invocation: a tool name and its named arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRequest {
    tool: String,
    arguments: BTreeMap<String, ArgValue>,
}

impl SessionRequest {
    /// Build a request. The tool name and every argument name must be
    /// non-empty; names are unique by construction.
    pub fn new(
        tool: impl Into<String>,
        arguments: BTreeMap<String, ArgValue>,
    ) -> Result<Self, McpError> {
        let tool = tool.into();
        if tool.is_empty() {
            return Err(McpError::InvalidRequest("tool name is empty".to_string()));
        }
        if arguments.contains_key("") {
            return Err(McpError::InvalidRequest(format!(
                "tool '{tool}' has an argument with an empty name"
            )));
        }
        Ok(Self { tool, arguments })
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn arguments(&self) -> &BTreeMap<String, ArgValue> {
        &self.arguments
    }
}

/// One unit of a tool result.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text(String),
    /// Any non-text block, kept as received.
    Other {
        kind: String,
        raw: serde_json::Value,
    },
}

impl ContentBlock {
    fn from_value(value: serde_json::Value) -> Self {
        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or("unknown")
            .to_string();
        if kind == "text" {
            if let Some(text) = value.get("text").and_then(|t| t.as_str()) {
                return Self::Text(text.to_string());
            }
        }
        Self::Other { kind, raw: value }
    }
}

/// The answer to a tool call that made it across the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionResult {
    Success(Vec<ContentBlock>),
    /// The server ran the exchange fine but reports that the tool failed.
    ToolFailure(Vec<ContentBlock>),
}

impl SessionResult {
    pub fn blocks(&self) -> &[ContentBlock] {
        match self {
            Self::Success(blocks) | Self::ToolFailure(blocks) => blocks,
        }
    }

    pub fn is_tool_failure(&self) -> bool {
        matches!(self, Self::ToolFailure(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// What the server told us during the handshake.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
    pub protocol_version: String,
    #[serde(default)]
    pub server_info: Option<ServerInfo>,
    #[serde(default)]
    pub capabilities: serde_json::Value,
}

#[derive(Deserialize)]
struct ToolCallResult {
    #[serde(default)]
    content: Vec<serde_json::Value>,
    #[serde(default, rename = "isError")]
    is_error: bool,
}

/// A session over some [`Transport`]. `initialize` must succeed before
/// `call` is accepted.
pub struct ProtocolSession<T> {
    transport: T,
    capabilities: Option<ServerCapabilities>,
}

impl<T: Transport> ProtocolSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            capabilities: None,
        }
    }

    /// Perform the handshake: `initialize`, then `notifications/initialized`.
    pub async fn initialize(&mut self) -> Result<&ServerCapabilities, McpError> {
        if self.capabilities.is_some() {
            return Err(McpError::Sequencing("initialize sent twice"));
        }

        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "lspcall",
                "version": env!("CARGO_PKG_VERSION")
            }
        });

        let result = self
            .transport
            .send_request("initialize", Some(params))
            .await?
            .into_result("initialize")?;
        let capabilities: ServerCapabilities = serde_json::from_value(result)
            .map_err(|e| McpError::malformed(format!("Failed to parse initialize result: {e}")))?;

        self.transport
            .send_notification("notifications/initialized", None)
            .await?;

        tracing::info!(
            protocol = %capabilities.protocol_version,
            server = ?capabilities.server_info.as_ref().map(|s| &s.name),
            "MCP session initialized"
        );
        Ok(self.capabilities.insert(capabilities))
    }

    /// Call one tool and wait for its result.
    pub async fn call(&self, request: &SessionRequest) -> Result<SessionResult, McpError> {
        if self.capabilities.is_none() {
            return Err(McpError::Sequencing("tools/call before initialize completed"));
        }

        let params = serde_json::json!({
            "name": request.tool(),
            "arguments": request.arguments(),
        });

        let result = self
            .transport
            .send_request("tools/call", Some(params))
            .await?
            .into_result("tools/call")?;
        let call_result: ToolCallResult = serde_json::from_value(result)
            .map_err(|e| McpError::malformed(format!("Failed to parse tools/call result: {e}")))?;

        let blocks = call_result
            .content
            .into_iter()
            .map(ContentBlock::from_value)
            .collect();

        Ok(if call_result.is_error {
            SessionResult::ToolFailure(blocks)
        } else {
            SessionResult::Success(blocks)
        })
    }

    pub fn capabilities(&self) -> Option<&ServerCapabilities> {
        self.capabilities.as_ref()
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}
