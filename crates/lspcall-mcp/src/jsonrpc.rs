//! JSON-RPC 2.0 messages exchanged with the server.

use crate::error::McpError;
use serde::{Deserialize, Serialize};

const VERSION: &str = "2.0";

/// An outgoing request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: VERSION,
            id,
            method: method.into(),
            params,
        }
    }
}

/// An outgoing notification; the server sends nothing back.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: VERSION,
            method: method.into(),
            params,
        }
    }
}

/// Any message read from the server's stdout.
///
/// Responses carry an `id` and no `method`. Server-initiated requests and
/// notifications carry a `method` and are not answered by this client.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub method: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<JsonRpcError>,
}

/// The `error` member of a failed response.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl JsonRpcResponse {
    /// True if this message answers one of our requests.
    pub fn is_response(&self) -> bool {
        self.id.is_some() && self.method.is_none()
    }

    /// Unwrap the `result` member, turning an `error` member into
    /// [`McpError::Rejected`].
    pub fn into_result(self, method: &str) -> Result<serde_json::Value, McpError> {
        if let Some(err) = self.error {
            return Err(McpError::Rejected {
                code: err.code,
                message: err.message,
            });
        }
        self.result.ok_or_else(|| {
            McpError::malformed(format!("{method} response has neither result nor error"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FailureKind, ProtocolErrorKind};

    #[test]
    fn serialize_call_request() {
        let req = JsonRpcRequest::new(
            2,
            "tools/call",
            Some(serde_json::json!({"name": "hover", "arguments": {"line": 3}})),
        );
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 2);
        assert_eq!(json["method"], "tools/call");
        assert_eq!(json["params"]["arguments"]["line"], 3);
    }

    #[test]
    fn compact_request_has_no_spaces_around_id() {
        // Stub servers in the integration tests extract the id with sed.
        let line = serde_json::to_string(&JsonRpcRequest::new(7, "ping", None)).unwrap();
        assert!(line.contains("\"id\":7"));
        assert!(!line.contains("params"));
    }

    #[test]
    fn serialize_initialized_notification() {
        let notif = JsonRpcNotification::new("notifications/initialized", None);
        let json = serde_json::to_value(&notif).unwrap();
        assert_eq!(json["method"], "notifications/initialized");
        assert!(json.get("id").is_none());
        assert!(json.get("params").is_none());
    }

    #[test]
    fn result_response_unwraps() {
        let resp: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#).unwrap();
        assert!(resp.is_response());
        assert_eq!(resp.into_result("initialize").unwrap()["ok"], true);
    }

    #[test]
    fn error_response_is_rejected() {
        let resp: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Method not found","data":"x"}}"#,
        )
        .unwrap();
        match resp.into_result("tools/call") {
            Err(McpError::Rejected { code, message }) => {
                assert_eq!(code, -32601);
                assert_eq!(message, "Method not found");
            }
            other => panic!("Expected Rejected, got: {other:?}"),
        }
    }

    #[test]
    fn empty_response_is_malformed() {
        let resp: JsonRpcResponse = serde_json::from_str(r#"{"jsonrpc":"2.0","id":4}"#).unwrap();
        let err = resp.into_result("tools/call").unwrap_err();
        assert_eq!(
            err.kind(),
            FailureKind::Protocol(ProtocolErrorKind::MalformedResponse)
        );
    }

    #[test]
    fn server_request_is_not_a_response() {
        let msg: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":9,"method":"window/workDoneProgress/create","params":{}}"#,
        )
        .unwrap();
        assert!(!msg.is_response());

        let notif: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/message"}"#).unwrap();
        assert!(!notif.is_response());
    }
}
