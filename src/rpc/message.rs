//! JSON-RPC 2.0 wire types.
//!
//! Frames are parsed into a closed [`Incoming`] union right at the
//! boundary; nothing past this module handles loosely-typed envelopes.
//! One frame is one line: [`encode_frame`] emits compact JSON, which never
//! contains a raw newline, followed by `\n`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::FrameError;

/// JSON-RPC protocol version marker.
pub const JSONRPC_VERSION: &str = "2.0";

/// Tool protocol version negotiated by `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Request identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id (what [`RpcClient`](super::RpcClient) allocates).
    Number(u64),
    /// String id.
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// A request expecting a response.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    /// Correlation id.
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Parameters (`Null` when absent).
    pub params: Value,
}

/// A request without an id; never answered.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcNotification {
    /// Method name.
    pub method: String,
    /// Parameters (`Null` when absent).
    pub params: Value,
}

/// Error envelope carried by a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// JSON-RPC error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    /// Creates an error envelope without data.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attaches structured data.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A response to an earlier request.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcResponse {
    /// The call succeeded.
    Success {
        /// Id of the request being answered.
        id: RequestId,
        /// Result value.
        result: Value,
    },
    /// The call failed. `id` is `None` when the request could not be read.
    Failure {
        /// Id of the request being answered.
        id: Option<RequestId>,
        /// Error envelope.
        error: ErrorObject,
    },
}

impl RpcResponse {
    /// Id of the answered request, if any.
    #[must_use]
    pub const fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Success { id, .. } => Some(id),
            Self::Failure { id, .. } => id.as_ref(),
        }
    }
}

/// Every message that can arrive on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Request with an id.
    Request(RpcRequest),
    /// Request without an id.
    Notification(RpcNotification),
    /// Response to an earlier request.
    Response(RpcResponse),
}

/// Cheap pre-parse check applied to every line read from a worker.
///
/// The worker's stdout may carry diagnostic noise next to protocol frames;
/// only lines that start with `{` and mention the `"jsonrpc"` key are ever
/// handed to the JSON parser.
#[must_use]
pub fn is_protocol_frame(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('{') && trimmed.contains("\"jsonrpc\"")
}

impl Incoming {
    /// Parses one line into a typed message.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Json`] for malformed JSON and
    /// [`FrameError::Invalid`] for JSON that is not a JSON-RPC 2.0 message.
    pub fn parse(line: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(line).map_err(FrameError::Json)?;
        Self::from_value(value)
    }

    /// Classifies an already-parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Invalid`] if the value is not a JSON-RPC 2.0
    /// request, notification or response.
    pub fn from_value(value: Value) -> Result<Self, FrameError> {
        let Value::Object(mut obj) = value else {
            return Err(FrameError::invalid("frame is not a JSON object"));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(FrameError::invalid("missing or unsupported jsonrpc version"));
        }

        let id = match obj.remove("id") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(
                serde_json::from_value::<RequestId>(raw)
                    .map_err(|e| FrameError::invalid(format!("invalid id: {e}")))?,
            ),
        };

        if let Some(method) = obj.remove("method") {
            let Value::String(method) = method else {
                return Err(FrameError::invalid("method must be a string"));
            };
            let params = obj.remove("params").unwrap_or(Value::Null);
            return Ok(match id {
                Some(id) => Self::Request(RpcRequest { id, method, params }),
                None => Self::Notification(RpcNotification { method, params }),
            });
        }

        if let Some(error) = obj.remove("error") {
            let error: ErrorObject = serde_json::from_value(error)
                .map_err(|e| FrameError::invalid(format!("invalid error object: {e}")))?;
            return Ok(Self::Response(RpcResponse::Failure { id, error }));
        }

        if let Some(result) = obj.remove("result") {
            let id = id.ok_or_else(|| FrameError::invalid("success response without id"))?;
            return Ok(Self::Response(RpcResponse::Success { id, result }));
        }

        Err(FrameError::invalid("frame has neither method nor result/error"))
    }

    /// Renders the message as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("jsonrpc".to_string(), json!(JSONRPC_VERSION));
        match self {
            Self::Request(req) => {
                obj.insert("id".to_string(), json!(req.id));
                obj.insert("method".to_string(), json!(req.method));
                if !req.params.is_null() {
                    obj.insert("params".to_string(), req.params.clone());
                }
            }
            Self::Notification(note) => {
                obj.insert("method".to_string(), json!(note.method));
                if !note.params.is_null() {
                    obj.insert("params".to_string(), note.params.clone());
                }
            }
            Self::Response(RpcResponse::Success { id, result }) => {
                obj.insert("id".to_string(), json!(id));
                obj.insert("result".to_string(), result.clone());
            }
            Self::Response(RpcResponse::Failure { id, error }) => {
                obj.insert("id".to_string(), json!(id));
                obj.insert("error".to_string(), json!(error));
            }
        }
        Value::Object(obj)
    }
}

/// Serializes a message as one newline-terminated frame.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn encode_frame(message: &Incoming) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(&message.to_value())?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Identifies the client in `initialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    /// Program name.
    pub name: String,
    /// Program version.
    pub version: String,
}

impl Implementation {
    /// This crate's name and version.
    #[must_use]
    pub fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Parameters of `initialize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Requested protocol version.
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client identity.
    pub client_info: Implementation,
}

/// Result of `initialize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Negotiated protocol version.
    pub protocol_version: String,
    /// Server capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Server identity.
    pub server_info: Implementation,
}

/// Parameters of `tools/call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallParams {
    /// Tool name.
    pub name: String,
    /// Tool arguments.
    #[serde(default)]
    pub arguments: Value,
}

/// One content block of a tool result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    /// Text content; tools put their JSON-encoded result here.
    Text {
        /// Text payload.
        text: String,
    },
}

/// Result of `tools/call`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Content blocks.
    pub content: Vec<ContentBlock>,
}

impl ToolCallResult {
    /// Wraps a JSON value as a single text block.
    #[must_use]
    pub fn json_text(value: &Value) -> Self {
        Self {
            content: vec![ContentBlock::Text {
                text: value.to_string(),
            }],
        }
    }

    /// Returns the first text block, if any.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_frame_heuristic() {
        assert!(is_protocol_frame(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#));
        assert!(is_protocol_frame(r#"  {"id":1,"jsonrpc":"2.0","result":{}}"#));
        assert!(!is_protocol_frame("loading catalog... done"));
        assert!(!is_protocol_frame(r#"{"level":"info","msg":"ready"}"#));
        assert!(!is_protocol_frame(r#"log: {"jsonrpc":"2.0"}"#));
    }

    #[test]
    fn test_parse_request_and_notification() {
        let req = Incoming::parse(r#"{"jsonrpc":"2.0","id":7,"method":"tools/list"}"#);
        assert!(matches!(
            req,
            Ok(Incoming::Request(RpcRequest { id: RequestId::Number(7), ref method, .. })) if method == "tools/list"
        ));

        let note = Incoming::parse(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#);
        assert!(matches!(note, Ok(Incoming::Notification(_))));
    }

    #[test]
    fn test_parse_responses() {
        let ok = Incoming::parse(r#"{"jsonrpc":"2.0","id":"a","result":null}"#);
        assert!(matches!(
            ok,
            Ok(Incoming::Response(RpcResponse::Success { id: RequestId::String(_), result: Value::Null }))
        ));

        let err = Incoming::parse(
            r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32603,"message":"boom","data":"stack"}}"#,
        );
        match err {
            Ok(Incoming::Response(RpcResponse::Failure { id, error })) => {
                assert_eq!(id, Some(RequestId::Number(3)));
                assert_eq!(error.code, -32603);
                assert_eq!(error.data, Some(json!("stack")));
            }
            other => unreachable!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_invalid_frames() {
        assert!(matches!(Incoming::parse("{not json"), Err(FrameError::Json(_))));
        assert!(matches!(
            Incoming::parse(r#"{"jsonrpc":"1.0","id":1,"result":{}}"#),
            Err(FrameError::Invalid { .. })
        ));
        assert!(matches!(
            Incoming::parse(r#"{"jsonrpc":"2.0","id":1}"#),
            Err(FrameError::Invalid { .. })
        ));
        assert!(matches!(
            Incoming::parse(r#"{"jsonrpc":"2.0","result":{}}"#),
            Err(FrameError::Invalid { .. })
        ));
    }

    #[test]
    fn test_encode_frame_is_single_line() {
        let msg = Incoming::Request(RpcRequest {
            id: RequestId::Number(1),
            method: "tools/call".to_string(),
            params: json!({"name": "x", "arguments": {"query": "line one\nline two"}}),
        });
        let bytes = encode_frame(&msg).unwrap_or_default();
        let text = String::from_utf8(bytes).unwrap_or_default();
        assert!(text.ends_with('\n'));
        assert_eq!(text.matches('\n').count(), 1);
        assert!(is_protocol_frame(&text));
    }

    #[test]
    fn test_failure_with_null_id_serializes_null() {
        let msg = Incoming::Response(RpcResponse::Failure {
            id: None,
            error: ErrorObject::new(-32700, "parse error"),
        });
        let value = msg.to_value();
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["error"]["code"], -32700);
    }

    #[test]
    fn test_tool_call_result_text() {
        let result = ToolCallResult::json_text(&json!({"picks": []}));
        let wire = serde_json::to_value(&result).unwrap_or_default();
        assert_eq!(wire["content"][0]["type"], "text");
        assert_eq!(result.first_text(), Some(r#"{"picks":[]}"#));
    }

    fn arb_params() -> impl Strategy<Value = Value> {
        proptest::collection::btree_map("[a-z]{1,8}", ".{0,16}", 0..4).prop_map(|m| {
            if m.is_empty() {
                Value::Null
            } else {
                Value::Object(m.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
            }
        })
    }

    proptest! {
        #[test]
        fn prop_request_round_trip(id in any::<u64>(), method in "[a-z/]{1,20}", params in arb_params()) {
            let msg = Incoming::Request(RpcRequest { id: RequestId::Number(id), method, params });
            let bytes = encode_frame(&msg).unwrap_or_default();
            let line = String::from_utf8(bytes).unwrap_or_default();
            let parsed = Incoming::parse(line.trim_end());
            prop_assert!(is_protocol_frame(&line));
            prop_assert_eq!(parsed.ok(), Some(msg));
        }
    }
}
