//! Error types for huebridge.
//!
//! Each layer owns an error enum. Only [`RpcError`] is meant to reach
//! callers of the transport; every layer above it degrades to "fewer or no
//! results" and logs instead of propagating.

use thiserror::Error;

/// Result type alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// JSON-RPC error code: invalid JSON was received.
pub const PARSE_ERROR: i64 = -32700;
/// JSON-RPC error code: the request object is not valid.
pub const INVALID_REQUEST: i64 = -32600;
/// JSON-RPC error code: the method does not exist.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC error code: invalid method parameters.
pub const INVALID_PARAMS: i64 = -32602;
/// JSON-RPC error code: internal error while handling the call.
pub const INTERNAL_ERROR: i64 = -32603;

/// Top-level error aggregating every layer.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport or protocol failure.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// Tool handler failure.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Router or LLM provider failure.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Session memory failure.
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// CLI command failure.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the JSON-RPC peer.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The worker process could not be spawned.
    #[error("failed to spawn worker `{command}`: {source}")]
    Spawn {
        /// Command that was executed.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A stdio pipe of the worker was not available after spawn.
    #[error("worker {stream} pipe unavailable")]
    MissingPipe {
        /// Name of the missing stream (`stdin`, `stdout`).
        stream: &'static str,
    },

    /// Writing a frame to the worker failed.
    #[error("failed to write frame: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing a request failed.
    #[error("failed to serialize request: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The worker answered with an RPC error envelope.
    #[error("rpc error {code}: {message}")]
    Remote {
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
        /// Optional structured error data.
        data: Option<serde_json::Value>,
    },

    /// The worker exited while the call was pending.
    #[error("worker exited before responding")]
    WorkerExited,

    /// The transport was disconnected while the call was pending.
    #[error("transport disconnected")]
    Disconnected,

    /// The transport has not been connected.
    #[error("transport not connected")]
    NotConnected,

    /// The worker did not answer `initialize` in time.
    #[error("worker did not complete the handshake within {timeout_ms}ms")]
    HandshakeTimeout {
        /// Configured handshake bound.
        timeout_ms: u64,
    },

    /// A frame could not be classified as a JSON-RPC message.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Errors classifying a single line as a JSON-RPC message.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The line is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[source] serde_json::Error),

    /// The JSON is not a valid JSON-RPC 2.0 message.
    #[error("invalid JSON-RPC frame: {message}")]
    Invalid {
        /// Description of the problem.
        message: String,
    },
}

impl FrameError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Errors raised by tool handlers inside the worker.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The tool name is not registered.
    #[error("unknown tool: {name}")]
    UnknownTool {
        /// Requested tool name.
        name: String,
    },

    /// Tool arguments did not match the tool's schema.
    #[error("invalid arguments for {name}: {message}")]
    InvalidArguments {
        /// Tool name.
        name: String,
        /// Description of the problem.
        message: String,
    },

    /// The tool failed while executing.
    #[error("tool {name} failed: {message}")]
    Execution {
        /// Tool name.
        name: String,
        /// Description of the failure.
        message: String,
    },

    /// The product catalog could not be loaded.
    #[error("failed to load catalog {path}: {message}")]
    Catalog {
        /// Catalog file path.
        path: String,
        /// Description of the failure.
        message: String,
    },
}

/// Errors raised by the intent router and LLM providers.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No API key configured for the provider.
    #[error("API key missing: set OPENAI_API_KEY or HUEBRIDGE_API_KEY")]
    ApiKeyMissing,

    /// The configured provider name is unknown.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// Provider name.
        name: String,
    },

    /// The provider request failed.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Error message from the provider.
        message: String,
        /// HTTP status code if known.
        status: Option<u16>,
    },

    /// The model output could not be parsed.
    #[error("failed to parse model response: {message}")]
    ResponseParse {
        /// Description of the problem.
        message: String,
        /// Raw model output.
        content: String,
    },

    /// The model returned no usable actions.
    #[error("classifier returned no actions")]
    EmptyClassification,
}

/// Errors raised by session memory backends.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// A snapshot could not be (de)serialized.
    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend store failed.
    #[error("memory backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },
}

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value was outside its allowed range.
    #[error("invalid configuration for {field}: {message}")]
    Invalid {
        /// Field name.
        field: &'static str,
        /// Description of the problem.
        message: String,
    },
}

/// CLI command errors.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command failed.
    #[error("command failed: {0}")]
    ExecutionFailed(String),

    /// An argument was invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Output formatting failed.
    #[error("output format error: {0}")]
    OutputFormat(String),
}
