//! JSON-RPC 2.0 tool protocol over newline-delimited stdio frames.
//!
//! # Architecture
//!
//! ```text
//! StdioTransport ── spawns ──▶ worker process
//!   └── RpcClient ── stdin frames ──▶ ToolDispatcher::serve
//!         ▲                              ├── initialize / ping
//!         │                              ├── tools/list
//!         └──── stdout frames ◀──────────└── tools/call ─▶ ToolRegistry
//! ```
//!
//! Responses are correlated by id only; a line on the worker's stdout that
//! does not look like a frame is discarded before parsing.

pub mod client;
pub mod dispatcher;
pub mod message;
pub mod transport;

pub use client::{CloseReason, RpcClient};
pub use dispatcher::ToolDispatcher;
pub use message::{
    ContentBlock, ErrorObject, Implementation, Incoming, InitializeParams, InitializeResult,
    PROTOCOL_VERSION, RequestId, RpcNotification, RpcRequest, RpcResponse, ToolCallParams,
    ToolCallResult, encode_frame, is_protocol_frame,
};
pub use transport::{StdioTransport, WorkerCommand};
