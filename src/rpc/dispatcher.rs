//! Worker side of the JSON-RPC peer.
//!
//! [`ToolDispatcher::serve`] reads one frame per line and answers
//! `initialize`, `tools/list`, `tools/call` and `ping`. Every request runs
//! in its own task, so a slow tool never blocks reading the next line.
//! Responses funnel through one channel into a single writer task.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::message::{
    ErrorObject, Implementation, Incoming, InitializeParams, InitializeResult, PROTOCOL_VERSION,
    RequestId, RpcRequest, RpcResponse, ToolCallParams, ToolCallResult, encode_frame,
};
use crate::error::{
    FrameError, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
    RpcError, ToolError,
};
use crate::tools::ToolRegistry;

/// Outbound queue depth between request tasks and the writer.
const RESPONSE_QUEUE: usize = 64;

/// Serves a [`ToolRegistry`] over a line-delimited JSON-RPC stream.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    server_info: Implementation,
}

impl ToolDispatcher {
    /// Creates a dispatcher over `registry`.
    #[must_use]
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            server_info: Implementation::current(),
        }
    }

    /// Serves on the process's stdin/stdout until stdin closes.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Io`] if stdin cannot be read.
    pub async fn serve_stdio(&self) -> Result<(), RpcError> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serves until `reader` reaches EOF and every in-flight call has been
    /// answered.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Io`] if reading fails. Write failures end the
    /// writer task and are logged.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<(), RpcError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::channel::<Incoming>(RESPONSE_QUEUE);
        let writer_task = tokio::spawn(write_loop(writer, rx));
        info!(tools = self.registry.len(), "dispatcher serving");

        let mut lines = BufReader::new(reader).lines();
        let read_result = loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break Ok(()),
                Err(e) => break Err(RpcError::Io(e)),
            };
            if line.trim().is_empty() {
                continue;
            }
            self.accept(&line, &tx).await;
        };

        // The writer drains once every request task has dropped its sender.
        drop(tx);
        if let Err(e) = writer_task.await {
            warn!(error = %e, "response writer failed");
        }
        debug!("dispatcher stopped");
        read_result
    }

    async fn accept(&self, line: &str, tx: &mpsc::Sender<Incoming>) {
        match Incoming::parse(line) {
            Ok(Incoming::Request(request)) => {
                let registry = Arc::clone(&self.registry);
                let server_info = self.server_info.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let id = request.id.clone();
                    let method = request.method.clone();
                    let outcome = AssertUnwindSafe(handle_request(&registry, &server_info, request))
                        .catch_unwind()
                        .await;
                    let response = outcome.unwrap_or_else(|panic| {
                        let cause = panic_message(panic.as_ref());
                        warn!(%id, %method, %cause, "handler panicked");
                        failure(
                            Some(id),
                            ErrorObject::new(INTERNAL_ERROR, "internal error").with_data(json!(cause)),
                        )
                    });
                    let _ = tx.send(response).await;
                });
            }
            Ok(Incoming::Notification(note)) => {
                debug!(method = %note.method, "notification received");
            }
            Ok(Incoming::Response(_)) => {
                debug!("ignoring response frame sent to worker");
            }
            Err(FrameError::Json(e)) => {
                warn!(error = %e, "unparseable frame");
                let error = ErrorObject::new(PARSE_ERROR, "parse error").with_data(json!(e.to_string()));
                let _ = tx.send(failure(None, error)).await;
            }
            Err(e @ FrameError::Invalid { .. }) => {
                warn!(error = %e, "invalid frame");
                let error = ErrorObject::new(INVALID_REQUEST, "invalid request").with_data(json!(e.to_string()));
                let _ = tx.send(failure(None, error)).await;
            }
        }
    }
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::Receiver<Incoming>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let frame = match encode_frame(&message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "failed to encode response");
                continue;
            }
        };
        if let Err(e) = writer.write_all(&frame).await {
            warn!(error = %e, "failed to write response; stopping writer");
            return;
        }
        if let Err(e) = writer.flush().await {
            warn!(error = %e, "failed to flush response; stopping writer");
            return;
        }
    }
}

async fn handle_request(
    registry: &ToolRegistry,
    server_info: &Implementation,
    request: RpcRequest,
) -> Incoming {
    let RpcRequest { id, method, params } = request;
    debug!(%id, %method, "handling request");

    let outcome = match method.as_str() {
        "initialize" => Ok(initialize(server_info, &params)),
        "tools/list" => Ok(json!({ "tools": registry.descriptors() })),
        "tools/call" => call_tool(registry, params).await,
        "ping" | "notifications/initialized" | "notifications/cancel" | "notifications/cancelled" => {
            Ok(json!({}))
        }
        other => Err(ErrorObject::new(
            METHOD_NOT_FOUND,
            format!("method not found: {other}"),
        )),
    };

    match outcome {
        Ok(result) => Incoming::Response(RpcResponse::Success { id, result }),
        Err(error) => failure(Some(id), error),
    }
}

fn initialize(server_info: &Implementation, params: &Value) -> Value {
    match serde_json::from_value::<InitializeParams>(params.clone()) {
        Ok(p) => debug!(
            client = %p.client_info.name,
            protocol = %p.protocol_version,
            "client initialized"
        ),
        Err(e) => debug!(error = %e, "initialize without client info"),
    }
    let result = InitializeResult {
        protocol_version: PROTOCOL_VERSION.to_string(),
        capabilities: json!({ "tools": {} }),
        server_info: server_info.clone(),
    };
    serde_json::to_value(result).unwrap_or_else(|_| json!({}))
}

async fn call_tool(registry: &ToolRegistry, params: Value) -> Result<Value, ErrorObject> {
    let params: ToolCallParams = serde_json::from_value(params)
        .map_err(|e| ErrorObject::new(INVALID_PARAMS, format!("invalid tools/call params: {e}")))?;

    match registry.call(&params.name, params.arguments).await {
        Ok(result) => serde_json::to_value(ToolCallResult::json_text(&result))
            .map_err(|e| ErrorObject::new(INTERNAL_ERROR, "internal error").with_data(json!(e.to_string()))),
        Err(e @ (ToolError::UnknownTool { .. } | ToolError::InvalidArguments { .. })) => {
            debug!(tool = %params.name, error = %e, "rejected tool call");
            Err(ErrorObject::new(INVALID_PARAMS, e.to_string()))
        }
        Err(e) => {
            warn!(tool = %params.name, error = %e, "tool failed");
            Err(ErrorObject::new(INTERNAL_ERROR, format!("tool {} failed", params.name))
                .with_data(json!(e.to_string())))
        }
    }
}

const fn failure(id: Option<RequestId>, error: ErrorObject) -> Incoming {
    Incoming::Response(RpcResponse::Failure { id, error })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string())
}
