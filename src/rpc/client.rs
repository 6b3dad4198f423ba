//! Client half of the JSON-RPC peer.
//!
//! [`RpcClient`] multiplexes concurrent calls over one byte stream. Each
//! call gets a fresh id and a oneshot completion handle; a single reader
//! task routes responses back by id, so arrival order never matters.
//!
//! Outgoing frames go through a single writer task. A caller that stops
//! waiting (for example on timeout) never leaves half a line behind.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::message::{
    Incoming, RequestId, RpcNotification, RpcRequest, RpcResponse, encode_frame,
    is_protocol_frame,
};
use crate::error::RpcError;

type Completion = oneshot::Sender<Result<Value, RpcError>>;

/// Frames queued ahead of the writer task.
const OUTBOUND_QUEUE: usize = 64;

/// One encoded frame and the handle reporting its write.
struct Outbound {
    frame: Vec<u8>,
    written: oneshot::Sender<io::Result<()>>,
}

/// Why the client stopped accepting calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer's output stream ended.
    WorkerExited,
    /// The owner disconnected the transport.
    Disconnected,
}

impl CloseReason {
    const fn to_error(self) -> RpcError {
        match self {
            Self::WorkerExited => RpcError::WorkerExited,
            Self::Disconnected => RpcError::Disconnected,
        }
    }
}

#[derive(Default)]
struct PendingCalls {
    calls: HashMap<u64, Completion>,
    closed: Option<CloseReason>,
}

impl PendingCalls {
    /// Rejects every pending call and refuses new ones.
    fn close(&mut self, reason: CloseReason) -> usize {
        if self.closed.is_none() {
            self.closed = Some(reason);
        }
        let drained = self.calls.len();
        for (_, completion) in self.calls.drain() {
            let _ = completion.send(Err(reason.to_error()));
        }
        drained
    }
}

type SharedPending = Arc<Mutex<PendingCalls>>;

fn lock(pending: &SharedPending) -> MutexGuard<'_, PendingCalls> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// JSON-RPC client over an arbitrary async byte stream pair.
pub struct RpcClient {
    next_id: AtomicU64,
    pending: SharedPending,
    outbound: mpsc::Sender<Outbound>,
    reader_task: JoinHandle<()>,
}

impl RpcClient {
    /// Starts a client reading frames from `reader` and writing to `writer`.
    ///
    /// Spawns the reader and writer tasks on the current tokio runtime.
    /// The writer task ends once the client is dropped.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + 'static,
    {
        let pending: SharedPending = Arc::default();
        let reader_task = tokio::spawn(read_loop(reader, Arc::clone(&pending)));
        let (outbound, rx) = mpsc::channel(OUTBOUND_QUEUE);
        tokio::spawn(write_loop(writer, rx));

        Self {
            next_id: AtomicU64::new(1),
            pending,
            outbound,
            reader_task,
        }
    }

    /// Issues a call and waits for its response.
    ///
    /// There is no built-in timeout; callers that need a bound race this
    /// future against a timer. Dropping the future leaves the id pending
    /// until its response arrives, at which point the response is discarded.
    /// A frame already queued is still written whole.
    ///
    /// # Errors
    ///
    /// - [`RpcError::Remote`] if the peer answered with an error envelope
    /// - [`RpcError::WorkerExited`] / [`RpcError::Disconnected`] if the
    ///   stream closed before the response
    /// - [`RpcError::Io`] if the request frame could not be written
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = lock(&self.pending);
            if let Some(reason) = pending.closed {
                return Err(reason.to_error());
            }
            pending.calls.insert(id, tx);
        }

        let request = Incoming::Request(RpcRequest {
            id: RequestId::Number(id),
            method: method.to_string(),
            params,
        });
        debug!(id, method, "sending request");

        if let Err(e) = self.send(&request).await {
            lock(&self.pending).calls.remove(&id);
            return Err(e);
        }

        rx.await.unwrap_or(Err(RpcError::WorkerExited))
    }

    /// Sends a notification; no response is expected.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Io`] if the frame could not be written.
    pub async fn notify(&self, method: &str, params: Value) -> Result<(), RpcError> {
        if let Some(reason) = lock(&self.pending).closed {
            return Err(reason.to_error());
        }
        let note = Incoming::Notification(RpcNotification {
            method: method.to_string(),
            params,
        });
        self.send(&note).await
    }

    /// Queues one frame and waits until the writer task has flushed it.
    async fn send(&self, message: &Incoming) -> Result<(), RpcError> {
        let frame = encode_frame(message)?;
        let (written, ack) = oneshot::channel();
        self.outbound
            .send(Outbound { frame, written })
            .await
            .map_err(|_| writer_stopped())?;
        ack.await.map_err(|_| writer_stopped())??;
        Ok(())
    }

    /// Rejects every pending call with `reason` and refuses new calls.
    ///
    /// Returns the number of calls that were rejected.
    pub fn abandon_pending(&self, reason: CloseReason) -> usize {
        let rejected = lock(&self.pending).close(reason);
        if rejected > 0 {
            debug!(rejected, ?reason, "rejected pending calls");
        }
        self.reader_task.abort();
        rejected
    }

    /// Number of calls awaiting a response.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).calls.len()
    }

    /// Returns the close reason once the client stopped accepting calls.
    pub fn closed(&self) -> Option<CloseReason> {
        lock(&self.pending).closed
    }

    /// Returns `true` once the client stopped accepting calls.
    pub fn is_closed(&self) -> bool {
        self.closed().is_some()
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("next_id", &self.next_id)
            .field("pending", &self.pending_count())
            .field("closed", &self.closed())
            .finish_non_exhaustive()
    }
}

fn writer_stopped() -> RpcError {
    RpcError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "frame writer stopped"))
}

/// Writes queued frames one at a time. Stops at the first write failure;
/// later sends then fail with a broken pipe.
async fn write_loop<W>(writer: W, mut rx: mpsc::Receiver<Outbound>)
where
    W: AsyncWrite,
{
    let mut writer = Box::pin(writer);
    while let Some(Outbound { frame, written }) = rx.recv().await {
        let result = match writer.write_all(&frame).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        let failed = result.is_err();
        if let Err(e) = &result {
            warn!(error = %e, "failed to write frame; stopping writer");
        }
        if written.send(result).is_err() {
            debug!("caller stopped waiting before its frame was written");
        }
        if failed {
            return;
        }
    }
}

async fn read_loop<R>(reader: R, pending: SharedPending)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => route_line(&pending, &line),
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "worker output stream failed");
                break;
            }
        }
    }

    let rejected = lock(&pending).close(CloseReason::WorkerExited);
    debug!(rejected, "worker output closed");
}

/// Handles one line of worker output. Never panics, never rejects a call
/// because of a bad line.
fn route_line(pending: &SharedPending, line: &str) {
    if !is_protocol_frame(line) {
        if !line.trim().is_empty() {
            debug!(line, "discarding non-protocol output");
        }
        return;
    }

    let response = match Incoming::parse(line) {
        Ok(Incoming::Response(response)) => response,
        Ok(Incoming::Request(req)) => {
            debug!(method = %req.method, "ignoring request from worker");
            return;
        }
        Ok(Incoming::Notification(note)) => {
            debug!(method = %note.method, "ignoring notification from worker");
            return;
        }
        Err(e) => {
            warn!(error = %e, "skipping malformed frame");
            return;
        }
    };

    let Some(RequestId::Number(id)) = response.id().cloned() else {
        warn!(id = ?response.id(), "response id does not match any call");
        return;
    };

    let Some(completion) = lock(pending).calls.remove(&id) else {
        debug!(id, "no pending call for response; dropping");
        return;
    };

    let outcome = match response {
        RpcResponse::Success { result, .. } => Ok(result),
        RpcResponse::Failure { error, .. } => Err(RpcError::Remote {
            code: error.code,
            message: error.message,
            data: error.data,
        }),
    };

    if completion.send(outcome).is_err() {
        debug!(id, "caller gave up before response arrived; dropping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, duplex};

    /// Client wired to an in-memory peer. Returns the client plus the peer's
    /// line reader (what the client wrote) and writer (what the client reads).
    fn wired() -> (
        RpcClient,
        tokio::io::Lines<BufReader<DuplexStream>>,
        DuplexStream,
    ) {
        let (client_out, peer_in) = duplex(4096);
        let (peer_out, client_in) = duplex(4096);
        let client = RpcClient::new(client_in, client_out);
        (client, BufReader::new(peer_in).lines(), peer_out)
    }

    async fn next_request(lines: &mut tokio::io::Lines<BufReader<DuplexStream>>) -> RpcRequest {
        let line = lines
            .next_line()
            .await
            .unwrap_or_default()
            .unwrap_or_default();
        match Incoming::parse(&line) {
            Ok(Incoming::Request(req)) => req,
            other => unreachable!("expected request, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_call_resolves_by_id() {
        let (client, mut requests, mut peer) = wired();
        let client = Arc::new(client);

        let c = Arc::clone(&client);
        let call = tokio::spawn(async move { c.call("ping", Value::Null).await });

        let req = next_request(&mut requests).await;
        assert_eq!(req.id, RequestId::Number(1));
        assert_eq!(req.method, "ping");

        let reply = format!("{{\"jsonrpc\":\"2.0\",\"id\":{},\"result\":{{\"ok\":true}}}}\n", req.id);
        peer.write_all(reply.as_bytes()).await.unwrap_or_default();

        let result = call.await.unwrap_or_else(|_| unreachable!());
        assert_eq!(result.ok(), Some(json!({"ok": true})));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_out_of_order_responses() {
        let (client, mut requests, mut peer) = wired();
        let client = Arc::new(client);

        let c1 = Arc::clone(&client);
        let first = tokio::spawn(async move { c1.call("a", Value::Null).await });
        let r1 = next_request(&mut requests).await;
        let c2 = Arc::clone(&client);
        let second = tokio::spawn(async move { c2.call("b", Value::Null).await });
        let r2 = next_request(&mut requests).await;
        assert_ne!(r1.id, r2.id);

        let reply = |id: &RequestId, v: &str| format!("{{\"jsonrpc\":\"2.0\",\"id\":{id},\"result\":\"{v}\"}}\n");
        peer.write_all(reply(&r2.id, &r2.method).as_bytes()).await.unwrap_or_default();
        peer.write_all(reply(&r1.id, &r1.method).as_bytes()).await.unwrap_or_default();

        let first = first.await.unwrap_or_else(|_| unreachable!());
        let second = second.await.unwrap_or_else(|_| unreachable!());
        assert_eq!(first.ok(), Some(json!("a")));
        assert_eq!(second.ok(), Some(json!("b")));
    }

    #[tokio::test]
    async fn test_noise_and_garbage_do_not_touch_pending_calls() {
        let (client, mut requests, mut peer) = wired();
        let client = Arc::new(client);

        let c = Arc::clone(&client);
        let call = tokio::spawn(async move { c.call("tools/list", Value::Null).await });
        let req = next_request(&mut requests).await;

        peer.write_all(b"loading catalog...\n").await.unwrap_or_default();
        peer.write_all(b"{\"jsonrpc\": broken\n").await.unwrap_or_default();
        peer.write_all(b"{\"jsonrpc\":\"2.0\",\"id\":999,\"result\":{}}\n").await.unwrap_or_default();
        tokio::task::yield_now().await;
        assert_eq!(client.pending_count(), 1);
        assert!(!client.is_closed());

        let reply = format!("{{\"jsonrpc\":\"2.0\",\"id\":{},\"result\":[]}}\n", req.id);
        peer.write_all(reply.as_bytes()).await.unwrap_or_default();
        let result = call.await.unwrap_or_else(|_| unreachable!());
        assert_eq!(result.ok(), Some(json!([])));
    }

    #[tokio::test]
    async fn test_remote_error_rejects_call() {
        let (client, mut requests, mut peer) = wired();
        let client = Arc::new(client);

        let c = Arc::clone(&client);
        let call = tokio::spawn(async move { c.call("tools/call", json!({"name": "x"})).await });
        let req = next_request(&mut requests).await;

        let reply = format!(
            "{{\"jsonrpc\":\"2.0\",\"id\":{},\"error\":{{\"code\":-32603,\"message\":\"boom\",\"data\":\"cause\"}}}}\n",
            req.id
        );
        peer.write_all(reply.as_bytes()).await.unwrap_or_default();

        let result = call.await.unwrap_or_else(|_| unreachable!());
        assert!(matches!(
            result,
            Err(RpcError::Remote { code: -32603, ref message, .. }) if message == "boom"
        ));
    }

    #[tokio::test]
    async fn test_eof_rejects_pending_with_worker_exited() {
        let (client, mut requests, peer) = wired();
        let client = Arc::new(client);

        let c = Arc::clone(&client);
        let call = tokio::spawn(async move { c.call("slow", Value::Null).await });
        let _ = next_request(&mut requests).await;
        drop(peer);

        let result = call.await.unwrap_or_else(|_| unreachable!());
        assert!(matches!(result, Err(RpcError::WorkerExited)));
        assert_eq!(client.closed(), Some(CloseReason::WorkerExited));

        let after = client.call("again", Value::Null).await;
        assert!(matches!(after, Err(RpcError::WorkerExited)));
    }

    #[tokio::test]
    async fn test_abandon_pending_rejects_with_disconnected() {
        let (client, mut requests, _peer) = wired();
        let client = Arc::new(client);

        let c = Arc::clone(&client);
        let call = tokio::spawn(async move { c.call("slow", Value::Null).await });
        let _ = next_request(&mut requests).await;

        assert_eq!(client.abandon_pending(CloseReason::Disconnected), 1);
        let result = call.await.unwrap_or_else(|_| unreachable!());
        assert!(matches!(result, Err(RpcError::Disconnected)));
        assert!(matches!(
            client.notify("notifications/initialized", Value::Null).await,
            Err(RpcError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_abandoned_call_still_writes_whole_frame() {
        // A tiny pipe the peer does not drain keeps the first write blocked.
        let (client_out, peer_in) = duplex(32);
        let (_peer_out, client_in) = duplex(4096);
        let client = Arc::new(RpcClient::new(client_in, client_out));

        let big = json!({"pad": "x".repeat(512)});
        let gave_up = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            client.call("big", big.clone()),
        )
        .await;
        assert!(gave_up.is_err());

        let c = Arc::clone(&client);
        tokio::spawn(async move { c.call("ping", Value::Null).await });

        let mut requests = BufReader::new(peer_in).lines();
        let first = next_request(&mut requests).await;
        assert_eq!(first.method, "big");
        assert_eq!(first.params, big);
        let second = next_request(&mut requests).await;
        assert_eq!(second.method, "ping");
    }

    #[tokio::test]
    async fn test_ids_increase_monotonically() {
        let (client, mut requests, _peer) = wired();
        let client = Arc::new(client);
        for _ in 0..3 {
            let c = Arc::clone(&client);
            tokio::spawn(async move { c.call("m", Value::Null).await });
        }
        let mut ids = Vec::new();
        for _ in 0..3 {
            if let RequestId::Number(n) = next_request(&mut requests).await.id {
                ids.push(n);
            }
        }
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(client.pending_count(), 3);
    }
}
