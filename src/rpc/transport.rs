//! Stdio transport: owns the worker process and its JSON-RPC client.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::{CloseReason, RpcClient};
use super::message::{Implementation, InitializeParams, InitializeResult, PROTOCOL_VERSION};
use crate::error::RpcError;

/// How to launch the worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    /// Program to execute.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
}

impl WorkerCommand {
    /// Creates a worker command.
    #[must_use]
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

struct Connection {
    child: Child,
    client: Arc<RpcClient>,
    server: InitializeResult,
    stderr_task: Option<JoinHandle<()>>,
}

/// JSON-RPC peer over a child process's stdio.
///
/// `connect` spawns the worker and completes the `initialize` handshake;
/// `call` is safe to use concurrently from many tasks; `disconnect` kills
/// the worker and rejects every call still pending.
pub struct StdioTransport {
    command: WorkerCommand,
    handshake_timeout: Option<Duration>,
    connection: Mutex<Option<Connection>>,
}

impl StdioTransport {
    /// Creates a disconnected transport with an unbounded handshake.
    #[must_use]
    pub fn new(command: WorkerCommand) -> Self {
        Self {
            command,
            handshake_timeout: None,
            connection: Mutex::new(None),
        }
    }

    /// Bounds the `initialize` handshake. A worker that misses it is killed.
    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    /// Spawns the worker and performs the `initialize` handshake.
    ///
    /// Idempotent: returns the existing handshake result when already
    /// connected.
    ///
    /// # Errors
    ///
    /// - [`RpcError::Spawn`] if the process could not be started
    /// - [`RpcError::WorkerExited`] if it exited before answering `initialize`
    /// - [`RpcError::Remote`] if it rejected `initialize`
    /// - [`RpcError::HandshakeTimeout`] if it did not answer in time
    pub async fn connect(&self) -> Result<InitializeResult, RpcError> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            if !conn.client.is_closed() {
                return Ok(conn.server.clone());
            }
        }
        if let Some(stale) = slot.take() {
            Self::teardown(stale, CloseReason::WorkerExited).await;
        }

        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RpcError::Spawn {
                command: self.command.display(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or(RpcError::MissingPipe { stream: "stdin" })?;
        let stdout = child
            .stdout
            .take()
            .ok_or(RpcError::MissingPipe { stream: "stdout" })?;
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "huebridge::worker", "{line}");
                }
            })
        });

        let client = Arc::new(RpcClient::new(stdout, stdin));
        let handshake = match self.handshake_timeout {
            Some(limit) => tokio::time::timeout(limit, Self::handshake(&client))
                .await
                .unwrap_or_else(|_| {
                    Err(RpcError::HandshakeTimeout {
                        timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    })
                }),
            None => Self::handshake(&client).await,
        };
        match handshake {
            Ok(server) => {
                info!(
                    worker = %self.command.display(),
                    server = %server.server_info.name,
                    protocol = %server.protocol_version,
                    "worker connected"
                );
                *slot = Some(Connection {
                    child,
                    client,
                    server: server.clone(),
                    stderr_task,
                });
                Ok(server)
            }
            Err(e) => {
                warn!(worker = %self.command.display(), error = %e, "worker handshake failed");
                Self::shutdown(&client, &mut child, stderr_task, CloseReason::Disconnected).await;
                Err(e)
            }
        }
    }

    async fn handshake(client: &RpcClient) -> Result<InitializeResult, RpcError> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: json!({}),
            client_info: Implementation::current(),
        };
        let result = client.call("initialize", serde_json::to_value(params)?).await?;
        let server: InitializeResult = serde_json::from_value(result)?;
        client.notify("notifications/initialized", Value::Null).await?;
        Ok(server)
    }

    /// Issues a call on the connected worker.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::NotConnected`] before `connect`, otherwise
    /// whatever [`RpcClient::call`] returns.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let client = self.client().await.ok_or(RpcError::NotConnected)?;
        client.call(method, params).await
    }

    /// Kills the worker and rejects every pending call with
    /// [`RpcError::Disconnected`]. No-op when not connected.
    pub async fn disconnect(&self) {
        let conn = self.connection.lock().await.take();
        if let Some(conn) = conn {
            Self::teardown(conn, CloseReason::Disconnected).await;
            info!(worker = %self.command.display(), "worker disconnected");
        }
    }

    async fn teardown(mut conn: Connection, reason: CloseReason) {
        Self::shutdown(&conn.client, &mut conn.child, conn.stderr_task.take(), reason).await;
    }

    async fn shutdown(
        client: &RpcClient,
        child: &mut Child,
        stderr_task: Option<JoinHandle<()>>,
        reason: CloseReason,
    ) {
        client.abandon_pending(reason);
        if let Err(e) = child.kill().await {
            debug!(error = %e, "worker already gone");
        }
        if let Some(task) = stderr_task {
            task.abort();
        }
    }

    /// Returns `true` while a live worker is attached.
    pub async fn is_connected(&self) -> bool {
        self.client().await.is_some_and(|c| !c.is_closed())
    }

    /// Number of calls awaiting a response.
    pub async fn pending_count(&self) -> usize {
        self.client().await.map_or(0, |c| c.pending_count())
    }

    async fn client(&self) -> Option<Arc<RpcClient>> {
        self.connection
            .lock()
            .await
            .as_ref()
            .map(|conn| Arc::clone(&conn.client))
    }

    /// The worker command line.
    #[must_use]
    pub const fn command(&self) -> &WorkerCommand {
        &self.command
    }
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}
