//! Adapter between the orchestrator and the tool worker.
//!
//! [`ToolGateway`] owns a [`StdioTransport`], connects it lazily on
//! [`enable`](ToolGateway::enable) and translates generic recommendation
//! requests into `tools/call`s. Every public method degrades to `None` or
//! an empty list when the worker is unavailable, slow, or answers with
//! something unexpected: "no enrichment" is a normal branch for callers.
//!
//! [`ToolBackend`] is the seam the recommender and orchestrator program
//! against; it is implemented by the gateway and, for single-process use,
//! by [`ToolRegistry`] directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core::{Filters, Pick};
use crate::error::RpcError;
use crate::rpc::{StdioTransport, ToolCallParams, ToolCallResult, WorkerCommand};
use crate::tools::{
    FILTER_SEARCH, GENERATE_IMAGE, GenerateImageArgs, ImageRender, SearchArgs, SearchPayload,
    ToolDescriptor, ToolRegistry,
};

/// Pagination and exclusion hints forwarded to the search tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationContext {
    /// Structured filters.
    #[serde(default)]
    pub filters: Filters,
    /// Matches to skip.
    #[serde(default)]
    pub offset: usize,
    /// Page size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Ids the tool must not return.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_ids: Vec<String>,
}

/// Generic recommendation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationRequest {
    /// Free-text query.
    pub query: String,
    /// Filters and pagination.
    #[serde(default)]
    pub context: RecommendationContext,
    /// Preferred tools; the first one is called. Defaults to `filter_search`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
}

impl RecommendationRequest {
    /// Builds a request for one tool from search arguments.
    #[must_use]
    pub fn for_tool(tool: &str, args: &SearchArgs) -> Self {
        Self {
            query: args.query.clone(),
            context: RecommendationContext {
                filters: args.filters.clone(),
                offset: args.offset,
                limit: args.limit,
                exclude_ids: args.exclude_ids.clone(),
            },
            tools: Some(vec![tool.to_string()]),
        }
    }

    /// The tool this request resolves to.
    #[must_use]
    pub fn tool(&self) -> &str {
        self.tools
            .as_ref()
            .and_then(|tools| tools.first())
            .map_or(FILTER_SEARCH, String::as_str)
    }

    /// Search arguments sent to the tool.
    #[must_use]
    pub fn search_args(&self) -> SearchArgs {
        SearchArgs {
            query: self.query.clone(),
            filters: self.context.filters.clone(),
            offset: self.context.offset,
            limit: self.context.limit,
            exclude_ids: self.context.exclude_ids.clone(),
        }
    }
}

/// Provenance of a recommendation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    /// Ranking model reported by the tool.
    pub model: String,
    /// Tokens reported by the tool.
    pub tokens: u32,
    /// Round-trip latency.
    pub latency_ms: u64,
}

/// Reshaped tool result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationResponse {
    /// Ranked picks, best first.
    pub picks: Vec<Pick>,
    /// Provenance.
    pub metadata: ResponseMetadata,
}

impl RecommendationResponse {
    fn from_payload(payload: SearchPayload, latency: Duration) -> Self {
        Self {
            picks: payload.picks,
            metadata: ResponseMetadata {
                model: payload.model,
                tokens: payload.tokens,
                latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            },
        }
    }
}

/// Where tool calls go.
#[async_trait]
pub trait ToolBackend: Send + Sync {
    /// Runs a search tool. `None` means "no results available".
    async fn search(&self, tool: &str, args: &SearchArgs) -> Option<RecommendationResponse>;

    /// Runs the scene render tool. `None` means "no image available".
    async fn generate_image(&self, args: &GenerateImageArgs) -> Option<ImageRender>;
}

/// Lazily connected, failure-tolerant client of the tool worker.
pub struct ToolGateway {
    transport: StdioTransport,
    enabled: AtomicBool,
    lifecycle: Mutex<()>,
    call_timeout: Duration,
}

impl ToolGateway {
    /// Creates a disabled gateway for the given worker.
    #[must_use]
    pub fn new(worker: WorkerCommand, call_timeout: Duration) -> Self {
        Self {
            transport: StdioTransport::new(worker).with_handshake_timeout(call_timeout),
            enabled: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
            call_timeout,
        }
    }

    /// Connects the worker. Idempotent; returns whether the gateway is
    /// enabled afterwards. Connection failures are logged and swallowed.
    ///
    /// The handshake shares the call timeout, so a worker that never
    /// answers leaves the gateway disabled instead of blocking.
    pub async fn enable(&self) -> bool {
        if self.is_enabled() {
            return true;
        }
        let _guard = self.lifecycle.lock().await;
        if self.is_enabled() {
            return true;
        }

        match self.transport.connect().await {
            Ok(server) => {
                self.enabled.store(true, Ordering::Release);
                info!(server = %server.server_info.name, "tool gateway enabled");
                true
            }
            Err(e) => {
                warn!(error = %e, "tool worker unavailable; gateway stays disabled");
                false
            }
        }
    }

    /// Kills the worker. Pending calls are rejected.
    pub async fn disable(&self) {
        let _guard = self.lifecycle.lock().await;
        self.enabled.store(false, Ordering::Release);
        self.transport.disconnect().await;
    }

    /// Whether calls are currently forwarded to the worker.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Tools advertised by the worker; empty when unavailable.
    pub async fn list_tools(&self) -> Vec<ToolDescriptor> {
        #[derive(Deserialize)]
        struct ToolList {
            tools: Vec<ToolDescriptor>,
        }

        if !self.is_enabled() {
            return Vec::new();
        }
        self.request::<ToolList>("tools/list", json!({}))
            .await
            .map(|list| list.tools)
            .unwrap_or_default()
    }

    /// Runs one search tool for a generic request.
    ///
    /// Returns `None` when disabled, on timeout or transport failure, and
    /// when the tool's text payload is not the expected JSON.
    pub async fn process_recommendation(
        &self,
        request: &RecommendationRequest,
    ) -> Option<RecommendationResponse> {
        if !self.is_enabled() {
            return None;
        }
        let tool = request.tool();
        let arguments = serde_json::to_value(request.search_args()).ok()?;

        let started = Instant::now();
        let payload: SearchPayload = self.call_tool(tool, arguments).await?;
        let response = RecommendationResponse::from_payload(payload, started.elapsed());
        debug!(
            tool,
            picks = response.picks.len(),
            latency_ms = response.metadata.latency_ms,
            "recommendation received"
        );
        Some(response)
    }

    /// Runs the scene render tool.
    pub async fn generate_image(&self, args: &GenerateImageArgs) -> Option<ImageRender> {
        if !self.is_enabled() {
            return None;
        }
        let arguments = serde_json::to_value(args).ok()?;
        self.call_tool(GENERATE_IMAGE, arguments).await
    }

    /// Calls a tool and decodes the JSON text of its first content block.
    async fn call_tool<T: DeserializeOwned>(&self, name: &str, arguments: Value) -> Option<T> {
        let params = serde_json::to_value(ToolCallParams {
            name: name.to_string(),
            arguments,
        })
        .ok()?;
        let result: ToolCallResult = self.request("tools/call", params).await?;

        let Some(text) = result.first_text() else {
            warn!(tool = name, "tool returned no text content");
            return None;
        };
        match serde_json::from_str(text) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(tool = name, error = %e, "tool returned an unexpected payload");
                None
            }
        }
    }

    /// Issues one call raced against the call timeout.
    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Option<T> {
        let call = self.transport.call(method, params);
        let outcome = tokio::time::timeout(self.call_timeout, call).await;
        let value = match outcome {
            Ok(Ok(value)) => value,
            Ok(Err(RpcError::WorkerExited | RpcError::NotConnected)) => {
                warn!(method, "tool worker is gone; disabling gateway");
                self.enabled.store(false, Ordering::Release);
                return None;
            }
            Ok(Err(e)) => {
                warn!(method, error = %e, "tool call failed");
                return None;
            }
            Err(_) => {
                warn!(
                    method,
                    timeout_ms = u64::try_from(self.call_timeout.as_millis()).unwrap_or(u64::MAX),
                    "tool call timed out; late response will be dropped"
                );
                return None;
            }
        };

        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(method, error = %e, "unexpected result shape");
                None
            }
        }
    }
}

impl std::fmt::Debug for ToolGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolGateway")
            .field("transport", &self.transport)
            .field("enabled", &self.is_enabled())
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ToolBackend for ToolGateway {
    async fn search(&self, tool: &str, args: &SearchArgs) -> Option<RecommendationResponse> {
        self.process_recommendation(&RecommendationRequest::for_tool(tool, args))
            .await
    }

    async fn generate_image(&self, args: &GenerateImageArgs) -> Option<ImageRender> {
        Self::generate_image(self, args).await
    }
}

#[async_trait]
impl ToolBackend for ToolRegistry {
    async fn search(&self, tool: &str, args: &SearchArgs) -> Option<RecommendationResponse> {
        let started = Instant::now();
        let arguments = serde_json::to_value(args).ok()?;
        let payload: SearchPayload = call_in_process(self, tool, arguments).await?;
        Some(RecommendationResponse::from_payload(payload, started.elapsed()))
    }

    async fn generate_image(&self, args: &GenerateImageArgs) -> Option<ImageRender> {
        call_in_process(self, GENERATE_IMAGE, serde_json::to_value(args).ok()?).await
    }
}

async fn call_in_process<T: DeserializeOwned>(
    registry: &ToolRegistry,
    tool: &str,
    arguments: Value,
) -> Option<T> {
    match registry.call(tool, arguments).await {
        Ok(value) => serde_json::from_value(value)
            .map_err(|e| warn!(tool, error = %e, "unexpected tool payload"))
            .ok(),
        Err(e) => {
            warn!(tool, error = %e, "tool call failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::tools::SEMANTIC_SEARCH;
    use crate::tools::catalog::fixtures;

    #[test]
    fn test_request_defaults_to_filter_search() {
        let request = RecommendationRequest {
            query: "azul".to_string(),
            ..RecommendationRequest::default()
        };
        assert_eq!(request.tool(), FILTER_SEARCH);

        let args = SearchArgs {
            query: "azul".to_string(),
            offset: 2,
            exclude_ids: vec!["p1".to_string()],
            ..SearchArgs::default()
        };
        let request = RecommendationRequest::for_tool(SEMANTIC_SEARCH, &args);
        assert_eq!(request.tool(), SEMANTIC_SEARCH);
        assert_eq!(request.search_args(), args);
    }

    #[tokio::test]
    async fn test_disabled_gateway_returns_nothing() {
        let gateway = ToolGateway::new(
            WorkerCommand::new("/nonexistent/huebridge-worker", Vec::<String>::new()),
            Duration::from_secs(1),
        );
        assert!(!gateway.enable().await);
        assert!(!gateway.is_enabled());
        assert!(gateway.list_tools().await.is_empty());
        assert!(
            gateway
                .process_recommendation(&RecommendationRequest::default())
                .await
                .is_none()
        );
        assert!(
            gateway
                .generate_image(&GenerateImageArgs::default())
                .await
                .is_none()
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_silent_worker_leaves_gateway_disabled() {
        let gateway = ToolGateway::new(
            WorkerCommand::new("sh", ["-c", "sleep 30"]),
            Duration::from_millis(200),
        );
        let enabled = tokio::time::timeout(Duration::from_secs(3), gateway.enable()).await;
        assert_eq!(enabled.ok(), Some(false));
        assert!(!gateway.is_enabled());

        let disabled = tokio::time::timeout(Duration::from_secs(1), gateway.disable()).await;
        assert!(disabled.is_ok());
        assert!(gateway.list_tools().await.is_empty());
    }

    #[tokio::test]
    async fn test_in_process_backend() {
        let registry = ToolRegistry::builtin(Arc::new(fixtures::sample()));
        let args = SearchArgs {
            query: "azul".to_string(),
            filters: Filters {
                color: Some("azul".to_string()),
                ..Filters::default()
            },
            ..SearchArgs::default()
        };
        let response = registry.search(FILTER_SEARCH, &args).await;
        let picks = response.map(|r| r.picks).unwrap_or_default();
        assert!(!picks.is_empty());
        assert!(picks.iter().all(|p| p.id == "p1" || p.id == "p2"));

        assert!(registry.search("nope", &args).await.is_none());
        assert!(
            registry
                .generate_image(&GenerateImageArgs::default())
                .await
                .is_some()
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_garbage_payload_yields_none() {
        let script = r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  [ -z "$id" ] && continue
  case "$line" in
    *'"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"fake","version":"0"}}}\n' "$id" ;;
    *)
      echo "diagnostic noise"
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"not json"}]}}\n' "$id" ;;
  esac
done
"#;
        let gateway = ToolGateway::new(
            WorkerCommand::new("sh", ["-c", script]),
            Duration::from_secs(5),
        );
        assert!(gateway.enable().await);
        assert!(gateway.enable().await);

        let response = gateway
            .process_recommendation(&RecommendationRequest {
                query: "azul".to_string(),
                ..RecommendationRequest::default()
            })
            .await;
        assert!(response.is_none());
        assert!(gateway.is_enabled());

        gateway.disable().await;
        assert!(!gateway.is_enabled());
        assert!(gateway.list_tools().await.is_empty());
    }
}
