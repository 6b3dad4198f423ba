//! Model-based intent classifier.
//!
//! Sends the utterance, the keyword summary and the closed tool list to an
//! LLM and parses its JSON answer into [`RouterAction`]s. Any failure
//! (transport, timeout, malformed output) is returned as an error so a
//! [`WithFallback`](super::router::WithFallback) wrapper can hand the turn
//! to the rule router.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::config::RouterConfig;
use super::prompt::build_router_prompt;
use super::message::ChatRequest;
use super::provider::LlmProvider;
use super::router::{IntentRouter, MAX_ACTIONS, RouteRequest, RouterAction};
use super::swatch::{find_color, hex_for};
use crate::core::Filters;
use crate::error::AgentError;
use crate::tools::{
    FILTER_SEARCH, GENERATE_IMAGE, GenerateImageArgs, SEMANTIC_SEARCH, SearchArgs,
};

/// Tool names the classifier may choose from.
pub const ROUTABLE_TOOLS: [&str; 3] = [FILTER_SEARCH, SEMANTIC_SEARCH, GENERATE_IMAGE];

/// One entry of the model's answer before argument shaping.
#[derive(Debug, Deserialize)]
struct Classified {
    tool: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    rationale: Option<String>,
}

/// Object form of the model's answer.
#[derive(Debug, Deserialize)]
struct ClassifiedWrapper {
    actions: Vec<Value>,
}

/// Intent router backed by an LLM provider.
pub struct ModelRouter {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
    timeout: Duration,
    system_prompt: String,
}

impl ModelRouter {
    /// Creates a router with the given provider, configuration and system prompt.
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        config: &RouterConfig,
        system_prompt: String,
    ) -> Self {
        Self {
            provider,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout: config.timeout,
            system_prompt,
        }
    }

    /// Parses the model output into actions with tool-specific arguments.
    ///
    /// Accepts a bare JSON array or an object with an `actions` array,
    /// optionally wrapped in a markdown code block. Unknown tool names and
    /// duplicates are dropped; at most [`MAX_ACTIONS`] are kept in the
    /// order returned.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ResponseParse`] if the output is not one of
    /// the accepted JSON shapes.
    pub fn parse_actions(
        content: &str,
        request: &RouteRequest<'_>,
    ) -> Result<Vec<RouterAction>, AgentError> {
        let json_str = strip_code_fence(content);
        let parse_error = |message: String| AgentError::ResponseParse {
            message,
            content: content.to_string(),
        };

        let value: Value = serde_json::from_str(json_str)
            .map_err(|e| parse_error(format!("router output is not JSON: {e}")))?;
        let items = match value {
            Value::Array(items) => items,
            Value::Object(_) => {
                serde_json::from_value::<ClassifiedWrapper>(value)
                    .map_err(|e| parse_error(format!("router output has no actions: {e}")))?
                    .actions
            }
            other => return Err(parse_error(format!("unexpected router output: {other}"))),
        };

        let mut seen = HashSet::new();
        let actions = items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<Classified>(item) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!(error = %e, "skipping malformed router entry");
                    None
                }
            })
            .filter(|entry| {
                let known = ROUTABLE_TOOLS.contains(&entry.tool.as_str());
                if !known {
                    debug!(tool = %entry.tool, "skipping unknown tool from router");
                }
                known && seen.insert(entry.tool.clone())
            })
            .take(MAX_ACTIONS)
            .map(|entry| shape_action(entry, request))
            .collect();

        Ok(actions)
    }
}

impl std::fmt::Debug for ModelRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRouter")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl IntentRouter for ModelRouter {
    fn name(&self) -> &'static str {
        "model"
    }

    async fn route(&self, request: &RouteRequest<'_>) -> Result<Vec<RouterAction>, AgentError> {
        let prompt = build_router_prompt(
            request.utterance,
            &request.keywords.summary(),
            &ROUTABLE_TOOLS,
        );

        let chat = ChatRequest::classification(
            self.model.as_str(),
            self.system_prompt.as_str(),
            prompt,
            self.max_tokens,
        );
        let response = tokio::time::timeout(self.timeout, self.provider.chat(&chat))
            .await
            .map_err(|_| AgentError::ApiRequest {
                message: format!("router timed out after {:?}", self.timeout),
                status: None,
            })??;

        debug!(
            model = %self.model,
            tokens = response.usage.total(),
            truncated = response.truncated(),
            finish_reason = ?response.finish_reason,
            "router classification received"
        );

        Self::parse_actions(&response.content, request)
    }
}

/// Removes a surrounding markdown code block.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    }
}

/// Attaches the argument shape each tool expects.
fn shape_action(entry: Classified, request: &RouteRequest<'_>) -> RouterAction {
    let confidence = entry.confidence.unwrap_or(0.5).clamp(0.0, 1.0);
    let rationale = entry.rationale.unwrap_or_default();

    if entry.tool == GENERATE_IMAGE {
        let color = find_color(request.utterance)
            .map(str::to_string)
            .or_else(|| request.keywords.color.clone());
        let args = GenerateImageArgs {
            prompt: request.utterance.to_string(),
            hex: color.as_deref().and_then(hex_for).map(str::to_string),
            color,
            room: request.keywords.room.clone(),
            style: request.keywords.style.clone(),
        };
        return RouterAction::image(&args, confidence, rationale);
    }

    let args = SearchArgs {
        query: request.utterance.to_string(),
        filters: Filters::default(),
        ..SearchArgs::default()
    };
    RouterAction::search(&entry.tool, &args, confidence, rationale)
}
