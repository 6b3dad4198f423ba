//! Intent routing.
//!
//! An [`IntentRouter`] turns one utterance plus its keyword context into at
//! most [`MAX_ACTIONS`] advisory [`RouterAction`]s. Two strategies exist,
//! the model classifier and the deterministic rule engine, and
//! [`WithFallback`] composes them: the primary runs first and the fallback
//! answers whenever the primary errors or comes back empty.
//!
//! An empty action list is a normal outcome meaning "ask the user to
//! clarify".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::Filters;
use crate::error::AgentError;
use crate::memory::Keywords;
use crate::tools::{GENERATE_IMAGE, GenerateImageArgs, SearchArgs};

/// Maximum actions emitted per turn.
pub const MAX_ACTIONS: usize = 2;

/// One advisory routing decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterAction {
    /// Tool name.
    pub tool: String,
    /// Tool arguments, shaped for the tool.
    #[serde(default)]
    pub args: Value,
    /// Classifier confidence in `[0, 1]`.
    #[serde(default)]
    pub confidence: f32,
    /// Short explanation.
    #[serde(default)]
    pub rationale: String,
}

impl RouterAction {
    /// Search action carrying [`SearchArgs`].
    #[must_use]
    pub fn search(
        tool: &str,
        args: &SearchArgs,
        confidence: f32,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            tool: tool.to_string(),
            args: serde_json::to_value(args).unwrap_or(Value::Null),
            confidence,
            rationale: rationale.into(),
        }
    }

    /// Image action carrying [`GenerateImageArgs`].
    #[must_use]
    pub fn image(args: &GenerateImageArgs, confidence: f32, rationale: impl Into<String>) -> Self {
        Self {
            tool: GENERATE_IMAGE.to_string(),
            args: serde_json::to_value(args).unwrap_or(Value::Null),
            confidence,
            rationale: rationale.into(),
        }
    }

    /// Decodes the arguments as search arguments. Malformed arguments
    /// yield defaults.
    #[must_use]
    pub fn search_args(&self) -> SearchArgs {
        serde_json::from_value(self.args.clone()).unwrap_or_default()
    }

    /// Decodes the arguments as image arguments. Malformed arguments
    /// yield defaults.
    #[must_use]
    pub fn image_args(&self) -> GenerateImageArgs {
        serde_json::from_value(self.args.clone()).unwrap_or_default()
    }

    /// Whether this action asks for a scene render.
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.tool == GENERATE_IMAGE
    }
}

/// Input of a routing decision.
#[derive(Debug, Clone, Copy)]
pub struct RouteRequest<'a> {
    /// Current user utterance.
    pub utterance: &'a str,
    /// Keywords extracted from the conversation so far.
    pub keywords: &'a Keywords,
}

impl<'a> RouteRequest<'a> {
    /// Creates a request.
    #[must_use]
    pub const fn new(utterance: &'a str, keywords: &'a Keywords) -> Self {
        Self {
            utterance,
            keywords,
        }
    }

    /// Filters implied by the keyword context alone.
    #[must_use]
    pub fn context_filters(&self) -> Filters {
        self.keywords.to_filters()
    }
}

/// A routing strategy.
#[async_trait]
pub trait IntentRouter: Send + Sync {
    /// Router name for logging.
    fn name(&self) -> &'static str;

    /// Decides which tools to run for this turn.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] when the strategy cannot produce a decision.
    async fn route(&self, request: &RouteRequest<'_>) -> Result<Vec<RouterAction>, AgentError>;
}

/// Try-primary/else-fallback combinator.
#[derive(Debug, Clone)]
pub struct WithFallback<P, F> {
    primary: P,
    fallback: F,
}

impl<P, F> WithFallback<P, F> {
    /// Combines two routers.
    pub const fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl<P, F> IntentRouter for WithFallback<P, F>
where
    P: IntentRouter,
    F: IntentRouter,
{
    fn name(&self) -> &'static str {
        "with-fallback"
    }

    async fn route(&self, request: &RouteRequest<'_>) -> Result<Vec<RouterAction>, AgentError> {
        match self.primary.route(request).await {
            Ok(mut actions) if !actions.is_empty() => {
                actions.truncate(MAX_ACTIONS);
                return Ok(actions);
            }
            Ok(_) => debug!(
                router = self.primary.name(),
                "primary router returned no actions, using fallback"
            ),
            Err(e) => warn!(
                router = self.primary.name(),
                error = %e,
                "primary router failed, using fallback"
            ),
        }

        let mut actions = self.fallback.route(request).await?;
        actions.truncate(MAX_ACTIONS);
        Ok(actions)
    }
}

/// Routes a turn, degrading any error to "no actions".
pub async fn route_or_empty(router: &dyn IntentRouter, request: &RouteRequest<'_>) -> Vec<RouterAction> {
    match router.route(request).await {
        Ok(mut actions) => {
            actions.truncate(MAX_ACTIONS);
            actions
        }
        Err(e) => {
            warn!(router = router.name(), error = %e, "routing failed");
            Vec::new()
        }
    }
}
