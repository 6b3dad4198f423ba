//! LLM providers behind the model router.
//!
//! [`LlmProvider`] is the only seam between classification and a vendor
//! SDK; [`create_provider`] picks the implementation named in
//! [`RouterConfig::provider`].

use std::sync::Arc;

use async_trait::async_trait;

use super::config::RouterConfig;
use super::message::{ChatRequest, ChatResponse};
use crate::error::AgentError;

/// A chat completion backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Runs one completion.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiRequest`] when the call fails.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError>;
}

/// Builds the provider named in `config`.
///
/// Only `openai` exists, and only with the `openai` feature; it also
/// covers any server speaking the same API through
/// [`RouterConfig::base_url`].
///
/// # Errors
///
/// Returns [`AgentError::UnsupportedProvider`] for any other name.
pub fn create_provider(config: &RouterConfig) -> Result<Arc<dyn LlmProvider>, AgentError> {
    match config.provider.as_str() {
        #[cfg(feature = "openai")]
        "openai" => Ok(Arc::new(super::providers::OpenAiProvider::new(config))),
        other => Err(AgentError::UnsupportedProvider {
            name: other.to_string(),
        }),
    }
}
