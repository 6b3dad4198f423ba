//! Model router configuration.
//!
//! Resolved like [`crate::config::Config`]: explicit builder values win,
//! then environment variables, then defaults. Building fails without an
//! API key, which callers treat as "route with rules only".

use std::path::PathBuf;
use std::time::Duration;

use crate::error::AgentError;

const DEFAULT_PROVIDER: &str = "openai";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// The answer is at most two short JSON entries.
const DEFAULT_MAX_TOKENS: u32 = 256;
const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Settings for [`ModelRouter`](super::ModelRouter) and its provider.
#[derive(Clone)]
pub struct RouterConfig {
    /// Provider name understood by [`create_provider`](super::create_provider).
    pub provider: String,
    /// Provider API key.
    pub api_key: String,
    /// Endpoint override for compatible servers and proxies.
    pub base_url: Option<String>,
    /// Classification model.
    pub model: String,
    /// Completion token cap.
    pub max_tokens: u32,
    /// Bound on one classification; the rule router answers after it.
    pub timeout: Duration,
    /// Directory holding a `router.md` system prompt override.
    pub prompt_dir: Option<PathBuf>,
}

impl RouterConfig {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> RouterConfigBuilder {
        RouterConfigBuilder::default()
    }

    /// Configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key is set.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }
}

impl std::fmt::Debug for RouterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterConfig")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .field("prompt_dir", &self.prompt_dir)
            .finish()
    }
}

/// Builder for [`RouterConfig`].
#[derive(Debug, Clone, Default)]
pub struct RouterConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    timeout: Option<Duration>,
    prompt_dir: Option<PathBuf>,
}

impl RouterConfigBuilder {
    /// Fills unset fields from `HUEBRIDGE_*` and `OPENAI_*` variables.
    ///
    /// Empty values count as unset.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        self.provider = self.provider.or_else(|| env_value("HUEBRIDGE_PROVIDER"));
        self.api_key = self
            .api_key
            .or_else(|| env_value("OPENAI_API_KEY"))
            .or_else(|| env_value("HUEBRIDGE_API_KEY"));
        self.base_url = self
            .base_url
            .or_else(|| env_value("OPENAI_BASE_URL"))
            .or_else(|| env_value("HUEBRIDGE_BASE_URL"));
        self.model = self.model.or_else(|| env_value("HUEBRIDGE_ROUTER_MODEL"));
        self.timeout = self.timeout.or_else(|| {
            env_value("HUEBRIDGE_ROUTER_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
        });
        self.prompt_dir = self
            .prompt_dir
            .or_else(|| env_value("HUEBRIDGE_PROMPT_DIR").map(PathBuf::from));
        self
    }

    /// Sets the provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the endpoint override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the classification model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the completion token cap.
    #[must_use]
    pub const fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    /// Sets the classification timeout.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Sets the prompt override directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Builds the [`RouterConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key was set.
    pub fn build(self) -> Result<RouterConfig, AgentError> {
        Ok(RouterConfig {
            api_key: self.api_key.ok_or(AgentError::ApiKeyMissing)?,
            provider: self.provider.unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
            base_url: self.base_url,
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            prompt_dir: self.prompt_dir,
        })
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
