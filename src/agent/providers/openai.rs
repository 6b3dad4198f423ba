//! [`LlmProvider`] over `async-openai`.
//!
//! Any server speaking the chat completions API works through
//! [`RouterConfig::base_url`].

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, ResponseFormat,
};
use async_trait::async_trait;

use crate::agent::config::RouterConfig;
use crate::agent::message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
use crate::agent::provider::LlmProvider;
use crate::error::AgentError;

/// OpenAI-compatible chat completions.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    endpoint: Option<String>,
}

impl OpenAiProvider {
    /// Creates a client for the configured key and endpoint.
    #[must_use]
    pub fn new(config: &RouterConfig) -> Self {
        let mut sdk = OpenAIConfig::new().with_api_key(&config.api_key);
        if let Some(base_url) = &config.base_url {
            sdk = sdk.with_api_base(base_url);
        }
        Self {
            client: Client::with_config(sdk),
            endpoint: config.base_url.clone(),
        }
    }

    fn to_sdk_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage, OpenAIError> {
        Ok(match message.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(message.content.as_str())
                .build()?
                .into(),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(message.content.as_str())
                .build()?
                .into(),
        })
    }

    fn to_sdk_request(request: &ChatRequest) -> Result<CreateChatCompletionRequest, OpenAIError> {
        let messages = request
            .messages
            .iter()
            .map(Self::to_sdk_message)
            .collect::<Result<Vec<_>, _>>()?;

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(request.model.as_str()).messages(messages);
        // Some compatible servers reject an explicit zero.
        if let Some(t) = request.temperature.filter(|t| *t > 0.0) {
            builder.temperature(t);
        }
        if let Some(n) = request.max_tokens {
            builder.max_completion_tokens(n);
        }
        if request.json_mode {
            builder.response_format(ResponseFormat::JsonObject);
        }
        builder.build()
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

fn request_error(e: &OpenAIError) -> AgentError {
    AgentError::ApiRequest {
        message: e.to_string(),
        status: None,
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let sdk_request = Self::to_sdk_request(request).map_err(|e| request_error(&e))?;
        let response = self
            .client
            .chat()
            .create(sdk_request)
            .await
            .map_err(|e| request_error(&e))?;

        let usage = response.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        });
        let Some(choice) = response.choices.into_iter().next() else {
            return Err(AgentError::ApiRequest {
                message: "completion has no choices".to_string(),
                status: None,
            });
        };

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            usage: usage.unwrap_or_default(),
            finish_reason: choice
                .finish_reason
                .map(|reason| format!("{reason:?}").to_lowercase()),
        })
    }
}
