use crate::dialogue::{Role, Turn};
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    },
};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failures of the language-generation service.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("LLM request failed: {0}")]
    Api(#[from] OpenAIError),
    #[error("LLM response contained no choices")]
    NoChoices,
    #[error("LLM response carried no message content")]
    Empty,
    #[error("LLM request timed out after {0:?}")]
    Timeout(Duration),
}

/// A generic client for the language-generation service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generates the next assistant reply for the given conversation.
    async fn generate(&self, turns: &[Turn]) -> Result<String, GenerationError>;
}

/// An implementation of `LLMClient` for any OpenAI-compatible API.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u32,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The model identifier to use for chat completions (e.g., "gpt-3.5-turbo").
    /// * `max_tokens` - Upper bound on the length of each reply.
    pub fn new(config: OpenAIConfig, model: String, max_tokens: u32) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            max_tokens,
        }
    }
}

/// Converts a dialogue turn into the matching chat completion message.
pub fn to_request_message(turn: &Turn) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    let content = turn.content().to_string();
    let message = match turn.role() {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()?
            .into(),
    };
    Ok(message)
}

#[async_trait]
impl LLMClient for OpenAICompatibleClient {
    #[allow(deprecated)]
    async fn generate(&self, turns: &[Turn]) -> Result<String, GenerationError> {
        let messages = turns
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>, _>>()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_tokens(self.max_tokens)
            .build()?;

        debug!(model = %self.model, turns = turns.len(), "Sending chat completion request");
        let response: CreateChatCompletionResponse = self.client.chat().create(request).await?;

        reply_text(response)
    }
}

/// Extracts the first choice's text. Blank text is a valid, if silent, reply.
pub fn reply_text(response: CreateChatCompletionResponse) -> Result<String, GenerationError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or(GenerationError::NoChoices)?;
    choice.message.content.ok_or(GenerationError::Empty)
}
