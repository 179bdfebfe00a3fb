use crate::error::{LlmError, Result};
use crate::openai::OpenAiClient;
use crate::types::{ChatMessage, ChatResponse};

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_MAX_TOKENS: u32 = 100;

#[derive(Clone)]
pub struct LlmClient {
    inner: OpenAiClient,
    model: String,
    max_tokens: u32,
}

impl LlmClient {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(api_key: &str, model: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(%e, "reqwest client build failed; falling back to default client");
                reqwest::Client::new()
            });
        Self {
            inner: OpenAiClient::new(client, api_key, model),
            model: model.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.inner = self.inner.with_base_url(base_url);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    #[tracing::instrument(level = "info", skip_all, fields(model = %self.model))]
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatResponse> {
        if messages.is_empty() {
            return Err(LlmError::InvalidInput("no messages to send".to_string()));
        }
        let response = self.inner.chat(messages, self.max_tokens).await?;
        tracing::debug!(
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            finish_reason = %response.finish_reason,
            "chat completion finished"
        );
        Ok(response)
    }

    /// Single-turn completion of `prompt`, returning the trimmed reply text.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(LlmError::InvalidInput("empty prompt".to_string()));
        }
        let response = self.chat(&[ChatMessage::user(prompt)]).await?;
        let text = response.message.content.trim().to_string();
        if text.is_empty() {
            return Err(LlmError::ResponseFormat(
                "completion returned no text".to_string(),
            ));
        }
        Ok(text)
    }
}
