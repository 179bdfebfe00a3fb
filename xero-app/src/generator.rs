use async_trait::async_trait;
use xero_core::TextGenerator;
use xero_llm::LlmClient;

/// Reply generator backed by the chat-completions API. Without an API key
/// every call fails, so the mention processor falls back to its fixed reply.
pub struct LlmReplyGenerator {
    client: Option<LlmClient>,
}

impl LlmReplyGenerator {
    pub fn new(client: Option<LlmClient>) -> Self {
        Self { client }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }
}

#[async_trait]
impl TextGenerator for LlmReplyGenerator {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        let Some(client) = self.client.as_ref() else {
            return Err(anyhow::anyhow!("no OpenAI API key configured"));
        };
        Ok(client.complete(prompt).await?)
    }
}
