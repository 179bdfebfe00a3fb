use crate::error::{LlmError, Result};
use crate::types::{ChatMessage, ChatResponse, Role, Usage};
use serde::{Deserialize, Serialize};

const OPENAI_API_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(http: reqwest::Client, api_key: &str, model: &str) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: OPENAI_API_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    #[tracing::instrument(level = "info", skip_all)]
    pub async fn chat(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<ChatResponse> {
        let req = OpenAiChatRequest::new(&self.model, messages, max_tokens);

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Http(format!(
                "openai chat status={status} body={body}"
            )));
        }

        let parsed: OpenAiChatResponse = serde_json::from_str(&body)?;
        parsed.try_into()
    }
}

#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
}

impl OpenAiChatRequest {
    fn new(model: &str, messages: &[ChatMessage], max_tokens: u32) -> Self {
        Self {
            model: model.to_string(),
            messages: messages.iter().map(to_openai_message).collect(),
            max_tokens,
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: &'static str,
    content: String,
}

fn to_openai_message(m: &ChatMessage) -> OpenAiMessage {
    let role = match m.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    OpenAiMessage {
        role,
        content: m.content.clone(),
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl TryFrom<OpenAiChatResponse> for ChatResponse {
    type Error = LlmError;

    fn try_from(v: OpenAiChatResponse) -> Result<Self> {
        let choice = v.choices.into_iter().next().ok_or_else(|| {
            LlmError::ResponseFormat("openai response missing choices".to_string())
        })?;
        let usage = v.usage.unwrap_or_default();

        Ok(ChatResponse {
            message: ChatMessage {
                role: Role::Assistant,
                content: choice.message.content.unwrap_or_default(),
            },
            usage: Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
            },
            finish_reason: choice
                .finish_reason
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_carries_model_messages_and_token_budget() {
        let req = OpenAiChatRequest::new(
            "gpt-3.5-turbo",
            &[ChatMessage::user("gm")],
            100,
        );
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "gpt-3.5-turbo",
                "messages": [{"role": "user", "content": "gm"}],
                "max_tokens": 100
            })
        );
    }

    #[test]
    fn first_choice_becomes_the_response() {
        let raw = json!({
            "choices": [
                {"message": {"role": "assistant", "content": "Hello there!"}, "finish_reason": "stop"},
                {"message": {"role": "assistant", "content": "ignored"}}
            ],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        });
        let parsed: OpenAiChatResponse = serde_json::from_value(raw).unwrap();
        let resp = ChatResponse::try_from(parsed).unwrap();
        assert_eq!(resp.message.content, "Hello there!");
        assert_eq!(resp.message.role, Role::Assistant);
        assert_eq!(resp.finish_reason, "stop");
        assert_eq!(resp.usage.completion_tokens, 3);
    }

    #[test]
    fn missing_choices_is_a_format_error() {
        let parsed: OpenAiChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        let err = ChatResponse::try_from(parsed).expect_err("no choices");
        assert!(matches!(err, LlmError::ResponseFormat(_)));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let c = OpenAiClient::new(reqwest::Client::new(), "k", "m").with_base_url("http://x/v1/");
        assert_eq!(c.base_url, "http://x/v1");
    }
}
