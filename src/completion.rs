//! Completion service seam.
//!
//! Handlers never talk to the model API directly; they receive an
//! `Arc<dyn CompletionService>` built at process start. [`OpenAiClient`] is
//! the production implementation and speaks the OpenAI chat-completions wire
//! format. Tests substitute scripted fakes.

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::UpstreamError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Output constraint requested from the upstream model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Text,
    JsonObject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub response_format: ResponseFormat,
}

/// Capability to turn role-tagged messages into generated text.
///
/// Implementations make exactly one upstream call per invocation. An empty
/// string is a valid answer; interpreting it is the caller's business.
#[async_trait::async_trait]
pub trait CompletionService: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, request: CompletionRequest) -> Result<String, UpstreamError>;
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        }
    }

    fn render_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
        });
        if request.response_format == ResponseFormat::JsonObject {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }
}

#[async_trait::async_trait]
impl CompletionService for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, UpstreamError> {
        let body = self.render_body(&request);
        let mut rb = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            rb = rb.bearer_auth(key);
        }

        let resp = rb.send().await.map_err(|err| {
            tracing::warn!(error=%err, model=%self.model, "completion request failed");
            UpstreamError::new(err.to_string())
        })?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|err| UpstreamError::new(err.to_string()))?;

        if !status.is_success() {
            let message = upstream_error_message(&text)
                .unwrap_or_else(|| format!("{} status code (no body)", status.as_u16()));
            tracing::warn!(status=status.as_u16(), error=%message, "completion service rejected request");
            return Err(UpstreamError::new(message));
        }

        let json: Value = serde_json::from_str(&text)
            .map_err(|err| UpstreamError::new(format!("Unreadable completion response: {}", err)))?;
        let choice = json
            .pointer("/choices/0/message")
            .ok_or_else(|| UpstreamError::new("Completion response contained no choices"))?;
        // A null content (refusals, tool calls) counts as an empty completion.
        Ok(choice
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }
}

/// Pull the human-readable message out of an OpenAI-style error body.
fn upstream_error_message(body: &str) -> Option<String> {
    if body.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(body) {
        Ok(v) => v
            .pointer("/error/message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some(body.to_string())),
        Err(_) => Some(body.to_string()),
    }
}
