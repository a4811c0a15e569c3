use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use paperlink_core::AppConfig;

use crate::error::{EngineError, Result};
use crate::retry::AttemptOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Extraction,
    Translation,
}

impl RequestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Extraction => "extraction",
            Self::Translation => "translation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub kind: RequestKind,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Ask the provider for a JSON object reply.
    pub json_mode: bool,
}

impl CompletionRequest {
    pub fn prompt_chars(&self) -> usize {
        self.messages.iter().map(|m| m.content.chars().count()).sum()
    }

    /// Prompt size in tokens, rounded up: one per ASCII character, two for
    /// anything else (CJK text often tokenizes above one token per character).
    pub fn prompt_token_bound(&self) -> usize {
        self.messages
            .iter()
            .flat_map(|m| m.content.chars())
            .map(|c| if c.is_ascii() { 1 } else { 2 })
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    #[serde(default)]
    pub total_tokens: u64,
}

/// One round trip to a language model. Implementations classify failures;
/// retrying is the caller's job.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> AttemptOutcome<Completion>;
}

// ─── OpenAI-compatible chat completions ───────────────────────────────────────

/// `POST {base_url}/chat/completions` with bearer auth. DeepSeek by default.
pub struct ChatCompletionsBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u64,
}

impl ChatCompletionsBackend {
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(EngineError::Configuration("API key is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("paperlink/", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            model: model.to_string(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = config
            .api_key()
            .map_err(|e| EngineError::Configuration(e.to_string()))?;
        Self::new(
            &config.llm.base_url,
            &api_key,
            &config.llm.model,
            Duration::from_secs(config.llm.timeout_secs),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionBackend for ChatCompletionsBackend {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> AttemptOutcome<Completion> {
        let body = ChatBody {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.json_mode.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let response = match self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                return AttemptOutcome::Retryable(format!("transport: {e}"));
            }
            Err(e) => return AttemptOutcome::Fatal(format!("transport: {e}")),
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let reason = format!("HTTP {}: {}", status.as_u16(), truncate(&text, 200));
            return if is_retryable_status(status) {
                AttemptOutcome::Retryable(reason)
            } else {
                AttemptOutcome::Fatal(reason)
            };
        }

        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => return AttemptOutcome::Retryable(format!("reading body: {e}")),
        };
        let parsed: ChatResponse = match serde_json::from_str(&text) {
            Ok(p) => p,
            Err(e) => return AttemptOutcome::Fatal(format!("unexpected response shape: {e}")),
        };
        let Some(content) = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
        else {
            return AttemptOutcome::Fatal("response has no choices".to_string());
        };

        AttemptOutcome::Success(Completion {
            content,
            total_tokens: parsed.usage.map(|u| u.total_tokens).unwrap_or(0),
        })
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
