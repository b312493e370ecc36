use crate::error::{ChatError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_API_URL: &str = "https://api.together.xyz/v1";
pub const DEFAULT_MODEL: &str = "meta-llama/Meta-Llama-3-8B-Instruct-Turbo";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// Hosted chat-completion endpoint: one message list in, one answer out.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    pub api_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Per-request timeout; 0 disables it.
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            temperature: None,
            max_tokens: None,
            timeout_secs: 60,
            max_retries: 0,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client (Together AI by default).
pub struct ChatCompletionsClient {
    config: LLMConfig,
    http_client: reqwest::Client,
}

impl ChatCompletionsClient {
    pub fn new(config: LLMConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        Ok(Self {
            http_client: builder.build()?,
            config,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.api_url.trim_end_matches('/'))
    }

    fn build_request_body<'a>(&'a self, messages: &'a [ChatMessage]) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    async fn send_once(&self, body: &CompletionRequest<'_>) -> Result<String> {
        let mut request = self.http_client.post(self.endpoint()).json(body);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let completion: CompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(ChatError::EmptyCompletion)
    }
}

#[async_trait]
impl GenerationClient for ChatCompletionsClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = self.build_request_body(messages);
        let max_delay = Duration::from_millis(self.config.max_backoff_ms);
        let mut delay = Duration::from_millis(self.config.initial_backoff_ms).min(max_delay);
        let mut attempt = 0;

        loop {
            debug!(model = %self.config.model, messages = messages.len(), attempt, "Requesting completion");
            match self.send_once(&body).await {
                Ok(content) => return Ok(content),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(error = %e, attempt, delay_ms = delay.as_millis() as u64, "Completion failed; retrying");
                    tokio::time::sleep(delay).await;
                    delay = next_backoff(delay, max_delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

fn next_backoff(delay: Duration, max_delay: Duration) -> Duration {
    delay.saturating_mul(2).min(max_delay)
}
