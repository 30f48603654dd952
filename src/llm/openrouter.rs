//! OpenAI-compatible chat completion client (OpenRouter by default).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use super::{ChatMessage, CompletionOptions, LlmClient, LlmError, ModelResponse, TokenUsage, ToolCall, ToolSchema};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const MAX_BACKOFF_EXPONENT: u32 = 6;

/// Transport settings for [`OpenRouterClient`].
#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    /// Zero disables pacing.
    pub requests_per_min: u32,
}

impl OpenRouterConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
            max_retries: 3,
            requests_per_min: 60,
        }
    }
}

/// Chat completion client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenRouterClient {
    http: reqwest::Client,
    config: OpenRouterConfig,
    next_slot: Mutex<Option<Instant>>,
}

impl OpenRouterClient {
    pub fn new(config: OpenRouterConfig) -> Result<Self, LlmError> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("skill-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            config,
            next_slot: Mutex::new(None),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// Wait until the next request slot allowed by `requests_per_min`.
    async fn pace(&self) {
        if self.config.requests_per_min == 0 {
            return;
        }
        let interval = Duration::from_secs(60) / self.config.requests_per_min;
        let wait = {
            let mut slot = self.next_slot.lock().await;
            let now = Instant::now();
            let start = match *slot {
                Some(at) if at > now => at,
                _ => now,
            };
            *slot = Some(start + interval);
            start.saturating_duration_since(now)
        };
        if !wait.is_zero() {
            tracing::debug!("Rate limit pacing: waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }

    async fn send_once(&self, body: &serde_json::Value) -> Result<ModelResponse, LlmError> {
        self.pace().await;

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: truncate(&body, 500),
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        parsed.into_model_response()
    }
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
        options: &CompletionOptions,
    ) -> Result<ModelResponse, LlmError> {
        let body = request_body(messages, tools, options);

        let mut attempt = 0u32;
        loop {
            match self.send_once(&body).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let backoff = retry_backoff(attempt);
                    tracing::warn!(
                        "Completion attempt {} failed ({}), retrying in {:?}",
                        attempt + 1,
                        e,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Exponential backoff from 500ms, capped at 32s.
fn retry_backoff(attempt: u32) -> Duration {
    Duration::from_millis(500 * 2u64.pow(attempt.min(MAX_BACKOFF_EXPONENT)))
}

fn request_body(
    messages: &[ChatMessage],
    tools: &[ToolSchema],
    options: &CompletionOptions,
) -> serde_json::Value {
    let mut body = json!({
        "model": options.model,
        "messages": messages,
        "temperature": options.temperature,
    });
    if !tools.is_empty() {
        body["tools"] = json!(tools);
        body["tool_choice"] = json!("auto");
    }
    body
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

impl CompletionResponse {
    fn into_model_response(self) -> Result<ModelResponse, LlmError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;
        Ok(ModelResponse {
            content: choice.message.content,
            tool_calls: choice.message.tool_calls.unwrap_or_default(),
            usage: self.usage,
        })
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}... [truncated]", head)
    }
}
