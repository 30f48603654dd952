//! Scripted model client for offline runs and tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ChatMessage, CompletionOptions, LlmClient, LlmError, ModelResponse, Role, ToolSchema};

/// Replays scripted responses in order, then echoes the last user turn.
///
/// Every call is recorded so tests can inspect what the model was shown.
#[derive(Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<ModelResponse, String>>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
    repeat_last: bool,
}

impl MockLlmClient {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(Ok).collect()),
            ..Default::default()
        }
    }

    /// Client that returns `response` for every call.
    pub fn always(response: ModelResponse) -> Self {
        Self {
            script: Mutex::new(VecDeque::from([Ok(response)])),
            repeat_last: true,
            ..Default::default()
        }
    }

    /// Queue a transport failure.
    pub fn push_error(&self, message: impl Into<String>) {
        lock(&self.script).push_back(Err(message.into()));
    }

    /// Number of completions requested so far.
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Conversations passed to each completion, in call order.
    pub fn recorded_calls(&self) -> Vec<Vec<ChatMessage>> {
        lock(&self.calls).clone()
    }

    fn next_scripted(&self) -> Option<Result<ModelResponse, String>> {
        let mut script = lock(&self.script);
        if self.repeat_last && script.len() == 1 {
            return script.front().cloned();
        }
        script.pop_front()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolSchema],
        _options: &CompletionOptions,
    ) -> Result<ModelResponse, LlmError> {
        lock(&self.calls).push(messages.to_vec());

        match self.next_scripted() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(LlmError::InvalidResponse(message)),
            None => {
                let last_user = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.body())
                    .unwrap_or_default();
                Ok(ModelResponse::text(format!("[mock] {}", last_user)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> CompletionOptions {
        CompletionOptions {
            model: "mock".to_string(),
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn test_replays_then_echoes() {
        let client = MockLlmClient::new(vec![ModelResponse::text("first")]);
        let conversation = vec![ChatMessage::user("ping")];

        let first = client.complete(&conversation, &[], &options()).await.unwrap();
        assert_eq!(first.content.as_deref(), Some("first"));

        let second = client.complete(&conversation, &[], &options()).await.unwrap();
        assert_eq!(second.content.as_deref(), Some("[mock] ping"));
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_always_repeats() {
        let client = MockLlmClient::always(ModelResponse::text("same"));
        for _ in 0..3 {
            let r = client.complete(&[], &[], &options()).await.unwrap();
            assert_eq!(r.content.as_deref(), Some("same"));
        }
    }

    #[tokio::test]
    async fn test_scripted_error() {
        let client = MockLlmClient::new(vec![]);
        client.push_error("boom");
        let err = client.complete(&[], &[], &options()).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
