//! Tool dispatch: one tool request in, exactly one tool turn out.
//!
//! Nothing escapes this boundary. Unknown tools, malformed arguments, tool
//! errors, panics and cancellation all become the body of the tool turn.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::llm::{ChatMessage, ToolCall};
use crate::tools::ToolSet;

/// Argument payloads above this size are treated as malformed.
pub const MAX_ARGUMENT_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Completed,
    NotFound,
    Failed,
    Cancelled,
}

/// The tool turn produced for a request, and how it came about.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub message: ChatMessage,
    pub status: DispatchStatus,
}

impl Dispatched {
    fn new(call: &ToolCall, status: DispatchStatus, body: String) -> Self {
        Self {
            message: ChatMessage::tool(call.id.clone(), body),
            status,
        }
    }

    /// Answer `call` as cancelled without invoking anything.
    pub fn cancelled(call: &ToolCall) -> Self {
        Self::new(call, DispatchStatus::Cancelled, "tool error: cancelled".to_string())
    }
}

/// Parse a raw argument payload into a JSON object.
///
/// Empty, oversized, malformed or non-object payloads become `{}`.
pub fn parse_arguments(raw: &str) -> Value {
    let raw = raw.trim();
    if raw.is_empty() {
        return Value::Object(Map::new());
    }
    if raw.len() > MAX_ARGUMENT_BYTES {
        tracing::warn!("Tool arguments too large ({} bytes), using empty arguments", raw.len());
        return Value::Object(Map::new());
    }
    match serde_json::from_str::<Map<String, Value>>(raw) {
        Ok(map) => Value::Object(map),
        Err(e) => {
            tracing::warn!("Malformed tool arguments ({}), using empty arguments", e);
            Value::Object(Map::new())
        }
    }
}

/// Resolve `call` against `tools` and run it.
pub async fn dispatch(call: &ToolCall, tools: &ToolSet, cancel: &CancellationToken) -> Dispatched {
    let name = call.function.name.as_str();

    let Some(tool) = tools.get(name) else {
        tracing::warn!("Model requested unknown tool: {}", name);
        return Dispatched::new(call, DispatchStatus::NotFound, format!("tool not found: {}", name));
    };

    if cancel.is_cancelled() {
        return Dispatched::cancelled(call);
    }

    let args = parse_arguments(&call.function.arguments);
    tracing::debug!("Calling tool {} with args {}", name, args);

    let invocation = AssertUnwindSafe(tool.execute(args)).catch_unwind();
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        r = invocation => Some(r),
    };

    match outcome {
        None => {
            tracing::info!("Tool {} cancelled", name);
            Dispatched::cancelled(call)
        }
        Some(Ok(Ok(output))) => Dispatched::new(call, DispatchStatus::Completed, output),
        Some(Ok(Err(e))) => {
            tracing::debug!("Tool {} failed: {:#}", name, e);
            Dispatched::new(call, DispatchStatus::Failed, format!("tool error: {:#}", e))
        }
        Some(Err(_)) => {
            tracing::error!("Tool {} panicked", name);
            Dispatched::new(call, DispatchStatus::Failed, "tool error: tool panicked".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use crate::tools::{SimpleTool, Tool};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn tools() -> ToolSet {
        let echo = SimpleTool::new("echo", "echo args", |args: Value| async move { Ok(args.to_string()) });
        let fail = SimpleTool::new("fail", "always fails", |_args: Value| async move {
            Err(anyhow::anyhow!("disk on fire"))
        });
        let slow = SimpleTool::new("slow", "never finishes in time", |_args: Value| async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("late".to_string())
        });
        let panics = SimpleTool::new("panics", "panics", |_args: Value| async move {
            if true {
                panic!("boom");
            }
            Ok(String::new())
        });
        let list: Vec<Arc<dyn Tool>> = vec![Arc::new(echo), Arc::new(fail), Arc::new(slow), Arc::new(panics)];
        ToolSet::new(list)
    }

    #[test]
    fn test_parse_arguments_degrades_to_empty_object() {
        assert_eq!(parse_arguments(""), json!({}));
        assert_eq!(parse_arguments("{not json"), json!({}));
        assert_eq!(parse_arguments("[1, 2]"), json!({}));
        assert_eq!(parse_arguments(&format!("{{\"a\":\"{}\"}}", "x".repeat(MAX_ARGUMENT_BYTES))), json!({}));
        assert_eq!(parse_arguments(r#"{"a": 1}"#), json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported() {
        let call = ToolCall::new("c1", "nonexistent", "{}");
        let out = dispatch(&call, &tools(), &CancellationToken::new()).await;
        assert_eq!(out.status, DispatchStatus::NotFound);
        assert_eq!(out.message.role, Role::Tool);
        assert_eq!(out.message.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(out.message.body(), "tool not found: nonexistent");
    }

    #[tokio::test]
    async fn test_malformed_args_still_invoke_tool() {
        let call = ToolCall::new("c2", "echo", "{broken");
        let out = dispatch(&call, &tools(), &CancellationToken::new()).await;
        assert_eq!(out.status, DispatchStatus::Completed);
        assert_eq!(out.message.body(), "{}");
    }

    #[tokio::test]
    async fn test_tool_error_becomes_body() {
        let call = ToolCall::new("c3", "fail", "{}");
        let out = dispatch(&call, &tools(), &CancellationToken::new()).await;
        assert_eq!(out.status, DispatchStatus::Failed);
        assert_eq!(out.message.body(), "tool error: disk on fire");
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let call = ToolCall::new("c4", "panics", "{}");
        let out = dispatch(&call, &tools(), &CancellationToken::new()).await;
        assert_eq!(out.status, DispatchStatus::Failed);
        assert_eq!(out.message.tool_call_id.as_deref(), Some("c4"));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_tool() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let call = ToolCall::new("c5", "slow", "{}");
        let out = tokio::time::timeout(Duration::from_secs(5), dispatch(&call, &tools(), &cancel))
            .await
            .expect("dispatch must return promptly after cancellation");
        assert_eq!(out.status, DispatchStatus::Cancelled);
        assert_eq!(out.message.body(), "tool error: cancelled");
    }
}
