//! Interpretation of raw model output.
//!
//! A response is either a final answer or a list of tool requests. Requests
//! come from the provider's native tool-call field or, failing that, from a
//! reply consisting solely of `{"tool": "...", "args": {...}}`.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::llm::{ModelResponse, ToolCall};

/// What the model asked for this step.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelAction {
    /// Final answer text. May be empty; the executor rejects that.
    FinalText(String),
    /// Tool requests in emission order, plus any accompanying text.
    ToolCalls { text: Option<String>, calls: Vec<ToolCall> },
}

/// Classify a model response. Requests without an id get `call_{step}_{index}`.
pub fn interpret(response: ModelResponse, step: usize) -> ModelAction {
    let ModelResponse { content, tool_calls, .. } = response;

    let calls = if tool_calls.is_empty() {
        match content.as_deref().and_then(parse_text_invocation) {
            Some(call) => vec![call],
            None => return ModelAction::FinalText(content.unwrap_or_default()),
        }
    } else {
        tool_calls
    };

    let calls = calls
        .into_iter()
        .enumerate()
        .map(|(index, mut call)| {
            if call.id.trim().is_empty() {
                call.id = format!("call_{}_{}", step, index);
            }
            call
        })
        .collect();

    ModelAction::ToolCalls { text: content, calls }
}

/// Parse a text-protocol tool invocation, tolerating a surrounding code fence.
fn parse_text_invocation(content: &str) -> Option<ToolCall> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"(?s)^```[a-zA-Z]*\s*(.*?)\s*```$").expect("static regex")
    });

    let trimmed = content.trim();
    let body = fence
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(trimmed);
    if !body.starts_with('{') {
        return None;
    }

    let value: Value = serde_json::from_str(body).ok()?;
    let object = value.as_object()?;
    let name = object.get("tool")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }

    let arguments = match object.get("args") {
        Some(Value::String(raw)) => raw.clone(),
        Some(Value::Null) | None => "{}".to_string(),
        Some(other) => other.to_string(),
    };

    Some(ToolCall::new(String::new(), name, arguments))
}
