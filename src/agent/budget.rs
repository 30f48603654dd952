//! Character budget over the accumulated conversation.
//!
//! The budget is checked once per step, before the model is queried. Turns
//! appended while a step is in flight may overshoot it; the overshoot is caught
//! at the next step boundary so no tool request is left unanswered.

use crate::llm::ChatMessage;

/// Total characters across every turn body. Tool request payloads are not counted.
pub fn conversation_chars(messages: &[ChatMessage]) -> usize {
    messages.iter().map(|m| m.body().chars().count()).sum()
}

/// Admission decision for the next model query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Exceeded { used: usize, limit: usize },
}

/// Decide whether another query may be issued. `max_chars == 0` disables the check.
pub fn admit(messages: &[ChatMessage], max_chars: usize) -> Admission {
    if max_chars == 0 {
        return Admission::Admit;
    }
    let used = conversation_chars(messages);
    if used > max_chars {
        Admission::Exceeded { used, limit: max_chars }
    } else {
        Admission::Admit
    }
}
