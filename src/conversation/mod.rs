//! Conversation threads and retrieval context.
//!
//! The executor never persists anything itself. Callers that want history
//! record finished runs in a [`ThreadStore`] and hand a [`ThreadContext`] to
//! the executor so later runs see the relevant prior turns.

mod store;

pub use store::{Thread, ThreadError, ThreadMessage, ThreadStore};

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::llm::{ChatMessage, Role};

/// Supplies prior turns for retrieval-augmented continuation.
#[async_trait]
pub trait ConversationContext: Send + Sync {
    /// Turns to place before the task. Only user and assistant text turns are used.
    async fn prior_turns(&self, task: &str) -> anyhow::Result<Vec<ChatMessage>>;
}

/// Context drawn from one stored thread: the latest `recent` turns plus up to
/// `relevant` older turns that share the most words with the task.
pub struct ThreadContext {
    store: Arc<ThreadStore>,
    thread_id: String,
    recent: usize,
    relevant: usize,
}

impl ThreadContext {
    pub fn new(store: Arc<ThreadStore>, thread_id: impl Into<String>) -> Self {
        Self {
            store,
            thread_id: thread_id.into(),
            recent: 6,
            relevant: 4,
        }
    }

    pub fn with_window(mut self, recent: usize, relevant: usize) -> Self {
        self.recent = recent;
        self.relevant = relevant;
        self
    }
}

#[async_trait]
impl ConversationContext for ThreadContext {
    async fn prior_turns(&self, task: &str) -> anyhow::Result<Vec<ChatMessage>> {
        let thread = self.store.get(&self.thread_id).await?;
        let turns: Vec<&ThreadMessage> = thread
            .messages
            .iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant) && !m.content.trim().is_empty())
            .collect();

        let split = turns.len().saturating_sub(self.recent);
        let (older, recent) = turns.split_at(split);

        let query = words(task);
        let mut scored: Vec<(usize, usize)> = older
            .iter()
            .enumerate()
            .map(|(idx, m)| (idx, words(&m.content).intersection(&query).count()))
            .filter(|(_, score)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        let mut picked: Vec<usize> = scored.into_iter().take(self.relevant).map(|(idx, _)| idx).collect();
        picked.sort_unstable();

        Ok(picked
            .into_iter()
            .map(|idx| older[idx])
            .chain(recent.iter().copied())
            .map(|m| ChatMessage::new(m.role, m.content.clone()))
            .collect())
    }
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
        .map(|w| w.to_lowercase())
        .collect()
}
