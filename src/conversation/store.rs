//! File-backed thread store: one JSON document per thread.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::agent::{RunOutcome, RunReport};
use crate::llm::Role;

#[derive(Debug, Error)]
pub enum ThreadError {
    #[error("thread not found: {0}")]
    NotFound(String),

    #[error("invalid thread id: {0}")]
    InvalidId(String),

    #[error("thread storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt thread file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<ThreadMessage>,
}

/// Threads stored as `<dir>/<id>.json`. Writes go through a temp file and a rename.
#[derive(Debug)]
pub struct ThreadStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl ThreadStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, ThreadError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn path(&self, id: &str) -> Result<PathBuf, ThreadError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ThreadError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }

    pub async fn create(&self, title: &str) -> Result<Thread, ThreadError> {
        let now = Utc::now();
        let thread = Thread {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        };
        let _guard = self.write_lock.lock().await;
        self.save(&thread).await?;
        tracing::debug!("Created thread {}", thread.id);
        Ok(thread)
    }

    pub async fn get(&self, id: &str) -> Result<Thread, ThreadError> {
        let path = self.path(id)?;
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ThreadError::NotFound(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&data)?)
    }

    /// All readable threads, most recently updated first. Unreadable files are skipped.
    pub async fn list(&self) -> Result<Vec<Thread>, ThreadError> {
        let mut threads = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match tokio::fs::read(&path).await.map(|d| serde_json::from_slice::<Thread>(&d)) {
                Ok(Ok(thread)) => threads.push(thread),
                Ok(Err(e)) => tracing::warn!("Skipping corrupt thread {}: {}", path.display(), e),
                Err(e) => tracing::warn!("Skipping unreadable thread {}: {}", path.display(), e),
            }
        }
        threads.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(threads)
    }

    pub async fn append(&self, id: &str, role: Role, content: &str) -> Result<Thread, ThreadError> {
        self.append_many(id, &[(role, content.to_string())]).await
    }

    /// Persist a finished run: the task and, when there is one, the final answer.
    pub async fn record_run(&self, id: &str, task: &str, report: &RunReport) -> Result<Thread, ThreadError> {
        let mut entries = vec![(Role::User, task.to_string())];
        if let RunOutcome::Answer(answer) = &report.outcome {
            entries.push((Role::Assistant, answer.clone()));
        }
        self.append_many(id, &entries).await
    }

    async fn append_many(&self, id: &str, entries: &[(Role, String)]) -> Result<Thread, ThreadError> {
        let _guard = self.write_lock.lock().await;
        let mut thread = self.get(id).await?;
        let now = Utc::now();
        for (role, content) in entries {
            thread.messages.push(ThreadMessage {
                id: Uuid::new_v4(),
                role: *role,
                content: content.clone(),
                created_at: now,
            });
        }
        thread.updated_at = now;
        self.save(&thread).await?;
        Ok(thread)
    }

    async fn save(&self, thread: &Thread) -> Result<(), ThreadError> {
        let path = self.path(&thread.id)?;
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(thread)?;
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}
