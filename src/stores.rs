//! External collaborator stores: sessions, cross-session memory, and goals.
//!
//! The engine consumes these as trait-shaped capabilities; a real deployment
//! backs them with a relational store. The in-memory implementations here are
//! used by tests and by embedders that do not need durability.
//!
//! The memory blob is process-wide, append-only mutable state. All access
//! goes through a mutex-guarded accessor whose only mutation entry point is
//! `append`, so callers cannot introduce read-modify-write races.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::EngineError;

/// Default status for newly created goals.
pub const DEFAULT_GOAL_STATUS: &str = "pending";

/// A stored chat message, ordered by `created_at` within its session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Message identifier.
    pub id: String,
    /// Owning session identifier.
    pub session_id: String,
    /// Message text.
    pub content: String,
    /// `true` for user messages, `false` for assistant messages.
    pub is_user: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A per-session goal record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    /// Goal identifier.
    pub id: String,
    /// Owning session identifier.
    pub session_id: String,
    /// Short goal title.
    pub title: String,
    /// Longer description of what the user wants to achieve.
    pub description: String,
    /// Optional target date.
    pub deadline: Option<NaiveDate>,
    /// Free-form status, defaults to "pending".
    pub status: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Fields for creating a goal; identifier and timestamp are assigned by the
/// store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalDraft {
    /// Short goal title.
    pub title: String,
    /// Longer description.
    #[serde(default)]
    pub description: String,
    /// Optional target date.
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    /// Status; the store substitutes "pending" when absent.
    #[serde(default)]
    pub status: Option<String>,
}

/// Chat session persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns `true` when `session_id` refers to an existing session.
    async fn exists(&self, session_id: &str) -> Result<bool, EngineError>;

    /// Last `n` messages of the session, in chronological order.
    async fn recent_messages(
        &self,
        session_id: &str,
        n: usize,
    ) -> Result<Vec<ChatTurn>, EngineError>;

    /// Appends a message and returns its identifier.
    async fn append_message(
        &self,
        session_id: &str,
        content: &str,
        is_user: bool,
    ) -> Result<String, EngineError>;
}

/// Cross-session preference memory: one free-text blob, append-only.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Current memory text, `None` when never written.
    async fn get(&self) -> Result<Option<String>, EngineError>;

    /// Appends one line to the memory blob.
    async fn append(&self, line: &str) -> Result<(), EngineError>;
}

/// Per-session goal persistence.
#[async_trait]
pub trait GoalStore: Send + Sync {
    /// All goals for a session, newest first.
    async fn list(&self, session_id: &str) -> Result<Vec<Goal>, EngineError>;

    /// Creates a goal from a draft and returns the stored record.
    async fn create(&self, session_id: &str, draft: GoalDraft) -> Result<Goal, EngineError>;
}

/// In-memory [`SessionStore`].
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<Mutex<HashMap<String, Vec<ChatTurn>>>>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session so subsequent requests against it validate.
    pub fn create_session(&self, session_id: &str) {
        self.sessions
            .lock()
            .entry(session_id.to_string())
            .or_default();
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn exists(&self, session_id: &str) -> Result<bool, EngineError> {
        Ok(self.sessions.lock().contains_key(session_id))
    }

    async fn recent_messages(
        &self,
        session_id: &str,
        n: usize,
    ) -> Result<Vec<ChatTurn>, EngineError> {
        let sessions = self.sessions.lock();
        let turns = sessions
            .get(session_id)
            .ok_or_else(|| EngineError::NotFound(format!("session {session_id}")))?;
        let start = turns.len().saturating_sub(n);
        Ok(turns[start..].to_vec())
    }

    async fn append_message(
        &self,
        session_id: &str,
        content: &str,
        is_user: bool,
    ) -> Result<String, EngineError> {
        let mut sessions = self.sessions.lock();
        let turns = sessions
            .get_mut(session_id)
            .ok_or_else(|| EngineError::NotFound(format!("session {session_id}")))?;
        let id = Uuid::new_v4().to_string();
        turns.push(ChatTurn {
            id: id.clone(),
            session_id: session_id.to_string(),
            content: content.to_string(),
            is_user,
            created_at: Utc::now(),
        });
        Ok(id)
    }
}

/// Process-wide memory blob behind a mutex.
///
/// `append` is the only mutation entry point; the read-modify-append happens
/// inside one critical section, so concurrent requests cannot lose updates.
#[derive(Clone, Default)]
pub struct SharedMemory {
    blob: Arc<Mutex<Option<String>>>,
}

impl SharedMemory {
    /// Creates an empty (uninitialized) memory blob.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a blob seeded with existing preference text.
    #[must_use]
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            blob: Arc::new(Mutex::new(Some(text.into()))),
        }
    }
}

#[async_trait]
impl MemoryStore for SharedMemory {
    async fn get(&self) -> Result<Option<String>, EngineError> {
        Ok(self.blob.lock().clone())
    }

    async fn append(&self, line: &str) -> Result<(), EngineError> {
        let mut blob = self.blob.lock();
        match blob.as_mut() {
            Some(text) => {
                text.push('\n');
                text.push_str(line);
            }
            None => *blob = Some(line.to_string()),
        }
        Ok(())
    }
}

/// In-memory [`GoalStore`].
#[derive(Clone, Default)]
pub struct InMemoryGoalStore {
    goals: Arc<Mutex<Vec<Goal>>>,
}

impl InMemoryGoalStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GoalStore for InMemoryGoalStore {
    async fn list(&self, session_id: &str) -> Result<Vec<Goal>, EngineError> {
        let goals = self.goals.lock();
        let mut matching: Vec<Goal> = goals
            .iter()
            .filter(|goal| goal.session_id == session_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn create(&self, session_id: &str, draft: GoalDraft) -> Result<Goal, EngineError> {
        let goal = Goal {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            title: draft.title,
            description: draft.description,
            deadline: draft.deadline,
            status: draft.status.unwrap_or_else(|| DEFAULT_GOAL_STATUS.to_string()),
            created_at: Utc::now(),
        };
        self.goals.lock().push(goal.clone());
        Ok(goal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_store_orders_recent_messages_chronologically() {
        let store = InMemorySessionStore::new();
        store.create_session("s1");

        for i in 0..7 {
            store
                .append_message("s1", &format!("msg {i}"), i % 2 == 0)
                .await
                .unwrap();
        }

        let recent = store.recent_messages("s1", 5).await.unwrap();
        assert_eq!(recent.len(), 5);
        assert_eq!(recent.first().unwrap().content, "msg 2");
        assert_eq!(recent.last().unwrap().content, "msg 6");
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let store = InMemorySessionStore::new();
        assert!(!store.exists("ghost").await.unwrap());
        assert!(store
            .append_message("ghost", "hi", true)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn memory_append_initializes_then_extends() {
        let memory = SharedMemory::new();
        assert_eq!(memory.get().await.unwrap(), None);

        memory.append("Prefers visual explanations").await.unwrap();
        memory.append("Struggles with recursion").await.unwrap();

        let text = memory.get().await.unwrap().unwrap();
        assert_eq!(
            text,
            "Prefers visual explanations\nStruggles with recursion"
        );
    }

    #[tokio::test]
    async fn goal_store_defaults_status_and_scopes_by_session() {
        let store = InMemoryGoalStore::new();
        let goal = store
            .create(
                "s1",
                GoalDraft {
                    title: "Learn Rust".into(),
                    description: "Finish the book".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(goal.status, "pending");

        store
            .create("s2", GoalDraft { title: "Other".into(), ..Default::default() })
            .await
            .unwrap();

        let listed = store.list("s1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Learn Rust");
    }
}
