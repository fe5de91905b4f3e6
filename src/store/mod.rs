//! Persistence abstraction.
//!
//! The dispatch loop, router, and rescheduler only ever see these traits;
//! the Postgres implementation lives in [`postgres`] and an in-memory one
//! in [`memory`] for tests and `--no-db` runs.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::tasks::Task;

/// A registered human user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: Uuid,
    /// The name the assistant addresses the user by (`@nick`).
    pub nick_name: String,
    pub full_name: Option<String>,
    /// Free-text lifestyle notes rendered into the prompt.
    pub preferences: Option<String>,
}

/// The assistant's stored identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantIdentity {
    pub name: String,
    pub base_prompt: String,
}

/// Task storage.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_task(&self, task: &Task) -> Result<(), DatabaseError>;

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, DatabaseError>;

    /// Tasks not yet completed, soonest first. Rendered into the prompt.
    async fn pending_tasks(&self) -> Result<Vec<Task>, DatabaseError>;

    /// Mark a task completed. Returns false when the id is unknown.
    async fn complete_task(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, DatabaseError>;

    /// The rescheduler cohort: recurring, completed, and past due.
    async fn due_recurring_completed(&self, now: DateTime<Utc>)
    -> Result<Vec<Task>, DatabaseError>;

    /// Re-arm a recurring task: new execution time, completion cleared,
    /// status back to scheduled.
    async fn reschedule_task(&self, id: Uuid, next: DateTime<Utc>) -> Result<(), DatabaseError>;
}

/// Transcript persistence. Entries are stored pre-formatted.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn store_message(
        &self,
        entry: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    /// Most recent entries, oldest first. Used to warm the transcript at
    /// startup.
    async fn recent_messages(&self, limit: usize) -> Result<Vec<String>, DatabaseError>;
}

/// Users and assistant identity.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn registered_users(&self) -> Result<Vec<UserProfile>, DatabaseError>;

    /// The assistant's identity row; `None` when not yet seeded.
    async fn assistant_identity(&self) -> Result<Option<AssistantIdentity>, DatabaseError>;
}
