//! In-memory store for tests and database-less runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::tasks::{Task, TaskStatus};

use super::{AssistantIdentity, MessageStore, ProfileStore, TaskStore, UserProfile};

/// Volatile store backing `--no-db` mode and the test suite.
#[derive(Default)]
pub struct MemoryStore {
    tasks: RwLock<HashMap<Uuid, Task>>,
    messages: RwLock<Vec<(DateTime<Utc>, String)>>,
    users: RwLock<Vec<UserProfile>>,
    identity: RwLock<Option<AssistantIdentity>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a registered user.
    pub async fn add_user(&self, nick_name: impl Into<String>) {
        self.users.write().await.push(UserProfile {
            id: Uuid::new_v4(),
            nick_name: nick_name.into(),
            full_name: None,
            preferences: None,
        });
    }

    /// Seed the assistant identity.
    pub async fn set_identity(&self, identity: AssistantIdentity) {
        *self.identity.write().await = Some(identity);
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create_task(&self, task: &Task) -> Result<(), DatabaseError> {
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, DatabaseError> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn pending_tasks(&self) -> Result<Vec<Task>, DatabaseError> {
        let mut pending: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| !t.is_completed)
            .cloned()
            .collect();
        pending.sort_by_key(|t| (t.execute_at.is_none(), t.execute_at));
        Ok(pending)
    }

    async fn complete_task(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, DatabaseError> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&id) {
            Some(task) => {
                task.is_completed = true;
                task.status = TaskStatus::Completed;
                task.completed_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn due_recurring_completed(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Task>, DatabaseError> {
        Ok(self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| {
                t.is_recurring && t.is_completed && t.execute_at.is_some_and(|at| at < now)
            })
            .cloned()
            .collect())
    }

    async fn reschedule_task(&self, id: Uuid, next: DateTime<Utc>) -> Result<(), DatabaseError> {
        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.get_mut(&id) {
            task.execute_at = Some(next);
            task.is_completed = false;
            task.status = TaskStatus::Scheduled;
            task.completed_at = None;
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn store_message(
        &self,
        entry: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.messages
            .write()
            .await
            .push((sent_at, entry.to_string()));
        Ok(())
    }

    async fn recent_messages(&self, limit: usize) -> Result<Vec<String>, DatabaseError> {
        let messages = self.messages.read().await;
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.iter().skip(skip).map(|(_, m)| m.clone()).collect())
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn registered_users(&self) -> Result<Vec<UserProfile>, DatabaseError> {
        Ok(self.users.read().await.clone())
    }

    async fn assistant_identity(&self) -> Result<Option<AssistantIdentity>, DatabaseError> {
        Ok(self.identity.read().await.clone())
    }
}
