//! PostgreSQL store on deadpool-postgres with embedded refinery migrations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Pool, Runtime};
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::DatabaseError;
use crate::tasks::{Recurrence, RecurrenceEnd, RecurrenceType, Task, TaskStatus};

use super::{AssistantIdentity, MessageStore, ProfileStore, TaskStore, UserProfile};

mod embedded {
    refinery::embed_migrations!("migrations");
}

const TASK_COLUMNS: &str = "task_id, task_description, task_execute_at, task_status, \
     is_completed, is_recurring, recurrence_type, recurrence_interval, recurrence_days, \
     recurrence_month_day, recurrence_until, recurrence_count, created_at, task_completed_at";

/// Database store for tasks, messages, and profiles.
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    /// Connect to the database and verify the pool.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let mut cfg = deadpool_postgres::Config::new();
        cfg.url = Some(config.url.clone());
        cfg.pool = Some(deadpool_postgres::PoolConfig {
            max_size: config.pool_size,
            ..Default::default()
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| DatabaseError::Pool(e.to_string()))?;

        // Test connection
        let _ = pool.get().await?;

        Ok(Self { pool })
    }

    /// Apply pending schema migrations.
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let mut client = self.pool.get().await?;
        let report = embedded::migrations::runner()
            .run_async(&mut **client)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        if !report.applied_migrations().is_empty() {
            tracing::info!(
                applied = report.applied_migrations().len(),
                "database migrations applied"
            );
        }
        Ok(())
    }

    async fn conn(&self) -> Result<deadpool_postgres::Object, DatabaseError> {
        Ok(self.pool.get().await?)
    }
}

fn task_from_row(row: &Row) -> Result<Task, DatabaseError> {
    let status: String = row.get("task_status");
    let status: TaskStatus = status.parse().map_err(DatabaseError::InvalidRow)?;

    let is_recurring: bool = row.get("is_recurring");
    let recurrence_type: Option<String> = row.get("recurrence_type");

    let recurrence = match (is_recurring, recurrence_type) {
        (true, Some(kind)) => {
            let recurrence_type: RecurrenceType =
                kind.parse().map_err(DatabaseError::InvalidRow)?;
            let interval: i32 = row.get("recurrence_interval");
            let days: Option<Vec<i16>> = row.get("recurrence_days");
            let month_day: Option<i16> = row.get("recurrence_month_day");
            let until: Option<DateTime<Utc>> = row.get("recurrence_until");
            let count: Option<i32> = row.get("recurrence_count");

            let end = match (until, count) {
                (Some(until), _) => RecurrenceEnd::Until(until),
                (None, Some(count)) => RecurrenceEnd::Count(count.max(0) as u32),
                (None, None) => RecurrenceEnd::Never,
            };

            Some(Recurrence {
                recurrence_type,
                interval: interval.max(1) as u32,
                days: days
                    .unwrap_or_default()
                    .into_iter()
                    .map(|d| d as u8)
                    .collect(),
                month_day: month_day.map(|d| d as u8),
                end,
            })
        }
        _ => None,
    };

    Ok(Task {
        id: row.get("task_id"),
        description: row.get("task_description"),
        execute_at: row.get("task_execute_at"),
        status,
        is_completed: row.get("is_completed"),
        is_recurring,
        recurrence,
        created_at: row.get("created_at"),
        completed_at: row.get("task_completed_at"),
    })
}

#[async_trait]
impl TaskStore for PgStore {
    async fn create_task(&self, task: &Task) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;

        let recurrence_type = task.recurrence.as_ref().map(|r| r.recurrence_type.to_string());
        let interval = task
            .recurrence
            .as_ref()
            .map(|r| r.interval as i32)
            .unwrap_or(1);
        let days: Option<Vec<i16>> = task.recurrence.as_ref().and_then(|r| {
            (!r.days.is_empty()).then(|| r.days.iter().map(|d| i16::from(*d)).collect())
        });
        let month_day = task
            .recurrence
            .as_ref()
            .and_then(|r| r.month_day.map(i16::from));
        let (until, count) = match task.recurrence.as_ref().map(|r| r.end) {
            Some(RecurrenceEnd::Until(until)) => (Some(until), None),
            Some(RecurrenceEnd::Count(count)) => (None, Some(count as i32)),
            _ => (None, None),
        };

        conn.execute(
            r#"
            INSERT INTO tasks (
                task_id, task_description, task_execute_at, task_status,
                is_completed, is_recurring, recurrence_type, recurrence_interval,
                recurrence_days, recurrence_month_day, recurrence_until,
                recurrence_count, created_at, task_completed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
            &[
                &task.id,
                &task.description,
                &task.execute_at,
                &task.status.to_string(),
                &task.is_completed,
                &task.is_recurring,
                &recurrence_type,
                &interval,
                &days,
                &month_day,
                &until,
                &count,
                &task.created_at,
                &task.completed_at,
            ],
        )
        .await?;

        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                format!("SELECT {TASK_COLUMNS} FROM tasks WHERE task_id = $1").as_str(),
                &[&id],
            )
            .await?;

        row.map(|r| task_from_row(&r)).transpose()
    }

    async fn pending_tasks(&self) -> Result<Vec<Task>, DatabaseError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                format!(
                    "SELECT {TASK_COLUMNS} FROM tasks \
                     WHERE NOT is_completed \
                     ORDER BY task_execute_at ASC NULLS LAST"
                )
                .as_str(),
                &[],
            )
            .await?;

        rows.iter().map(task_from_row).collect()
    }

    async fn complete_task(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, DatabaseError> {
        let conn = self.conn().await?;
        let updated = conn
            .execute(
                "UPDATE tasks \
                 SET is_completed = TRUE, task_status = 'completed', task_completed_at = $2 \
                 WHERE task_id = $1",
                &[&id, &at],
            )
            .await?;

        Ok(updated > 0)
    }

    async fn due_recurring_completed(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Task>, DatabaseError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                format!(
                    "SELECT {TASK_COLUMNS} FROM tasks \
                     WHERE is_recurring AND is_completed AND task_execute_at < $1"
                )
                .as_str(),
                &[&now],
            )
            .await?;

        rows.iter().map(task_from_row).collect()
    }

    async fn reschedule_task(&self, id: Uuid, next: DateTime<Utc>) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE tasks \
             SET task_execute_at = $2, is_completed = FALSE, \
                 task_completed_at = NULL, task_status = 'scheduled' \
             WHERE task_id = $1",
            &[&id, &next],
        )
        .await?;

        Ok(())
    }
}

#[async_trait]
impl MessageStore for PgStore {
    async fn store_message(
        &self,
        entry: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO messages (content, date_sent) VALUES ($1, $2)",
            &[&entry, &sent_at],
        )
        .await?;
        Ok(())
    }

    async fn recent_messages(&self, limit: usize) -> Result<Vec<String>, DatabaseError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT content FROM messages ORDER BY date_sent DESC, message_id DESC LIMIT $1",
                &[&(limit as i64)],
            )
            .await?;

        // Newest-first from the query; the transcript wants oldest-first.
        Ok(rows.iter().rev().map(|r| r.get("content")).collect())
    }
}

#[async_trait]
impl ProfileStore for PgStore {
    async fn registered_users(&self) -> Result<Vec<UserProfile>, DatabaseError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT user_id, nick_name, full_name, preferences \
                 FROM user_profile ORDER BY nick_name",
                &[],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|r| UserProfile {
                id: r.get("user_id"),
                nick_name: r.get("nick_name"),
                full_name: r.get("full_name"),
                preferences: r.get("preferences"),
            })
            .collect())
    }

    async fn assistant_identity(&self) -> Result<Option<AssistantIdentity>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT ai_name, ai_base_prompt FROM ai ORDER BY ai_id LIMIT 1",
                &[],
            )
            .await?;

        Ok(row.map(|r| AssistantIdentity {
            name: r.get("ai_name"),
            base_prompt: r.get("ai_base_prompt"),
        }))
    }
}
