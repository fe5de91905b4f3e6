//! Daily sweep that re-arms completed recurring tasks.

use std::sync::Arc;

use chrono::{DateTime, Days, Local, TimeZone, Utc};

use crate::error::SchedulingError;
use crate::store::TaskStore;
use crate::tasks::{Task, next_execution};

/// Re-arms recurring tasks whose current occurrence has completed.
///
/// Runs forever: one sweep immediately on startup, then one per day at
/// 00:01 local time. A failure on one task never aborts the rest of the
/// cohort, and a failed sweep never kills the loop.
pub struct Rescheduler {
    store: Arc<dyn TaskStore>,
}

impl Rescheduler {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Run the daily loop. Spawn this as a background task.
    pub async fn run(self) {
        loop {
            match self.process_cohort().await {
                Ok(rearmed) => {
                    tracing::info!(rearmed, "recurring task sweep finished");
                }
                Err(e) => {
                    tracing::error!("recurring task sweep failed: {e}");
                }
            }

            let pause = until_next_sweep(Local::now());
            tracing::info!("next recurring task sweep in {}s", pause.as_secs());
            tokio::time::sleep(pause).await;
        }
    }

    /// One sweep: fetch every recurring, completed, past-due task and
    /// re-arm each. Returns how many were re-armed.
    pub async fn process_cohort(&self) -> Result<usize, SchedulingError> {
        let cohort = self.store.due_recurring_completed(Utc::now()).await?;
        let mut rearmed = 0;

        for task in &cohort {
            match self.rearm(task).await {
                Ok(next) => {
                    tracing::debug!(task_id = %task.id, next = %next, "task re-armed");
                    rearmed += 1;
                }
                Err(SchedulingError::NoValidOccurrence { task_id }) => {
                    // Left unscheduled on purpose; the operator sees this
                    // warning on every sweep until the task is fixed.
                    tracing::warn!(%task_id, "could not compute next occurrence, task left unscheduled");
                }
                Err(e) => {
                    tracing::error!(task_id = %task.id, "failed to reschedule task: {e}");
                }
            }
        }

        Ok(rearmed)
    }

    async fn rearm(&self, task: &Task) -> Result<DateTime<Utc>, SchedulingError> {
        let recurrence = task
            .recurrence
            .as_ref()
            .ok_or(SchedulingError::MissingRecurrence { task_id: task.id })?;
        let execute_at = task
            .execute_at
            .ok_or(SchedulingError::NoValidOccurrence { task_id: task.id })?;

        let next = next_execution(recurrence, execute_at, Utc::now())
            .ok_or(SchedulingError::NoValidOccurrence { task_id: task.id })?;

        self.store.reschedule_task(task.id, next).await?;
        Ok(next)
    }
}

/// Duration until the next 00:01 boundary after `now`.
///
/// Generic over the timezone so tests can pin it; production passes
/// `Local::now()`.
pub fn until_next_sweep<Tz: TimeZone>(now: DateTime<Tz>) -> std::time::Duration {
    let tomorrow = now.date_naive() + Days::new(1);
    let target = tomorrow.and_hms_opt(0, 1, 0).unwrap_or_default();

    // On DST transitions the boundary may be ambiguous or skipped; take
    // the earliest valid interpretation.
    let target = match now.timezone().from_local_datetime(&target) {
        chrono::offset::LocalResult::Single(t) | chrono::offset::LocalResult::Ambiguous(t, _) => t,
        chrono::offset::LocalResult::None => now.clone() + chrono::Duration::days(1),
    };

    (target - now).to_std().unwrap_or_default()
}
