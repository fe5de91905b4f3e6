//! Task management tools over the task store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use uuid::Uuid;

use crate::store::TaskStore;
use crate::tasks::{Recurrence, RecurrenceType, Task};

use super::super::{Tool, ToolError, split_arguments};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// `/addTask "description" "2025-04-01 09:00" [daily|weekly|monthly|yearly [interval]]`
pub struct AddTaskTool {
    store: Arc<dyn TaskStore>,
}

impl AddTaskTool {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for AddTaskTool {
    fn name(&self) -> &str {
        "addTask"
    }

    fn description(&self) -> &str {
        "Creates a task, optionally recurring."
    }

    fn usage(&self) -> &str {
        "/addTask \"Call dentist\" \"2025-04-01 09:00\" [daily|weekly|monthly|yearly [interval]]"
    }

    async fn invoke(&self, arguments: &str) -> Result<String, ToolError> {
        let args = split_arguments(arguments);
        let [description, due, rest @ ..] = args.as_slice() else {
            return Err(ToolError::InvalidArguments(format!(
                "expected a description and a due date, usage: {}",
                self.usage()
            )));
        };

        let execute_at = NaiveDateTime::parse_from_str(due, DATE_FORMAT)
            .map_err(|_| {
                ToolError::InvalidArguments(format!(
                    "cannot read due date {due:?}, expected {DATE_FORMAT}"
                ))
            })?
            .and_utc();

        let task = match rest {
            [] => Task::once(description, execute_at),
            [kind, rest @ ..] => {
                let recurrence_type: RecurrenceType = kind
                    .parse()
                    .map_err(|e: String| ToolError::InvalidArguments(e))?;
                let interval = match rest {
                    [] => 1,
                    [interval, ..] => interval.parse().map_err(|_| {
                        ToolError::InvalidArguments(format!("not an interval: {interval:?}"))
                    })?,
                };
                Task::recurring(description, execute_at, Recurrence::every(recurrence_type, interval))
            }
        };

        self.store
            .create_task(&task)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        Ok(format!(
            "Task {} created: {} due {}",
            task.id,
            task.description,
            execute_at.format(DATE_FORMAT)
        ))
    }
}

/// `/complete <task-id>`
pub struct CompleteTaskTool {
    store: Arc<dyn TaskStore>,
}

impl CompleteTaskTool {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CompleteTaskTool {
    fn name(&self) -> &str {
        "complete"
    }

    fn description(&self) -> &str {
        "Marks a task from the Tasks list as completed by its id."
    }

    fn usage(&self) -> &str {
        "/complete 4ac90873-5a15-4af2-80fe-5e8b0e30e84b"
    }

    async fn invoke(&self, arguments: &str) -> Result<String, ToolError> {
        let id: Uuid = arguments
            .trim()
            .parse()
            .map_err(|_| ToolError::InvalidArguments(format!("not a task id: {arguments:?}")))?;

        let completed = self
            .store
            .complete_task(id, Utc::now())
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        if completed {
            Ok(format!("Task {id} completed"))
        } else {
            Err(ToolError::ExecutionFailed(format!("no task with id {id}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn add_one_shot_task() {
        let store = Arc::new(MemoryStore::new());
        let tool = AddTaskTool::new(store.clone());

        let result = tool
            .invoke("\"Call dentist\" \"2025-04-01 09:00\"")
            .await
            .unwrap();
        assert!(result.contains("Call dentist"));

        let pending = store.pending_tasks().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(!pending[0].is_recurring);
    }

    #[tokio::test]
    async fn add_recurring_task_with_interval() {
        let store = Arc::new(MemoryStore::new());
        let tool = AddTaskTool::new(store.clone());

        tool.invoke("\"Water plants\" \"2025-04-01 09:00\" daily 2")
            .await
            .unwrap();

        let pending = store.pending_tasks().await.unwrap();
        assert!(pending[0].is_recurring);
        let recurrence = pending[0].recurrence.as_ref().unwrap();
        assert_eq!(recurrence.recurrence_type, RecurrenceType::Daily);
        assert_eq!(recurrence.interval, 2);
    }

    #[tokio::test]
    async fn bad_date_is_invalid_arguments() {
        let store = Arc::new(MemoryStore::new());
        let tool = AddTaskTool::new(store);

        let err = tool.invoke("\"x\" \"tomorrowish\"").await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn complete_marks_task_done() {
        let store = Arc::new(MemoryStore::new());
        let task = Task::once("x", Utc::now());
        store.create_task(&task).await.unwrap();

        let tool = CompleteTaskTool::new(store.clone());
        tool.invoke(&task.id.to_string()).await.unwrap();

        let reloaded = store.get_task(task.id).await.unwrap().unwrap();
        assert!(reloaded.is_completed);
    }

    #[tokio::test]
    async fn complete_unknown_task_reports_failure() {
        let store = Arc::new(MemoryStore::new());
        let tool = CompleteTaskTool::new(store);

        let err = tool.invoke(&Uuid::new_v4().to_string()).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed(_)));
    }
}
