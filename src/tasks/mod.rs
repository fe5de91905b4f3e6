//! Task model and recurring-task scheduling.

mod recurrence;
mod rescheduler;

pub use recurrence::next_execution;
pub use rescheduler::Rescheduler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How often a recurring task repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceType {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Custom,
}

impl std::fmt::Display for RecurrenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::Custom => "custom",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RecurrenceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown recurrence type: {other}")),
        }
    }
}

/// When a recurring task stops repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceEnd {
    /// Repeats until deleted.
    #[default]
    Never,
    /// Repeats until the given timestamp (inclusive).
    Until(DateTime<Utc>),
    /// Repeats the given number of remaining times.
    Count(u32),
}

/// The rule set governing when a recurring task is next due.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub recurrence_type: RecurrenceType,
    /// Every N days/weeks/months/years; always >= 1.
    pub interval: u32,
    /// Weekday numbers, Monday = 1 through Sunday = 7. Weekly only; empty
    /// means "use the natural default from execute_at".
    #[serde(default)]
    pub days: Vec<u8>,
    /// Target day of month. Monthly only; absent means execute_at's day.
    #[serde(default)]
    pub month_day: Option<u8>,
    #[serde(default)]
    pub end: RecurrenceEnd,
}

impl Recurrence {
    /// A simple every-N pattern with no day constraints.
    pub fn every(recurrence_type: RecurrenceType, interval: u32) -> Self {
        Self {
            recurrence_type,
            interval: interval.max(1),
            days: Vec::new(),
            month_day: None,
            end: RecurrenceEnd::Never,
        }
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Scheduled,
    Completed,
    /// Recurring task whose next occurrence could not be computed.
    Unscheduled,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Unscheduled => "unscheduled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "completed" => Ok(Self::Completed),
            "unscheduled" => Ok(Self::Unscheduled),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A scheduled (possibly recurring) task feeding the assistant's context.
///
/// Completing a recurring task does not retire its identity: the
/// rescheduler recomputes `execute_at` and flips `is_completed` back,
/// reincarnating the same row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub description: String,
    /// Next due timestamp; `None` for tasks left unscheduled.
    pub execute_at: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub is_completed: bool,
    pub is_recurring: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Recurrence>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// A one-shot task due at the given time.
    pub fn once(description: impl Into<String>, execute_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            execute_at: Some(execute_at),
            status: TaskStatus::Scheduled,
            is_completed: false,
            is_recurring: false,
            recurrence: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// A recurring task anchored at the given first occurrence.
    pub fn recurring(
        description: impl Into<String>,
        execute_at: DateTime<Utc>,
        recurrence: Recurrence,
    ) -> Self {
        Self {
            recurrence: Some(recurrence),
            is_recurring: true,
            ..Self::once(description, execute_at)
        }
    }
}
