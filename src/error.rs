//! Error types shared across the assistant core.
//!
//! Each subsystem that can fail in a domain-specific way gets its own enum;
//! `ParseError` lives with the output parser and `ToolError` with the tool
//! system. Nothing here is allowed to escape the dispatch loop or the
//! rescheduler; both catch and report at the loop body.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Errors from LLM providers.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Authentication failed or no credentials configured.
    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    /// The request could not be sent or returned a failure status.
    #[error("Request to {provider} failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    /// Rate limited by the provider.
    #[error("Rate limited by {provider}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    /// The provider returned a payload we could not interpret.
    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Terminal failure from the generation retry loop.
///
/// Raised only after the retry ceiling is exhausted; the two variants keep
/// "the model kept producing malformed output" distinguishable from "the
/// model call itself kept failing".
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Every attempt parsed unsuccessfully.
    #[error("model output could not be parsed after {attempts} attempt(s): {last_error}")]
    MalformedOutput { attempts: u32, last_error: String },

    /// The final attempt failed before parsing (network, auth, provider).
    #[error("model call failed after {attempts} attempt(s): {last_error}")]
    ProviderFailure { attempts: u32, last_error: String },
}

impl GenerationError {
    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::MalformedOutput { attempts, .. } | Self::ProviderFailure { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Errors delivering to a session's channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The transport side of the session is gone.
    #[error("session channel closed")]
    Closed,

    /// The send itself failed.
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Database errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Connection pool setup or checkout failed.
    #[error("connection pool error: {0}")]
    Pool(String),

    /// Query-level error.
    #[error(transparent)]
    Postgres(#[from] tokio_postgres::Error),

    /// Schema migration failed.
    #[error("migration failed: {0}")]
    Migration(String),

    /// A row held a value the application model cannot represent.
    #[error("invalid row data: {0}")]
    InvalidRow(String),
}

impl From<deadpool_postgres::PoolError> for DatabaseError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        DatabaseError::Pool(err.to_string())
    }
}

/// A single recurrence re-arm failed.
///
/// Never aborts a rescheduler sweep; the failing task is logged and the
/// batch continues.
#[derive(Debug, Error)]
pub enum SchedulingError {
    /// No valid next occurrence could be computed.
    #[error("no valid next occurrence for task {task_id}")]
    NoValidOccurrence { task_id: Uuid },

    /// The task is marked recurring but carries no recurrence specification.
    #[error("task {task_id} is recurring but has no recurrence pattern")]
    MissingRecurrence { task_id: Uuid },

    /// Persisting the new execution time failed.
    #[error(transparent)]
    Store(#[from] DatabaseError),
}
