//! Rolling conversation transcript.
//!
//! Every message the loop sees, inbound or outbound or operational,
//! becomes one formatted line here, and is written through to the message
//! store for durability. The in-memory tail feeds the prompt.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::store::MessageStore;

use super::SYSTEM_SENDER;

/// Shared transcript: in-memory tail plus write-through persistence.
pub struct Transcript {
    entries: RwLock<VecDeque<String>>,
    store: Arc<dyn MessageStore>,
    window: usize,
}

impl Transcript {
    pub fn new(store: Arc<dyn MessageStore>, window: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            store,
            window: window.max(1),
        }
    }

    /// Format one chat-log entry.
    ///
    /// `12:03:41 Sam [kitchen]: @Keeva turn the lights off`
    pub fn format_entry(
        at: DateTime<Utc>,
        message: &str,
        from: &str,
        to: &str,
        location: Option<&str>,
    ) -> String {
        let timestamp = at.format("%H:%M:%S");
        match location {
            Some(location) => format!("{timestamp} {from} [{location}]: @{to} {message}"),
            None => format!("{timestamp} {from}: @{to} {message}"),
        }
    }

    /// Load the persisted tail into memory. Called once at startup.
    pub async fn warm(&self) {
        match self.store.recent_messages(self.window).await {
            Ok(recent) => {
                let mut entries = self.entries.write().await;
                entries.extend(recent);
            }
            Err(e) => {
                tracing::warn!("could not warm transcript from store: {e}");
            }
        }
    }

    /// Append a message. Store failures are logged, never fatal: losing a
    /// transcript row must not take the loop down.
    pub async fn append(
        &self,
        message: &str,
        from: &str,
        to: &str,
        location: Option<&str>,
    ) -> String {
        let now = Utc::now();
        let entry = Self::format_entry(now, message, from, to, location);

        if let Err(e) = self.store.store_message(&entry, now).await {
            tracing::error!("failed to persist transcript entry: {e}");
        }

        let mut entries = self.entries.write().await;
        entries.push_back(entry.clone());
        while entries.len() > self.window {
            entries.pop_front();
        }

        entry
    }

    /// Append an operational message addressed to the assistant.
    pub async fn append_system(&self, to: &str, message: &str) -> String {
        self.append(message, SYSTEM_SENDER, to, None).await
    }

    /// The current window, oldest first, joined for the prompt.
    pub async fn render(&self) -> String {
        let entries = self.entries.read().await;
        entries.iter().cloned().collect::<Vec<_>>().join("\n")
    }

    /// Snapshot of the current window.
    pub async fn entries(&self) -> Vec<String> {
        self.entries.read().await.iter().cloned().collect()
    }
}
