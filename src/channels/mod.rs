//! Device sessions and the registry the router delivers through.
//!
//! A session binds one connected device to a live delivery sink. The
//! registry is the only mutable state shared between the transport side
//! (connect/disconnect) and the router (reads during delivery); everything
//! goes through the RwLock so the map is never iterated while mutated.

pub mod ws;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::ChannelError;

/// A device able to host a conversation session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Stable identity; at most one active session per device.
    pub id: Uuid,
    pub name: String,
    /// Human-readable placement, e.g. "kitchen" or "office". User actions
    /// can pin delivery to a location.
    pub location: String,
    /// Owning user. `None` marks a shared household device, which receives
    /// messages addressed to any user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// Transport-side handle that can push text to a connected device.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), ChannelError>;
}

/// A live binding between a device and its delivery sink.
pub struct Session {
    pub device: Device,
    pub connected_at: DateTime<Utc>,
    sink: Arc<dyn DeliverySink>,
}

impl Session {
    /// Deliver one message to this session's device.
    pub async fn deliver(&self, text: &str) -> Result<(), ChannelError> {
        self.sink.send(text).await
    }

    /// Whether this session should receive messages addressed to `recipient`.
    fn serves(&self, recipient: &str) -> bool {
        match &self.device.owner {
            Some(owner) => owner == recipient,
            None => true,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("device", &self.device)
            .field("connected_at", &self.connected_at)
            .finish_non_exhaustive()
    }
}

/// All active sessions, keyed by device identity.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session for a device, replacing any previous one for the
    /// same device identity.
    pub async fn add(&self, device: Device, sink: Arc<dyn DeliverySink>) -> Arc<Session> {
        let session = Arc::new(Session {
            device: device.clone(),
            connected_at: Utc::now(),
            sink,
        });

        let previous = self
            .sessions
            .write()
            .await
            .insert(device.id, Arc::clone(&session));
        if previous.is_some() {
            tracing::debug!(device = %device.name, "replaced existing session for device");
        }
        tracing::info!(device = %device.name, location = %device.location, "session added");
        session
    }

    /// Remove a device's session. Returns it if one was active.
    pub async fn remove(&self, device_id: Uuid) -> Option<Arc<Session>> {
        let removed = self.sessions.write().await.remove(&device_id);
        if let Some(session) = &removed {
            tracing::info!(device = %session.device.name, "session removed");
        }
        removed
    }

    /// All sessions that serve the given recipient (owned by them, or
    /// shared devices).
    pub async fn sessions_for(&self, recipient: &str) -> Vec<Arc<Session>> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.serves(recipient))
            .cloned()
            .collect()
    }

    /// Every active session.
    pub async fn all(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Locations of all connected devices, for the prompt.
    pub async fn connected_locations(&self) -> Vec<String> {
        let mut locations: Vec<String> = self
            .sessions
            .read()
            .await
            .values()
            .map(|s| s.device.location.clone())
            .collect();
        locations.sort();
        locations
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tokio::sync::Mutex;

    /// Sink that records everything sent through it.
    #[derive(Default)]
    pub struct RecordingSink {
        pub sent: Mutex<Vec<String>>,
        pub fail: bool,
    }

    impl RecordingSink {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn failing() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl DeliverySink for RecordingSink {
        async fn send(&self, text: &str) -> Result<(), ChannelError> {
            if self.fail {
                return Err(ChannelError::Closed);
            }
            self.sent.lock().await.push(text.to_string());
            Ok(())
        }
    }

    pub fn device(name: &str, location: &str, owner: Option<&str>) -> Device {
        Device {
            id: Uuid::new_v4(),
            name: name.to_string(),
            location: location.to_string(),
            owner: owner.map(String::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{RecordingSink, device};
    use super::*;

    #[tokio::test]
    async fn one_session_per_device_identity() {
        let registry = SessionRegistry::new();
        let dev = device("tablet", "kitchen", None);

        registry.add(dev.clone(), RecordingSink::new()).await;
        registry.add(dev.clone(), RecordingSink::new()).await;

        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn sessions_for_filters_by_owner_and_includes_shared() {
        let registry = SessionRegistry::new();
        registry
            .add(device("sams-phone", "pocket", Some("Sam")), RecordingSink::new())
            .await;
        registry
            .add(device("alex-phone", "pocket", Some("Alex")), RecordingSink::new())
            .await;
        registry
            .add(device("speaker", "kitchen", None), RecordingSink::new())
            .await;

        let sams = registry.sessions_for("Sam").await;
        assert_eq!(sams.len(), 2);
        assert!(sams.iter().all(|s| s.device.owner.as_deref() != Some("Alex")));
    }

    #[tokio::test]
    async fn remove_returns_active_session() {
        let registry = SessionRegistry::new();
        let dev = device("tablet", "kitchen", None);
        registry.add(dev.clone(), RecordingSink::new()).await;

        assert!(registry.remove(dev.id).await.is_some());
        assert!(registry.remove(dev.id).await.is_none());
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn delivery_reaches_the_sink() {
        let registry = SessionRegistry::new();
        let sink = RecordingSink::new();
        registry
            .add(device("tablet", "kitchen", None), sink.clone())
            .await;

        let sessions = registry.sessions_for("Sam").await;
        sessions[0].deliver("hello").await.unwrap();

        assert_eq!(*sink.sent.lock().await, vec!["hello".to_string()]);
    }
}
