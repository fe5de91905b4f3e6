//! WebSocket endpoint binding devices to sessions.
//!
//! A device connects to `/ws` with its identity in the query string. For
//! the lifetime of the socket it owns one session in the registry; text it
//! sends becomes inbound messages for the dispatch loop, and anything the
//! router delivers to the session is pushed down the socket.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::assistant::{InboundMessage, InboundSender};
use crate::error::ChannelError;

use super::{Device, DeliverySink, SessionRegistry};

/// Shared state for the WebSocket routes.
#[derive(Clone)]
pub struct WsState {
    pub sessions: Arc<SessionRegistry>,
    pub inbound: InboundSender,
    pub assistant_name: String,
}

/// Device identity presented at connect time.
#[derive(Debug, Deserialize)]
struct ConnectQuery {
    /// Stable device id; omitted on first connect.
    device_id: Option<Uuid>,
    name: String,
    location: String,
    owner: Option<String>,
}

/// What a connected device sends: who is speaking and what they said.
#[derive(Debug, Deserialize)]
struct ClientMessage {
    nickname: String,
    message: String,
}

/// Sink side of a socket: the session writes here, the socket task drains.
struct WsSink {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl DeliverySink for WsSink {
    async fn send(&self, text: &str) -> Result<(), ChannelError> {
        self.tx
            .send(text.to_string())
            .map_err(|_| ChannelError::Closed)
    }
}

/// Build the WebSocket route fragment.
pub fn routes(state: WsState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ConnectQuery>,
    State(state): State<WsState>,
) -> impl IntoResponse {
    let device = Device {
        id: query.device_id.unwrap_or_else(Uuid::new_v4),
        name: query.name,
        location: query.location,
        owner: query.owner,
    };

    ws.on_upgrade(move |socket| handle_socket(socket, device, state))
}

async fn handle_socket(socket: WebSocket, device: Device, state: WsState) {
    let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<String>();
    let session = state
        .sessions
        .add(device.clone(), Arc::new(WsSink { tx: outgoing_tx }))
        .await;
    // Keep only a weak handle: when a reconnect replaces the session, the
    // registry drops the last strong one, the sink goes with it, and
    // `outgoing_rx` closes below.
    let session = Arc::downgrade(&session);

    announce(&state, format!("Device {} connected.", device.name));

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            outgoing = outgoing_rx.recv() => {
                match outgoing {
                    Some(text) => {
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    // Session replaced by a newer connect for this device.
                    None => break,
                }
            }
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_text(&state, &device, text.as_str());
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(device = %device.name, "websocket error: {e}");
                        break;
                    }
                }
            }
        }
    }

    // Only tear down the registry entry if it is still ours; a reconnect
    // may have replaced it already, in which case our weak handle is dead.
    if session.upgrade().is_some() {
        state.sessions.remove(device.id).await;
        announce(&state, format!("Device {} disconnected.", device.name));
    }
}

fn handle_client_text(state: &WsState, device: &Device, text: &str) {
    let client: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(device = %device.name, "dropping malformed client message: {e}");
            return;
        }
    };

    let inbound = InboundMessage::from_user(client.nickname, &state.assistant_name, client.message)
        .with_location(&device.location);
    if state.inbound.send(inbound).is_err() {
        tracing::error!("dispatch queue closed, dropping inbound message");
    }
}

fn announce(state: &WsState, message: String) {
    if state
        .inbound
        .send(InboundMessage::system(&state.assistant_name, message))
        .is_err()
    {
        tracing::error!("dispatch queue closed, dropping system announcement");
    }
}
