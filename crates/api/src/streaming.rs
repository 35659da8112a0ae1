//! WebSocket streaming API.
//!
//! Clients connect to `/streaming` and subscribe to individual polls;
//! every tally change, open/close flip, and deletion is pushed as it
//! happens. The same events feed the SSE endpoints for embeds.

#![allow(missing_docs)]

use async_trait::async_trait;
use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use pollo_common::AppResult;
use pollo_core::services::{EventPublisher, OptionTally};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tracing::{error, info, warn};

use crate::middleware::AppState;

/// Streaming query parameters.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Access token for authentication.
    pub token: Option<String>,
}

/// A real-time poll event, serialized as-is onto the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PollEvent {
    /// A vote was recorded; carries the updated tally snapshot.
    VoteCast {
        poll_id: String,
        tally: Vec<OptionTally>,
        total_votes: i32,
    },
    /// The poll was opened or closed.
    PollStateChanged { poll_id: String, is_open: bool },
    /// The poll was deleted.
    PollDeleted { poll_id: String },
}

impl PollEvent {
    /// The poll this event belongs to.
    #[must_use]
    pub fn poll_id(&self) -> &str {
        match self {
            Self::VoteCast { poll_id, .. }
            | Self::PollStateChanged { poll_id, .. }
            | Self::PollDeleted { poll_id } => poll_id,
        }
    }
}

/// Client-to-server message.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Start receiving events for a poll.
    Subscribe { poll_id: String },
    /// Stop receiving events for a poll.
    Unsubscribe { poll_id: String },
}

/// Server-to-client acknowledgement.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Subscription registered.
    Subscribed { poll_id: String },
    /// Subscription removed.
    Unsubscribed { poll_id: String },
}

/// Shared state for streaming.
#[derive(Clone)]
pub struct StreamingState {
    /// Broadcast sender every event passes through.
    pub global_tx: Arc<broadcast::Sender<PollEvent>>,
    /// Per-poll senders for SSE clients (keyed by poll ID).
    poll_channels: Arc<RwLock<HashMap<String, broadcast::Sender<PollEvent>>>>,
}

impl StreamingState {
    /// Create a new streaming state.
    #[must_use]
    pub fn new() -> Self {
        let (global_tx, _) = broadcast::channel(1000);

        Self {
            global_tx: Arc::new(global_tx),
            poll_channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Publish an event to the global stream and, if anyone is listening,
    /// to the event's per-poll channel.
    pub async fn publish(&self, event: PollEvent) {
        let channels = self.poll_channels.read().await;
        if let Some(sender) = channels.get(event.poll_id()) {
            let _ = sender.send(event.clone());
        }
        drop(channels);

        let _ = self.global_tx.send(event);
    }

    /// Get or create the broadcast channel for a poll.
    pub async fn poll_channel(&self, poll_id: &str) -> broadcast::Sender<PollEvent> {
        let mut channels = self.poll_channels.write().await;

        if let Some(sender) = channels.get(poll_id)
            && sender.receiver_count() > 0
        {
            return sender.clone();
        }

        let (sender, _) = broadcast::channel(100);
        channels.insert(poll_id.to_string(), sender.clone());
        sender
    }

    /// Drop per-poll channels nobody subscribes to anymore.
    pub async fn cleanup(&self) {
        let mut channels = self.poll_channels.write().await;
        channels.retain(|_, sender| sender.receiver_count() > 0);
    }

    /// Number of per-poll channels currently registered.
    pub async fn poll_channel_count(&self) -> usize {
        self.poll_channels.read().await.len()
    }
}

impl Default for StreamingState {
    fn default() -> Self {
        Self::new()
    }
}

/// Bridges the core services' event-publisher seam onto the broadcast
/// channels, so votes and poll mutations reach connected clients.
#[derive(Clone)]
pub struct StreamingEventPublisher {
    streaming: StreamingState,
}

impl StreamingEventPublisher {
    /// Create a publisher feeding the given streaming state.
    #[must_use]
    pub const fn new(streaming: StreamingState) -> Self {
        Self { streaming }
    }
}

#[async_trait]
impl EventPublisher for StreamingEventPublisher {
    async fn publish_vote_cast(
        &self,
        poll_id: &str,
        tally: &[OptionTally],
        total_votes: i32,
    ) -> AppResult<()> {
        self.streaming
            .publish(PollEvent::VoteCast {
                poll_id: poll_id.to_string(),
                tally: tally.to_vec(),
                total_votes,
            })
            .await;
        Ok(())
    }

    async fn publish_poll_state_changed(&self, poll_id: &str, is_open: bool) -> AppResult<()> {
        self.streaming
            .publish(PollEvent::PollStateChanged {
                poll_id: poll_id.to_string(),
                is_open,
            })
            .await;
        Ok(())
    }

    async fn publish_poll_deleted(&self, poll_id: &str) -> AppResult<()> {
        self.streaming
            .publish(PollEvent::PollDeleted {
                poll_id: poll_id.to_string(),
            })
            .await;
        Ok(())
    }
}

/// WebSocket handler for streaming.
pub async fn streaming_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<StreamQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    info!("New streaming connection");

    ws.on_upgrade(move |socket| handle_socket(socket, query, state))
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, query: StreamQuery, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Authenticate if token provided; anonymous connections are fine
    let user = if let Some(token) = &query.token {
        match state.user_service.authenticate_by_token(token).await {
            Ok(u) => Some(u),
            Err(e) => {
                warn!("Streaming auth failed: {}", e);
                None
            }
        }
    } else {
        None
    };

    let user_id = user.map(|u| u.id);

    info!(user_id = ?user_id, "Streaming connection established");

    let mut events = state.streaming.global_tx.subscribe();

    // Poll IDs this client asked to follow
    let mut subscriptions: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            // Handle incoming messages from client
            Some(msg) = receiver.next() => {
                match msg {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                let response = handle_client_message(client_msg, &mut subscriptions);
                                let json = serde_json::to_string(&response).unwrap_or_default();
                                if sender.send(Message::Text(json.into())).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!("Failed to parse client message: {}", e);
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("Client closed connection");
                        break;
                    }
                    Ok(Message::Ping(data)) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                }
            }

            // Forward events for subscribed polls
            Ok(event) = events.recv() => {
                if subscriptions.contains(event.poll_id()) {
                    let json = serde_json::to_string(&event).unwrap_or_default();
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    // Subscriptions die with the socket; nothing outlives the connection
    info!(user_id = ?user_id, "Streaming connection closed");
}

/// Handle a client message.
fn handle_client_message(msg: ClientMessage, subscriptions: &mut HashSet<String>) -> ServerMessage {
    match msg {
        ClientMessage::Subscribe { poll_id } => {
            subscriptions.insert(poll_id.clone());
            info!(poll_id = %poll_id, "Subscribed to poll");
            ServerMessage::Subscribed { poll_id }
        }
        ClientMessage::Unsubscribe { poll_id } => {
            subscriptions.remove(&poll_id);
            info!(poll_id = %poll_id, "Unsubscribed from poll");
            ServerMessage::Unsubscribed { poll_id }
        }
    }
}
