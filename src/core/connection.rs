//! WebSocket connection state
//! One instance per attached transport, owned by the registry

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::warn;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use warp::ws::Message;

use crate::core::message_types::ServerMessage;

/// Opaque handle naming one live connection
pub type ConnectionId = String;

/// State of a single attached transport connection
pub struct Connection {
    pub id: ConnectionId,
    /// Unset until the auth message arrives
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    /// Presence color drawn from the palette at attach time
    pub color: String,
    /// Channels this connection is subscribed to
    pub channels: HashSet<String>,
    /// Rooms this connection has joined
    pub rooms: HashSet<String>,
    sender: mpsc::Sender<Message>,
    shutdown: Arc<Notify>,
    connected_at: Instant,
}

impl Connection {
    pub fn new(id: ConnectionId, color: String, sender: mpsc::Sender<Message>) -> Self {
        Self {
            id,
            user_id: None,
            user_name: None,
            color,
            channels: HashSet::new(),
            rooms: HashSet::new(),
            sender,
            shutdown: Arc::new(Notify::new()),
            connected_at: Instant::now(),
        }
    }

    /// Queue a message without blocking. A full queue means this peer cannot
    /// keep up: the frame is dropped and the connection is shut down so the
    /// broadcast path never stalls on one slow member.
    pub fn send(&self, message: &ServerMessage) -> bool {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to serialize outbound message: {}", e);
                return false;
            }
        };

        match self.sender.try_send(Message::text(text)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    "Outbound queue overflow for connection {}, disconnecting",
                    self.id
                );
                self.shutdown.notify_one();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Signal observed by the connection's writer task
    pub fn shutdown_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    pub fn connection_duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
