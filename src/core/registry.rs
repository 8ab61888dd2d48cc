//! Connection registry
//! Tracks every live transport connection and its negotiated identity.
//! Pure in-memory bookkeeping; no operation blocks on network I/O.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio::sync::RwLock;
use uuid::Uuid;
use warp::ws::Message;

use crate::constants::PRESENCE_PALETTE;
use crate::core::connection::{Connection, ConnectionId};
use crate::core::message_types::ServerMessage;

/// What a detached connection still referenced, handed back to the caller
/// so it can drive the unsubscribe/leave cascade.
pub struct DetachedConnection {
    pub user_id: Option<String>,
    pub channels: Vec<String>,
    pub rooms: Vec<String>,
}

pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection with empty identity and subscriptions.
    /// Always succeeds; the color is drawn uniformly from the palette.
    pub async fn attach(&self, sender: mpsc::Sender<Message>) -> ConnectionId {
        let id = Uuid::new_v4().to_string();
        let color = {
            let idx = rand::thread_rng().gen_range(0..PRESENCE_PALETTE.len());
            PRESENCE_PALETTE[idx].to_string()
        };

        let connection = Connection::new(id.clone(), color, sender);
        self.connections.write().await.insert(id.clone(), connection);
        id
    }

    /// Bind identity to a connection. Last write wins: a client may
    /// legitimately re-authenticate, so repeat calls simply overwrite.
    pub async fn set_identity(&self, id: &str, user_id: String, user_name: String) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get_mut(id) {
            Some(conn) => {
                conn.user_id = Some(user_id);
                conn.user_name = Some(user_name);
                true
            }
            None => false,
        }
    }

    /// Remove a connection and hand back everything it referenced.
    /// Idempotent: a second detach finds nothing and returns None.
    pub async fn detach(&self, id: &str) -> Option<DetachedConnection> {
        let conn = self.connections.write().await.remove(id)?;
        Some(DetachedConnection {
            user_id: conn.user_id.clone(),
            channels: conn.channels.iter().cloned().collect(),
            rooms: conn.rooms.iter().cloned().collect(),
        })
    }

    pub async fn identity(&self, id: &str) -> Option<(String, String)> {
        let connections = self.connections.read().await;
        let conn = connections.get(id)?;
        Some((conn.user_id.clone()?, conn.user_name.clone()?))
    }

    pub async fn color(&self, id: &str) -> Option<String> {
        let connections = self.connections.read().await;
        connections.get(id).map(|c| c.color.clone())
    }

    pub async fn shutdown_signal(&self, id: &str) -> Option<Arc<Notify>> {
        let connections = self.connections.read().await;
        connections.get(id).map(|c| c.shutdown_signal())
    }

    /// Track a channel subscription on the connection side
    pub async fn add_channel(&self, id: &str, channel: &str) {
        if let Some(conn) = self.connections.write().await.get_mut(id) {
            conn.channels.insert(channel.to_string());
        }
    }

    pub async fn remove_channel(&self, id: &str, channel: &str) {
        if let Some(conn) = self.connections.write().await.get_mut(id) {
            conn.channels.remove(channel);
        }
    }

    /// Track a room membership on the connection side
    pub async fn add_room(&self, id: &str, room_id: &str) {
        if let Some(conn) = self.connections.write().await.get_mut(id) {
            conn.rooms.insert(room_id.to_string());
        }
    }

    pub async fn remove_room(&self, id: &str, room_id: &str) {
        if let Some(conn) = self.connections.write().await.get_mut(id) {
            conn.rooms.remove(room_id);
        }
    }

    /// Queue a message on one connection; fire-and-forget
    pub async fn send_to(&self, id: &str, message: &ServerMessage) -> bool {
        let connections = self.connections.read().await;
        match connections.get(id) {
            Some(conn) => conn.send(message),
            None => false,
        }
    }

    /// Queue a message on every listed connection except `exclude`.
    /// Delivery is fire-and-forget per member: a slow connection is shut
    /// down by its own queue overflow, never blocking the others.
    pub async fn send_to_many(
        &self,
        ids: &[ConnectionId],
        message: &ServerMessage,
        exclude: Option<&str>,
    ) -> usize {
        let connections = self.connections.read().await;
        let mut sent = 0;
        for id in ids {
            if Some(id.as_str()) == exclude {
                continue;
            }
            if let Some(conn) = connections.get(id) {
                if conn.send(message) {
                    sent += 1;
                }
            }
        }
        sent
    }

    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn connection_duration(&self, id: &str) -> Option<std::time::Duration> {
        let connections = self.connections.read().await;
        connections.get(id).map(|c| c.connection_duration())
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
