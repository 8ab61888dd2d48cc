//! Integrated hub service that coordinates the registry, the channel
//! broadcaster and the room store. Constructed once at startup and handed
//! into every connection handler; tests build isolated hubs of their own.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use warp::ws::Message;

use crate::core::channel::ChannelBroadcaster;
use crate::core::connection::ConnectionId;
use crate::core::message_types::{ClientMessage, ServerMessage};
use crate::core::registry::ConnectionRegistry;
use crate::core::room::RoomStore;
use crate::core::sync::RoomSynchronizer;
use crate::error::{HubError, Result};

/// Aggregate counts for the operational stats endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub total_connections: usize,
    pub channel_member_counts: HashMap<String, usize>,
    pub room_member_counts: HashMap<String, usize>,
}

pub struct Hub {
    pub registry: Arc<ConnectionRegistry>,
    pub channels: Arc<ChannelBroadcaster>,
    pub rooms: Arc<RoomStore>,
    sync: RoomSynchronizer,
}

impl Hub {
    pub fn new() -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomStore::new());
        let sync = RoomSynchronizer::new(Arc::clone(&registry), Arc::clone(&rooms));
        Self {
            registry,
            channels: Arc::new(ChannelBroadcaster::new()),
            rooms,
            sync,
        }
    }

    /// Register a new transport connection and greet it
    pub async fn attach(&self, sender: mpsc::Sender<Message>) -> ConnectionId {
        let conn_id = self.registry.attach(sender).await;
        self.registry
            .send_to(
                &conn_id,
                &ServerMessage::Connected {
                    connection_id: conn_id.clone(),
                },
            )
            .await;
        info!(
            "Client connected: {} ({} total)",
            conn_id,
            self.registry.count().await
        );
        conn_id
    }

    /// Dispatch one inbound protocol message. Precondition failures come
    /// back as errors for the caller to turn into a typed reply; they never
    /// mutate shared state or broadcast.
    pub async fn handle_message(&self, conn_id: &str, message: ClientMessage) -> Result<()> {
        match message {
            ClientMessage::Auth { user_id, user_name } => {
                self.registry
                    .set_identity(conn_id, user_id.clone(), user_name)
                    .await;
                self.registry
                    .send_to(conn_id, &ServerMessage::AuthAck { user_id })
                    .await;
                Ok(())
            }

            ClientMessage::Subscribe { channel } => {
                self.channels.subscribe(conn_id, &channel).await;
                self.registry.add_channel(conn_id, &channel).await;
                self.registry
                    .send_to(conn_id, &ServerMessage::Subscribed { channel })
                    .await;
                Ok(())
            }

            ClientMessage::Unsubscribe { channel } => {
                self.channels.unsubscribe(conn_id, &channel).await;
                self.registry.remove_channel(conn_id, &channel).await;
                Ok(())
            }

            ClientMessage::ControllerInput {
                channel,
                gamepad_index,
                input,
            } => {
                let user_id = self.require_identity(conn_id).await?;
                let event = ServerMessage::Input {
                    user_id,
                    gamepad_index,
                    timestamp: Utc::now(),
                    data: input,
                };
                self.channels
                    .publish(&self.registry, &channel, &event, Some(conn_id))
                    .await;
                Ok(())
            }

            ClientMessage::ControllerConnect {
                channel,
                gamepad_index,
            } => {
                let user_id = self.require_identity(conn_id).await?;
                let event = ServerMessage::DeviceConnect {
                    user_id,
                    gamepad_index,
                    timestamp: Utc::now(),
                    data: Value::Null,
                };
                self.channels
                    .publish(&self.registry, &channel, &event, Some(conn_id))
                    .await;
                Ok(())
            }

            ClientMessage::ControllerDisconnect {
                channel,
                gamepad_index,
            } => {
                let user_id = self.require_identity(conn_id).await?;
                let event = ServerMessage::DeviceDisconnect {
                    user_id,
                    gamepad_index,
                    timestamp: Utc::now(),
                    data: Value::Null,
                };
                self.channels
                    .publish(&self.registry, &channel, &event, Some(conn_id))
                    .await;
                Ok(())
            }

            ClientMessage::CollabJoin {
                room_id,
                initial_state,
            } => self.sync.join(conn_id, &room_id, initial_state).await,

            ClientMessage::CollabLeave { room_id } => self.sync.leave(conn_id, &room_id).await,

            ClientMessage::CollabStateUpdate {
                room_id,
                patch,
                version,
            } => self.sync.patch(conn_id, &room_id, version, patch).await,

            ClientMessage::CollabFullSync { room_id, state } => {
                self.sync.full_sync(conn_id, &room_id, state).await
            }

            ClientMessage::CollabCursorMove { room_id, cursor } => {
                self.sync.cursor_move(conn_id, &room_id, cursor).await
            }
        }
    }

    /// Cleanup cascade on transport teardown. Equivalent to an explicit
    /// leave for every joined room and an unsubscribe for every channel;
    /// idempotent and unconditional.
    pub async fn detach(&self, conn_id: &str) {
        let duration = self.registry.connection_duration(conn_id).await;
        let detached = match self.registry.detach(conn_id).await {
            Some(detached) => detached,
            None => return,
        };

        for channel in &detached.channels {
            self.channels.unsubscribe(conn_id, channel).await;
        }
        for room_id in &detached.rooms {
            // Registry entry is gone; departure still runs against the room
            if let Err(e) = self.sync.leave(conn_id, room_id).await {
                debug!("Cleanup leave for {} in {} failed: {}", conn_id, room_id, e);
            }
        }

        info!(
            "Client disconnected: {} after {:?} ({} total)",
            conn_id,
            duration.unwrap_or_default(),
            self.registry.count().await
        );
    }

    /// Read-only aggregate snapshot; never blocks protocol processing
    pub async fn stats(&self) -> HubStats {
        HubStats {
            total_connections: self.registry.count().await,
            channel_member_counts: self.channels.member_counts().await,
            room_member_counts: self.rooms.member_counts().await,
        }
    }

    async fn require_identity(&self, conn_id: &str) -> Result<String> {
        self.registry
            .identity(conn_id)
            .await
            .map(|(user_id, _)| user_id)
            .ok_or(HubError::AuthRequired)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared reference handed to every connection handler and route
pub type SharedHub = Arc<Hub>;
