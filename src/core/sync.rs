//! Room synchronizer
//! Protocol state machine per (connection, room) pair: not-joined -> joined
//! -> not-joined. Applies joins, optimistic patches, full resyncs and cursor
//! updates, then re-broadcasts results to the other room members.
//!
//! Precondition failures never mutate shared state and never broadcast; the
//! caller turns the returned error into a typed reply for the sender alone.

use std::sync::Arc;

use log::debug;
use serde_json::Value;

use crate::core::message_types::{CursorPos, ServerMessage};
use crate::core::registry::ConnectionRegistry;
use crate::core::room::{PatchOutcome, Presence, RoomStore};
use crate::error::{HubError, Result};

pub struct RoomSynchronizer {
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomStore>,
}

impl RoomSynchronizer {
    pub fn new(registry: Arc<ConnectionRegistry>, rooms: Arc<RoomStore>) -> Self {
        Self { registry, rooms }
    }

    /// not-joined -> joined. Requires identity. Replies to the joiner with
    /// the authoritative snapshot; everyone else learns about the new
    /// presence. Re-joining refreshes presence and re-sends the snapshot.
    pub async fn join(
        &self,
        conn_id: &str,
        room_id: &str,
        initial_state: Option<Value>,
    ) -> Result<()> {
        let (user_id, user_name) = self
            .registry
            .identity(conn_id)
            .await
            .ok_or(HubError::AuthRequired)?;
        let color = self
            .registry
            .color(conn_id)
            .await
            .ok_or_else(|| HubError::ConnectionNotFound(conn_id.to_string()))?;

        let presence = Presence::new(user_id.clone(), user_name, color.clone());
        let presence_info = presence.to_user_info();
        let snapshot = self
            .rooms
            .join_member(room_id, initial_state, conn_id.to_string(), presence)
            .await;
        self.registry.add_room(conn_id, room_id).await;

        self.registry
            .send_to(
                conn_id,
                &ServerMessage::CollabJoined {
                    room_id: room_id.to_string(),
                    state: snapshot.state,
                    version: snapshot.version,
                    users: snapshot.users,
                    your_color: color,
                },
            )
            .await;

        // A re-join under a new identity displaced the old one; the other
        // members hear the departure before the arrival
        if let Some(old_user) = snapshot.departed_user {
            self.registry
                .send_to_many(
                    &snapshot.members,
                    &ServerMessage::CollabUserLeft {
                        room_id: room_id.to_string(),
                        user_id: old_user,
                    },
                    Some(conn_id),
                )
                .await;
        }

        let announced = self
            .registry
            .send_to_many(
                &snapshot.members,
                &ServerMessage::CollabUserJoined {
                    room_id: room_id.to_string(),
                    user: presence_info,
                },
                Some(conn_id),
            )
            .await;
        debug!(
            "{} joined room {} ({} members notified)",
            user_id, room_id, announced
        );
        Ok(())
    }

    /// joined -> not-joined. A no-op when the connection is not a member.
    /// The room is destroyed the moment its membership reaches zero.
    pub async fn leave(&self, conn_id: &str, room_id: &str) -> Result<()> {
        let room = match self.rooms.get(room_id).await {
            Some(room) => room,
            None => return Ok(()),
        };

        let (departed, remaining) = {
            let mut room = room.lock().await;
            if !room.has_member(conn_id) {
                return Ok(());
            }
            let departed = room.remove_member(conn_id);
            (departed, room.member_connections())
        };
        self.registry.remove_room(conn_id, room_id).await;

        if let Some(user_id) = departed {
            self.registry
                .send_to_many(
                    &remaining,
                    &ServerMessage::CollabUserLeft {
                        room_id: room_id.to_string(),
                        user_id: user_id.clone(),
                    },
                    Some(conn_id),
                )
                .await;
            debug!("{} left room {}", user_id, room_id);
        }

        self.rooms.remove_if_empty(room_id).await;
        Ok(())
    }

    /// Optimistic patch. On a stale version only the sender hears back, with
    /// the authoritative state to re-base on; nothing is broadcast. On
    /// success every other member gets the patch (the originator already
    /// holds the result and is not re-sent its own patch).
    pub async fn patch(
        &self,
        conn_id: &str,
        room_id: &str,
        expected_version: u64,
        patch: Value,
    ) -> Result<()> {
        let room = self
            .rooms
            .get(room_id)
            .await
            .ok_or_else(|| HubError::NotInRoom(room_id.to_string()))?;

        let (outcome, user_id, others) = {
            let mut room = room.lock().await;
            let user_id = room
                .member_user(conn_id)
                .cloned()
                .ok_or_else(|| HubError::NotInRoom(room_id.to_string()))?;
            let outcome = room.apply_patch(expected_version, &patch);
            if matches!(outcome, PatchOutcome::Applied(_)) {
                room.touch(&user_id);
            }
            (outcome, user_id, room.member_connections())
        };

        match outcome {
            PatchOutcome::Applied(version) => {
                self.registry
                    .send_to_many(
                        &others,
                        &ServerMessage::CollabStateUpdated {
                            room_id: room_id.to_string(),
                            patch,
                            version,
                            user_id,
                        },
                        Some(conn_id),
                    )
                    .await;
            }
            PatchOutcome::Conflict { version, state } => {
                debug!(
                    "Stale patch for room {} from {}: expected {}, server at {}",
                    room_id, user_id, expected_version, version
                );
                self.registry
                    .send_to(
                        conn_id,
                        &ServerMessage::CollabSyncRequired {
                            room_id: room_id.to_string(),
                            server_version: version,
                            state,
                        },
                    )
                    .await;
            }
        }
        Ok(())
    }

    /// Unconditional replacement: the caller declares ground truth, so no
    /// conflict can be detected for it. The version still advances.
    pub async fn full_sync(&self, conn_id: &str, room_id: &str, new_state: Value) -> Result<()> {
        let room = self
            .rooms
            .get(room_id)
            .await
            .ok_or_else(|| HubError::NotInRoom(room_id.to_string()))?;

        let (version, user_id, others) = {
            let mut room = room.lock().await;
            let user_id = room
                .member_user(conn_id)
                .cloned()
                .ok_or_else(|| HubError::NotInRoom(room_id.to_string()))?;
            let version = room.replace_state(new_state.clone());
            room.touch(&user_id);
            (version, user_id, room.member_connections())
        };

        self.registry
            .send_to_many(
                &others,
                &ServerMessage::CollabFullSync {
                    room_id: room_id.to_string(),
                    state: new_state,
                    version,
                    user_id,
                },
                Some(conn_id),
            )
            .await;
        Ok(())
    }

    /// Updates presence only; explicitly excluded from the state/version
    /// model so high-frequency cursor traffic cannot cause conflict churn.
    pub async fn cursor_move(&self, conn_id: &str, room_id: &str, cursor: CursorPos) -> Result<()> {
        let room = self
            .rooms
            .get(room_id)
            .await
            .ok_or_else(|| HubError::NotInRoom(room_id.to_string()))?;

        let (user_id, others) = {
            let mut room = room.lock().await;
            let user_id = room
                .member_user(conn_id)
                .cloned()
                .ok_or_else(|| HubError::NotInRoom(room_id.to_string()))?;
            room.update_cursor(&user_id, cursor);
            (user_id, room.member_connections())
        };

        self.registry
            .send_to_many(
                &others,
                &ServerMessage::CollabCursorMoved {
                    room_id: room_id.to_string(),
                    user_id,
                    cursor,
                },
                Some(conn_id),
            )
            .await;
        Ok(())
    }
}
