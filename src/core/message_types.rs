//! Wire protocol message types
//!
//! Every inbound and outbound frame is an internally tagged JSON object.
//! Adding a message type is a compile-time-checked change: dispatch is an
//! exhaustive match over these enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Two-dimensional cursor position, echoed opaquely (unit unspecified)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPos {
    pub x: f64,
    pub y: f64,
}

/// A user's live metadata within one room, as sent on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub user_id: String,
    pub user_name: String,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorPos>,
}

/// Client-to-server message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Bind an identity to this connection (last write wins)
    Auth { user_id: String, user_name: String },

    /// Join a broadcast channel
    Subscribe { channel: String },

    /// Leave a broadcast channel
    Unsubscribe { channel: String },

    /// Relay a transient input event to channel subscribers
    ControllerInput {
        channel: String,
        gamepad_index: u32,
        input: Value,
    },

    /// Announce a physical device attach on the sender's side
    ControllerConnect { channel: String, gamepad_index: u32 },

    /// Announce a physical device detach on the sender's side
    ControllerDisconnect { channel: String, gamepad_index: u32 },

    /// Join a collaboration room, optionally seeding its state
    CollabJoin {
        room_id: String,
        #[serde(default)]
        initial_state: Option<Value>,
    },

    /// Leave a collaboration room
    CollabLeave { room_id: String },

    /// Optimistic patch against the version the client last observed
    CollabStateUpdate {
        room_id: String,
        patch: Value,
        version: u64,
    },

    /// Unconditional state replacement ("this is now ground truth")
    CollabFullSync { room_id: String, state: Value },

    /// High-frequency cursor update; never touches the room version
    CollabCursorMove { room_id: String, cursor: CursorPos },
}

/// Server-to-client message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Connection established
    Connected { connection_id: String },

    /// Identity bound
    AuthAck { user_id: String },

    /// Channel subscription confirmed
    Subscribed { channel: String },

    /// Relayed input event from another subscriber
    Input {
        user_id: String,
        gamepad_index: u32,
        timestamp: DateTime<Utc>,
        data: Value,
    },

    /// Relayed device-attach event
    #[serde(rename = "connect")]
    DeviceConnect {
        user_id: String,
        gamepad_index: u32,
        timestamp: DateTime<Utc>,
        data: Value,
    },

    /// Relayed device-detach event
    #[serde(rename = "disconnect")]
    DeviceDisconnect {
        user_id: String,
        gamepad_index: u32,
        timestamp: DateTime<Utc>,
        data: Value,
    },

    /// Reply to the joiner with the authoritative room snapshot
    CollabJoined {
        room_id: String,
        state: Value,
        version: u64,
        users: Vec<UserInfo>,
        your_color: String,
    },

    /// Another user joined the room
    CollabUserJoined { room_id: String, user: UserInfo },

    /// A user left the room
    CollabUserLeft { room_id: String, user_id: String },

    /// Version conflict: sender must discard its pending patch and re-base
    CollabSyncRequired {
        room_id: String,
        server_version: u64,
        state: Value,
    },

    /// An accepted patch, relayed to every other member
    CollabStateUpdated {
        room_id: String,
        patch: Value,
        version: u64,
        user_id: String,
    },

    /// A full state replacement, relayed to every other member
    CollabFullSync {
        room_id: String,
        state: Value,
        version: u64,
        user_id: String,
    },

    /// Another user's cursor moved
    CollabCursorMoved {
        room_id: String,
        user_id: String,
        cursor: CursorPos,
    },

    /// Typed rejection (precondition failures, parse errors)
    Error { code: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_tags() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "collab_state_update",
            "roomId": "doc-1",
            "patch": {"text": "hello"},
            "version": 0,
        }))
        .unwrap();
        match msg {
            ClientMessage::CollabStateUpdate {
                room_id, version, ..
            } => {
                assert_eq!(room_id, "doc-1");
                assert_eq!(version, 0);
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_initial_state_is_optional() {
        let msg: ClientMessage =
            serde_json::from_value(json!({"type": "collab_join", "roomId": "doc-1"})).unwrap();
        match msg {
            ClientMessage::CollabJoin {
                initial_state: None,
                ..
            } => {}
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_server_message_wire_shape() {
        let msg = ServerMessage::CollabSyncRequired {
            room_id: "doc-1".to_string(),
            server_version: 3,
            state: json!({"text": "hi"}),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "collab_sync_required");
        assert_eq!(value["serverVersion"], 3);
        assert_eq!(value["roomId"], "doc-1");
    }

    #[test]
    fn test_device_event_tags() {
        let msg = ServerMessage::DeviceConnect {
            user_id: "u1".to_string(),
            gamepad_index: 0,
            timestamp: Utc::now(),
            data: Value::Null,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "connect");
        assert_eq!(value["gamepadIndex"], 0);
    }
}
