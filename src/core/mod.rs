//! Core functionality for the synchronization hub

pub mod channel;
pub mod connection;
pub mod hub;
pub mod message_types;
pub mod registry;
pub mod room;
pub mod sync;

// Re-export main components for convenience
pub use channel::ChannelBroadcaster;
pub use connection::{Connection, ConnectionId};
pub use hub::{Hub, HubStats, SharedHub};
pub use message_types::{ClientMessage, CursorPos, ServerMessage, UserInfo};
pub use registry::ConnectionRegistry;
pub use room::{JoinSnapshot, PatchOutcome, Presence, Room, RoomStore};
pub use sync::RoomSynchronizer;
