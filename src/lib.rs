//! Sync Hub - a real-time room synchronization server
//!
//! Many independent clients observe and mutate shared room state over
//! WebSockets, with optimistic version-checked patches, presence tracking
//! and ephemeral pub/sub channels for transient event relay.

pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;

// Re-export main components
pub use config::ServerConfig;
pub use error::{HubError, Result};
