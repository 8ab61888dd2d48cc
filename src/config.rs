//! Server configuration module
//! Handles dynamic configuration parameters for the synchronization hub

use crate::constants::{
    DEFAULT_HOST, DEFAULT_MAX_FRAME_BYTES, DEFAULT_OUTBOUND_QUEUE, DEFAULT_PORT,
};
use std::env;

/// Server configuration parameters
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Capacity of each connection's bounded outbound queue
    pub outbound_queue: usize,
    /// Maximum accepted inbound frame size in bytes
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl ServerConfig {
    /// Configuration for unit and integration tests
    pub fn for_testing() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            outbound_queue: 8,
            max_frame_bytes: 4096,
        }
    }

    /// Load configuration from environment variables if available
    pub fn from_env() -> Self {
        let host = env::var("SYNC_HUB_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = env::var("SYNC_HUB_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let outbound_queue = env::var("SYNC_HUB_OUTBOUND_QUEUE")
            .ok()
            .and_then(|q| q.parse().ok())
            .filter(|q| *q > 0)
            .unwrap_or(DEFAULT_OUTBOUND_QUEUE);

        let max_frame_bytes = env::var("SYNC_HUB_MAX_FRAME_BYTES")
            .ok()
            .and_then(|b| b.parse().ok())
            .filter(|b| *b > 0)
            .unwrap_or(DEFAULT_MAX_FRAME_BYTES);

        Self {
            host,
            port,
            outbound_queue,
            max_frame_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.outbound_queue, DEFAULT_OUTBOUND_QUEUE);
    }

    #[test]
    fn test_for_testing_uses_small_queue() {
        let config = ServerConfig::for_testing();
        assert!(config.outbound_queue < DEFAULT_OUTBOUND_QUEUE);
    }
}
