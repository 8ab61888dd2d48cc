//! Channel broadcaster
//! Ephemeral pub/sub fan-out with no retained state: a client that connects
//! after an event was published never sees it.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use crate::core::connection::ConnectionId;
use crate::core::message_types::ServerMessage;
use crate::core::registry::ConnectionRegistry;

pub struct ChannelBroadcaster {
    /// Channel name -> current member set. A channel with zero members is
    /// deleted, never kept empty: existence is derivable from membership.
    channels: RwLock<HashMap<String, HashSet<ConnectionId>>>,
}

impl ChannelBroadcaster {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Add the connection to the channel, creating it on first subscribe.
    /// Returns false when the subscription already existed (no-op).
    pub async fn subscribe(&self, id: &str, channel: &str) -> bool {
        let mut channels = self.channels.write().await;
        channels
            .entry(channel.to_string())
            .or_default()
            .insert(id.to_string())
    }

    /// Remove the membership; the channel is deleted when its member set
    /// empties. Unknown channels are a no-op.
    pub async fn unsubscribe(&self, id: &str, channel: &str) {
        let mut channels = self.channels.write().await;
        if let Some(members) = channels.get_mut(channel) {
            members.remove(id);
            if members.is_empty() {
                channels.remove(channel);
            }
        }
    }

    /// Deliver `message` to every current member except `exclude`. Members
    /// are snapshotted before delivery, so a subscriber added or removed
    /// mid-publish is unaffected by this call. Publishing to a channel with
    /// no members is a silent no-op.
    pub async fn publish(
        &self,
        registry: &ConnectionRegistry,
        channel: &str,
        message: &ServerMessage,
        exclude: Option<&str>,
    ) -> usize {
        let members: Vec<ConnectionId> = {
            let channels = self.channels.read().await;
            match channels.get(channel) {
                Some(members) => members.iter().cloned().collect(),
                None => return 0,
            }
        };

        registry.send_to_many(&members, message, exclude).await
    }

    /// Read-only snapshot for the stats endpoint
    pub async fn member_counts(&self) -> HashMap<String, usize> {
        self.channels
            .read()
            .await
            .iter()
            .map(|(name, members)| (name.clone(), members.len()))
            .collect()
    }

    #[cfg(test)]
    pub async fn channel_exists(&self, channel: &str) -> bool {
        self.channels.read().await.contains_key(channel)
    }
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
