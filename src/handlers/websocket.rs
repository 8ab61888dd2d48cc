use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use log::{error, warn};
use tokio::sync::mpsc;
use warp::ws::{Message, WebSocket};

use crate::config::ServerConfig;
use crate::core::hub::SharedHub;
use crate::core::message_types::{ClientMessage, ServerMessage};

// Handle a WebSocket connection for its whole lifetime
pub async fn handle_ws_client(ws: WebSocket, hub: SharedHub, config: ServerConfig) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, mut rx) = mpsc::channel(config.outbound_queue);

    let conn_id = hub.attach(tx).await;
    let shutdown = match hub.registry.shutdown_signal(&conn_id).await {
        Some(shutdown) => shutdown,
        None => return,
    };

    // Writer task: drains the bounded outbound queue into the socket. The
    // shutdown signal fires on queue overflow and forces the peer off.
    tokio::task::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    let _ = ws_tx.send(Message::close()).await;
                    break;
                }
                maybe_msg = rx.recv() => match maybe_msg {
                    Some(msg) => {
                        if let Err(e) = ws_tx.send(msg).await {
                            error!("Failed to send WebSocket message: {}", e);
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    });

    // Inbound loop: one task per connection, shared hub for everything else
    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(msg) => {
                if msg.is_close() {
                    break;
                }
                if let Ok(text) = msg.to_str() {
                    if text.len() > config.max_frame_bytes {
                        warn!(
                            "Dropping oversized frame from {} ({} bytes)",
                            conn_id,
                            text.len()
                        );
                        continue;
                    }
                    process_message(text, &conn_id, &hub).await;
                }
            }
            Err(e) => {
                error!("WebSocket error on {}: {}", conn_id, e);
                break;
            }
        }
    }

    // Teardown is unconditional: a misbehaving client cannot skip cleanup
    hub.detach(&conn_id).await;
}

// Process one inbound frame. Malformed frames are logged and dropped; the
// connection stays open. Precondition failures become typed error replies
// to the sender only.
async fn process_message(text: &str, conn_id: &str, hub: &SharedHub) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Failed to parse message from {}: {}", conn_id, e);
            return;
        }
    };

    if let Err(e) = hub.handle_message(conn_id, message).await {
        hub.registry
            .send_to(
                conn_id,
                &ServerMessage::Error {
                    code: e.code().to_string(),
                    message: e.to_string(),
                },
            )
            .await;
    }
}
