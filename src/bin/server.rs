use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info, warn};
use warp::{self, Filter};

use sync_hub::config::ServerConfig;
use sync_hub::constants::{STATS_PATH, WS_PATH};
use sync_hub::core::hub::{Hub, SharedHub};
use sync_hub::handlers::websocket::handle_ws_client;

#[tokio::main]
async fn main() {
    // Initialize env
    match dotenvy::dotenv() {
        Ok(_) => info!("Environment variables loaded from .env file"),
        Err(e) => warn!("No .env file loaded: {}", e),
    };

    // Initialize logging
    env_logger::init();

    // Load config from the environment
    let config = ServerConfig::from_env();
    info!("Configuration: host={}, port={}", config.host, config.port);

    // One hub for the whole process, handed into every handler
    let hub: SharedHub = Arc::new(Hub::new());

    // WebSocket route
    let ws_config = config.clone();
    let ws_route = warp::path(WS_PATH)
        .and(warp::ws())
        .and(with_hub(hub.clone()))
        .map(move |ws: warp::ws::Ws, hub: SharedHub| {
            let config = ws_config.clone();
            ws.on_upgrade(move |socket| handle_ws_client(socket, hub, config))
        });

    // Operational stats route: read-only snapshots, never blocks protocol
    // processing
    let stats_route = warp::path(STATS_PATH)
        .and(warp::get())
        .and(with_hub(hub.clone()))
        .and_then(|hub: SharedHub| async move {
            let stats = hub.stats().await;
            Ok::<_, warp::Rejection>(warp::reply::json(&stats))
        });

    // Health check route
    let health_route = warp::path("health").map(|| "OK");

    let routes = ws_route.or(stats_route).or(health_route);

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting sync hub on {}", addr);
    warp::serve(routes).run(addr).await;
}

// Helper filter to hand the shared hub into each request
fn with_hub(hub: SharedHub) -> impl Filter<Extract = (SharedHub,), Error = Infallible> + Clone {
    warp::any().map(move || hub.clone())
}
