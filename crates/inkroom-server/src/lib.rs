//! Inkroom WebSocket room relay.
//!
//! Holds the authoritative element list of each room, merges incoming
//! updates with the same version rule the clients use, and relays accepted
//! changes and presence to the other members.
//!
//! ## Protocol
//!
//! Messages are JSON envelopes:
//! ```json
//! { "type": "join", "roomId": "r", "userId": "u", "payload": { "username": "Uma" } }
//! { "type": "update", "roomId": "r", "userId": "u", "payload": { "elements": [] } }
//! { "type": "cursor", "roomId": "r", "userId": "u", "payload": { "cursor": { "x": 1, "y": 2 } } }
//! ```

pub mod config;
pub mod error;
pub mod rest;
pub mod room;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use config::ServerConfig;
pub use error::RelayError;
pub use room::{Room, RoomRegistry};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RoomRegistry>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            rooms: Arc::new(RoomRegistry::new(config.channel_capacity)),
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health))
        .route("/api/rooms", post(rest::create_room))
        .route(
            "/api/rooms/{id}",
            get(rest::get_room).put(rest::put_room).delete(rest::delete_room),
        )
        .route("/api/rooms/{id}/export", get(rest::export_room))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on an already bound listener, with the idle-room reaper running
/// alongside.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), RelayError> {
    let reaper = room::spawn_reaper(
        state.rooms.clone(),
        state.config.reaper_interval(),
        state.config.room_idle(),
    );
    let result = axum::serve(listener, router(state)).await;
    reaper.abort();
    result.map_err(RelayError::from)
}

/// Bind `config.bind` and serve until the process exits.
pub async fn run(config: ServerConfig) -> Result<(), RelayError> {
    let listener = TcpListener::bind(config.bind).await?;
    let addr = listener.local_addr()?;
    info!("Inkroom relay server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);
    serve(listener, AppState::new(config)).await
}

/// Index page
async fn index() -> &'static str {
    "Inkroom Relay Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}
