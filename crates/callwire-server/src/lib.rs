//! Callwire server library logic.

pub mod api;
pub mod api_webhook;
pub mod api_ws;
pub mod config;
pub mod retention;

use api_ws::ConnectionManager;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use callwire_directory::{DirectoryClient, DirectoryError};
use callwire_session::{Relay, SessionRegistry};
use config::Config;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Event relay over the session registry.
    pub relay: Relay,
    /// Session metadata lookup for call context.
    pub directory: DirectoryClient,
    /// Connection manager for WebSockets.
    pub connection_manager: ConnectionManager,
}

impl AppState {
    pub fn new(relay: Relay, directory: DirectoryClient, listener_queue: usize) -> Self {
        Self {
            connection_manager: ConnectionManager::new(relay.clone(), listener_queue),
            relay,
            directory,
        }
    }

    /// Builds the state from configuration with an empty registry.
    pub fn from_config(config: &Config) -> Result<Self, DirectoryError> {
        let directory =
            DirectoryClient::new(config.directory.clone(), config.greeting.clone())?;
        Ok(Self::new(
            Relay::new(SessionRegistry::new()),
            directory,
            config.sessions.listener_queue,
        ))
    }

    pub fn registry(&self) -> &SessionRegistry {
        self.relay.registry()
    }
}

/// Maximum request body size (2 MiB). Protects against OOM from oversized payloads.
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Health check handler.
async fn health(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.registry().session_count(),
        "connections": state.connection_manager.open_connections(),
        "directory": state.directory.is_enabled(),
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/ws/callConversation", get(api_ws::ws_handler))
        .route(
            "/api/webhooks/call",
            post(api_webhook::call_webhook_handler),
        )
        .route(
            "/api/voiceIntelligence",
            post(api_webhook::voice_intelligence_handler),
        )
        .route("/api/sessions/{code}", get(api::get_session_handler))
        .route(
            "/api/sessions/{code}/context",
            get(api::get_call_context_handler),
        )
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
