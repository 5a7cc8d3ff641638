//! HTTP routes.
//!
//! - `/tokens`: document reads and writes
//! - `/platforms` (also under `/build`): build tool outputs
//! - `/sse`: live stream and polling fallback

mod platforms;
mod stream;
mod tokens;

use crate::config::ServerConfig;
use crate::store::TokenStore;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tokensync_build::StyleDictionaryBuilder;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Token store
    pub store: Arc<TokenStore>,
    /// Build tool driver
    pub builder: Arc<StyleDictionaryBuilder>,
    /// Server configuration
    pub config: Arc<ServerConfig>,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .merge(tokens::routes())
        .nest("/platforms", platforms::routes())
        .nest("/build", platforms::routes())
        .nest("/sse", stream::routes())
        .with_state(state)
}

async fn index() -> Json<Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "tokens": "/tokens",
            "platforms": "/platforms",
            "build": "/build",
            "stream": "/sse/events",
            "status": "/sse/status",
            "health": "/health",
        },
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
