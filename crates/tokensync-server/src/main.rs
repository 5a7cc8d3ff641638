//! # tokensync Server
//!
//! Serves the token document over HTTP and pushes changes over SSE.

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use std::sync::Arc;
use tokensync_build::{ProcessRunner, StyleDictionaryBuilder};
use tokensync_server::{router, AppState, BroadcastHub, JsonFileStore, ServerConfig, TokenStore};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting tokensync server"
    );

    let config = Arc::new(ServerConfig::from_env()?);

    let hub = BroadcastHub::new(config.hub);
    let backend = Arc::new(JsonFileStore::new(config.tokens_dir.clone()));
    let store = TokenStore::open(backend, Arc::clone(&hub), config.store_settings())
        .await
        .context("Failed to open token store")?;
    let document = store
        .load()
        .await
        .context("Failed to load token document")?;
    tracing::info!(
        tokens_dir = %config.tokens_dir.display(),
        document_version = document.metadata.version,
        hash = %document.content_hash(),
        "Token document ready"
    );

    let builder = StyleDictionaryBuilder::new(config.builder_config(), Arc::new(ProcessRunner));
    builder.check_toolchain().await;

    let _heartbeat = hub.spawn_heartbeat(config.heartbeat_interval);

    let state = AppState {
        store: Arc::new(store),
        builder: Arc::new(builder),
        config: Arc::clone(&config),
    };
    let app = router(state)
        .layer(cors_layer(&config.allowed_origins)?)
        .layer(TraceLayer::new_for_http());

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return Ok(layer.allow_origin(Any));
    }
    let origins = origins
        .iter()
        .map(|o| HeaderValue::from_str(o).with_context(|| format!("Invalid CORS origin '{o}'")))
        .collect::<Result<Vec<_>>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}
