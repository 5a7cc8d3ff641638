//! Server-sent event stream and its polling fallback.

use super::AppState;
use crate::error::ApiError;
use crate::store::CatchUp;
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;
use tokensync_proto::{PollingRegistration, StreamStatus, SyncCheckResponse, UpdatesSinceResponse};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/events", get(events))
        .route("/status", get(status))
        .route("/updates/since/:version", get(updates_since))
        .route("/updates/sync", get(sync_check))
        .route("/polling/register", post(register_polling))
}

#[derive(Debug, Default, Deserialize)]
struct EventsQuery {
    since_version: Option<u64>,
    client_hash: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SyncQuery {
    client_hash: Option<String>,
}

/// Open a stream. Heartbeats come from the hub, so no keep-alive is added here.
async fn events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let subscription = state
        .store
        .subscribe(CatchUp {
            since_version: query.since_version,
            client_hash: query.client_hash,
        })
        .await?;

    let stream = subscription.map(|event| Event::default().event(event.name()).json_data(&*event));
    Ok(Sse::new(stream))
}

async fn status(State(state): State<AppState>) -> Result<Json<StreamStatus>, ApiError> {
    let token_metadata = state.store.metadata().await?;
    let current_status = state.store.status();
    Ok(Json(StreamStatus {
        sse_clients: current_status.sse_clients,
        current_status,
        token_metadata,
    }))
}

async fn updates_since(
    State(state): State<AppState>,
    Path(version): Path<u64>,
) -> Json<UpdatesSinceResponse> {
    Json(state.store.updates_since(version))
}

async fn sync_check(
    State(state): State<AppState>,
    Query(query): Query<SyncQuery>,
) -> Result<Json<SyncCheckResponse>, ApiError> {
    Ok(Json(state.store.sync_check(query.client_hash.as_deref()).await?))
}

async fn register_polling(State(state): State<AppState>) -> Json<PollingRegistration> {
    tracing::debug!("Polling client registered");
    Json(PollingRegistration::new(state.config.polling_interval.as_secs()))
}
