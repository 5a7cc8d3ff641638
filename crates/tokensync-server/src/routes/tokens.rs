//! Token document routes.
//!
//! URL paths use `/` between segments (`/tokens/color/semantic/primary`);
//! dot paths are accepted as well.

use super::AppState;
use crate::error::ApiError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use tokensync_core::{Node, TokenDocument, TokenPath};
use tokensync_proto::{BatchReport, BatchRequest, DeleteResponse, WriteRequest, WriteResponse};

/// Wildcard segment that selects the batch endpoint for `POST`.
const BATCH: &str = "batch";

pub(super) fn routes() -> Router<AppState> {
    Router::new().route("/tokens", get(document)).route(
        "/tokens/*path",
        get(read).put(write).delete(remove).post(batch),
    )
}

fn dot_path(url_path: &str) -> Result<String, ApiError> {
    Ok(TokenPath::from_url_path(url_path)?.to_string())
}

async fn document(State(state): State<AppState>) -> Result<Json<TokenDocument>, ApiError> {
    Ok(Json(state.store.load().await?))
}

async fn read(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<Node>, ApiError> {
    let path = dot_path(&path)?;
    Ok(Json(state.store.read_path(&path).await?))
}

async fn write(
    State(state): State<AppState>,
    Path(path): Path<String>,
    body: Result<Json<WriteRequest>, JsonRejection>,
) -> Result<Json<WriteResponse>, ApiError> {
    let path = dot_path(&path)?;
    let Json(request) = body?;

    let outcome = state
        .store
        .write_path(&path, request.value, &request.token_type, request.description)
        .await?;

    Ok(Json(WriteResponse {
        success: true,
        token_path: outcome.path.to_string(),
        token: outcome.token,
        document_version: outcome.document_version,
        version: outcome.record.map(|r| r.version),
        timestamp: outcome.timestamp,
    }))
}

async fn remove(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let path = dot_path(&path)?;
    let outcome = state.store.delete_path(&path).await?;

    Ok(Json(DeleteResponse {
        success: true,
        token_path: outcome.path.to_string(),
        removed: outcome.removed,
        document_version: outcome.document_version,
        version: outcome.record.map(|r| r.version),
        timestamp: outcome.timestamp,
    }))
}

async fn batch(
    State(state): State<AppState>,
    Path(path): Path<String>,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchReport>, ApiError> {
    if path.trim_matches('/') != BATCH {
        return Err(ApiError::NotFound(format!("no POST route for /tokens/{path}")));
    }
    let Json(request) = body?;
    Ok(Json(state.store.batch_write(request.tokens).await?))
}
