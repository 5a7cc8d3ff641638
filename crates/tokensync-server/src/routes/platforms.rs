//! Build tool routes.

use super::AppState;
use crate::error::ApiError;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokensync_build::{media_type, BuildError, BuildStatus, Platform};
use tokensync_proto::BuildRequest;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(available).delete(clear_all))
        .route("/status", get(status))
        .route("/build", post(build_many))
        .route("/build/:platform", post(build_one))
        .route("/:platform", get(platform_info).delete(clear_platform))
        .route("/:platform/files", get(list_files))
        .route("/:platform/download", get(download_main))
        .route("/:platform/files/:filename", get(download_file))
        .route("/:platform/files/:filename/content", get(file_content))
}

async fn available(State(state): State<AppState>) -> Json<Value> {
    let status = state.builder.status();
    let formats: serde_json::Map<String, Value> = Platform::ALL
        .iter()
        .map(|p| (p.as_str().to_string(), json!(p.formats())))
        .collect();

    Json(json!({
        "available_platforms": status.available_platforms,
        "default_platforms": state.builder.config().default_platforms,
        "last_build": status.last_build_time,
        "supported_formats": formats,
        "build_status": status.build_cache,
    }))
}

async fn status(State(state): State<AppState>) -> Json<BuildStatus> {
    Json(state.builder.status())
}

async fn build_many(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let request: BuildRequest = if body.iter().all(u8::is_ascii_whitespace) {
        BuildRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid build request: {e}")))?
    };

    let results = match request.platforms {
        Some(names) => {
            let platforms = names
                .iter()
                .map(|name| name.parse::<Platform>())
                .collect::<Result<Vec<_>, BuildError>>()?;
            state.builder.build_platforms(&platforms).await
        }
        None => state.builder.build_default().await,
    };
    let (ok, failed): (Vec<_>, Vec<_>) = results.values().partition(|r| r.success);
    let total_files: usize = ok.iter().map(|r| r.output_files.len()).sum();

    Ok(Json(json!({
        "success": failed.is_empty(),
        "built_platforms": ok.len(),
        "failed_platforms": failed.len(),
        "total_output_files": total_files,
        "summary": {
            "successful": ok.iter().map(|r| r.platform).collect::<Vec<_>>(),
            "failed": failed.iter().map(|r| r.platform).collect::<Vec<_>>(),
        },
        "build_results": results,
    })))
}

async fn build_one(
    State(state): State<AppState>,
    Path(platform): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let platform: Platform = platform.parse()?;
    let mut results = state.builder.build_platforms(&[platform]).await;
    let result = results.shift_remove(&platform).ok_or_else(|| BuildError::Failed {
        platform,
        message: "no build result".to_string(),
    })?;

    if !result.success {
        return Err(BuildError::Failed {
            platform,
            message: result.error.unwrap_or_else(|| "unknown error".to_string()),
        }
        .into());
    }

    Ok(Json(json!({
        "success": true,
        "platform": platform,
        "build_time": result.build_time,
        "file_count": result.output_files.len(),
        "total_size_bytes": result.total_size_bytes(),
        "build_duration_ms": result.build_duration_ms,
        "output_files": result.output_files,
    })))
}

async fn platform_info(
    State(state): State<AppState>,
    Path(platform): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let platform: Platform = platform.parse()?;
    let files = state.builder.platform_files(platform).await?;

    Ok(Json(json!({
        "platform": platform,
        "file_count": files.len(),
        "total_size_bytes": files.iter().map(|f| f.size).sum::<u64>(),
        "last_modified": files.iter().map(|f| f.modified).max(),
        "files": files,
    })))
}

async fn list_files(
    State(state): State<AppState>,
    Path(platform): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let platform: Platform = platform.parse()?;
    let files = state.builder.platform_files(platform).await?;
    if files.is_empty() {
        return Err(ApiError::NotFound(format!(
            "no files found for platform '{platform}'; run a build first"
        )));
    }
    Ok(Json(json!({ "platform": platform, "files": files })))
}

async fn download_main(
    State(state): State<AppState>,
    Path(platform): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let platform: Platform = platform.parse()?;
    let path = state.builder.main_file_path(platform)?;
    attachment(&path, platform.main_file()).await
}

async fn download_file(
    State(state): State<AppState>,
    Path((platform, filename)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let platform: Platform = platform.parse()?;
    let path = state.builder.file_path(platform, &filename)?;
    attachment(&path, &filename).await
}

async fn attachment(path: &std::path::Path, filename: &str) -> Result<impl IntoResponse, ApiError> {
    let bytes = tokio::fs::read(path).await.map_err(BuildError::from)?;
    let headers = [
        (header::CONTENT_TYPE, media_type(path).to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ),
    ];
    Ok((headers, bytes))
}

async fn file_content(
    State(state): State<AppState>,
    Path((platform, filename)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let platform: Platform = platform.parse()?;
    let content = state.builder.file_content(platform, &filename).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], content))
}

async fn clear_platform(
    State(state): State<AppState>,
    Path(platform): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let platform: Platform = platform.parse()?;
    state.builder.clear_platform(platform).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("build files cleared for platform '{platform}'"),
    })))
}

async fn clear_all(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.builder.clear_all().await?;
    Ok(Json(json!({
        "success": true,
        "message": "all build files cleared",
    })))
}
