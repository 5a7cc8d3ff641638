//! HTTP error responses.

use crate::hub::HubError;
use crate::store::StoreError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokensync_build::BuildError;
use tokensync_core::TokenError;

/// Error returned by route handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A token store operation failed
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A platform build or file lookup failed
    #[error(transparent)]
    Build(#[from] BuildError),
    /// The request body was not valid JSON for the route
    #[error("invalid request body: {0}")]
    InvalidJsonBody(#[from] JsonRejection),
    /// The request was well-formed JSON but semantically invalid
    #[error("{0}")]
    BadRequest(String),
    /// Nothing exists at the requested location
    #[error("{0}")]
    NotFound(String),
}

/// JSON body of an error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message
    pub error: String,
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        ApiError::Store(StoreError::Token(err))
    }
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Store(StoreError::Token(TokenError::NotFound { .. }))
            | ApiError::Build(BuildError::NotFound(_))
            | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::Token(_))
            | ApiError::Build(BuildError::UnknownPlatform { .. } | BuildError::NotText(_))
            | ApiError::InvalidJsonBody(_)
            | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Build(BuildError::AccessDenied { .. }) => StatusCode::FORBIDDEN,
            ApiError::Store(StoreError::Hub(HubError::TooManyConnections { .. })) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Store(StoreError::Persistence(_))
            | ApiError::Build(
                BuildError::Spawn { .. } | BuildError::Failed { .. } | BuildError::Io(_),
            ) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = ?self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
