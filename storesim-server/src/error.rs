//! Error types for the HTTP endpoints.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Error type for HTTP endpoints.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No snapshot has been published yet.
    #[error("no statistics available yet")]
    WarmingUp,

    /// The requested node action does not exist.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// Encoding Prometheus metrics failed.
    #[error("failed to encode metrics: {0}")]
    Encoding(#[from] prometheus::Error),
}

/// Result type for HTTP endpoints.
pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::WarmingUp => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "warming_up" })),
            )
                .into_response(),
            ApiError::UnknownAction(action) => {
                tracing::debug!("unknown action: {action}");
                StatusCode::NOT_FOUND.into_response()
            }
            ApiError::Encoding(err) => {
                tracing::error!(
                    error = err as &dyn std::error::Error,
                    "failed to render metrics"
                );
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
