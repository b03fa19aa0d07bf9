//! Server-specific error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use mdp_etl::EtlError;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("unknown stream: {0}")]
    UnknownStream(String),

    #[error("internal server error: {0}")]
    Internal(String),
}

impl From<EtlError> for AppError {
    fn from(err: EtlError) -> Self {
        match err {
            EtlError::UnknownStream(stream) => AppError::UnknownStream(stream),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::UnknownStream(ref stream) => (
                StatusCode::NOT_FOUND,
                format!("unknown stream: {stream}"),
            ),
            AppError::Internal(ref message) => {
                tracing::error!("Internal error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message.clone())
            },
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "status": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}
