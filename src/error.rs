//! Error handling for the Sentra LPR service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Camera or stream cannot be opened or read; recoverable by a fresh start
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// File source reached end of stream; normal termination, not a fault
    #[error("Source exhausted")]
    SourceExhausted,

    /// External detector call failed or returned malformed data
    #[error("Detector error: {0}")]
    Detector(String),

    /// Parking backend unreachable or returned malformed data
    #[error("Backend error: {0}")]
    Backend(String),

    /// Malformed request input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A confirmation for the same plate and action is already outstanding
    #[error("Already in progress: {0}")]
    AlreadyInProgress(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            Error::SourceUnavailable(msg) => {
                (StatusCode::BAD_GATEWAY, "SOURCE_UNAVAILABLE", msg.clone())
            }
            Error::SourceExhausted => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SOURCE_EXHAUSTED",
                "source ended".to_string(),
            ),
            Error::Detector(msg) => (StatusCode::BAD_GATEWAY, "DETECTOR_ERROR", msg.clone()),
            Error::Backend(msg) => (StatusCode::BAD_GATEWAY, "BACKEND_ERROR", msg.clone()),
            Error::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg.clone()),
            Error::AlreadyInProgress(msg) => {
                (StatusCode::CONFLICT, "ALREADY_IN_PROGRESS", msg.clone())
            }
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            Error::Config(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR", msg.clone())
            }
            Error::Serialization(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SERIALIZATION_ERROR",
                e.to_string(),
            ),
            Error::Http(e) => (StatusCode::BAD_GATEWAY, "HTTP_ERROR", e.to_string()),
            Error::Io(e) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR", e.to_string()),
            Error::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
