use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::tls::TlsError;

/// Application-wide error types with appropriate HTTP status codes.
///
/// Middleware never produces these: a [`Handler`](crate::middleware::Handler)
/// answers every request with a response. They surface from construction
/// (configuration, TLS, HTTP clients), from outbound requests and from the
/// demo route handlers.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Unix socket transport error: {0}")]
    UnixTransport(#[from] hyper_util::client::legacy::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] axum::http::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Operation timed out: {0}")]
    OperationTimeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error response body for API endpoints.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Full details stay in the server log
        tracing::error!(error = %self, "Request failed");

        let (status, error_type, message) = match &self {
            AppError::SerializationError(e) => (
                StatusCode::BAD_REQUEST,
                "serialization_error",
                sanitize_serde_error(e),
            ),
            AppError::InvalidRequest(_) => (
                StatusCode::BAD_REQUEST,
                "bad_request",
                "Invalid request".to_string(),
            ),
            AppError::OperationTimeout(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                "timeout",
                "Operation timed out. Please try again.".to_string(),
            ),
            AppError::Client(_) | AppError::UnixTransport(_) => (
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                "Upstream request failed. Please try again.".to_string(),
            ),
            AppError::ConfigError(_) | AppError::Tls(_) | AppError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred. Please contact support if the issue persists."
                    .to_string(),
            ),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Sanitize serde error messages to avoid leaking internal type information.
fn sanitize_serde_error(e: &serde_json::Error) -> String {
    let msg = e.to_string();

    if msg.contains("invalid type") {
        return "Invalid data type in request body".to_string();
    }

    if msg.contains("EOF while parsing") || msg.contains("expected") {
        return "Malformed JSON in request body".to_string();
    }

    "Invalid request format".to_string()
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
