//! Error types for the gateway.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Errors raised while loading configuration and starting up. All of them are fatal.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration is structurally valid JSON but unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// A configured URL failed to parse
    #[error("Invalid {field} URL {value:?}: {source}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },

    /// Route table is not valid JSON
    #[error("Malformed configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client construction errors
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for startup operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Per-request forwarding failures. Answered with 502, the process keeps serving.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "error": "BAD_GATEWAY",
                "message": self.to_string()
            })),
        )
            .into_response()
    }
}

pub fn internal_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": "INTERNAL_ERROR",
            "message": "An unexpected error occurred"
        })),
    )
        .into_response()
}
