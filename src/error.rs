use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Unified error type for the Relay application
#[derive(Error, Debug)]
pub enum RelayError {
    // Transport errors
    #[error("Connectivity failure: {0}")]
    Connectivity(String),

    // Endpoint data errors
    #[error("Invalid proxy endpoint: {0}")]
    InvalidEndpoint(String),

    // Proxy source errors
    #[error("Proxy source fetch failed: {0}")]
    SourceFetch(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            RelayError::InvalidRequest(_)
            | RelayError::InvalidEndpoint(_)
            | RelayError::InvalidConfig(_) => StatusCode::BAD_REQUEST,

            // 502 Bad Gateway
            RelayError::Connectivity(_) | RelayError::SourceFetch(_) => StatusCode::BAD_GATEWAY,

            // 500 Internal Server Error
            RelayError::Io(_) | RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this error is a transport-level fault that counts against a retry budget
    pub fn is_connectivity(&self) -> bool {
        matches!(self, RelayError::Connectivity(_))
    }
}

// Implement IntoResponse for API error responses
impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}

// Status codes are never turned into errors by the executor, so apart from
// request-construction problems every reqwest failure is a transport fault.
impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            return RelayError::InvalidRequest(err.to_string());
        }
        let kind = if err.is_timeout() {
            "timed out"
        } else if err.is_connect() {
            "connect failed"
        } else if err.is_body() || err.is_decode() {
            "response read failed"
        } else {
            "request failed"
        };
        RelayError::Connectivity(format!("{}: {}", kind, err))
    }
}

// Convert from URL parse errors
impl From<url::ParseError> for RelayError {
    fn from(err: url::ParseError) -> Self {
        RelayError::InvalidRequest(err.to_string())
    }
}
