//! Error types for the coordination core
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Coord Error Enum ==
/// Unified error type for the lock, queue and store layers.
#[derive(Error, Debug)]
pub enum CoordError {
    /// Shared store unreachable or command rejected
    #[error("Store error: {0}")]
    Store(String),

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Scoped lock acquisition gave up
    #[error("Failed to acquire lock: {0}")]
    LockNotAcquired(String),

    /// Invalid construction or request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A task handler panicked; carries the panic message
    #[error("handler panicked: {0}")]
    HandlerPanicked(String),

    /// Worker loop did not stop within its grace window
    #[error("Shutdown timed out: {0}")]
    ShutdownTimeout(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<redis::RedisError> for CoordError {
    fn from(err: redis::RedisError) -> Self {
        CoordError::Store(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CoordError {
    fn into_response(self) -> Response {
        let status = match &self {
            CoordError::LockNotAcquired(_) => StatusCode::CONFLICT,
            CoordError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CoordError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoordError::Serialization(_)
            | CoordError::HandlerPanicked(_)
            | CoordError::ShutdownTimeout(_)
            | CoordError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the coordination core.
pub type Result<T> = std::result::Result<T, CoordError>;
