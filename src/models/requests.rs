//! Request DTOs for the demo HTTP API

use serde::Deserialize;

/// Request body for POST /queue
#[derive(Debug, Clone, Deserialize)]
pub struct EnqueueRequest {
    /// Session the document belongs to
    pub user_id: String,
    /// Text handed to the queued task
    #[serde(default)]
    pub text: String,
}

impl EnqueueRequest {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.user_id.is_empty() {
            return Some("user_id cannot be empty".to_string());
        }
        None
    }
}

/// Request body for POST /lock
#[derive(Debug, Clone, Deserialize)]
pub struct LockRequest {
    pub text: String,
}
