//! Response DTOs for the demo HTTP API

use serde::Serialize;
use serde_json::Value;

/// Response body for POST /queue
#[derive(Debug, Clone, Serialize)]
pub struct EnqueueResponse {
    pub task_id: String,
}

impl EnqueueResponse {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
        }
    }
}

/// Response body for POST /lock
#[derive(Debug, Clone, Serialize)]
pub struct LockResponse {
    /// Result of the work done under the lock
    pub message: String,
    /// Store key of the lock that was held
    pub lock: String,
}

impl LockResponse {
    pub fn new(text: &str, lock: impl Into<String>) -> Self {
        Self {
            message: format!("Processed: {}", text),
            lock: lock.into(),
        }
    }
}

/// Response body for GET /cache
#[derive(Debug, Clone, Serialize)]
pub struct CacheResponse {
    pub result: Value,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy" when the store answers, "degraded" otherwise
    pub status: String,
    /// "up" or the store error
    pub store: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            store: "up".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn degraded(reason: impl Into<String>) -> Self {
        Self {
            status: "degraded".to_string(),
            store: reason.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_response_serialize() {
        let json = serde_json::to_string(&EnqueueResponse::new("t-1")).unwrap();
        assert_eq!(json, r#"{"task_id":"t-1"}"#);
    }

    #[test]
    fn test_lock_response_message() {
        let resp = LockResponse::new("hello", "lock_coord:input_data");
        assert_eq!(resp.message, "Processed: hello");
        assert_eq!(resp.lock, "lock_coord:input_data");
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
        assert!(resp.is_healthy());
    }

    #[test]
    fn test_degraded_health_carries_reason() {
        let resp = HealthResponse::degraded("connection refused");
        assert!(!resp.is_healthy());
        assert_eq!(resp.store, "connection refused");
    }
}
