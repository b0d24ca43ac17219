//! Request and Response models for the demo HTTP API
//!
//! DTOs serialized to and from the bodies of the demo endpoints.

pub mod requests;
pub mod responses;

pub use requests::{EnqueueRequest, LockRequest};
pub use responses::{CacheResponse, EnqueueResponse, HealthResponse, LockResponse};
