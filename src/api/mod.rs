//! API Module
//!
//! Demo HTTP surface exercising the queue, the lock and the memoizing cache.
//!
//! # Endpoints
//! - `POST /queue` - Enqueue on `pdf_queue`
//! - `GET /queue/stats` - Queue statistics
//! - `GET /queue/:task_id` - Task status
//! - `POST /lock` - Work under a distributed lock
//! - `GET /cache` - Memoized slow lookup
//! - `GET /health` - Health check endpoint

pub mod demo;
pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
