//! API Routes
//!
//! Configures the Axum router with the demo endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    cache_handler, enqueue_handler, health_handler, lock_handler, queue_stats_handler,
    task_status_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `POST /queue` - Enqueue a document task
/// - `GET /queue/stats` - Live queue statistics
/// - `GET /queue/:task_id` - Status of one task
/// - `POST /lock` - Simulated work under the `input_data` lock
/// - `GET /cache` - Memoized slow lookup
/// - `GET /health` - Store health check
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/queue", post(enqueue_handler))
        .route("/queue/stats", get(queue_stats_handler))
        .route("/queue/:task_id", get(task_status_handler))
        .route("/lock", post(lock_handler))
        .route("/cache", get(cache_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
