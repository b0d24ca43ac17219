//! API Handlers
//!
//! HTTP request handlers for each demo endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::warn;

use crate::cache::{MemoPolicy, QueryParams, TtlCache};
use crate::config::Config;
use crate::error::{CoordError, Result};
use crate::lock::DistributedLock;
use crate::models::{
    CacheResponse, EnqueueRequest, EnqueueResponse, HealthResponse, LockRequest, LockResponse,
};
use crate::queue::{QueueStats, TaskKwargs, TaskQueue, TaskStatus};
use crate::store::SharedStore;

use super::demo::{slow_lookup, SlowLookup};

/// Name of the lock the lock endpoint serializes on.
pub const INPUT_LOCK: &str = "input_data";

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SharedStore>,
    /// The `pdf_queue` demo queue
    pub queue: Arc<TaskQueue>,
    pub lookup: Arc<SlowLookup>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn SharedStore>, queue: Arc<TaskQueue>, config: Config) -> Self {
        let lookup = SlowLookup::new(
            TtlCache::new(),
            "cache_endpoint",
            MemoPolicy::fixed(config.cache_ttl()),
            slow_lookup(config.simulated_work()),
        );

        Self {
            store,
            queue,
            lookup: Arc::new(lookup),
            config: Arc::new(config),
        }
    }
}

/// Handler for POST /queue
///
/// Enqueues a document task and returns its id without waiting for it.
pub async fn enqueue_handler(
    State(state): State<AppState>,
    Json(req): Json<EnqueueRequest>,
) -> Result<Json<EnqueueResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CoordError::InvalidRequest(error_msg));
    }

    let mut kwargs = TaskKwargs::new();
    kwargs.insert("user_id".to_string(), req.user_id.into());
    kwargs.insert("text".to_string(), req.text.into());

    let task_id = state.queue.enqueue(Vec::new(), kwargs, None).await?;
    Ok(Json(EnqueueResponse::new(task_id)))
}

/// Handler for GET /queue/stats
pub async fn queue_stats_handler(State(state): State<AppState>) -> Result<Json<QueueStats>> {
    Ok(Json(state.queue.get_stats().await?))
}

/// Handler for GET /queue/:task_id
pub async fn task_status_handler(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatus>> {
    Ok(Json(state.queue.get_task_status(&task_id).await?))
}

/// Handler for POST /lock
///
/// Does the simulated work while holding the `input_data` lock. Gives up
/// with 409 if the lock is not obtained within the configured wait.
pub async fn lock_handler(
    State(state): State<AppState>,
    Json(req): Json<LockRequest>,
) -> Result<Json<LockResponse>> {
    let config = &state.config;
    let lock = DistributedLock::new(
        Arc::clone(&state.store),
        &config.app_name,
        INPUT_LOCK,
        config.lock_timeout(),
    )?;

    let work = config.simulated_work();
    lock.scoped(Some(config.lock_wait()), || tokio::time::sleep(work))
        .await
        .inspect_err(|e| warn!(text = %req.text, error = %e, "Lock endpoint gave up"))?;

    Ok(Json(LockResponse::new(&req.text, lock.key())))
}

/// Handler for GET /cache
///
/// Memoized slow lookup keyed by the sorted query parameters.
pub async fn cache_handler(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<CacheResponse>> {
    let result = state
        .lookup
        .call_request(params)
        .await
        .map_err(|e| CoordError::Internal(e.to_string()))?;

    Ok(Json(CacheResponse { result }))
}

/// Handler for GET /health
///
/// Pings the shared store; 503 with `degraded` when it does not answer.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse::healthy())),
        Err(e) => {
            warn!(error = %e, "Store ping failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse::degraded(e.to_string())))
        }
    }
}
