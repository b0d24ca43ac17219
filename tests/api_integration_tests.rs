//! Integration Tests for API Endpoints
//!
//! Full request/response cycle for each demo endpoint, against the
//! in-memory store.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use coord_core::api::{create_router, demo};
use coord_core::{
    AppState, Config, DistributedLock, MemoryStore, QueueOptions, SharedStore, TaskQueue,
};
use serde_json::Value;
use tower::ServiceExt;

// == Helper Functions ==

fn test_config() -> Config {
    Config {
        app_name: "itest".to_string(),
        simulated_work_ms: 200,
        lock_wait: 1,
        cache_ttl: 30,
        ..Config::default()
    }
}

fn build_state() -> (AppState, Arc<TaskQueue>) {
    let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
    let queue = TaskQueue::new(
        Arc::clone(&store),
        "itest",
        "pdf_queue",
        QueueOptions {
            max_concurrent: 3,
            pop_timeout: Duration::from_millis(100),
            ..QueueOptions::default()
        },
    )
    .unwrap();
    let state = AppState::new(store, Arc::clone(&queue), test_config());
    (state, queue)
}

fn create_test_app() -> Router {
    create_router(build_state().0)
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn enqueue(app: &Router, body: &str) -> String {
    let response = app.clone().oneshot(post_json("/queue", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    json["task_id"].as_str().unwrap().to_string()
}

async fn wait_for_status(app: &Router, task_id: &str, wanted: &str) -> Value {
    for _ in 0..100 {
        let response = app.clone().oneshot(get(&format!("/queue/{}", task_id))).await.unwrap();
        let json = body_to_json(response.into_body()).await;
        if json["status"] == wanted {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("task {} never reached {}", task_id, wanted);
}

// == Queue Endpoint Tests ==

#[tokio::test]
async fn test_enqueue_reports_queued_position() {
    let app = create_test_app();

    let task_id = enqueue(&app, r#"{"user_id":"abc","text":"hello"}"#).await;

    let response = app.oneshot(get(&format!("/queue/{}", task_id))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "queued");
    assert_eq!(json["tasks_ahead"], 0);
}

#[tokio::test]
async fn test_enqueue_rejects_empty_user() {
    let app = create_test_app();

    let response = app
        .oneshot(post_json("/queue", r#"{"user_id":"","text":"hello"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert!(json["error"].as_str().unwrap().contains("user_id"));
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let app = create_test_app();

    let response = app.oneshot(get("/queue/does-not-exist")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "not_found");
}

#[tokio::test]
async fn test_pdf_queue_task_completes() {
    let (state, queue) = build_state();
    let app = create_router(state);

    let task_id = enqueue(&app, r#"{"user_id":"abc","text":"hello"}"#).await;
    queue.start_worker(demo::pdf_handler(Duration::from_millis(50)));

    let json = wait_for_status(&app, &task_id, "complete").await;
    assert!(json["completed_at"].as_f64().unwrap() > 0.0);

    queue.stop_worker().await.unwrap();
}

#[tokio::test]
async fn test_pdf_queue_task_fails_on_bad_input() {
    let (state, queue) = build_state();
    let app = create_router(state);

    let task_id = enqueue(&app, r#"{"user_id":"abc","text":""}"#).await;
    queue.start_worker(demo::pdf_handler(Duration::from_millis(50)));

    let json = wait_for_status(&app, &task_id, "failed").await;
    assert_eq!(json["error"], "bad input");
    assert!(json["failed_at"].as_f64().unwrap() > 0.0);

    queue.stop_worker().await.unwrap();
}

#[tokio::test]
async fn test_queue_stats_endpoint() {
    let app = create_test_app();

    enqueue(&app, r#"{"user_id":"a","text":"one"}"#).await;
    enqueue(&app, r#"{"user_id":"b","text":"two"}"#).await;

    let response = app.oneshot(get("/queue/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["queue_name"], "pdf_queue");
    assert_eq!(json["queue_size"], 2);
    assert_eq!(json["processing_count"], 0);
    assert_eq!(json["max_concurrent"], 3);
    assert_eq!(json["available_slots"], 3);
}

// == Lock Endpoint Tests ==

#[tokio::test]
async fn test_lock_endpoint_success() {
    let app = create_test_app();

    let response = app
        .oneshot(post_json("/lock", r#"{"text":"hello"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["message"], "Processed: hello");
    assert_eq!(json["lock"], "lock_itest:input_data");
}

#[tokio::test]
async fn test_lock_endpoint_conflicts_while_held() {
    let (state, _) = build_state();
    let holder = DistributedLock::new(
        Arc::clone(&state.store),
        "itest",
        "input_data",
        Duration::from_secs(30),
    )
    .unwrap();
    assert!(holder.acquire(false, None).await.unwrap());
    let app = create_router(state);

    let response = app
        .oneshot(post_json("/lock", r#"{"text":"hello"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_to_json(response.into_body()).await;
    assert!(json["error"].as_str().unwrap().contains("lock_itest:input_data"));
    assert!(holder.release().await);
}

#[tokio::test]
async fn test_concurrent_lock_requests_serialize() {
    let app = create_test_app();

    let (a, b) = tokio::join!(
        app.clone().oneshot(post_json("/lock", r#"{"text":"a"}"#)),
        app.clone().oneshot(post_json("/lock", r#"{"text":"b"}"#)),
    );

    // The second waits for the first within the lock wait budget
    assert_eq!(a.unwrap().status(), StatusCode::OK);
    assert_eq!(b.unwrap().status(), StatusCode::OK);
}

// == Cache Endpoint Tests ==

#[tokio::test]
async fn test_cache_endpoint_memoizes_by_query() {
    let app = create_test_app();

    let response = app.clone().oneshot(get("/cache?text=hi&lang=en")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["result"], "Cache hi");

    // Same parameters in another order hit the cache
    let started = std::time::Instant::now();
    let response = app.oneshot(get("/cache?lang=en&text=hi")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(started.elapsed() < Duration::from_millis(100));
}

// == Health Endpoint Tests ==

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app();

    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "healthy");
    assert!(json.get("timestamp").is_some());
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = create_test_app();

    let response = app.oneshot(get("/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
