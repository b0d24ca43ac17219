//! Integration Tests for the Queue and Lock
//!
//! Registry-driven queue runs against the in-memory store, plus the same
//! scenarios against a live Redis (ignored by default; set `REDIS_URL` and
//! run with `--ignored`).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use coord_core::queue::{kwargs, Task, TaskKwargs};
use coord_core::{
    DistributedLock, MemoryStore, QueueOptions, QueueRegistry, RedisStore, SharedStore,
    TaskHandler, TaskQueue, TaskStatus,
};
use serde_json::json;
use uuid::Uuid;

// == Helper Functions ==

fn fast_options(max_concurrent: u32) -> QueueOptions {
    QueueOptions {
        max_concurrent,
        pop_timeout: Duration::from_millis(100),
        error_backoff: Duration::from_millis(100),
        ..QueueOptions::default()
    }
}

async fn wait_terminal(queue: &TaskQueue, id: &str) -> TaskStatus {
    for _ in 0..200 {
        let status = queue.get_task_status(id).await.unwrap();
        if status.is_terminal() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("task {} never finished", id);
}

async fn redis_store() -> Arc<dyn SharedStore> {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    Arc::new(RedisStore::connect(&url).await.unwrap())
}

/// Unique namespace so runs against a shared Redis do not collide.
fn unique_app() -> String {
    format!("itest_{}", Uuid::new_v4().simple())
}

// == Shared Scenarios ==

async fn scenario_two_queues_share_a_store(store: Arc<dyn SharedStore>, app: &str) {
    let registry = QueueRegistry::new();
    let handled = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&handled);
    let documents = registry
        .create_queue(
            Arc::clone(&store),
            app,
            "documents",
            TaskHandler::non_blocking(move |_task: Task| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(())
                }
            }),
            fast_options(2),
        )
        .unwrap();
    let images = registry
        .create_queue(
            Arc::clone(&store),
            app,
            "images",
            TaskHandler::blocking(|task| match task.kwarg_str("path") {
                Some(path) if path.ends_with(".png") => Ok(()),
                _ => Err(anyhow!("unsupported image")),
            }),
            fast_options(2),
        )
        .unwrap();

    registry.init();

    let doc = documents.enqueue(vec![json!("a")], TaskKwargs::new(), None).await.unwrap();
    let good = images
        .enqueue(vec![], kwargs([("path", json!("scan.png"))]), None)
        .await
        .unwrap();
    let bad = images
        .enqueue(vec![], kwargs([("path", json!("scan.gif"))]), None)
        .await
        .unwrap();

    assert!(matches!(wait_terminal(&documents, &doc).await, TaskStatus::Complete { .. }));
    assert!(matches!(wait_terminal(&images, &good).await, TaskStatus::Complete { .. }));
    match wait_terminal(&images, &bad).await {
        TaskStatus::Failed { error, .. } => assert_eq!(error, "unsupported image"),
        other => panic!("unexpected status {:?}", other),
    }
    assert_eq!(handled.load(Ordering::SeqCst), 1);

    // Results are per queue
    assert_eq!(documents.get_task_status(&good).await.unwrap(), TaskStatus::NotFound);

    registry.close().await;
    assert!(!documents.is_running());
    assert!(!images.is_running());
}

async fn scenario_lock_exclusive_across_instances(store: Arc<dyn SharedStore>, app: &str) {
    let a = DistributedLock::new(Arc::clone(&store), app, "shared", Duration::from_secs(5)).unwrap();
    let b = DistributedLock::new(Arc::clone(&store), app, "shared", Duration::from_secs(5)).unwrap();

    assert!(a.acquire(false, None).await.unwrap());
    assert!(!b.acquire(false, None).await.unwrap());
    assert!(!b.release().await);
    assert!(a.release().await);
    assert!(b.acquire(false, None).await.unwrap());
    assert!(b.release().await);
}

// == In-Memory Store ==

#[tokio::test]
async fn test_registry_runs_queues_on_memory_store() {
    scenario_two_queues_share_a_store(Arc::new(MemoryStore::new()), "itest").await;
}

#[tokio::test]
async fn test_lock_exclusive_on_memory_store() {
    scenario_lock_exclusive_across_instances(Arc::new(MemoryStore::new()), "itest").await;
}

#[tokio::test]
async fn test_many_producers_one_worker() {
    let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
    let queue = TaskQueue::new(Arc::clone(&store), "itest", "bulk", fast_options(4)).unwrap();

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                let mut ids = Vec::new();
                for n in 0..5 {
                    ids.push(
                        queue
                            .enqueue(vec![json!(p), json!(n)], TaskKwargs::new(), None)
                            .await
                            .unwrap(),
                    );
                }
                ids
            })
        })
        .collect();

    let mut ids = Vec::new();
    for producer in producers {
        ids.extend(producer.await.unwrap());
    }
    assert_eq!(queue.get_stats().await.unwrap().queue_size, 20);

    queue.start_worker(TaskHandler::blocking(|_task| Ok(())));
    for id in &ids {
        assert!(matches!(wait_terminal(&queue, id).await, TaskStatus::Complete { .. }));
    }

    let stats = queue.get_stats().await.unwrap();
    assert_eq!(stats.queue_size, 0);
    queue.stop_worker().await.unwrap();
}

// == Redis Store ==

#[tokio::test]
#[ignore = "requires a running Redis at REDIS_URL"]
async fn test_registry_runs_queues_on_redis() {
    let app = unique_app();
    scenario_two_queues_share_a_store(redis_store().await, &app).await;
}

#[tokio::test]
#[ignore = "requires a running Redis at REDIS_URL"]
async fn test_lock_exclusive_on_redis() {
    let app = unique_app();
    scenario_lock_exclusive_across_instances(redis_store().await, &app).await;
}

#[tokio::test]
#[ignore = "requires a running Redis at REDIS_URL"]
async fn test_redis_lock_expires() {
    let store = redis_store().await;
    let app = unique_app();
    let a = DistributedLock::new(Arc::clone(&store), &app, "expiring", Duration::from_secs(1)).unwrap();
    let b = DistributedLock::new(Arc::clone(&store), &app, "expiring", Duration::from_secs(1)).unwrap();

    assert!(a.acquire(false, None).await.unwrap());
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(b.acquire(false, None).await.unwrap());
    assert!(!a.release().await);
    assert!(b.release().await);
}
