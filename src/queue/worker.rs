//! Worker loop and per-task unit of work.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{watch, OwnedSemaphorePermit};
use tracing::{debug, error, info, warn};

use crate::error::CoordError;

use super::handler::{panic_message, TaskHandler};
use super::task::{Task, TaskStatus};
use super::TaskQueue;

/// Dequeues until `stop` flips. One permit is taken before every dequeue
/// attempt and travels with the task, so at most `max_concurrent` tasks run.
pub(super) async fn run(queue: Arc<TaskQueue>, handler: TaskHandler, mut stop: watch::Receiver<bool>) {
    let options = queue.options.clone();

    loop {
        if *stop.borrow() {
            break;
        }

        let permit = tokio::select! {
            biased;
            _ = stop.changed() => break,
            permit = Arc::clone(&queue.slots).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        // Not raced against `stop`: a dequeue dropped mid-flight could
        // strand a record in the processing list.
        let popped = queue
            .store
            .move_tail_to_head(&queue.queue_key, &queue.processing_key, options.pop_timeout)
            .await;

        match popped {
            Ok(Some(record)) => {
                let queue = Arc::clone(&queue);
                let handler = handler.clone();
                tokio::spawn(async move {
                    process(&queue, &handler, record).await;
                    drop(permit);
                });
            }
            Ok(None) => drop(permit),
            Err(e) => {
                drop(permit);
                warn!(queue = %queue.function_name, error = %e, "Dequeue failed; backing off");
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = tokio::time::sleep(options.error_backoff) => {}
                }
            }
        }
    }

    debug!(queue = %queue.function_name, "Worker loop exited");
}

/// Runs one dequeued record to a terminal result, then takes it off the
/// processing list. Never fails; every outcome is recorded or logged.
async fn process(queue: &TaskQueue, handler: &TaskHandler, record: String) {
    let task: Task = match serde_json::from_str(&record) {
        Ok(task) => task,
        Err(e) => {
            error!(queue = %queue.function_name, error = %e, "Dropping undecodable task record");
            finish(queue, &record).await;
            return;
        }
    };
    let task_id = task.id.clone();

    let status = match execute(queue, handler, task).await {
        Ok(()) => {
            info!(queue = %queue.function_name, task_id = %task_id, "Task completed");
            TaskStatus::complete()
        }
        Err(message) => {
            error!(queue = %queue.function_name, task_id = %task_id, error = %message, "Task failed");
            TaskStatus::failed(message)
        }
    };

    match serde_json::to_string(&status) {
        Ok(payload) => {
            let stored = queue
                .store
                .set_with_ttl(&queue.result_key(&task_id), &payload, queue.options.result_ttl)
                .await;
            if let Err(e) = stored {
                error!(queue = %queue.function_name, task_id = %task_id, error = %e, "Failed to store task result");
            }
        }
        Err(e) => {
            error!(queue = %queue.function_name, task_id = %task_id, error = %e, "Failed to encode task result");
        }
    }

    finish(queue, &record).await;
}

async fn execute(queue: &TaskQueue, handler: &TaskHandler, task: Task) -> Result<(), String> {
    match handler {
        TaskHandler::NonBlocking(f) => {
            match AssertUnwindSafe(async move { f(task).await }).catch_unwind().await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(panic) => Err(CoordError::HandlerPanicked(panic_message(panic.as_ref())).to_string()),
            }
        }
        TaskHandler::Blocking(f) => {
            let f = Arc::clone(f);
            match queue.pool.run(move || f(task)).await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            }
        }
    }
}

async fn finish(queue: &TaskQueue, record: &str) {
    if let Err(e) = queue.store.remove_value(&queue.processing_key, record).await {
        error!(queue = %queue.function_name, error = %e, "Failed to clear processing record");
    }
}
