//! Task Queue Module
//!
//! A reliable, bounded-concurrency task queue on top of a [`SharedStore`].
//!
//! Each queue owns two lists: the main list `queue_{app}:{fn}` and the
//! processing list `processing_{app}:{fn}`. Producers push onto the head of
//! the main list; the worker atomically moves the tail into the processing
//! list, runs the handler, writes a terminal result under
//! `result:{fn}:{id}`, and then removes the record from the processing list.
//!
//! A process that dies mid-task leaves its record in the processing list,
//! where it reports `processing` until an operator calls
//! [`TaskQueue::requeue_processing`]. Nothing requeues automatically, so a
//! task runs at most once.

mod handler;
mod pool;
mod registry;
mod task;
mod worker;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CoordError, Result};
use crate::store::{processing_key, queue_key, result_key, SharedStore};

pub(crate) use handler::panic_message;
pub use handler::TaskHandler;
pub use pool::BlockingPool;
pub use registry::QueueRegistry;
pub use task::{unix_now, QueueStats, Task, TaskArgs, TaskKwargs, TaskStatus};

use task::TaskId;

// == Queue Options ==
/// Tuning knobs of one queue.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Tasks in flight at once in this process. Must be at least 1.
    pub max_concurrent: u32,
    /// How long terminal results stay readable.
    pub result_ttl: Duration,
    /// How long one dequeue attempt waits for the main list.
    pub pop_timeout: Duration,
    /// Pause after a store error in the worker loop.
    pub error_backoff: Duration,
    /// How long `stop_worker` waits for the loop and in-flight tasks.
    pub stop_grace: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            result_ttl: Duration::from_secs(86_400),
            pop_timeout: Duration::from_secs(1),
            error_backoff: Duration::from_secs(1),
            stop_grace: Duration::from_secs(5),
        }
    }
}

struct Worker {
    stop: watch::Sender<bool>,
    join: JoinHandle<()>,
}

// == Task Queue ==
/// One named queue and its worker loop.
pub struct TaskQueue {
    function_name: String,
    queue_key: String,
    processing_key: String,
    store: Arc<dyn SharedStore>,
    options: QueueOptions,
    /// One permit per in-flight task
    slots: Arc<Semaphore>,
    pool: BlockingPool,
    worker: Mutex<Option<Worker>>,
}

impl TaskQueue {
    // == Constructor ==
    pub fn new(
        store: Arc<dyn SharedStore>,
        app_name: &str,
        function_name: &str,
        options: QueueOptions,
    ) -> Result<Arc<Self>> {
        if function_name.is_empty() {
            return Err(CoordError::InvalidRequest("queue name cannot be empty".to_string()));
        }
        if options.max_concurrent == 0 {
            return Err(CoordError::InvalidRequest(
                "max_concurrent must be at least 1".to_string(),
            ));
        }

        Ok(Arc::new(Self {
            function_name: function_name.to_string(),
            queue_key: queue_key(app_name, function_name),
            processing_key: processing_key(app_name, function_name),
            store,
            slots: Arc::new(Semaphore::new(options.max_concurrent as usize)),
            pool: BlockingPool::new(options.max_concurrent),
            options,
            worker: Mutex::new(None),
        }))
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn queue_key(&self) -> &str {
        &self.queue_key
    }

    pub fn processing_key(&self) -> &str {
        &self.processing_key
    }

    pub fn options(&self) -> &QueueOptions {
        &self.options
    }

    pub fn is_running(&self) -> bool {
        self.worker().is_some()
    }

    fn worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn result_key(&self, task_id: &str) -> String {
        result_key(&self.function_name, task_id)
    }

    // == Enqueue ==
    /// Serializes a task onto the head of the main list.
    ///
    /// Never waits for the task to run; poll [`TaskQueue::get_task_status`]
    /// with the returned id.
    ///
    /// # Arguments
    /// * `args` - Positional arguments handed to the handler
    /// * `kwargs` - Keyword arguments handed to the handler
    /// * `task_id` - Explicit id, or `None` for a fresh UUIDv4
    ///
    /// # Returns
    /// The task id, or [`CoordError::InvalidRequest`] for an empty explicit id.
    ///
    /// # Example
    /// ```ignore
    /// let id = queue
    ///     .enqueue(vec![], kwargs([("user_id", json!("abc"))]), None)
    ///     .await?;
    /// ```
    pub async fn enqueue(
        &self,
        args: TaskArgs,
        kwargs: TaskKwargs,
        task_id: Option<String>,
    ) -> Result<String> {
        let id = match task_id {
            Some(id) if id.is_empty() => {
                return Err(CoordError::InvalidRequest("task id cannot be empty".to_string()))
            }
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };

        let task = Task::new(id.clone(), self.function_name.clone(), args, kwargs);
        let record = serde_json::to_string(&task)?;
        self.store.push_head(&self.queue_key, &record).await?;

        debug!(queue = %self.function_name, task_id = %id, "Task enqueued");
        Ok(id)
    }

    // == Status ==
    /// Reports where a task is.
    ///
    /// # Arguments
    /// * `task_id` - Id returned by [`TaskQueue::enqueue`]
    ///
    /// # Returns
    /// The stored terminal result if there is one, else `Queued` with the
    /// number of records between the task and the dequeue end, else
    /// `Processing`, else `NotFound`.
    ///
    /// The reads are not atomic together. The main list is scanned before the
    /// processing list so a task moved between them is still seen, and the
    /// result key is read again before answering `NotFound` because a task
    /// can finish between the scans. Both scans are linear in the list
    /// length; records that do not decode are skipped.
    pub async fn get_task_status(&self, task_id: &str) -> Result<TaskStatus> {
        let result_key = self.result_key(task_id);
        if let Some(raw) = self.store.get(&result_key).await? {
            return Ok(serde_json::from_str(&raw)?);
        }

        let queued = self.store.list_all(&self.queue_key).await?;
        if let Some(index) = queued.iter().position(|raw| record_has_id(raw, task_id)) {
            // The tail is dequeued next
            return Ok(TaskStatus::Queued {
                tasks_ahead: queued.len() - index - 1,
            });
        }

        let processing = self.store.list_all(&self.processing_key).await?;
        if processing.iter().any(|raw| record_has_id(raw, task_id)) {
            return Ok(TaskStatus::Processing);
        }

        // Finished after the first read: the result is written before the
        // processing record is removed
        if let Some(raw) = self.store.get(&result_key).await? {
            return Ok(serde_json::from_str(&raw)?);
        }

        Ok(TaskStatus::NotFound)
    }

    pub async fn get_stats(&self) -> Result<QueueStats> {
        let queue_size = self.store.list_len(&self.queue_key).await?;
        let processing_count = self.store.list_len(&self.processing_key).await?;
        let max_concurrent = self.options.max_concurrent as usize;

        Ok(QueueStats {
            queue_name: self.function_name.clone(),
            queue_size,
            processing_count,
            max_concurrent,
            available_slots: max_concurrent as i64 - processing_count as i64,
        })
    }

    // == Worker Lifecycle ==
    /// Starts the worker loop with `handler`.
    ///
    /// The loop takes a concurrency permit, moves the next record into the
    /// processing list (waiting up to `pop_timeout`) and runs it on a spawned
    /// task that keeps the permit until the result is stored. Blocking
    /// handlers run on the queue's bounded blocking pool.
    ///
    /// Does nothing if the worker is already running. Must be called inside
    /// a tokio runtime.
    ///
    /// # Arguments
    /// * `handler` - Run once per dequeued task
    ///
    /// # Example
    /// ```ignore
    /// queue.start_worker(TaskHandler::blocking(|task| render(&task)));
    /// // Later, during shutdown:
    /// queue.stop_worker().await?;
    /// ```
    pub fn start_worker(self: &Arc<Self>, handler: TaskHandler) {
        let mut slot = self.worker();
        if slot.is_some() {
            debug!(queue = %self.function_name, "Worker already running");
            return;
        }

        let (stop, stop_rx) = watch::channel(false);
        let join = tokio::spawn(worker::run(Arc::clone(self), handler, stop_rx));
        *slot = Some(Worker { stop, join });

        info!(
            queue = %self.function_name,
            max_concurrent = self.options.max_concurrent,
            "Worker started"
        );
    }

    /// Stops the worker loop.
    ///
    /// The loop finishes its current dequeue attempt and exits; it is aborted
    /// if that takes longer than the grace window. In-flight tasks get the
    /// rest of the window, then blocking handlers still running are waited
    /// for. Nothing is killed. Returns [`CoordError::ShutdownTimeout`] when
    /// tasks were still in flight at the end of the window.
    pub async fn stop_worker(&self) -> Result<()> {
        let worker = self.worker().take();
        let Some(worker) = worker else {
            return Ok(());
        };

        let deadline = Instant::now() + self.options.stop_grace;
        let _ = worker.stop.send(true);

        let mut join = worker.join;
        if tokio::time::timeout_at(deadline, &mut join).await.is_err() {
            warn!(queue = %self.function_name, "Worker loop did not stop in time; aborting");
            join.abort();
        }

        let all_slots = self.options.max_concurrent;
        let settled = tokio::time::timeout_at(deadline, self.slots.acquire_many(all_slots)).await;
        self.pool.drain().await;

        match settled {
            Ok(_) => {
                info!(queue = %self.function_name, "Worker stopped");
                Ok(())
            }
            Err(_) => {
                warn!(queue = %self.function_name, "Tasks still in flight after stop grace");
                Err(CoordError::ShutdownTimeout(self.function_name.clone()))
            }
        }
    }

    // == Recovery ==
    /// Moves every record in the processing list back to the dequeue end of
    /// the main list, oldest first in line. Returns how many moved.
    ///
    /// Only safe while no worker in any process is handling this queue;
    /// otherwise a running task would be run twice.
    pub async fn requeue_processing(&self) -> Result<usize> {
        let stranded = self.store.list_all(&self.processing_key).await?;

        let mut moved = 0;
        // Head first is newest first; the last one appended is dequeued first
        for record in &stranded {
            if self
                .store
                .move_value_to_tail(&self.processing_key, &self.queue_key, record)
                .await?
            {
                moved += 1;
            }
        }

        info!(queue = %self.function_name, moved, "Requeued processing records");
        Ok(moved)
    }
}

fn record_has_id(raw: &str, task_id: &str) -> bool {
    serde_json::from_str::<TaskId>(raw).is_ok_and(|record| record.id == task_id)
}

/// Builds keyword arguments from `(name, value)` pairs.
pub fn kwargs<I, K>(pairs: I) -> TaskKwargs
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
