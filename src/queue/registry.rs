//! Queue Registry
//!
//! Starts and stops the worker loops of every registered queue together.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;
use tracing::{info, warn};

use crate::error::Result;
use crate::store::SharedStore;

use super::{QueueOptions, TaskHandler, TaskQueue};

/// Owns the (queue, handler) pairs built at startup.
#[derive(Default)]
pub struct QueueRegistry {
    queues: Mutex<Vec<(Arc<TaskQueue>, TaskHandler)>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn queues(&self) -> MutexGuard<'_, Vec<(Arc<TaskQueue>, TaskHandler)>> {
        self.queues.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self, queue: Arc<TaskQueue>, handler: TaskHandler) {
        info!(queue = %queue.function_name(), handler = handler.kind(), "Queue registered");
        self.queues().push((queue, handler));
    }

    /// Builds a queue and registers it with `handler` in one step.
    ///
    /// # Returns
    /// The new queue, for producers to enqueue on, or the construction error
    /// (nothing is registered then).
    ///
    /// # Example
    /// ```ignore
    /// let registry = QueueRegistry::new();
    /// let pdf = registry.create_queue(store, "coord", "pdf_queue", handler, QueueOptions::default())?;
    /// registry.init();
    /// // ...
    /// registry.close().await;
    /// ```
    pub fn create_queue(
        &self,
        store: Arc<dyn SharedStore>,
        app_name: &str,
        function_name: &str,
        handler: TaskHandler,
        options: QueueOptions,
    ) -> Result<Arc<TaskQueue>> {
        let queue = TaskQueue::new(store, app_name, function_name, options)?;
        self.register(Arc::clone(&queue), handler);
        Ok(queue)
    }

    /// Starts every registered worker.
    pub fn init(&self) {
        let queues = self.queues();
        if queues.is_empty() {
            return;
        }
        for (queue, handler) in queues.iter() {
            queue.start_worker(handler.clone());
        }
        info!(count = queues.len(), "Queue workers started");
    }

    /// Stops every registered worker concurrently. A queue that fails to stop
    /// cleanly is logged and does not hold up the others.
    pub async fn close(&self) {
        let queues: Vec<Arc<TaskQueue>> = self.queues().iter().map(|(q, _)| Arc::clone(q)).collect();
        if queues.is_empty() {
            return;
        }

        let outcomes = join_all(queues.iter().map(|queue| queue.stop_worker())).await;
        for (queue, outcome) in queues.iter().zip(outcomes) {
            if let Err(e) = outcome {
                warn!(queue = %queue.function_name(), error = %e, "Queue did not stop cleanly");
            }
        }
        info!(count = queues.len(), "Queue workers stopped");
    }

    pub fn len(&self) -> usize {
        self.queues().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues().is_empty()
    }
}
