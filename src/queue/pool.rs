//! Bounded pool for blocking task handlers.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::{CoordError, Result};

use super::handler::panic_message;

/// Runs blocking closures on tokio's blocking threads, at most `size` at once.
#[derive(Debug, Clone)]
pub struct BlockingPool {
    slots: Arc<Semaphore>,
    size: u32,
}

impl BlockingPool {
    pub fn new(size: u32) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(size as usize)),
            size,
        }
    }

    /// Runs `f` once a slot is free. A panic inside `f` comes back as
    /// [`CoordError::HandlerPanicked`] carrying the panic message.
    pub async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| CoordError::Internal("blocking pool closed".to_string()))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        })
        .await
        .map_err(|e| match e.try_into_panic() {
            Ok(panic) => CoordError::HandlerPanicked(panic_message(panic.as_ref())),
            Err(e) => CoordError::Internal(format!("blocking handler did not finish: {}", e)),
        })
    }

    /// Waits for every closure currently running to finish. Nothing is
    /// interrupted and the pool stays usable afterwards.
    pub async fn drain(&self) {
        if let Ok(all) = self.slots.acquire_many(self.size).await {
            drop(all);
        }
    }

    pub fn in_flight(&self) -> usize {
        self.size as usize - self.slots.available_permits()
    }
}
