//! Distributed Lock Module
//!
//! At-most-one-holder mutual exclusion across every process sharing the
//! store. A lock record `lock_{app}:{key}` holds a random owner token and
//! expires after the lock timeout, so a crashed holder cannot deadlock the
//! others. Release deletes the record only while it still carries this
//! holder's token.
//!
//! The expiry is not a fencing token: a holder whose record expired
//! mid-operation and was taken over by someone else is not told.

mod guard;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{CoordError, Result};
use crate::store::{lock_key, SharedStore};

pub use guard::LockGuard;

/// Record expiry applied when none is given.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause between attempts of a blocking acquire.
pub const RETRY_INTERVAL: Duration = Duration::from_millis(100);

// == Distributed Lock ==
/// A named lock shared through a [`SharedStore`].
pub struct DistributedLock {
    store: Arc<dyn SharedStore>,
    key: String,
    timeout: Duration,
    /// Owner token while this instance believes it holds the lock
    held: Mutex<Option<String>>,
}

impl DistributedLock {
    // == Constructor ==
    /// Creates a lock on `lock_{app_name}:{lock}` whose record expires after `timeout`.
    pub fn new(
        store: Arc<dyn SharedStore>,
        app_name: &str,
        lock: &str,
        timeout: Duration,
    ) -> Result<Self> {
        if lock.is_empty() {
            return Err(CoordError::InvalidRequest("lock key cannot be empty".to_string()));
        }
        if timeout.is_zero() {
            return Err(CoordError::InvalidRequest("lock timeout must be positive".to_string()));
        }

        Ok(Self {
            store,
            key: lock_key(app_name, lock),
            timeout,
            held: Mutex::new(None),
        })
    }

    /// Full store key of the lock record.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether this instance believes it holds the lock. Says nothing about
    /// whether the record has expired since.
    pub fn is_held(&self) -> bool {
        self.held().is_some()
    }

    fn held(&self) -> MutexGuard<'_, Option<String>> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // == Acquire ==
    /// Tries to take the lock.
    ///
    /// Each attempt is an atomic set-if-absent of the lock record with a
    /// fresh random owner token and the lock's timeout as expiry.
    ///
    /// # Arguments
    /// * `blocking` - false for a single attempt; true to retry every
    ///   [`RETRY_INTERVAL`] while another holder has the record
    /// * `blocking_timeout` - Give up after this long when blocking; `None`
    ///   waits forever
    ///
    /// # Returns
    /// `Ok(true)` once held, `Ok(false)` if not obtained, or a store error.
    ///
    /// # Example
    /// ```ignore
    /// let lock = DistributedLock::new(store, "extractor", "input_data", Duration::from_secs(30))?;
    /// if lock.acquire(true, Some(Duration::from_secs(5))).await? {
    ///     // ... exclusive work ...
    ///     lock.release().await;
    /// }
    /// ```
    pub async fn acquire(&self, blocking: bool, blocking_timeout: Option<Duration>) -> Result<bool> {
        let started = Instant::now();

        loop {
            let token = Uuid::new_v4().simple().to_string();
            if self.store.set_if_absent(&self.key, &token, self.timeout).await? {
                *self.held() = Some(token);
                info!(lock = %self.key, "Lock acquired");
                return Ok(true);
            }

            if !blocking {
                return Ok(false);
            }

            if let Some(limit) = blocking_timeout {
                if started.elapsed() >= limit {
                    warn!(lock = %self.key, waited_ms = limit.as_millis() as u64, "Lock not acquired in time");
                    return Ok(false);
                }
            }

            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    }

    // == Release ==
    /// Gives the lock up.
    ///
    /// Returns false without touching the store if this instance never held
    /// it. Otherwise deletes the record only if it still carries this
    /// instance's token and reports whether that happened. Local state is
    /// unlocked either way.
    pub async fn release(&self) -> bool {
        let token = self.held().take();
        match token {
            Some(token) => release_token(self.store.as_ref(), &self.key, &token).await,
            None => false,
        }
    }

    // == Scoped Use ==
    /// Blocks until the lock is held and returns a guard releasing it.
    pub async fn lock(&self) -> Result<LockGuard<'_>> {
        self.lock_with(None).await
    }

    /// Like [`DistributedLock::lock`] but gives up after `wait`.
    pub async fn lock_within(&self, wait: Duration) -> Result<LockGuard<'_>> {
        self.lock_with(Some(wait)).await
    }

    async fn lock_with(&self, wait: Option<Duration>) -> Result<LockGuard<'_>> {
        if self.acquire(true, wait).await? {
            Ok(LockGuard::new(self))
        } else {
            Err(CoordError::LockNotAcquired(self.key.clone()))
        }
    }

    /// Runs `f` while holding the lock, releasing it exactly once however `f`
    /// ends: return, error, panic, or cancellation of the returned future.
    pub async fn scoped<F, Fut, T>(&self, wait: Option<Duration>, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let guard = self.lock_with(wait).await?;
        let outcome = AssertUnwindSafe(f()).catch_unwind().await;
        guard.release().await;

        match outcome {
            Ok(value) => Ok(value),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Compare-and-delete of the record at `key` for `token`. Store failures are
/// logged and reported as not released.
pub(crate) async fn release_token(store: &dyn SharedStore, key: &str, token: &str) -> bool {
    match store.delete_if_equals(key, token).await {
        Ok(true) => {
            info!(lock = %key, "Lock released");
            true
        }
        Ok(false) => {
            // Expired and possibly re-acquired by another holder
            warn!(lock = %key, "Lock was no longer owned at release");
            false
        }
        Err(e) => {
            warn!(lock = %key, error = %e, "Lock release failed");
            false
        }
    }
}
