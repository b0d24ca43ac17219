//! Scoped lock ownership.

use std::sync::Arc;

use tracing::warn;

use super::{release_token, DistributedLock};

/// Holds a [`DistributedLock`] until released or dropped.
///
/// Prefer [`LockGuard::release`]. Dropping a guard that was not released
/// (early return, cancellation) hands the compare-and-delete to a spawned
/// task; without a runtime the record is left to expire.
#[must_use = "dropping the guard releases the lock"]
pub struct LockGuard<'a> {
    lock: &'a DistributedLock,
    active: bool,
}

impl<'a> LockGuard<'a> {
    pub(super) fn new(lock: &'a DistributedLock) -> Self {
        Self { lock, active: true }
    }

    pub fn key(&self) -> &str {
        self.lock.key()
    }

    /// Releases the lock, reporting whether this holder still owned the record.
    pub async fn release(mut self) -> bool {
        self.active = false;
        self.lock.release().await
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        let Some(token) = self.lock.held().take() else {
            return;
        };

        let store = Arc::clone(&self.lock.store);
        let key = self.lock.key.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    release_token(store.as_ref(), &key, &token).await;
                });
            }
            Err(_) => {
                warn!(lock = %key, "No runtime to release lock; record left to expire");
            }
        }
    }
}
