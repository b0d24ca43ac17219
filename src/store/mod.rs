//! Shared Store Module
//!
//! The narrow async interface the lock and the task queue use to coordinate
//! across processes. [`RedisStore`] is the production backend; [`MemoryStore`]
//! gives the same semantics inside one process.

mod keys;
mod memory;
mod redis_store;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use keys::{lock_key, processing_key, queue_key, result_key};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Key/value and list operations backing cross-process coordination.
///
/// Lists follow Redis orientation: the head is index 0, the tail is the last
/// element.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Round-trips to the store.
    async fn ping(&self) -> Result<()>;

    /// Sets `key` only when absent, with an expiry. Returns whether it was set.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Deletes `key` only if it currently holds `expected`, atomically.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Sets `key` unconditionally with an expiry.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn push_head(&self, list: &str, value: &str) -> Result<()>;

    /// Pops the tail of `source` and pushes it onto the head of `destination`
    /// atomically, waiting up to `timeout` for `source` to become non-empty.
    async fn move_tail_to_head(
        &self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> Result<Option<String>>;

    /// Removes the first occurrence of `value` from `list`. Returns the count removed.
    async fn remove_value(&self, list: &str, value: &str) -> Result<usize>;

    /// Removes `value` from `source` and appends it to the tail of
    /// `destination` in one atomic step. Returns false if `value` was absent.
    async fn move_value_to_tail(&self, source: &str, destination: &str, value: &str)
        -> Result<bool>;

    /// Every element of `list`, head first.
    async fn list_all(&self, list: &str) -> Result<Vec<String>>;

    async fn list_len(&self, list: &str) -> Result<usize>;
}
