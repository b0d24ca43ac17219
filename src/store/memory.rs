//! In-process shared store.
//!
//! Mirrors the Redis semantics the core relies on: expiring string keys
//! (checked lazily on access), head/tail list operations, and a blocking
//! tail-to-head move that wakes when something is pushed. Coordination only
//! spans the tasks of this process.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::SharedStore;
use crate::error::Result;

#[derive(Debug)]
struct StringEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl StringEntry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    strings: HashMap<String, StringEntry>,
    lists: HashMap<String, VecDeque<String>>,
}

impl MemoryState {
    /// Live string value for `key`, dropping it first if it has expired.
    fn live_string(&mut self, key: &str) -> Option<&StringEntry> {
        let now = Instant::now();
        if self.strings.get(key).is_some_and(|e| e.is_expired(now)) {
            self.strings.remove(key);
        }
        self.strings.get(key)
    }

    fn pop_tail_push_head(&mut self, source: &str, destination: &str) -> Option<String> {
        let value = self.lists.get_mut(source)?.pop_back()?;
        self.lists
            .entry(destination.to_string())
            .or_default()
            .push_front(value.clone());
        Some(value)
    }
}

/// Shared store held entirely in this process's memory.
///
/// Nothing is swept: an expired key is dropped only when it is next read, and
/// a list emptied by pops keeps its (empty) slot. Result keys that are never
/// read again therefore stay resident, and the store grows without bound over
/// a long run. Meant for tests and single-process development.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    pushed: Notify,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut state = self.state();
        if state.live_string(key).is_some() {
            return Ok(false);
        }
        state.strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        let mut state = self.state();
        let owned = state.live_string(key).is_some_and(|e| e.value == expected);
        if owned {
            state.strings.remove(key);
        }
        Ok(owned)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.state().live_string(key).map(|e| e.value.clone()))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.state().strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn push_head(&self, list: &str, value: &str) -> Result<()> {
        self.state()
            .lists
            .entry(list.to_string())
            .or_default()
            .push_front(value.to_string());
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn move_tail_to_head(
        &self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking so a push in between is not missed
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let popped = self.state().pop_tail_push_head(source, destination);
            if popped.is_some() {
                return Ok(popped);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn remove_value(&self, list: &str, value: &str) -> Result<usize> {
        let mut state = self.state();
        let Some(items) = state.lists.get_mut(list) else {
            return Ok(0);
        };
        match items.iter().position(|item| item == value) {
            Some(index) => {
                items.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn move_value_to_tail(
        &self,
        source: &str,
        destination: &str,
        value: &str,
    ) -> Result<bool> {
        let moved = {
            let mut state = self.state();
            let position = state
                .lists
                .get(source)
                .and_then(|items| items.iter().position(|item| item == value));
            match position {
                Some(index) => {
                    if let Some(items) = state.lists.get_mut(source) {
                        items.remove(index);
                    }
                    state
                        .lists
                        .entry(destination.to_string())
                        .or_default()
                        .push_back(value.to_string());
                    true
                }
                None => false,
            }
        };
        if moved {
            self.pushed.notify_waiters();
        }
        Ok(moved)
    }

    async fn list_all(&self, list: &str) -> Result<Vec<String>> {
        Ok(self
            .state()
            .lists
            .get(list)
            .map(|items| items.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_len(&self, list: &str) -> Result<usize> {
        Ok(self.state().lists.get(list).map_or(0, VecDeque::len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_set_if_absent_respects_existing_key() {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("k", "a", Duration::from_secs(5)).await.unwrap());
        assert!(!store.set_if_absent("k", "b", Duration::from_secs(5)).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_expired_key_is_absent() {
        let store = MemoryStore::new();
        store.set_with_ttl("k", "v", Duration::from_millis(50)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.set_if_absent("k", "w", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_if_equals_checks_value() {
        let store = MemoryStore::new();
        store.set_with_ttl("k", "owner-a", Duration::from_secs(5)).await.unwrap();

        assert!(!store.delete_if_equals("k", "owner-b").await.unwrap());
        assert!(store.get("k").await.unwrap().is_some());
        assert!(store.delete_if_equals("k", "owner-a").await.unwrap());
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lists_are_fifo_through_move() {
        let store = MemoryStore::new();
        store.push_head("main", "first").await.unwrap();
        store.push_head("main", "second").await.unwrap();

        let moved = store
            .move_tail_to_head("main", "processing", Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(moved.as_deref(), Some("first"));
        assert_eq!(store.list_all("main").await.unwrap(), vec!["second"]);
        assert_eq!(store.list_all("processing").await.unwrap(), vec!["first"]);
    }

    #[tokio::test]
    async fn test_move_times_out_on_empty_list() {
        let store = MemoryStore::new();
        let started = Instant::now();
        let moved = store
            .move_tail_to_head("main", "processing", Duration::from_millis(50))
            .await
            .unwrap();
        assert!(moved.is_none());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_blocked_move_wakes_on_push() {
        let store = Arc::new(MemoryStore::new());
        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .move_tail_to_head("main", "processing", Duration::from_secs(5))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.push_head("main", "job").await.unwrap();

        let moved = waiter.await.unwrap().unwrap();
        assert_eq!(moved.as_deref(), Some("job"));
    }

    #[tokio::test]
    async fn test_remove_value_removes_single_occurrence() {
        let store = MemoryStore::new();
        store.push_head("l", "x").await.unwrap();
        store.push_head("l", "x").await.unwrap();

        assert_eq!(store.remove_value("l", "x").await.unwrap(), 1);
        assert_eq!(store.list_len("l").await.unwrap(), 1);
        assert_eq!(store.remove_value("missing", "x").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_move_value_to_tail() {
        let store = MemoryStore::new();
        store.push_head("main", "a").await.unwrap();
        store.push_head("processing", "stuck").await.unwrap();

        assert!(store.move_value_to_tail("processing", "main", "stuck").await.unwrap());
        assert!(!store.move_value_to_tail("processing", "main", "stuck").await.unwrap());
        assert_eq!(store.list_all("main").await.unwrap(), vec!["a", "stuck"]);
        assert_eq!(store.list_len("processing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expired_keys_linger_until_read() {
        let store = MemoryStore::new();
        store.set_with_ttl("result:q:1", "done", Duration::from_millis(20)).await.unwrap();
        store.push_head("list", "x").await.unwrap();
        store.remove_value("list", "x").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        // No sweeper: both slots are still resident
        assert_eq!(store.state().strings.len(), 1);
        assert!(store.state().lists.contains_key("list"));

        assert!(store.get("result:q:1").await.unwrap().is_none());
        assert!(store.state().strings.is_empty());
    }
}
