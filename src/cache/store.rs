//! TTL Cache Module
//!
//! Process-local key/value store with fixed or sliding expiry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::cache::CacheEntry;

// == TTL Cache ==
/// Thread-safe in-memory cache with per-entry TTL.
///
/// Clones share the same entries. Expired entries are only removed when they
/// are next read; there is no background sweeper, so keys that are never read
/// again stay resident until [`TtlCache::clear`] or process exit.
///
/// A miss is `None`. Because values are returned as `Option<V>`, a cached
/// "no value" (`V = Option<T>` holding `None`) stays distinguishable from a miss.
#[derive(Debug)]
pub struct TtlCache<V = serde_json::Value> {
    entries: Arc<Mutex<HashMap<String, CacheEntry<V>>>>,
}

impl<V> Clone for TtlCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<V> Default for TtlCache<V> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<V: Clone> TtlCache<V> {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        // Cache operations never fail; a poisoned map is still a valid map
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // == Set ==
    /// Stores `value` under `key` for `ttl`, replacing any existing entry.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.entries().insert(key.into(), CacheEntry::new(value, ttl));
    }

    // == Get ==
    /// Returns the live value for `key`.
    ///
    /// An entry found expired is removed and reported as a miss. With
    /// `sliding`, a hit resets the entry's expiry to a full TTL from now.
    pub fn get(&self, key: &str, sliding: bool) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries();

        let entry = entries.get_mut(key)?;
        if entry.is_expired_at(now) {
            entries.remove(key);
            return None;
        }
        if sliding {
            entry.refresh(now);
        }
        Some(entry.value.clone())
    }

    // == Remove ==
    /// Drops `key`, returning whether an entry (live or expired) was present.
    pub fn remove(&self, key: &str) -> bool {
        self.entries().remove(key).is_some()
    }

    // == Clear ==
    /// Removes every entry.
    pub fn clear(&self) {
        self.entries().clear();
    }

    // == Length ==
    /// Number of resident entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
