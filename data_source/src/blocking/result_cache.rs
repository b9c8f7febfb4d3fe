// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Remembers the last `{value, cursor}` of each closed loop. See [`ResultCache`].

use std::sync::{Arc, Mutex, PoisonError};

use crate::{Cursor, LruCache, ResourceKey};

/// What a loop leaves behind when it is closed.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResult<V> {
    /// [`None`] if the loop was closed before its first successful fetch.
    pub value: Option<V>,
    pub cursor: Cursor,
}

/// Bounded LRU store of [`CachedResult`]s keyed by [`ResourceKey`].
///
/// Entries are written only when a loop is closed cleanly and read only when a loop for
/// the same key is started. They are never invalidated; a stale entry is corrected by
/// the next fetch, which uses the cached cursor.
#[derive(Debug)]
pub struct ResultCache<V> {
    lru: LruCache<ResourceKey, CachedResult<V>>,
}

pub type SharedResultCache<V> = Arc<Mutex<ResultCache<V>>>;

impl<V: Clone> ResultCache<V> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            lru: LruCache::new(capacity),
        }
    }

    #[must_use]
    pub fn new_shared(capacity: usize) -> SharedResultCache<V> {
        Arc::new(Mutex::new(Self::new(capacity)))
    }

    /// Returns a copy of the entry and marks it as recently used.
    pub fn get(&mut self, key: &ResourceKey) -> Option<CachedResult<V>> {
        self.lru.get(key).cloned()
    }

    /// Returns a copy of the entry without touching it.
    #[must_use]
    pub fn peek(&self, key: &ResourceKey) -> Option<CachedResult<V>> {
        self.lru.peek(key).cloned()
    }

    /// Inserts or updates the entry for `key`. When a new key is inserted at capacity,
    /// exactly one entry (the least recently used) is evicted.
    pub fn put(&mut self, key: ResourceKey, value: Option<V>, cursor: Cursor) {
        if let Some((evicted_key, evicted)) =
            self.lru.insert(key, CachedResult { value, cursor })
        {
            // % is Display, ? is Debug.
            tracing::debug!(
                message = "Result cache evicted least recently used entry",
                key = %evicted_key,
                cursor = %evicted.cursor
            );
        }
    }

    #[must_use]
    pub fn contains_key(&self, key: &ResourceKey) -> bool { self.lru.contains_key(key) }

    #[must_use]
    pub fn len(&self) -> usize { self.lru.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.lru.is_empty() }

    #[must_use]
    pub fn capacity(&self) -> usize { self.lru.capacity() }
}

/// Locks the shared cache. The cache holds plain data, so a poisoned lock is recovered.
pub fn lock_result_cache<V>(
    cache: &Mutex<ResultCache<V>>,
) -> std::sync::MutexGuard<'_, ResultCache<V>> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(index: usize) -> ResourceKey { ResourceKey::new(format!("dc1/service/svc-{index}")) }

    #[test]
    fn test_get_returns_none_if_never_written() {
        let mut cache = ResultCache::<u32>::new(50);
        assert_eq!(cache.get(&key(0)), None);
    }

    #[test]
    fn test_put_then_get() {
        let mut cache = ResultCache::new(50);
        cache.put(key(0), Some(vec!["v1"]), Cursor(1));
        assert_eq!(
            cache.get(&key(0)),
            Some(CachedResult {
                value: Some(vec!["v1"]),
                cursor: Cursor(1),
            })
        );

        // Update in place.
        cache.put(key(0), Some(vec!["v2"]), Cursor(2));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.peek(&key(0)).map(|it| it.cursor), Some(Cursor(2)));
    }

    #[test]
    fn test_fifty_first_key_evicts_least_recently_touched() {
        let mut cache = ResultCache::new(50);
        for index in 0..50 {
            cache.put(key(index), Some(index), Cursor(index as u64 + 1));
        }
        assert_eq!(cache.len(), 50);

        // `get` counts as a touch, so key(0) is no longer the oldest; key(1) is.
        assert!(cache.get(&key(0)).is_some());

        cache.put(key(50), Some(50), Cursor(51));

        assert_eq!(cache.len(), 50);
        assert!(cache.contains_key(&key(0)));
        assert!(!cache.contains_key(&key(1)));
        for index in 2..=50 {
            assert!(cache.contains_key(&key(index)), "key {index} should survive");
        }
    }

    #[test]
    fn test_entry_without_value() {
        let mut cache = ResultCache::<String>::new(2);
        cache.put(key(0), None, Cursor::NONE);
        assert_eq!(
            cache.get(&key(0)),
            Some(CachedResult {
                value: None,
                cursor: Cursor::NONE,
            })
        );
    }
}
