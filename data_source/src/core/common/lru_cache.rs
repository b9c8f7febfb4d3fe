// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Generic bounded LRU (Least Recently Used) map.
//!
//! Every [`get()`] and [`insert()`] stamps the entry with the next value of a monotonic
//! tick counter. A second index ([`BTreeMap`] from tick to key) keeps entries ordered by
//! recency, so finding the least recently used entry is `O(log n)` instead of a scan.
//!
//! | Operation        | Touches entry | May evict |
//! | :--------------- | :------------ | :-------- |
//! | [`get()`]        | yes           | no        |
//! | [`insert()`]     | yes           | yes (new key at capacity only) |
//! | [`peek()`]       | no            | no        |
//!
//! ## Example
//!
//! ```
//! use r3bl_data_source::LruCache;
//!
//! let mut cache = LruCache::<String, i32>::new(2);
//! cache.insert("a".to_string(), 1);
//! cache.insert("b".to_string(), 2);
//! cache.get(&"a".to_string());
//! let evicted = cache.insert("c".to_string(), 3);
//! assert_eq!(evicted, Some(("b".to_string(), 2)));
//! ```
//!
//! [`get()`]: LruCache::get
//! [`insert()`]: LruCache::insert
//! [`peek()`]: LruCache::peek

use std::{collections::BTreeMap,
          hash::Hash};

use rustc_hash::{FxBuildHasher, FxHashMap};

#[derive(Clone, Debug)]
struct Slot<V> {
    value: V,
    tick: u64,
}

/// A bounded map that evicts the least recently used entry when a new key is inserted
/// at capacity.
#[derive(Debug)]
pub struct LruCache<K, V> {
    map: FxHashMap<K, Slot<V>>,
    recency: BTreeMap<u64, K>,
    capacity: usize,
    tick: u64,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Creates an empty cache. A `capacity` of `0` is treated as `1`, so the cache can
    /// always hold the most recent entry.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            map: FxHashMap::with_capacity_and_hasher(capacity, FxBuildHasher),
            recency: BTreeMap::new(),
            capacity,
            tick: 0,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Returns the value for `key` and marks it as the most recently used entry.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let tick = self.next_tick();
        let slot = self.map.get_mut(key)?;
        self.recency.remove(&slot.tick);
        self.recency.insert(tick, key.clone());
        slot.tick = tick;
        Some(&slot.value)
    }

    /// Returns the value for `key` without changing its recency.
    #[must_use]
    pub fn peek(&self, key: &K) -> Option<&V> { self.map.get(key).map(|slot| &slot.value) }

    /// Inserts or updates `key`, marking it as the most recently used entry.
    ///
    /// Returns the entry that was evicted to make room, if any. Updating an existing key
    /// never evicts.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        let tick = self.next_tick();

        if let Some(slot) = self.map.get_mut(&key) {
            self.recency.remove(&slot.tick);
            self.recency.insert(tick, key);
            slot.tick = tick;
            slot.value = value;
            return None;
        }

        let evicted = if self.map.len() >= self.capacity {
            self.recency.pop_first().and_then(|(_, lru_key)| {
                self.map
                    .remove(&lru_key)
                    .map(|slot| (lru_key, slot.value))
            })
        } else {
            None
        };

        self.recency.insert(tick, key.clone());
        self.map.insert(key, Slot { value, tick });
        evicted
    }

    #[must_use]
    pub fn len(&self) -> usize { self.map.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.map.is_empty() }

    #[must_use]
    pub fn capacity(&self) -> usize { self.capacity }

    /// Does NOT update the recency of the entry.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool { self.map.contains_key(key) }
}
