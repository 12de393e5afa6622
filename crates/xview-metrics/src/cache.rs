//! Bounded key/value cache with insertion-order eviction.
//!
//! One calculator instance owns a handful of these (image bytes,
//! histograms, edge maps). Once the cache is full, inserting a new key
//! evicts the oldest inserted entry. Reads do not refresh an entry's
//! position. Call [`BoundedCache::clear`] between unrelated runs.

use std::hash::Hash;

use indexmap::IndexMap;

/// Insertion-ordered cache holding at most `capacity` entries.
#[derive(Debug, Clone)]
pub struct BoundedCache<K, V> {
    capacity: usize,
    entries: IndexMap<K, V>,
    evictions: u64,
}

impl<K: Hash + Eq, V> BoundedCache<K, V> {
    /// Create an empty cache. A capacity of zero disables caching.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: IndexMap::with_capacity(capacity),
            evictions: 0,
        }
    }

    /// Look up a cached value.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Insert a value, evicting the oldest entries if the cache is full.
    ///
    /// Re-inserting an existing key replaces its value in place without
    /// changing its eviction order.
    pub fn insert(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        if let Some(slot) = self.entries.get_mut(&key) {
            *slot = value;
            return;
        }
        while self.entries.len() >= self.capacity {
            if self.entries.shift_remove_index(0).is_none() {
                break;
            }
            self.evictions += 1;
        }
        self.entries.insert(key, value);
    }

    /// Drop every entry. The eviction counter is kept.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total entries evicted since construction.
    #[must_use]
    pub const fn evictions(&self) -> u64 {
        self.evictions
    }
}
