//! Overflowing LRU cache.
//!
//! A bounded cache that tolerates `overflow` entries above `capacity`
//! before it reclaims space. Reclaiming walks entries from least- to
//! most-recently-used and asks an [`EvictionPolicy`] whether each candidate
//! may be closed; a refusal keeps the entry and moves on to the next one.
//! Evicted entries are handed back to the caller so owners can release
//! whatever hangs off them.

use ::lru::LruCache;
use std::hash::Hash;

pub trait EvictionPolicy<K, V> {
    /// Called for each eviction candidate. `false` keeps the entry.
    fn close(&mut self, key: &K, value: &V) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysClose;

impl<K, V> EvictionPolicy<K, V> for AlwaysClose {
    fn close(&mut self, _key: &K, _value: &V) -> bool {
        true
    }
}

impl<K, V, F> EvictionPolicy<K, V> for F
where
    F: FnMut(&K, &V) -> bool,
{
    fn close(&mut self, key: &K, value: &V) -> bool {
        self(key, value)
    }
}

pub struct OverflowingLruCache<K: Hash + Eq, V, P = AlwaysClose> {
    entries: LruCache<K, V>,
    capacity: usize,
    overflow: usize,
    policy: P,
}

impl<K: Hash + Eq + Clone, V> OverflowingLruCache<K, V, AlwaysClose> {
    pub fn new(capacity: usize, overflow: usize) -> Self {
        Self::with_policy(capacity, overflow, AlwaysClose)
    }
}

impl<K, V, P> OverflowingLruCache<K, V, P>
where
    K: Hash + Eq + Clone,
    P: EvictionPolicy<K, V>,
{
    pub fn with_policy(capacity: usize, overflow: usize, policy: P) -> Self {
        Self {
            entries: LruCache::unbounded(),
            capacity,
            overflow,
            policy,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn overflow(&self) -> usize {
        self.overflow
    }

    /// Size above which `put` reclaims space.
    pub fn limit(&self) -> usize {
        self.capacity.saturating_add(self.overflow)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    /// Returns the value and marks it most-recently-used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Returns the value without touching recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.peek(key)
    }

    /// Inserts `value` as most-recently-used. When the cache grows past
    /// `capacity + overflow` it is reduced toward `capacity`; the entry just
    /// inserted is never chosen. Returns the evicted entries.
    pub fn put(&mut self, key: K, value: V) -> Vec<(K, V)> {
        self.entries.put(key.clone(), value);
        if self.entries.len() > self.limit() {
            self.reduce_to(self.capacity, Some(&key))
        } else {
            Vec::new()
        }
    }

    /// Removes the entry without consulting the eviction policy.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.pop(key)
    }

    /// Evicts closeable entries until at most `capacity` remain. Run this
    /// before enumerating entries so callers never see entries that are
    /// about to go.
    pub fn shrink(&mut self) -> Vec<(K, V)> {
        self.reduce_to(self.capacity, None)
    }

    /// Shrinks, then returns the remaining keys from most- to
    /// least-recently-used together with the entries the shrink evicted.
    pub fn entries_after_shrink(&mut self) -> (Vec<K>, Vec<(K, V)>) {
        let evicted = self.shrink();
        let keys = self.entries.iter().map(|(k, _)| k.clone()).collect();
        (keys, evicted)
    }

    /// Keys ordered from least- to most-recently-used.
    pub fn keys_lru_first(&self) -> Vec<K> {
        self.entries.iter().rev().map(|(k, _)| k.clone()).collect()
    }

    /// Entries ordered from most- to least-recently-used.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }

    /// Removes everything without consulting the eviction policy.
    pub fn clear(&mut self) -> Vec<(K, V)> {
        let mut drained = Vec::with_capacity(self.entries.len());
        while let Some(entry) = self.entries.pop_lru() {
            drained.push(entry);
        }
        drained
    }

    fn reduce_to(&mut self, target: usize, keep: Option<&K>) -> Vec<(K, V)> {
        let mut evicted = Vec::new();
        if self.entries.len() <= target {
            return evicted;
        }

        for key in self.keys_lru_first() {
            if self.entries.len() <= target {
                break;
            }
            if keep == Some(&key) {
                continue;
            }
            let closeable = match self.entries.peek(&key) {
                Some(value) => self.policy.close(&key, value),
                None => false,
            };
            if closeable && let Some(value) = self.entries.pop(&key) {
                evicted.push((key, value));
            }
        }

        evicted
    }
}
