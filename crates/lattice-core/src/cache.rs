//! Memoization table for lazily derived statistics
//!
//! Data containers compute their derived statistics on first access and keep
//! them until the underlying data changes. The whole table is dropped in one
//! step by [`StatCache::forget`], so no statistic can outlive a mutation.
//!
//! Values are computed outside the lock: a statistic may depend on another
//! statistic of the same container, which would otherwise deadlock.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

/// Table of cached statistics keyed by statistic name
pub struct StatCache<K, V> {
    table: Mutex<HashMap<K, V>>,
}

impl<K, V> StatCache<K, V>
where
    K: Eq + Hash + Copy,
    V: Clone,
{
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, V>> {
        // A poisoned table only means a computation panicked; the entries are still whole.
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cached value for `key`, if present
    pub fn get(&self, key: K) -> Option<V> {
        self.lock().get(&key).cloned()
    }

    /// Store a value, replacing any previous one
    pub fn insert(&self, key: K, value: V) {
        self.lock().insert(key, value);
    }

    /// Cached value for `key`, computing and storing it on a miss
    pub fn get_or_insert_with<F>(&self, key: K, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.get(key) {
            return value;
        }
        let value = compute();
        self.lock().entry(key).or_insert(value).clone()
    }

    /// Fallible variant of [`get_or_insert_with`](Self::get_or_insert_with); errors are not cached
    pub fn try_get_or_insert_with<F, E>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = compute()?;
        Ok(self.lock().entry(key).or_insert(value).clone())
    }

    /// Whether `key` currently holds a value
    pub fn is_cached(&self, key: K) -> bool {
        self.lock().contains_key(&key)
    }

    /// Number of cached statistics
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every cached statistic at once
    pub fn forget(&self) {
        self.lock().clear();
    }
}

impl<K, V> Default for StatCache<K, V>
where
    K: Eq + Hash + Copy,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Clones start cold; derived values are recomputed from the cloned data.
impl<K, V> Clone for StatCache<K, V>
where
    K: Eq + Hash + Copy,
    V: Clone,
{
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for StatCache<K, V>
where
    K: Eq + Hash + Copy + std::fmt::Debug,
    V: Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<K> = self.lock().keys().copied().collect();
        f.debug_struct("StatCache").field("cached", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Key {
        A,
        B,
    }

    #[test]
    fn computes_once_until_forgotten() {
        let cache: StatCache<Key, f64> = StatCache::new();
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            1.5
        };

        assert_eq!(cache.get_or_insert_with(Key::A, compute), 1.5);
        assert_eq!(cache.get_or_insert_with(Key::A, || unreachable!()), 1.5);
        assert_eq!(calls.get(), 1);

        cache.insert(Key::B, 2.0);
        assert_eq!(cache.len(), 2);

        cache.forget();
        assert!(cache.is_empty());
        assert!(!cache.is_cached(Key::A));
        assert!(!cache.is_cached(Key::B));
    }

    #[test]
    fn nested_lookups_do_not_deadlock() {
        let cache: StatCache<Key, f64> = StatCache::new();
        let b = cache.get_or_insert_with(Key::B, || cache.get_or_insert_with(Key::A, || 3.0) * 2.0);
        assert_eq!(b, 6.0);
    }

    #[test]
    fn errors_are_not_cached() {
        let cache: StatCache<Key, f64> = StatCache::new();
        let failed: Result<f64, &str> = cache.try_get_or_insert_with(Key::A, || Err("boom"));
        assert!(failed.is_err());
        assert!(!cache.is_cached(Key::A));
        let ok: Result<f64, &str> = cache.try_get_or_insert_with(Key::A, || Ok(4.0));
        assert_eq!(ok, Ok(4.0));
    }

    #[test]
    fn clone_starts_cold() {
        let cache: StatCache<Key, f64> = StatCache::new();
        cache.insert(Key::A, 1.0);
        let copy = cache.clone();
        assert!(copy.is_empty());
        assert_eq!(cache.len(), 1);
    }
}
