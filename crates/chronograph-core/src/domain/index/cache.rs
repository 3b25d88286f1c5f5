//! Adjacency lookup caches
//!
//! ## LRU eviction
//!
//! When the cache is full, the least-recently-accessed key is evicted.
//! Recency is a logical tick rather than wall time, so eviction order is
//! deterministic.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Mutex;

use super::adjacency::Direction;

/// Key for one cached adjacency list
pub type CacheKey = (Direction, String);

/// Read-through cache for adjacency lookups
///
/// Lookups populate the cache while holding only the index's read lock, so
/// implementations use interior mutability.
pub trait AdjacencyCache: Send + Sync + Debug {
    fn get(&self, key: &CacheKey) -> Option<Vec<String>>;

    fn put(&self, key: CacheKey, value: Vec<String>);

    fn invalidate(&self, key: &CacheKey);

    fn clear(&self);

    /// Number of cached keys
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct CacheEntry {
    value: Vec<String>,
    last_accessed: u64,
}

#[derive(Debug, Default)]
struct LruState {
    entries: HashMap<CacheKey, CacheEntry>,
    tick: u64,
}

impl LruState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

/// Bounded least-recently-used cache
#[derive(Debug)]
pub struct LruAdjacencyCache {
    capacity: usize,
    state: Mutex<LruState>,
}

impl LruAdjacencyCache {
    /// Create a cache holding at most `capacity` keys
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(LruState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl AdjacencyCache for LruAdjacencyCache {
    fn get(&self, key: &CacheKey) -> Option<Vec<String>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let tick = state.next_tick();
        let entry = state.entries.get_mut(key)?;
        entry.last_accessed = tick;
        Some(entry.value.clone())
    }

    fn put(&self, key: CacheKey, value: Vec<String>) {
        if self.capacity == 0 {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.entries.len() >= self.capacity && !state.entries.contains_key(&key) {
            state.evict_lru();
        }
        let tick = state.next_tick();
        state.entries.insert(
            key,
            CacheEntry {
                value,
                last_accessed: tick,
            },
        );
    }

    fn invalidate(&self, key: &CacheKey) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.remove(key);
    }

    fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.clear();
    }

    fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }
}

/// Cache that stores nothing; every lookup is a miss
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledCache;

impl AdjacencyCache for DisabledCache {
    fn get(&self, _key: &CacheKey) -> Option<Vec<String>> {
        None
    }

    fn put(&self, _key: CacheKey, _value: Vec<String>) {}

    fn invalidate(&self, _key: &CacheKey) {}

    fn clear(&self) {}

    fn len(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(element: &str) -> CacheKey {
        (Direction::Forward, element.to_string())
    }

    #[test]
    fn test_lru_evicts_least_recent() {
        let cache = LruAdjacencyCache::new(2);
        cache.put(key("a"), vec!["rel-1".to_string()]);
        cache.put(key("b"), vec!["rel-2".to_string()]);

        // Touch "a" so "b" becomes the eviction candidate
        assert!(cache.get(&key("a")).is_some());
        cache.put(key("c"), vec![]);

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("b")).is_none());
        assert!(cache.get(&key("a")).is_some());
        assert!(cache.get(&key("c")).is_some());
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache = LruAdjacencyCache::new(1);
        cache.put(key("a"), vec![]);
        cache.put(key("a"), vec!["rel-1".to_string()]);
        assert_eq!(cache.get(&key("a")), Some(vec!["rel-1".to_string()]));
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache = LruAdjacencyCache::new(8);
        cache.put(key("a"), vec![]);
        cache.put((Direction::Reverse, "a".to_string()), vec![]);
        cache.invalidate(&key("a"));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_and_disabled() {
        let cache = LruAdjacencyCache::new(0);
        cache.put(key("a"), vec![]);
        assert!(cache.is_empty());

        let disabled = DisabledCache;
        disabled.put(key("a"), vec![]);
        assert!(disabled.get(&key("a")).is_none());
        assert_eq!(disabled.len(), 0);
    }
}
