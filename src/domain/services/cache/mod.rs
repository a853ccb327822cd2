//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Bounded key/value cache with least-recently-used eviction. The event admin keeps four of these
// per engine instance (topic matches, compiled filters, publish and subscribe permissions). They
// are never expired by age: a reconfiguration builds brand new instances instead.
//
// | Component                  | Description                                                  |
// |----------------------------|--------------------------------------------------------------|
// | LeastRecentlyUsedCache     | Thread-safe LRU map with a fixed capacity                    |
//--------------------------------------------------------------------------------------------------

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::Mutex;

/// Capacity used when a configured size is below [`MIN_CACHE_SIZE`].
pub const DEFAULT_CACHE_SIZE: usize = 30;

/// Smallest accepted cache capacity.
pub const MIN_CACHE_SIZE: usize = 10;

/// Upper bound on the slots reserved up front; larger caches grow on demand.
const MAX_PREALLOCATED: usize = 1024;

#[derive(Debug)]
struct Entry<V> {
    value: V,
    last_used: u64,
}

#[derive(Debug)]
struct CacheState<K, V> {
    entries: HashMap<K, Entry<V>>,
    tick: u64,
}

/// Thread-safe cache evicting the least recently used entry on overflow.
///
/// Recency is a monotonically increasing tick stamped on every `get` hit and
/// every `put`, all under a single lock, so concurrent readers and writers
/// agree on a total order.
#[derive(Debug)]
pub struct LeastRecentlyUsedCache<K, V> {
    state: Mutex<CacheState<K, V>>,
    capacity: usize,
}

impl<K, V> LeastRecentlyUsedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates a cache holding at most `capacity` entries.
    ///
    /// A capacity below [`MIN_CACHE_SIZE`] falls back to [`DEFAULT_CACHE_SIZE`].
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity < MIN_CACHE_SIZE {
            DEFAULT_CACHE_SIZE
        } else {
            capacity
        };
        Self::with_exact_capacity(capacity)
    }

    /// Creates a cache with exactly `capacity` entries (at least one), bypassing
    /// the floor applied by [`new`](Self::new).
    pub fn with_exact_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::with_capacity(capacity.min(MAX_PREALLOCATED) + 1),
                tick: 0,
            }),
            capacity,
        }
    }

    /// Returns a clone of the cached value and marks it as most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = self.state.lock();
        state.tick += 1;
        let tick = state.tick;
        state.entries.get_mut(key).map(|entry| {
            entry.last_used = tick;
            entry.value.clone()
        })
    }

    /// Inserts or replaces a value, evicting the least recently used entry if
    /// the cache grows beyond its capacity.
    pub fn put(&self, key: K, value: V) {
        let mut state = self.state.lock();
        state.tick += 1;
        let last_used = state.tick;
        state.entries.insert(key, Entry { value, last_used });

        if state.entries.len() > self.capacity {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                state.entries.remove(&oldest);
            }
        }
    }

    /// Returns the cached value or computes, stores and returns it.
    ///
    /// The computation runs outside the lock; two threads missing at the same
    /// time may both compute, the last writer wins.
    pub fn get_or_insert_with<F>(&self, key: K, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = compute();
        self.put(key, value.clone());
        value
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
