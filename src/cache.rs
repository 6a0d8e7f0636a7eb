//! Bounded LRU cache for external service responses.
//!
//! Both the recognition and translation clients keep a small response cache
//! keyed by content hash. The cache is deliberately simple: a map plus an
//! access-ordered queue, evicting the least-recently-used entry on insert.
//! The single-in-flight-cycle invariant means there is never more than one
//! writer, so no interior locking is needed here.

use std::collections::HashMap;
use std::collections::VecDeque;

/// Bounded LRU map with eviction on insert.
#[derive(Debug)]
pub struct LruCache<V> {
    capacity: usize,
    entries: HashMap<String, V>,
    /// Keys in least-recently-used-first order.
    order: VecDeque<String>,
}

impl<V> LruCache<V> {
    /// Creates a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Looks up a key, refreshing its recency on hit.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        if self.entries.contains_key(key) {
            self.touch(key);
            self.entries.get(key)
        } else {
            None
        }
    }

    /// Inserts a value, evicting the least-recently-used entry when full.
    pub fn insert(&mut self, key: String, value: V) {
        if self.entries.contains_key(&key) {
            self.entries.insert(key.clone(), value);
            self.touch(&key);
            return;
        }
        if self.entries.len() >= self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.entries.remove(&oldest);
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, value);
    }

    /// Returns true if the key is cached (without refreshing recency).
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
            self.order.push_back(key.to_string());
        }
    }
}
