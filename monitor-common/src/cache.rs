//! Bounded TTL cache.
//!
//! Backs violation deduplication in the rule evaluator: a key present and
//! unexpired means the same finding was raised within the current window
//! and must be suppressed. Capacity is bounded with oldest-first eviction,
//! so an unbounded stream of distinct keys cannot grow memory without
//! limit.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    order: VecDeque<K>,
}

impl<K: Eq + Hash + Clone, V> Inner<K, V> {
    fn purge_expired(&mut self, now: Instant) {
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    fn store(&mut self, capacity: usize, key: K, value: V, ttl: Duration, now: Instant) {
        if self.entries.len() >= capacity && !self.entries.contains_key(&key) {
            self.purge_expired(now);
            // Order may hold keys already purged; popping those is a no-op.
            while self.entries.len() >= capacity {
                let Some(oldest) = self.order.pop_front() else {
                    break;
                };
                self.entries.remove(&oldest);
            }
        }
        let entry = Entry {
            value,
            expires_at: now + ttl,
        };
        if self.entries.insert(key.clone(), entry).is_none() {
            self.order.push_back(key);
        }
    }
}

/// Thread-safe map with per-entry expiry and a hard capacity bound.
///
/// Re-inserting an existing key refreshes its value and TTL but keeps its
/// original eviction position.
pub struct TtlCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    capacity: usize,
    default_ttl: Duration,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
            default_ttl,
        }
    }

    /// Insert with the cache-wide default TTL.
    pub fn insert(&self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    /// Insert with an entry-specific TTL.
    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let mut inner = self.inner.lock();
        inner.store(self.capacity, key, value, ttl, Instant::now());
    }

    /// Insert only if no unexpired entry exists for the key.
    ///
    /// Returns true when the value was stored. This is the deduplication
    /// primitive: a false return means the key was seen within its TTL.
    pub fn insert_if_vacant(&self, key: K, value: V, ttl: Duration) -> bool {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        if let Some(entry) = inner.entries.get(&key) {
            if entry.expires_at > now {
                return false;
            }
        }
        inner.store(self.capacity, key, value, ttl, now);
        true
    }

    /// Fetch a value, evicting it if expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        if let Some(entry) = inner.entries.get(key) {
            if entry.expires_at > now {
                return Some(entry.value.clone());
            }
        } else {
            return None;
        }
        inner.entries.remove(key);
        None
    }

    /// Whether an unexpired entry exists, without touching it.
    pub fn contains(&self, key: &K) -> bool {
        let inner = self.inner.lock();
        inner
            .entries
            .get(key)
            .map_or(false, |entry| entry.expires_at > Instant::now())
    }

    /// Number of unexpired entries.
    pub fn len(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.purge_expired(Instant::now());
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }
}
