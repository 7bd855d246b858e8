//! Bounded LRU cache with per-entry time-to-live.
//!
//! Used for executable discovery and version detection results. Methods take
//! `&self`; the map and the counters sit behind one `parking_lot::Mutex`.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

pub const DEFAULT_CAPACITY: usize = 128;
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries pushed out by capacity pressure.
    pub evictions: u64,
    /// Entries dropped because their TTL elapsed.
    pub expirations: u64,
    pub current_size: usize,
    pub max_size: usize,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

#[derive(Debug)]
struct Inner<K: Hash + Eq, V> {
    entries: LruCache<K, Entry<V>>,
    stats: CacheStats,
}

#[derive(Debug)]
pub struct TtlLruCache<K: Hash + Eq, V> {
    inner: Mutex<Inner<K, V>>,
    ttl: Duration,
}

impl<K, V> TtlLruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// `ttl` of zero keeps entries until capacity evicts them. A capacity of
    /// zero is treated as one.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                stats: CacheStats {
                    max_size: capacity.get(),
                    ..CacheStats::default()
                },
            }),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_expired(&self, entry: &Entry<V>) -> bool {
        !self.ttl.is_zero() && entry.inserted_at.elapsed() >= self.ttl
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let expired = match inner.entries.get(key) {
            Some(entry) if self.is_expired(entry) => true,
            Some(entry) => {
                let value = entry.value.clone();
                inner.stats.hits += 1;
                return Some(value);
            }
            None => false,
        };

        if expired {
            inner.entries.pop(key);
            inner.stats.expirations += 1;
            inner.stats.current_size = inner.entries.len();
        }
        inner.stats.misses += 1;
        None
    }

    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.lock();
        let entry = Entry {
            value,
            inserted_at: Instant::now(),
        };
        if let Some((evicted, _)) = inner.entries.push(key.clone(), entry)
            && evicted != key
        {
            inner.stats.evictions += 1;
        }
        inner.stats.current_size = inner.entries.len();
    }

    /// Return the cached value for `key`, computing and storing it on a miss.
    pub fn get_or_insert_with(&self, key: K, compute: impl FnOnce() -> V) -> V {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = compute();
        self.insert(key, value.clone());
        value
    }

    pub fn invalidate(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let removed = inner.entries.pop(key).map(|entry| entry.value);
        inner.stats.current_size = inner.entries.len();
        removed
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.stats.current_size = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }
}
