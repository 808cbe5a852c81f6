use crate::element::Widget;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default capacity of the query result cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;
/// Default time-to-live for `query_cached` results.
pub const DEFAULT_QUERY_TTL: Duration = Duration::from_secs(30);
/// Default time-to-live for `find_cached` results.
pub const DEFAULT_FIND_TTL: Duration = Duration::from_secs(60);

struct Entry<V> {
    value: V,
    inserted: Instant,
    ttl: Duration,
    /// Insertion order, tie-breaker when timestamps are equal.
    seq: u64,
}

/// Bounded map with per-entry time-to-live.
///
/// Expiry is lazy: an entry older than its TTL is treated as absent on the
/// next read and removed then; there is no background sweep beyond the
/// explicit [`TtlCache::cleanup_expired`]. Insertion at capacity evicts the
/// single entry with the oldest timestamp.
pub struct TtlCache<V> {
    max_size: usize,
    default_ttl: Duration,
    entries: HashMap<String, Entry<V>>,
    next_seq: u64,
}

impl<V> TtlCache<V> {
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            max_size,
            default_ttl,
            entries: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn get(&mut self, key: &str) -> Option<&V> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.inserted.elapsed() > entry.ttl,
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|entry| &entry.value)
    }

    pub fn insert(&mut self, key: String, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl)
    }

    pub fn insert_with_ttl(&mut self, key: String, value: V, ttl: Duration) {
        if self.max_size == 0 {
            return;
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_size {
            self.evict_oldest();
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            key,
            Entry {
                value,
                inserted: Instant::now(),
                ttl,
                seq,
            },
        );
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| (entry.inserted, entry.seq))
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            debug!(key, "evicting oldest cache entry");
            self.entries.remove(&key);
        }
    }

    /// Drop every expired entry now, returning how many were removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.inserted.elapsed() <= entry.ttl);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Snapshot of cache bookkeeping counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub size: usize,
}

/// Process-lifetime cache state shared by all callers of one engine.
///
/// Holds the selector → result-set cache, the selector normalization memo,
/// and the global hit/miss counters, each behind its own lock so callers on
/// different threads cannot corrupt the bookkeeping. Owned by the engine that
/// constructed it; cleared only through [`CacheContext::clear`].
pub struct CacheContext {
    results: Mutex<TtlCache<Vec<Widget>>>,
    normalized: Mutex<TtlCache<String>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheContext {
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        Self {
            results: Mutex::new(TtlCache::new(capacity, default_ttl)),
            // The normalization memo gets the same bound and TTL policy as
            // the result cache rather than growing without limit.
            normalized: Mutex::new(TtlCache::new(capacity, default_ttl)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cached result set for a selector, counting a hit or a miss.
    pub fn get_results(&self, key: &str) -> Option<Vec<Widget>> {
        let mut cache = self.results.lock().expect("result cache poisoned");
        match cache.get(key) {
            Some(widgets) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(widgets.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn store_results(&self, key: String, widgets: Vec<Widget>, ttl: Duration) {
        self.results
            .lock()
            .expect("result cache poisoned")
            .insert_with_ttl(key, widgets, ttl);
    }

    /// Normalized form of a selector: trimmed, internal whitespace runs
    /// collapsed to single spaces. Memoized by exact input string; the memo
    /// does not touch the hit/miss counters.
    pub fn optimize(&self, selector: &str) -> String {
        let mut memo = self.normalized.lock().expect("normalization memo poisoned");
        if let Some(normalized) = memo.get(selector) {
            return normalized.clone();
        }
        let normalized = normalize(selector);
        memo.insert(selector.to_string(), normalized.clone());
        normalized
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            size: self.results.lock().expect("result cache poisoned").len(),
        }
    }

    /// Drop all entries and reset the counters together.
    pub fn clear(&self) {
        self.results.lock().expect("result cache poisoned").clear();
        self.normalized
            .lock()
            .expect("normalization memo poisoned")
            .clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Explicit sweep of expired result entries.
    pub fn cleanup_expired(&self) -> usize {
        self.results
            .lock()
            .expect("result cache poisoned")
            .cleanup_expired()
    }
}

fn normalize(selector: &str) -> String {
    selector.split_whitespace().collect::<Vec<_>>().join(" ")
}
