//! Bounded, time- and access-aware cache
//!
//! One `CacheLayer` instance per key space (account statuses, simulation
//! results, analyses). Instances are owned by the component that uses them
//! and handed in through constructors; nothing here is global.
//!
//! Eviction order comes from a monotonic logical clock rather than wall
//! time, so concurrent `get`/`put` never reorder entries inconsistently.

pub mod replay;

pub use replay::{
    ReplayOptions, ReplayReport, ReplayRunner, ReplaySession, ReplayStep, ReplayStepOutcome,
    ReplayStepReport, StepComparison,
};

use crate::metrics::metrics;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Capacity and expiry for one key space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Entries older than this are dropped on read (no expiry when unset)
    #[serde(default)]
    pub ttl_ms: Option<u64>,
}

fn default_capacity() -> usize {
    1_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            ttl_ms: None,
        }
    }
}

impl CacheConfig {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ttl_ms: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = Some(ttl.as_millis() as u64);
        self
    }
}

/// A cached value with its access bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry<K, V> {
    pub key: K,
    pub value: V,
    pub created_at: DateTime<Utc>,
    pub last_accessed: Option<DateTime<Utc>>,
    pub access_count: u64,
    /// Free-form tags supplied at insertion
    pub metadata: BTreeMap<String, String>,
    created_tick: u64,
    last_access_tick: Option<u64>,
    sequence: u64,
    inserted: Instant,
}

impl<K, V> CacheEntry<K, V> {
    /// Logical time used for LRU ordering
    fn recency(&self) -> (u64, u64) {
        (self.last_access_tick.unwrap_or(self.created_tick), self.sequence)
    }

    fn is_expired(&self, ttl: Option<Duration>) -> bool {
        matches!(ttl, Some(ttl) if self.inserted.elapsed() >= ttl)
    }
}

/// Counters exposed by [`CacheLayer::stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

pub struct CacheLayer<K, V> {
    name: &'static str,
    capacity: usize,
    ttl: Option<Duration>,
    entries: Mutex<HashMap<K, CacheEntry<K, V>>>,
    clock: AtomicU64,
    sequence: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl<K, V> std::fmt::Debug for CacheLayer<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLayer")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .field("size", &self.entries.lock().len())
            .finish()
    }
}

impl<K, V> CacheLayer<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(name: &'static str, config: &CacheConfig) -> Self {
        Self {
            name,
            capacity: config.capacity,
            ttl: config.ttl_ms.map(Duration::from_millis),
            entries: Mutex::new(HashMap::new()),
            clock: AtomicU64::new(0),
            sequence: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    pub fn with_capacity(name: &'static str, capacity: usize) -> Self {
        Self::new(name, &CacheConfig::new(capacity))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst)
    }

    /// Insert or replace a value with no metadata
    pub fn put(&self, key: K, value: V) -> Vec<K> {
        self.put_with_metadata(key, value, BTreeMap::new())
    }

    /// Insert or replace a value, evicting if the cache grows past capacity
    ///
    /// Replacing an entry resets its metadata and access bookkeeping.
    /// Returns the evicted keys.
    pub fn put_with_metadata(&self, key: K, value: V, metadata: BTreeMap<String, String>) -> Vec<K> {
        let entry = CacheEntry {
            key: key.clone(),
            value,
            created_at: Utc::now(),
            last_accessed: None,
            access_count: 0,
            metadata,
            created_tick: self.tick(),
            last_access_tick: None,
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            inserted: Instant::now(),
        };
        self.entries.lock().insert(key, entry);
        self.evict_if_over_capacity()
    }

    /// Read a value, updating its access count and recency
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();

        if entries.get(key).is_some_and(|e| e.is_expired(self.ttl)) {
            entries.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }

        match entries.get_mut(key) {
            Some(entry) => {
                entry.access_count += 1;
                entry.last_accessed = Some(Utc::now());
                entry.last_access_tick = Some(self.tick());
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Read a value without touching access data or stats
    pub fn peek(&self, key: &K) -> Option<V> {
        self.entries
            .lock()
            .get(key)
            .filter(|e| !e.is_expired(self.ttl))
            .map(|e| e.value.clone())
    }

    /// Copy of the full entry (value plus bookkeeping) without touching it
    pub fn entry(&self, key: &K) -> Option<CacheEntry<K, V>> {
        self.entries
            .lock()
            .get(key)
            .filter(|e| !e.is_expired(self.ttl))
            .cloned()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.peek(key).is_some()
    }

    /// Evict least-recently-used entries until the cache fits its capacity
    ///
    /// Recency is the last access tick, or the creation tick for entries
    /// never read; ties fall back to insertion order.
    pub fn evict_if_over_capacity(&self) -> Vec<K> {
        let mut entries = self.entries.lock();
        let mut evicted = Vec::new();

        while entries.len() > self.capacity {
            let victim = entries
                .values()
                .min_by_key(|e| e.recency())
                .map(|e| e.key.clone());
            match victim {
                Some(key) => {
                    entries.remove(&key);
                    evicted.push(key);
                }
                None => break,
            }
        }

        if !evicted.is_empty() {
            self.evictions.fetch_add(evicted.len() as u64, Ordering::Relaxed);
            metrics().cache_evictions.inc_by(evicted.len() as u64);
            debug!(cache = self.name, evicted = evicted.len(), "Cache eviction");
        }
        evicted
    }

    /// Drop every expired entry, returning how many were removed
    pub fn prune_expired(&self) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(Some(ttl)));
        let removed = before - entries.len();
        self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn invalidate(&self, key: &K) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Keys in insertion order
    pub fn keys(&self) -> Vec<K> {
        let entries = self.entries.lock();
        let mut keyed: Vec<_> = entries.values().map(|e| (e.sequence, e.key.clone())).collect();
        keyed.sort_by_key(|(sequence, _)| *sequence);
        keyed.into_iter().map(|(_, key)| key).collect()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            size: self.len(),
            capacity: self.capacity,
        }
    }
}
