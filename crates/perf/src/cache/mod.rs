//! Partitioned key/value cache with per-entry time-to-live.
//!
//! Entries expire independently. Expiry is enforced three ways:
//!
//! - lazily, when an expired entry is read
//! - eagerly, when an insert pushes a partition past its size threshold
//! - periodically, by the sweeper task (see [`spawn_sweeper`])
//!
//! The `default` partition always exists; other partitions are created on
//! first insert.

mod sweeper;

pub use sweeper::{spawn_sweeper, SweeperHandle, MIN_SWEEP_PERIOD};

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::CacheConfig;

/// Name of the partition used by [`ExpiringCache::set`] and [`ExpiringCache::get`].
pub const DEFAULT_PARTITION: &str = "default";

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.ttl
    }
}

type Partition<V> = HashMap<String, CacheEntry<V>>;

#[derive(Debug)]
struct CacheInner<V> {
    partitions: HashMap<String, Partition<V>>,
    hits: u64,
    misses: u64,
    expired: u64,
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries removed because their ttl had elapsed.
    pub expired: u64,
    /// Entries currently stored across all partitions, expired or not.
    pub entries: usize,
}

/// Thread-safe expiring cache.
///
/// Share it behind an `Arc`; all methods take `&self`.
pub struct ExpiringCache<V> {
    inner: Mutex<CacheInner<V>>,
    config: CacheConfig,
}

impl<V: Clone> ExpiringCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        let mut partitions = HashMap::new();
        partitions.insert(DEFAULT_PARTITION.to_string(), Partition::new());
        Self {
            inner: Mutex::new(CacheInner {
                partitions,
                hits: 0,
                misses: 0,
                expired: 0,
            }),
            config,
        }
    }

    /// Lock the cache, recovering from poison.
    fn lock(&self) -> MutexGuard<'_, CacheInner<V>> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("Cache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Insert into the default partition with the default ttl.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_in(DEFAULT_PARTITION, key, value, self.config.default_ttl);
    }

    /// Insert into the default partition with an explicit ttl.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.set_in(DEFAULT_PARTITION, key, value, ttl);
    }

    /// Insert into a named partition.
    ///
    /// If the partition holds more than `max_entries` entries afterwards, its
    /// expired entries are swept.
    pub fn set_in(&self, partition: &str, key: impl Into<String>, value: V, ttl: Duration) {
        let now = Instant::now();
        let mut guard = self.lock();
        let inner = &mut *guard;

        let entries = inner.partitions.entry(partition.to_string()).or_default();
        entries.insert(
            key.into(),
            CacheEntry {
                value,
                created_at: now,
                ttl,
            },
        );

        if entries.len() > self.config.max_entries {
            let removed = sweep(entries, now);
            inner.expired += removed as u64;
            debug!(
                partition,
                removed, "Partition over capacity, swept expired entries"
            );
        }
    }

    /// Read from the default partition.
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_in(DEFAULT_PARTITION, key)
    }

    /// Read from a named partition.
    ///
    /// An expired entry is removed and reported as absent.
    pub fn get_in(&self, partition: &str, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut guard = self.lock();
        let inner = &mut *guard;

        let Some(entries) = inner.partitions.get_mut(partition) else {
            inner.misses += 1;
            return None;
        };

        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                let value = entry.value.clone();
                inner.hits += 1;
                Some(value)
            }
            Some(_) => {
                entries.remove(key);
                inner.expired += 1;
                inner.misses += 1;
                None
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Remove an entry from the default partition, returning its value if it was live.
    pub fn remove(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.lock();
        inner
            .partitions
            .get_mut(DEFAULT_PARTITION)
            .and_then(|entries| entries.remove(key))
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value)
    }

    /// Remove every expired entry of `partition`. Unknown partitions are a no-op.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup(&self, partition: &str) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let removed = match inner.partitions.get_mut(partition) {
            Some(entries) => sweep(entries, now),
            None => return 0,
        };
        inner.expired += removed as u64;
        removed
    }

    /// Run [`cleanup`](Self::cleanup) over every partition.
    pub fn cleanup_all(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let removed: usize = inner
            .partitions
            .values_mut()
            .map(|entries| sweep(entries, now))
            .sum();
        inner.expired += removed as u64;
        removed
    }

    /// Number of stored entries in `partition`, expired or not.
    pub fn len_of(&self, partition: &str) -> usize {
        self.lock().partitions.get(partition).map_or(0, HashMap::len)
    }

    pub fn partitions(&self) -> Vec<String> {
        self.lock().partitions.keys().cloned().collect()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            expired: inner.expired,
            entries: inner.partitions.values().map(HashMap::len).sum(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

impl<V: Clone> Default for ExpiringCache<V> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

fn sweep<V>(entries: &mut Partition<V>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(now));
    before - entries.len()
}
