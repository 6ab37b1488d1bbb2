//! ResourceCache implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::types::{CacheEntry, CacheStatistics, CacheStrategy, ResourceKey};
use crate::config::SharedConfig;
use crate::resource::Resource;

struct CacheInner {
    entries: HashMap<ResourceKey, CacheEntry>,
    total_size_bytes: u64,
    /// Monotonic insertion counter for deterministic LRU tie-breaking.
    sequence: u64,
    hit_count: u64,
    miss_count: u64,
    eviction_count: u64,
}

/// Content-keyed store of loaded resources with TTL and LRU eviction.
///
/// All state lives behind one mutex; every read/modify/evict sequence takes
/// it for its full critical section so counts are never torn and the size
/// bound is restored before the lock drops. The lock is never held across
/// an external loader invocation.
pub struct ResourceCache {
    config: SharedConfig,
    inner: Mutex<CacheInner>,
}

impl ResourceCache {
    /// Create an empty cache reading limits from the shared configuration.
    #[must_use]
    pub fn new(config: SharedConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                total_size_bytes: 0,
                sequence: 0,
                hit_count: 0,
                miss_count: 0,
                eviction_count: 0,
            }),
        }
    }

    /// Look up an entry, returning a copy if present and not expired.
    ///
    /// Updates the entry's access time on a hit. A TTL-expired entry counts
    /// as a miss and is removed on this call.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("cache lock poisoned");

        let status = inner
            .entries
            .get(key)
            .map(|entry| entry.is_expired(now));

        let Some(expired) = status else {
            inner.miss_count += 1;
            debug!(key, "cache miss");
            return None;
        };

        if expired {
            Self::remove_entry(&mut inner, key);
            inner.miss_count += 1;
            inner.eviction_count += 1;
            debug!(key, "cache miss (entry expired)");
            return None;
        }

        inner.hit_count += 1;
        let entry = inner
            .entries
            .get_mut(key)
            .expect("entry checked present above");
        entry.touch(now);
        debug!(key, "cache hit");
        Some(entry.clone())
    }

    /// Insert or replace an entry, then synchronously re-establish the byte
    /// and item bounds.
    ///
    /// `strategy` falls back to the configured default when omitted; the
    /// entry's TTL comes from the strategy.
    pub fn put(
        &self,
        key: impl Into<ResourceKey>,
        value: Arc<dyn Resource>,
        size_bytes: u64,
        strategy: Option<CacheStrategy>,
    ) {
        let key = key.into();
        let config = self.config.current();
        let strategy = strategy.unwrap_or(config.default_cache_strategy);
        let now = Instant::now();

        let mut inner = self.inner.lock().expect("cache lock poisoned");

        if inner.entries.contains_key(&key) {
            Self::remove_entry(&mut inner, &key);
        }

        inner.sequence += 1;
        let sequence = inner.sequence;
        inner.total_size_bytes += size_bytes;
        debug!(key = %key, size_bytes, ?strategy, "cache insert");
        inner.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                value,
                size_bytes,
                created_at: now,
                last_accessed: now,
                expires_at: Some(now + config.ttl_for(strategy)),
                strategy,
                sequence,
            },
        );

        Self::enforce_bounds(&mut inner, config.max_memory_size, config.max_cache_items);
    }

    /// Remove an entry if present. Returns whether removal occurred and
    /// counts it as an eviction when it did.
    pub fn evict(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        let removed = Self::remove_entry(&mut inner, key);
        if removed {
            inner.eviction_count += 1;
            info!(key, "evicted cache entry");
        }
        removed
    }

    /// Remove all entries. Resets the item count and byte total but not the
    /// cumulative hit/miss/eviction counters.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        let cleared = inner.entries.len();
        inner.entries.clear();
        inner.total_size_bytes = 0;
        info!(cleared, "cleared cache");
    }

    /// Point-in-time statistics snapshot, taken under the cache lock so
    /// counts are never torn.
    #[must_use]
    pub fn statistics(&self) -> CacheStatistics {
        let inner = self.inner.lock().expect("cache lock poisoned");
        CacheStatistics {
            item_count: inner.entries.len(),
            total_size_bytes: inner.total_size_bytes,
            hit_count: inner.hit_count,
            miss_count: inner.miss_count,
            eviction_count: inner.eviction_count,
        }
    }

    /// Current byte total, read under the lock.
    pub(crate) fn current_usage(&self) -> u64 {
        let inner = self.inner.lock().expect("cache lock poisoned");
        inner.total_size_bytes
    }

    /// Run one full eviction pass: expired entries first, then LRU until the
    /// configured bounds hold. Returns the number of entries removed.
    ///
    /// Invoked by the memory monitor when pressure reaches `Elevated`.
    pub(crate) fn run_eviction_pass(&self) -> usize {
        let config = self.config.current();
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        Self::enforce_bounds(&mut inner, config.max_memory_size, config.max_cache_items)
    }

    /// Remove one key, keeping the byte total consistent. Never counts an
    /// eviction; callers decide.
    fn remove_entry(inner: &mut CacheInner, key: &str) -> bool {
        match inner.entries.remove(key) {
            Some(entry) => {
                inner.total_size_bytes = inner.total_size_bytes.saturating_sub(entry.size_bytes);
                true
            }
            None => false,
        }
    }

    /// Expired-first, then LRU (ties broken by oldest insertion) until both
    /// bounds hold or the cache is empty. Never fails: an entry that alone
    /// exceeds the byte bound is still evicted, with the anomaly logged.
    fn enforce_bounds(inner: &mut CacheInner, max_memory_size: u64, max_cache_items: usize) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        let expired: Vec<ResourceKey> = inner
            .entries
            .values()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.key.clone())
            .collect();
        for key in expired {
            Self::remove_entry(inner, &key);
            removed += 1;
            debug!(key = %key, "evicted expired entry");
        }

        while (inner.total_size_bytes > max_memory_size || inner.entries.len() > max_cache_items)
            && !inner.entries.is_empty()
        {
            let victim = inner
                .entries
                .values()
                .min_by_key(|entry| (entry.last_accessed, entry.sequence))
                .map(|entry| (entry.key.clone(), entry.size_bytes))
                .expect("cache checked non-empty above");

            if victim.1 > max_memory_size {
                warn!(
                    key = %victim.0,
                    size_bytes = victim.1,
                    max_memory_size,
                    "entry alone exceeds the cache capacity; evicting oversized entry"
                );
            } else {
                info!(key = %victim.0, "evicted least-recently-used entry");
            }
            Self::remove_entry(inner, &victim.0);
            removed += 1;
        }

        inner.eviction_count += removed as u64;
        removed
    }
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.statistics();
        f.debug_struct("ResourceCache")
            .field("item_count", &stats.item_count)
            .field("total_size_bytes", &stats.total_size_bytes)
            .finish_non_exhaustive()
    }
}
