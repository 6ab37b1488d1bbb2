//! Core data types for the resource cache.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::resource::Resource;

/// Opaque string identity of a loadable resource, used for both in-flight
/// deduplication and cache lookup.
pub type ResourceKey = String;

/// Eviction/TTL policy carried by each entry, assigned at insertion.
///
/// `Default` means TTL plus least-recently-used priority. The enum is
/// non-exhaustive so stricter or looser variants can be added without
/// breaking callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub enum CacheStrategy {
    /// TTL expiry with least-recently-used eviction priority.
    #[default]
    Default,
}

/// A cached resource entry with bookkeeping metadata.
///
/// Entries are copy-returned: `Get` hands out a clone (the value itself
/// sits behind an `Arc`), so eviction never has to wait for readers that
/// already hold a returned copy.
#[derive(Clone)]
pub struct CacheEntry {
    /// The key this entry is stored under.
    pub key: ResourceKey,
    /// The opaque resource value.
    pub value: Arc<dyn Resource>,
    /// Size in bytes charged against the cache capacity.
    pub size_bytes: u64,
    /// When the entry was inserted.
    pub created_at: Instant,
    /// Last access time; drives LRU victim selection.
    pub last_accessed: Instant,
    /// Expiry instant, `None` for entries that never expire.
    pub expires_at: Option<Instant>,
    /// The policy assigned at insertion.
    pub strategy: CacheStrategy,
    /// Insertion counter; breaks `last_accessed` ties so eviction order is
    /// deterministic (oldest insertion first).
    pub(crate) sequence: u64,
}

impl CacheEntry {
    /// Whether the entry's TTL has passed as of `now`.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires| now >= expires)
    }

    /// Record an access.
    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_accessed = now;
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("size_bytes", &self.size_bytes)
            .field("created_at", &self.created_at)
            .field("last_accessed", &self.last_accessed)
            .field("expires_at", &self.expires_at)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

/// Aggregate cache statistics for observability.
///
/// The hit/miss/eviction counters accumulate for the life of the process;
/// `Clear` resets only the item count and byte total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatistics {
    /// Current number of entries.
    pub item_count: usize,
    /// Current sum of entry sizes in bytes.
    pub total_size_bytes: u64,
    /// Total lookups answered from the cache.
    pub hit_count: u64,
    /// Total lookups that missed (including TTL-expired entries).
    pub miss_count: u64,
    /// Total entries removed by expiry, capacity or pressure eviction.
    pub eviction_count: u64,
}

impl CacheStatistics {
    /// Fraction of lookups answered from the cache, 0.0 when none occurred.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}
