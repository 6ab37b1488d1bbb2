//! Content-keyed resource cache with TTL and pressure-driven eviction.

pub mod store;
pub mod types;

pub use store::ResourceCache;
pub use types::{CacheEntry, CacheStatistics, CacheStrategy, ResourceKey};
