//! Memory-pressure-aware resource cache and concurrent loader.
//!
//! Loadstone accepts requests for named resources, loads each resource at
//! most once concurrently, caches the result under a configurable strategy,
//! tracks memory usage against a capacity bound, and evicts under pressure,
//! broadcasting pressure transitions through a typed publish/subscribe bus.
//!
//! # Components
//!
//! - [`config`]: hot-swappable configuration value objects
//! - [`events`]: typed publish/subscribe bus with isolated handlers
//! - [`cache`]: TTL + LRU resource cache with a byte and item bound
//! - [`loader`]: deduplicating concurrent loader behind a permit gate
//! - [`monitor`]: background pressure sampling and eviction triggering
//! - [`service`]: management facade (statistics, reports, config)
//! - [`system`]: the wired-up context object with an explicit lifecycle
//!
//! # Example
//!
//! ```rust,no_run
//! use loadstone::{LoadedResource, ResourceSystem, ResourceSystemConfig};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let system = ResourceSystem::new(ResourceSystemConfig::default())?;
//! system.start();
//!
//! let result = system
//!     .loader()
//!     .load(
//!         "textures/rock.png",
//!         |key| async move {
//!             let bytes = std::fs::read(&key)?;
//!             let size = bytes.len() as u64;
//!             Ok(LoadedResource::new(bytes, size))
//!         },
//!         None,
//!     )
//!     .await;
//! assert!(result.is_success());
//!
//! system.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod events;
pub mod loader;
pub mod monitor;
pub mod resource;
pub mod service;
pub mod system;

pub use cache::{CacheEntry, CacheStatistics, CacheStrategy, ResourceCache, ResourceKey};
pub use config::{ConfigError, ResourceLoadingConfig, ResourceSystemConfig, SharedConfig};
pub use events::{EventBus, Subscription};
pub use loader::{LoadError, LoadResult, ResourceLoadedEvent, ResourceLoader};
pub use monitor::{MemoryInfo, MemoryMonitor, MemoryPressureEvent, MemoryPressureLevel};
pub use resource::{LoadedResource, Resource};
pub use service::{PerformanceReport, ResourceMonitorService};
pub use system::ResourceSystem;
