//! Configuration for the resource system.
//!
//! Configuration is a value object: components read an immutable snapshot
//! and the whole object is replaced atomically on update, so readers never
//! observe a half-applied change. In-flight loads keep the snapshot they
//! started with.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;

use crate::cache::CacheStrategy;

/// Configuration for the loading pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceLoadingConfig {
    /// Upper bound on simultaneous loader invocations (default: 4).
    #[serde(default = "default_max_concurrent_loads")]
    pub max_concurrent_loads: usize,

    /// Per-load deadline in seconds absent an override (default: 30).
    #[serde(default = "default_load_timeout_secs")]
    pub load_timeout_secs: u64,

    /// Whether to preload `preload_paths` at startup (default: true).
    #[serde(default = "default_true")]
    pub enable_preloading: bool,

    /// Keys to preload at startup (default: empty).
    #[serde(default)]
    pub preload_paths: Vec<String>,

    /// Whether loads go through the cache at all. When false every load
    /// re-invokes the loader callback (default: true).
    #[serde(default = "default_true")]
    pub enable_resource_cache: bool,
}

/// Configuration for the whole resource system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceSystemConfig {
    /// Loading pipeline settings.
    #[serde(default)]
    pub loading: ResourceLoadingConfig,

    /// Memory monitor sampling period in seconds (default: 300 = 5 minutes).
    #[serde(default = "default_cleanup_interval_secs")]
    pub cache_cleanup_interval_secs: u64,

    /// Strategy applied when the caller omits one (default: `Default`).
    #[serde(default)]
    pub default_cache_strategy: CacheStrategy,

    /// Cache capacity bound in bytes (default: 100 MiB).
    #[serde(default = "default_max_memory_size")]
    pub max_memory_size: u64,

    /// TTL in seconds applied when the strategy doesn't override
    /// (default: 3600 = 1 hour).
    #[serde(default = "default_expiration_secs")]
    pub default_expiration_secs: u64,

    /// Usage ratio at which pressure escalates from Normal (default: 0.8).
    #[serde(default = "default_pressure_threshold")]
    pub memory_pressure_threshold: f64,

    /// Whether elevated pressure triggers an eviction pass (default: true).
    #[serde(default = "default_true")]
    pub enable_auto_cleanup: bool,

    /// Whether the monitor samples at all. When false there is no sampling,
    /// no pressure events and no monitor-triggered eviction; capacity
    /// eviction on insert still applies (default: true).
    #[serde(default = "default_true")]
    pub enable_performance_monitoring: bool,

    /// Item-count cache bound, enforced alongside the byte bound
    /// (default: 1000).
    #[serde(default = "default_max_cache_items")]
    pub max_cache_items: usize,
}

fn default_max_concurrent_loads() -> usize {
    4
}

fn default_load_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_cleanup_interval_secs() -> u64 {
    300 // 5 minutes
}

fn default_max_memory_size() -> u64 {
    100 * 1024 * 1024 // 100 MiB
}

fn default_expiration_secs() -> u64 {
    3600 // 1 hour
}

fn default_pressure_threshold() -> f64 {
    0.8
}

fn default_max_cache_items() -> usize {
    1000
}

/// Errors rejecting a configuration. The previously active configuration
/// stays in force when replacement fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid concurrent load bound (must be > 0).
    #[error("invalid max_concurrent_loads: must be greater than 0")]
    InvalidMaxConcurrentLoads,

    /// Invalid load timeout (must be > 0).
    #[error("invalid load_timeout_secs: must be greater than 0")]
    InvalidLoadTimeout,

    /// Invalid cleanup interval (must be > 0).
    #[error("invalid cache_cleanup_interval_secs: must be greater than 0")]
    InvalidCleanupInterval,

    /// Invalid memory bound (must be > 0).
    #[error("invalid max_memory_size: must be greater than 0")]
    InvalidMaxMemorySize,

    /// Invalid default expiration (must be > 0).
    #[error("invalid default_expiration_secs: must be greater than 0")]
    InvalidDefaultExpiration,

    /// Invalid pressure threshold (must be in (0, 1]).
    #[error("invalid memory_pressure_threshold {0}: must be in (0, 1]")]
    InvalidPressureThreshold(f64),

    /// Invalid item bound (must be > 0).
    #[error("invalid max_cache_items: must be greater than 0")]
    InvalidMaxCacheItems,
}

impl Default for ResourceLoadingConfig {
    fn default() -> Self {
        Self {
            max_concurrent_loads: default_max_concurrent_loads(),
            load_timeout_secs: default_load_timeout_secs(),
            enable_preloading: default_true(),
            preload_paths: Vec::new(),
            enable_resource_cache: default_true(),
        }
    }
}

impl Default for ResourceSystemConfig {
    fn default() -> Self {
        Self {
            loading: ResourceLoadingConfig::default(),
            cache_cleanup_interval_secs: default_cleanup_interval_secs(),
            default_cache_strategy: CacheStrategy::default(),
            max_memory_size: default_max_memory_size(),
            default_expiration_secs: default_expiration_secs(),
            memory_pressure_threshold: default_pressure_threshold(),
            enable_auto_cleanup: default_true(),
            enable_performance_monitoring: default_true(),
            max_cache_items: default_max_cache_items(),
        }
    }
}

impl ResourceLoadingConfig {
    /// Validate the loading configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_loads == 0 {
            return Err(ConfigError::InvalidMaxConcurrentLoads);
        }
        if self.load_timeout_secs == 0 {
            return Err(ConfigError::InvalidLoadTimeout);
        }
        Ok(())
    }

    /// Get the per-load deadline as a Duration.
    #[must_use]
    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }
}

impl ResourceSystemConfig {
    /// Validate the whole configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.loading.validate()?;

        if self.cache_cleanup_interval_secs == 0 {
            return Err(ConfigError::InvalidCleanupInterval);
        }
        if self.max_memory_size == 0 {
            return Err(ConfigError::InvalidMaxMemorySize);
        }
        if self.default_expiration_secs == 0 {
            return Err(ConfigError::InvalidDefaultExpiration);
        }
        if !(self.memory_pressure_threshold > 0.0 && self.memory_pressure_threshold <= 1.0) {
            return Err(ConfigError::InvalidPressureThreshold(
                self.memory_pressure_threshold,
            ));
        }
        if self.max_cache_items == 0 {
            return Err(ConfigError::InvalidMaxCacheItems);
        }
        Ok(())
    }

    /// Get the monitor sampling period as a Duration.
    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cache_cleanup_interval_secs)
    }

    /// Get the default entry TTL as a Duration.
    #[must_use]
    pub fn default_expiration(&self) -> Duration {
        Duration::from_secs(self.default_expiration_secs)
    }

    /// TTL for entries inserted under the given strategy.
    #[must_use]
    pub fn ttl_for(&self, strategy: CacheStrategy) -> Duration {
        match strategy {
            CacheStrategy::Default => self.default_expiration(),
        }
    }
}

/// Shared handle to the active configuration.
///
/// Readers take a cheap `Arc` snapshot; `replace` validates and swaps the
/// whole object. Components that need point-in-time semantics (an in-flight
/// load, a sampling cycle) hold their snapshot for the full operation.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<Arc<ResourceSystemConfig>>>,
}

impl SharedConfig {
    /// Wrap a validated configuration in a shared handle.
    pub fn new(config: ResourceSystemConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        })
    }

    /// Snapshot of the currently active configuration.
    #[must_use]
    pub fn current(&self) -> Arc<ResourceSystemConfig> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Validate and atomically install a replacement configuration.
    ///
    /// On rejection the previously active configuration stays in force.
    pub fn replace(&self, config: ResourceSystemConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Arc::new(config);
        Ok(())
    }
}
