//! Read/write management facade for external observability callers.
//!
//! The service exposes statistics, memory usage, windowed performance
//! reports and configuration read/replace. It deliberately exposes no other
//! mutation: eviction is an internal consequence of pressure and capacity,
//! never an external command.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::cache::{CacheStatistics, ResourceCache};
use crate::config::{ConfigError, ResourceSystemConfig, SharedConfig};
use crate::monitor::{MemoryInfo, MemoryMonitor};

/// Aggregated view over cache statistics and recent memory samples.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    /// The window the report covers.
    pub period: Duration,
    /// Cache counters at generation time.
    pub cache: CacheStatistics,
    /// Fraction of lookups answered from the cache.
    pub hit_rate: f64,
    /// Memory samples recorded within the window, oldest first.
    pub samples: Vec<MemoryInfo>,
    /// Mean usage across the window's samples, 0 when there are none.
    pub average_usage: u64,
    /// Highest usage across the window's samples, 0 when there are none.
    pub peak_usage: u64,
}

/// Thin async facade over the cache, the memory monitor and the shared
/// configuration.
#[derive(Debug, Clone)]
pub struct ResourceMonitorService {
    cache: Arc<ResourceCache>,
    monitor: Arc<MemoryMonitor>,
    config: SharedConfig,
}

impl ResourceMonitorService {
    /// Create the facade over existing components.
    #[must_use]
    pub fn new(
        cache: Arc<ResourceCache>,
        monitor: Arc<MemoryMonitor>,
        config: SharedConfig,
    ) -> Self {
        Self {
            cache,
            monitor,
            config,
        }
    }

    /// Point-in-time cache statistics.
    pub async fn cache_statistics(&self) -> CacheStatistics {
        self.cache.statistics()
    }

    /// Current memory usage, classified under the active configuration.
    pub async fn memory_usage(&self) -> MemoryInfo {
        self.monitor.current_info()
    }

    /// Aggregate the cache counters and the memory samples recorded within
    /// `period` into one report.
    pub async fn performance_report(&self, period: Duration) -> PerformanceReport {
        let cache = self.cache.statistics();
        let samples = self.monitor.history_since(period);

        let (average_usage, peak_usage) = if samples.is_empty() {
            (0, 0)
        } else {
            let sum: u128 = samples.iter().map(|s| u128::from(s.current_usage)).sum();
            let average = (sum / samples.len() as u128) as u64;
            let peak = samples.iter().map(|s| s.current_usage).max().unwrap_or(0);
            (average, peak)
        };

        PerformanceReport {
            generated_at: Utc::now(),
            period,
            hit_rate: cache.hit_rate(),
            cache,
            samples,
            average_usage,
            peak_usage,
        }
    }

    /// Snapshot of the active configuration.
    pub async fn configuration(&self) -> Arc<ResourceSystemConfig> {
        self.config.current()
    }

    /// Validate and atomically install a replacement configuration.
    ///
    /// In-flight loads finish under the snapshot they started with; new
    /// loads and the next sampling cycle observe the replacement. A
    /// rejected configuration leaves the prior one active.
    pub async fn update_configuration(
        &self,
        config: ResourceSystemConfig,
    ) -> Result<(), ConfigError> {
        self.config.replace(config)?;
        info!("resource system configuration replaced");
        Ok(())
    }
}
