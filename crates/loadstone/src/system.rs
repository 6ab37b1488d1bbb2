//! The wired-up resource system with an explicit lifecycle.
//!
//! Instead of ambient global state, every component hangs off one
//! [`ResourceSystem`] context: construct it, `start()` the background
//! sampling (and preloading, if a loader callback is supplied), use the
//! loader and service handles, then `shutdown()` to stop the sampler.

use std::future::Future;
use std::sync::Arc;
use tracing::info;

use crate::cache::{ResourceCache, ResourceKey};
use crate::config::{ConfigError, ResourceSystemConfig, SharedConfig};
use crate::events::EventBus;
use crate::loader::ResourceLoader;
use crate::monitor::MemoryMonitor;
use crate::resource::LoadedResource;
use crate::service::ResourceMonitorService;

/// Owns the bus, cache, loader, monitor and management facade.
#[derive(Debug)]
pub struct ResourceSystem {
    config: SharedConfig,
    bus: EventBus,
    cache: Arc<ResourceCache>,
    loader: ResourceLoader,
    monitor: Arc<MemoryMonitor>,
    service: ResourceMonitorService,
}

impl ResourceSystem {
    /// Wire up all components under a validated configuration.
    pub fn new(config: ResourceSystemConfig) -> Result<Self, ConfigError> {
        let config = SharedConfig::new(config)?;
        let bus = EventBus::new();
        let cache = Arc::new(ResourceCache::new(config.clone()));
        let loader = ResourceLoader::new(cache.clone(), bus.clone(), config.clone());
        let monitor = Arc::new(MemoryMonitor::new(
            cache.clone(),
            bus.clone(),
            config.clone(),
        ));
        let service = ResourceMonitorService::new(cache.clone(), monitor.clone(), config.clone());

        Ok(Self {
            config,
            bus,
            cache,
            loader,
            monitor,
            service,
        })
    }

    /// Start background sampling.
    pub fn start(&self) {
        info!("resource system starting");
        self.monitor.start();
    }

    /// Start background sampling and kick off preloading of the configured
    /// paths through `loader`. Preload failures are logged, never fatal.
    pub fn start_with_preloader<F, Fut>(&self, loader: F)
    where
        F: Fn(ResourceKey) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<LoadedResource>> + Send + 'static,
    {
        self.start();
        self.loader.preload(loader);
    }

    /// Stop the background sampling task. Idempotent; entries and counters
    /// survive until the system is dropped.
    pub fn shutdown(&self) {
        info!("resource system shutting down");
        self.monitor.stop();
    }

    /// The shared event bus.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The resource cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    /// The deduplicating loader.
    #[must_use]
    pub fn loader(&self) -> &ResourceLoader {
        &self.loader
    }

    /// The memory monitor.
    #[must_use]
    pub fn monitor(&self) -> &Arc<MemoryMonitor> {
        &self.monitor
    }

    /// The management facade.
    #[must_use]
    pub fn service(&self) -> &ResourceMonitorService {
        &self.service
    }

    /// Snapshot of the active configuration.
    #[must_use]
    pub fn configuration(&self) -> Arc<ResourceSystemConfig> {
        self.config.current()
    }
}

impl Drop for ResourceSystem {
    fn drop(&mut self) {
        // The sampling task holds an Arc to the monitor; leaving it running
        // would keep it alive past the system's lifetime.
        self.monitor.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = ResourceSystemConfig::default();
        config.memory_pressure_threshold = 0.0;
        assert!(ResourceSystem::new(config).is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_lifecycle() {
        let system = ResourceSystem::new(ResourceSystemConfig::default()).unwrap();
        assert!(!system.monitor().is_running());

        system.start();
        assert!(system.monitor().is_running());

        system.shutdown();
        assert!(!system.monitor().is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_drop_stops_sampler() {
        let system = ResourceSystem::new(ResourceSystemConfig::default()).unwrap();
        system.start();
        let monitor = system.monitor().clone();
        drop(system);
        assert!(!monitor.is_running());
    }
}
