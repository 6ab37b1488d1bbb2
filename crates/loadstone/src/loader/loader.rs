//! ResourceLoader implementation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, warn};

use super::types::{LoadError, LoadOutcome, LoadResult, ResourceLoadedEvent};
use crate::cache::{ResourceCache, ResourceKey};
use crate::config::SharedConfig;
use crate::events::EventBus;
use crate::resource::LoadedResource;

type InFlightMap = Arc<Mutex<HashMap<ResourceKey, watch::Receiver<Option<LoadOutcome>>>>>;

/// Removes the in-flight registration when the load task finishes, even if
/// the loader callback panics mid-load; otherwise the key would join a dead
/// channel forever.
struct InFlightGuard {
    in_flight: InFlightMap,
    key: ResourceKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .expect("in-flight map lock poisoned")
            .remove(&self.key);
    }
}

/// Orchestrates concurrent loads: at most one in-flight load per key, a
/// global concurrency gate of `max_concurrent_loads` permits, per-call
/// deadlines, and cache population on success.
///
/// Cloning yields another handle to the same loader; clones share the
/// in-flight map and the gate.
#[derive(Clone)]
pub struct ResourceLoader {
    cache: Arc<ResourceCache>,
    bus: EventBus,
    config: SharedConfig,
    semaphore: Arc<Semaphore>,
    /// Permits currently granted to the semaphore; reconciled against the
    /// active configuration before each load so hot-swapped bounds apply to
    /// new loads.
    permit_target: Arc<Mutex<usize>>,
    in_flight: InFlightMap,
}

impl ResourceLoader {
    /// Create a loader over the given cache, bus and configuration.
    #[must_use]
    pub fn new(cache: Arc<ResourceCache>, bus: EventBus, config: SharedConfig) -> Self {
        let initial = config.current().loading.max_concurrent_loads;
        Self {
            cache,
            bus,
            config,
            semaphore: Arc::new(Semaphore::new(initial)),
            permit_target: Arc::new(Mutex::new(initial)),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Load a resource, deduplicating concurrent requests for the same key.
    ///
    /// A cache hit returns immediately. On a miss, the first caller becomes
    /// the sole loader for the key and later callers attach to its
    /// completion: exactly one `loader` invocation occurs and every attached
    /// caller observes the same outcome. The callback runs under `timeout`
    /// (the configured default when `None`) once a gate permit is held; a
    /// caller whose own wait times out fails alone without terminating the
    /// shared load. Errors come back in the result, never as panics.
    pub async fn load<F, Fut>(
        &self,
        key: impl Into<ResourceKey>,
        loader: F,
        timeout: Option<Duration>,
    ) -> LoadResult
    where
        F: FnOnce(ResourceKey) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<LoadedResource>> + Send + 'static,
    {
        let key = key.into();
        let started = Instant::now();
        let config = self.config.current();
        let deadline = timeout.unwrap_or_else(|| config.loading.load_timeout());

        if config.loading.enable_resource_cache {
            if let Some(entry) = self.cache.get(&key) {
                let elapsed = started.elapsed();
                self.bus.publish(&ResourceLoadedEvent {
                    key: key.clone(),
                    success: true,
                    cached: true,
                    size_bytes: entry.size_bytes,
                    elapsed,
                });
                return LoadResult::success(key, entry.value, entry.size_bytes, true, elapsed);
            }
        }

        self.sync_permits(config.loading.max_concurrent_loads);

        // Become the sole loader for this key, or attach to the existing
        // in-flight load.
        let mut rx = {
            let mut in_flight = self.in_flight.lock().expect("in-flight map lock poisoned");
            if let Some(rx) = in_flight.get(&key) {
                debug!(key = %key, "attaching to in-flight load");
                rx.clone()
            } else {
                let (tx, rx) = watch::channel(None);
                in_flight.insert(key.clone(), rx.clone());
                self.spawn_load(key.clone(), loader, deadline, config, tx);
                rx
            }
        };

        let wait = async {
            loop {
                let settled = rx.borrow_and_update().clone();
                if let Some(outcome) = settled {
                    return outcome;
                }
                if rx.changed().await.is_err() {
                    return Err(LoadError::Failed(
                        "load task ended without settling".to_string(),
                    ));
                }
            }
        };

        let outcome = match tokio::time::timeout(deadline, wait).await {
            Ok(outcome) => outcome,
            // Only this caller's wait fails; other waiters keep the load.
            Err(_) => Err(LoadError::Timeout(deadline)),
        };

        let elapsed = started.elapsed();
        match outcome {
            Ok(loaded) => {
                LoadResult::success(key, loaded.value, loaded.size_bytes, false, elapsed)
            }
            Err(error) => LoadResult::failure(key, error, elapsed),
        }
    }

    /// Fire-and-forget loads for every configured preload path.
    ///
    /// No-op unless `enable_preloading` is set. Failures are logged and
    /// never abort startup.
    pub fn preload<F, Fut>(&self, loader: F)
    where
        F: Fn(ResourceKey) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<LoadedResource>> + Send + 'static,
    {
        let config = self.config.current();
        if !config.loading.enable_preloading {
            return;
        }

        for path in config.loading.preload_paths.clone() {
            let this = self.clone();
            let loader = loader.clone();
            tokio::spawn(async move {
                let result = this.load(path.clone(), loader, None).await;
                if result.is_success() {
                    debug!(key = %path, "preloaded resource");
                } else {
                    warn!(key = %path, error = ?result.error, "preload failed");
                }
            });
        }
    }

    /// Number of loads currently in flight (for observability and tests).
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight
            .lock()
            .expect("in-flight map lock poisoned")
            .len()
    }

    /// Reconcile the gate with the configured bound. Growth applies
    /// immediately; shrinkage is best-effort, taking effect as idle permits
    /// become available.
    fn sync_permits(&self, target: usize) {
        let mut granted = self.permit_target.lock().expect("permit state lock poisoned");
        if target > *granted {
            self.semaphore.add_permits(target - *granted);
            *granted = target;
        } else if target < *granted {
            let forgotten = self.semaphore.forget_permits(*granted - target);
            *granted -= forgotten;
        }
    }

    /// Run the single underlying load for `key` on its own task, so a
    /// caller abandoning its wait never cancels the load other callers are
    /// attached to. The loader callback carries no cancellation input, so an
    /// abandoned load completes and its result is cached or discarded as
    /// usual.
    fn spawn_load<F, Fut>(
        &self,
        key: ResourceKey,
        loader: F,
        deadline: Duration,
        config: Arc<crate::config::ResourceSystemConfig>,
        tx: watch::Sender<Option<LoadOutcome>>,
    ) where
        F: FnOnce(ResourceKey) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<LoadedResource>> + Send + 'static,
    {
        let cache = self.cache.clone();
        let bus = self.bus.clone();
        let semaphore = self.semaphore.clone();
        let guard = InFlightGuard {
            in_flight: self.in_flight.clone(),
            key: key.clone(),
        };

        tokio::spawn(async move {
            let started = Instant::now();

            let outcome: LoadOutcome = async {
                // A racing load may have populated the cache between the
                // caller's miss and this task starting.
                if config.loading.enable_resource_cache {
                    if let Some(entry) = cache.get(&key) {
                        return Ok(LoadedResource {
                            value: entry.value,
                            size_bytes: entry.size_bytes,
                        });
                    }
                }

                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return Err(LoadError::Failed("loader gate closed".to_string()));
                    }
                };

                debug!(key = %key, ?deadline, "invoking loader");
                let result = tokio::time::timeout(deadline, loader(key.clone())).await;
                drop(permit);

                match result {
                    Err(_) => Err(LoadError::Timeout(deadline)),
                    Ok(Err(error)) => Err(LoadError::Failed(error.to_string())),
                    Ok(Ok(loaded)) => {
                        if config.loading.enable_resource_cache {
                            cache.put(key.clone(), loaded.value.clone(), loaded.size_bytes, None);
                        }
                        Ok(loaded)
                    }
                }
            }
            .await;

            bus.publish(&ResourceLoadedEvent {
                key: key.clone(),
                success: outcome.is_ok(),
                cached: false,
                size_bytes: outcome.as_ref().map_or(0, |loaded| loaded.size_bytes),
                elapsed: started.elapsed(),
            });
            if let Err(error) = &outcome {
                warn!(key = %key, %error, "load failed");
            }

            // Unregister before settling so a caller arriving after the
            // settlement starts a fresh load instead of joining this one.
            drop(guard);
            let _ = tx.send(Some(outcome));
        });
    }
}

impl std::fmt::Debug for ResourceLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceLoader")
            .field("in_flight", &self.in_flight_count())
            .finish_non_exhaustive()
    }
}
