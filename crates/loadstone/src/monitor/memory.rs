//! MemoryMonitor implementation.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use chrono::Utc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::types::{MemoryInfo, MemoryPressureEvent, MemoryPressureLevel};
use crate::cache::ResourceCache;
use crate::config::SharedConfig;
use crate::events::EventBus;

/// Bounded ring of recent samples kept for performance reports.
const HISTORY_CAPACITY: usize = 256;

struct MonitorState {
    last_level: MemoryPressureLevel,
    last_usage: u64,
    peak_usage: u64,
    /// Monitor-triggered eviction passes so far.
    collection_count: u64,
    history: VecDeque<MemoryInfo>,
}

/// Background sampler that classifies memory pressure, publishes level
/// transitions on the bus, and drives cache eviction under sustained
/// pressure.
///
/// Usage is read from the cache's tracked byte total, the in-process
/// equivalent of the collected-heap probe this subsystem classifies
/// against `max_memory_size`.
pub struct MemoryMonitor {
    cache: Arc<ResourceCache>,
    bus: EventBus,
    config: SharedConfig,
    state: Mutex<MonitorState>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl MemoryMonitor {
    /// Create a monitor over the given cache, bus and configuration.
    #[must_use]
    pub fn new(cache: Arc<ResourceCache>, bus: EventBus, config: SharedConfig) -> Self {
        Self {
            cache,
            bus,
            config,
            state: Mutex::new(MonitorState {
                last_level: MemoryPressureLevel::Normal,
                last_usage: 0,
                peak_usage: 0,
                collection_count: 0,
                history: VecDeque::with_capacity(HISTORY_CAPACITY),
            }),
            shutdown_tx: Mutex::new(None),
        }
    }

    /// Launch the periodic sampling task.
    ///
    /// The period re-reads the active configuration each cycle, so a
    /// hot-swapped interval takes effect on the next tick. With
    /// `enable_performance_monitoring` off the tick is a no-op: no
    /// sampling, no events, no monitor-triggered eviction.
    pub fn start(self: &Arc<Self>) {
        let mut shutdown = self.shutdown_tx.lock().expect("shutdown slot lock poisoned");
        if shutdown.is_some() {
            warn!("memory monitor already running");
            return;
        }
        let (tx, mut rx) = oneshot::channel();
        *shutdown = Some(tx);

        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            info!("memory monitor sampling task started");
            loop {
                let config = monitor.config.current();
                tokio::select! {
                    _ = &mut rx => {
                        info!("memory monitor sampling task stopped");
                        break;
                    }
                    () = tokio::time::sleep(config.cleanup_interval()) => {
                        if monitor.config.current().enable_performance_monitoring {
                            let _ = monitor.sample_now();
                        }
                    }
                }
            }
        });
    }

    /// Signal the sampling task to stop. Idempotent.
    pub fn stop(&self) {
        if let Some(tx) = self
            .shutdown_tx
            .lock()
            .expect("shutdown slot lock poisoned")
            .take()
        {
            let _ = tx.send(());
        }
    }

    /// Whether the sampling task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shutdown_tx
            .lock()
            .expect("shutdown slot lock poisoned")
            .is_some()
    }

    /// Run one sampling cycle: snapshot usage, classify, publish a
    /// transition event when the level changed, and trigger a cache
    /// eviction pass when pressure is `Elevated` or worse (gated by
    /// `enable_auto_cleanup`).
    pub fn sample_now(&self) -> MemoryInfo {
        let config = self.config.current();
        let usage = self.cache.current_usage();
        let ratio = usage as f64 / config.max_memory_size as f64;
        let level = MemoryPressureLevel::classify(ratio, config.memory_pressure_threshold);

        let (info, transition) = {
            let mut state = self.state.lock().expect("monitor state lock poisoned");
            let previous_usage = state.last_usage;
            let previous_level = state.last_level;
            state.last_usage = usage;
            state.last_level = level;
            state.peak_usage = state.peak_usage.max(usage);

            if level >= MemoryPressureLevel::Elevated && config.enable_auto_cleanup {
                // Address sustained pressure before the next request is
                // admitted; the pass runs within this sampling cycle.
                let evicted = self.cache.run_eviction_pass();
                state.collection_count += 1;
                debug!(evicted, ?level, "pressure-triggered eviction pass");
            }

            let info = MemoryInfo {
                current_usage: usage,
                peak_usage: state.peak_usage,
                pressure_level: level,
                timestamp: Utc::now(),
                collection_count: state.collection_count,
            };

            if state.history.len() == HISTORY_CAPACITY {
                state.history.pop_front();
            }
            state.history.push_back(info.clone());

            let transition = (level != previous_level).then(|| MemoryPressureEvent {
                current_usage: usage,
                previous_usage,
                threshold: config.memory_pressure_threshold,
                pressure_level: level,
                timestamp: info.timestamp,
            });
            (info, transition)
        };

        if let Some(event) = transition {
            info!(
                current_usage = event.current_usage,
                previous_usage = event.previous_usage,
                level = ?event.pressure_level,
                "memory pressure level changed"
            );
            // Publish outside the state lock so handlers may query the
            // monitor without deadlocking.
            self.bus.publish(&event);
        }

        info
    }

    /// Usage probe: current usage classified under the active
    /// configuration, without recording a sample or publishing events. A
    /// usage above the stored peak advances the peak watermark, so probes
    /// and sampling cycles report the same high-water mark.
    #[must_use]
    pub fn current_info(&self) -> MemoryInfo {
        let config = self.config.current();
        let usage = self.cache.current_usage();
        let ratio = usage as f64 / config.max_memory_size as f64;
        let mut state = self.state.lock().expect("monitor state lock poisoned");
        state.peak_usage = state.peak_usage.max(usage);
        MemoryInfo {
            current_usage: usage,
            peak_usage: state.peak_usage,
            pressure_level: MemoryPressureLevel::classify(
                ratio,
                config.memory_pressure_threshold,
            ),
            timestamp: Utc::now(),
            collection_count: state.collection_count,
        }
    }

    /// Recorded samples younger than `period`, oldest first. The history is
    /// a bounded ring; samples older than its capacity allows are gone.
    #[must_use]
    pub fn history_since(&self, period: Duration) -> Vec<MemoryInfo> {
        // A period too large for chrono means "everything we kept".
        let cutoff = chrono::Duration::from_std(period)
            .ok()
            .map(|period| Utc::now() - period);
        let state = self.state.lock().expect("monitor state lock poisoned");
        state
            .history
            .iter()
            .filter(|info| cutoff.map_or(true, |cutoff| info.timestamp >= cutoff))
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for MemoryMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMonitor")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
