//! End-to-end tests for the wired-up resource system: load deduplication,
//! the concurrency gate, pressure events and configuration hot-swap.

use loadstone::{
    LoadError, LoadedResource, MemoryPressureEvent, MemoryPressureLevel, ResourceKey,
    ResourceSystem, ResourceSystemConfig,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

type BoxedLoad = Pin<Box<dyn Future<Output = anyhow::Result<LoadedResource>> + Send>>;

fn slow_loader(
    invocations: &Arc<AtomicUsize>,
    delay: Duration,
) -> impl Fn(ResourceKey) -> BoxedLoad + Clone + Send + Sync + 'static {
    let invocations = invocations.clone();
    move |key: ResourceKey| {
        invocations.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            Ok(LoadedResource::new(format!("payload:{key}"), 64))
        })
    }
}

fn system_with(config: ResourceSystemConfig) -> ResourceSystem {
    ResourceSystem::new(config).expect("valid config")
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_loads_for_one_key_share_a_single_invocation() {
    let system = system_with(ResourceSystemConfig::default());
    let invocations = Arc::new(AtomicUsize::new(0));

    let loads = (0..5).map(|_| {
        let loader = system.loader().clone();
        let f = slow_loader(&invocations, Duration::from_millis(50));
        tokio::spawn(async move { loader.load("models/tree", f, None).await })
    });
    let results = futures::future::join_all(loads).await;

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    for result in results {
        let result = result.unwrap();
        assert!(result.is_success());
        assert_eq!(
            result.downcast_ref::<String>().unwrap(),
            "payload:models/tree"
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_callers_share_the_same_failure() {
    let system = system_with(ResourceSystemConfig::default());
    let invocations = Arc::new(AtomicUsize::new(0));

    let loads = (0..4).map(|_| {
        let loader = system.loader().clone();
        let invocations = invocations.clone();
        tokio::spawn(async move {
            loader
                .load(
                    "broken",
                    move |_key| {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        async {
                            tokio::time::sleep(Duration::from_millis(30)).await;
                            anyhow::bail!("corrupt header")
                        }
                    },
                    None,
                )
                .await
        })
    });
    let results = futures::future::join_all(loads).await;

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    for result in results {
        let result = result.unwrap();
        assert_eq!(
            result.error,
            Some(LoadError::Failed("corrupt header".to_string()))
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrency_gate_bounds_parallel_loads() {
    let mut config = ResourceSystemConfig::default();
    config.loading.max_concurrent_loads = 2;
    let system = system_with(config);
    let invocations = Arc::new(AtomicUsize::new(0));

    let started = Instant::now();
    let loads = ["a", "b", "c"].map(|key| {
        let loader = system.loader().clone();
        let f = slow_loader(&invocations, Duration::from_millis(100));
        tokio::spawn(async move { loader.load(key, f, None).await })
    });
    let results = futures::future::join_all(loads).await;
    let elapsed = started.elapsed();

    for result in results {
        assert!(result.unwrap().is_success());
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 3);
    // Two permits, three 100ms loads: the third waits for a slot, so the
    // batch takes two rounds, not one.
    assert!(
        elapsed >= Duration::from_millis(180),
        "batch completed in {elapsed:?}; the gate did not serialize the third load"
    );
    assert!(
        elapsed < Duration::from_millis(400),
        "batch took {elapsed:?}; loads did not run in parallel at all"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_caller_timeout_leaves_shared_load_running() {
    let system = system_with(ResourceSystemConfig::default());
    let invocations = Arc::new(AtomicUsize::new(0));

    // Leader starts an 80ms load under the default deadline.
    let leader = {
        let loader = system.loader().clone();
        let f = slow_loader(&invocations, Duration::from_millis(80));
        tokio::spawn(async move { loader.load("slow/asset", f, None).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    // A joiner attaches to the in-flight load but only waits 20ms: its
    // wait fails alone, the shared load keeps running.
    let impatient = system
        .loader()
        .load(
            "slow/asset",
            slow_loader(&invocations, Duration::from_millis(80)),
            Some(Duration::from_millis(20)),
        )
        .await;
    assert_eq!(
        impatient.error,
        Some(LoadError::Timeout(Duration::from_millis(20)))
    );

    let leader = leader.await.unwrap();
    assert!(leader.is_success());

    // The settled value is in the cache; the loader ran exactly once.
    let patient = system
        .loader()
        .load(
            "slow/asset",
            slow_loader(&invocations, Duration::from_millis(80)),
            None,
        )
        .await;
    assert!(patient.is_success());
    assert!(patient.cached);
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pressure_transitions_publish_once_per_level() {
    let mut config = ResourceSystemConfig::default();
    config.max_memory_size = 1000;
    let system = system_with(config);

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let _sub = system.bus().subscribe::<MemoryPressureEvent, _>(move |event| {
        sink.lock().unwrap().push(event.pressure_level);
    });

    let cache = system.cache();
    cache.put("a", Arc::new(0u8), 850, None);
    system.monitor().sample_now();
    system.monitor().sample_now(); // stable level: no second event

    cache.clear();
    system.monitor().sample_now();

    assert_eq!(
        *events.lock().unwrap(),
        vec![MemoryPressureLevel::Elevated, MemoryPressureLevel::Normal]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancelled_subscription_sees_no_further_events() {
    let system = system_with(ResourceSystemConfig::default());
    let count = Arc::new(AtomicUsize::new(0));

    let sink = count.clone();
    let sub = system
        .bus()
        .subscribe::<MemoryPressureEvent, _>(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });
    sub.cancel();

    system.cache().put("a", Arc::new(0u8), 100 * 1024 * 1024, None);
    system.monitor().sample_now();

    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_configuration_hot_swap_applies_to_next_cycle() {
    let mut config = ResourceSystemConfig::default();
    config.max_memory_size = 1000;
    let system = system_with(config);

    let cache = system.cache();
    cache.put("a", Arc::new(0u8), 300, None);
    cache.put("b", Arc::new(0u8), 300, None);
    cache.put("c", Arc::new(0u8), 300, None);
    assert_eq!(cache.statistics().total_size_bytes, 900);

    // Shrink the capacity; the next pressure-driven pass enforces it.
    let mut next = ResourceSystemConfig::default();
    next.max_memory_size = 500;
    system.service().update_configuration(next).await.unwrap();

    let info = system.monitor().sample_now();
    assert!(info.pressure_level >= MemoryPressureLevel::Elevated);
    assert!(cache.statistics().total_size_bytes <= 500);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_performance_report_over_live_system() {
    let system = system_with(ResourceSystemConfig::default());
    let invocations = Arc::new(AtomicUsize::new(0));

    let loader = slow_loader(&invocations, Duration::from_millis(5));
    for key in ["a", "b", "a"] {
        let result = system.loader().load(key, loader.clone(), None).await;
        assert!(result.is_success());
    }
    system.monitor().sample_now();

    let report = system
        .service()
        .performance_report(Duration::from_secs(60))
        .await;
    assert_eq!(report.cache.item_count, 2);
    assert_eq!(report.cache.hit_count, 1);
    assert_eq!(report.samples.len(), 1);
    assert_eq!(report.peak_usage, 128); // two 64-byte payloads
}
