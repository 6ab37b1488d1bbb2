//! Load results, load errors and the load-outcome event.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::cache::ResourceKey;
use crate::resource::{LoadedResource, Resource};

/// Errors a load can settle with. Returned as values, never panicked past
/// the loader boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    /// The deadline elapsed before the loader callback completed.
    #[error("load timed out after {0:?}")]
    Timeout(Duration),

    /// The loader callback reported an error.
    #[error("loader failed: {0}")]
    Failed(String),
}

/// Shared settlement of one underlying load; every attached caller observes
/// a clone of the same outcome.
pub(crate) type LoadOutcome = Result<LoadedResource, LoadError>;

/// Outcome of a single `load` call.
#[derive(Clone)]
pub struct LoadResult {
    /// The requested key.
    pub key: ResourceKey,
    /// The loaded value on success.
    pub value: Option<Arc<dyn Resource>>,
    /// Accounted size of the value, 0 on failure.
    pub size_bytes: u64,
    /// Whether the value was answered from the cache.
    pub cached: bool,
    /// Wall time this caller spent in `load`.
    pub elapsed: Duration,
    /// The failure reason, `None` on success.
    pub error: Option<LoadError>,
}

impl LoadResult {
    pub(crate) fn success(
        key: ResourceKey,
        value: Arc<dyn Resource>,
        size_bytes: u64,
        cached: bool,
        elapsed: Duration,
    ) -> Self {
        Self {
            key,
            value: Some(value),
            size_bytes,
            cached,
            elapsed,
            error: None,
        }
    }

    pub(crate) fn failure(key: ResourceKey, error: LoadError, elapsed: Duration) -> Self {
        Self {
            key,
            value: None,
            size_bytes: 0,
            cached: false,
            elapsed,
            error: Some(error),
        }
    }

    /// Whether the load settled with a value.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Borrow the value downcast to a concrete type, if present.
    #[must_use]
    pub fn downcast_ref<T: Resource>(&self) -> Option<&T> {
        self.value
            .as_deref()
            .and_then(|value| value.as_any().downcast_ref::<T>())
    }
}

impl std::fmt::Debug for LoadResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadResult")
            .field("key", &self.key)
            .field("size_bytes", &self.size_bytes)
            .field("cached", &self.cached)
            .field("elapsed", &self.elapsed)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Published on the bus once per settled load (and per cache hit, flagged
/// `cached`). Subscribers filter on the fields they care about.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceLoadedEvent {
    /// The requested key.
    pub key: ResourceKey,
    /// Whether the load produced a value.
    pub success: bool,
    /// Whether the value came from the cache.
    pub cached: bool,
    /// Accounted size of the value, 0 on failure.
    pub size_bytes: u64,
    /// Time from load start to settlement.
    pub elapsed: Duration,
}
