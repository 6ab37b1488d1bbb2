//! The resource value seam between the cache and external loader callbacks.
//!
//! The cache stores fully opaque values: decoding and parsing payloads is the
//! loader callback's business. Callers that know the concrete type recover it
//! through [`Resource::as_any`].

use std::any::Any;
use std::sync::Arc;

/// Marker trait for values the cache can hold.
///
/// Blanket-implemented for every `Any + Send + Sync` type, so loader
/// callbacks can return plain structs, `Vec<u8>` blobs, parsed documents,
/// or anything else without ceremony.
pub trait Resource: Send + Sync + 'static {
    /// Access the value as `&dyn Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Sync> Resource for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A loaded resource paired with its accounted size.
///
/// Produced by the external loader callback; the size is what the cache
/// charges against `max_memory_size`, so callbacks should report the real
/// in-memory footprint, not the on-disk one.
#[derive(Clone)]
pub struct LoadedResource {
    /// The opaque resource value.
    pub value: Arc<dyn Resource>,
    /// Size in bytes charged against the cache capacity.
    pub size_bytes: u64,
}

impl LoadedResource {
    /// Wrap a concrete value and its accounted size.
    pub fn new<T: Resource>(value: T, size_bytes: u64) -> Self {
        Self {
            value: Arc::new(value),
            size_bytes,
        }
    }

    /// Borrow the value downcast to a concrete type, if it is one.
    #[must_use]
    pub fn downcast_ref<T: Resource>(&self) -> Option<&T> {
        self.value.as_any().downcast_ref::<T>()
    }
}

impl std::fmt::Debug for LoadedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedResource")
            .field("size_bytes", &self.size_bytes)
            .finish_non_exhaustive()
    }
}
