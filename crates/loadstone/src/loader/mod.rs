//! Concurrent resource loading with in-flight deduplication.

pub mod loader;
pub mod types;

pub use loader::ResourceLoader;
pub use types::{LoadError, LoadResult, ResourceLoadedEvent};
