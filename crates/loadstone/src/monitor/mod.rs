//! Memory-usage sampling and pressure classification.

pub mod memory;
pub mod types;

pub use memory::MemoryMonitor;
pub use types::{MemoryInfo, MemoryPressureEvent, MemoryPressureLevel};
