//! Pressure levels, usage snapshots and the pressure-change event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discrete classification of memory usage against the configured
/// threshold. Ordered: `Normal < Elevated < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MemoryPressureLevel {
    /// Usage below the configured threshold.
    Normal,
    /// Usage at or above the threshold; eviction is triggered.
    Elevated,
    /// Usage in the upper half of the band between threshold and capacity.
    High,
    /// Usage at or beyond capacity.
    Critical,
}

impl MemoryPressureLevel {
    /// Classify a usage ratio against the escalation threshold.
    ///
    /// Pure and deterministic: `Elevated` starts at `threshold`, `High`
    /// halfway between `threshold` and full, `Critical` at full. Monotone
    /// in `ratio` for any fixed threshold.
    #[must_use]
    pub fn classify(ratio: f64, threshold: f64) -> Self {
        let high = threshold + (1.0 - threshold) / 2.0;
        if ratio >= 1.0 {
            Self::Critical
        } else if ratio >= high {
            Self::High
        } else if ratio >= threshold {
            Self::Elevated
        } else {
            Self::Normal
        }
    }
}

/// Immutable snapshot of memory usage, produced by monitor sampling.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryInfo {
    /// Bytes currently charged against the capacity bound.
    pub current_usage: u64,
    /// Highest usage observed so far.
    pub peak_usage: u64,
    /// Classification of `current_usage` at snapshot time.
    pub pressure_level: MemoryPressureLevel,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// Number of monitor-triggered eviction passes so far.
    pub collection_count: u64,
}

/// Published exactly when the classified pressure level changes between
/// consecutive samples. Same-level samples emit nothing, even when usage
/// itself moved.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryPressureEvent {
    /// Usage at the sample that changed the level.
    pub current_usage: u64,
    /// Usage at the previous sample.
    pub previous_usage: u64,
    /// The configured escalation threshold.
    pub threshold: f64,
    /// The newly classified level.
    pub pressure_level: MemoryPressureLevel,
    /// When the transition was observed.
    pub timestamp: DateTime<Utc>,
}
