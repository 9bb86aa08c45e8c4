//! Core configuration for strata-machine-core.

use serde::{Deserialize, Serialize};

/// Configuration for engine limits and feature flags.
/// Keep this minimal; expand as needed without breaking API.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Hard ceiling on reference-deduplication passes during graph
    /// instantiation. Exceeding it restores the pre-dedup array.
    pub max_dedup_passes: usize,

    /// Maximum events to retain per tick before further events are dropped.
    pub max_events_per_tick: usize,

    /// Feature flags (placeholder; future: simd, parallel).
    pub features: Features,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Features {
    /// Reserved for future toggles (SIMD, parallel passes, etc.).
    pub reserved0: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_dedup_passes: 8,
            max_events_per_tick: 1024,
            features: Features::default(),
        }
    }
}
