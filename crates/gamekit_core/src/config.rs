//! Build-time storage limits and runtime configuration.
//!
//! The limits size every per-class table (membership masks, access
//! tracking, registry slots) and are checked at compile time. Everything
//! a deployment may want to tune lives in [`EcsConfig`], which can be
//! loaded from JSON by the runtime.

use serde::{Deserialize, Serialize};

/// Maximum number of archetype-class components. Archetype membership is
/// tracked as a `u32` mask and bucket ranks as `u32`.
pub const MAX_ARCHETYPE_COMPONENTS: usize = 20;

/// Maximum number of packed-class components (one `u64` has-mask per entity).
pub const MAX_PACKED_COMPONENTS: usize = 64;

/// Maximum number of indexed-class components (one `u64` has-mask per entity).
pub const MAX_INDEXED_COMPONENTS: usize = 64;

/// Alignment of every column allocation. Components may not ask for more.
pub const STORAGE_ALIGN: usize = 16;

const _: () = assert!(
    MAX_ARCHETYPE_COMPONENTS <= 20,
    "C(MAX, MAX/2) must fit the u32 bucket rank"
);
const _: () = assert!(MAX_PACKED_COMPONENTS <= 64);
const _: () = assert!(MAX_INDEXED_COMPONENTS <= 64);
const _: () = assert!(STORAGE_ALIGN.is_power_of_two());

/// Runtime tunables for a world and its scheduler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcsConfig {
    /// Worker threads for system jobs. `0` lets rayon pick.
    pub worker_threads: usize,
    /// Indexed arrays grow in multiples of this many slots.
    pub indexed_chunk: usize,
    /// Initial element capacity of a new duplicate-component array.
    pub duplicate_capacity: usize,
    /// Samples kept per system by the scheduler profiler.
    pub profiler_window: usize,
    /// Defaults used when building monitors from configuration.
    pub monitor: MonitorConfig,
}

impl Default for EcsConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            indexed_chunk: 16,
            duplicate_capacity: 16,
            profiler_window: 60,
            monitor: MonitorConfig::default(),
        }
    }
}

/// Ring layout for change monitors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub page_size: usize,
    pub page_count: usize,
    /// Byte width of the chunks compared by the binary monitor.
    pub chunk_size: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            page_size: 16,
            page_count: 4,
            chunk_size: 8,
        }
    }
}
