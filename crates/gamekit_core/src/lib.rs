//! GameKit Core
//!
//! Data-oriented simulation core:
//! - Entity Component System with four storage classes
//!   (archetype buckets, packed arrays, indexed arrays, context locals)
//! - Frequency-driven system scheduler with a conflict-graph worker pool
//! - Change monitors that record component diffs for rollback
//! - Deterministic time units and bump memory zones

pub mod config;
pub mod ecs;
pub mod memory;
pub mod monitor;
pub mod schedule;
pub mod time;

pub use bytemuck;

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
