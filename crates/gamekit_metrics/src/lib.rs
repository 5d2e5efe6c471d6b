//! GameKit Metrics - scheduler instrumentation
//!
//! Timing helpers that the system scheduler feeds while it drives ticks,
//! plus named event counters for the host loop.
//! Everything here vanishes when the `metrics` feature is off: the public
//! types stay available as no-op stubs so call sites never need `cfg`.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable metrics collection (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use gamekit_metrics::{SystemProfiler, TickTimer};
//!
//! let mut profiler = SystemProfiler::new(120);
//! profiler.record("integrate", std::time::Duration::from_micros(40));
//! let avg = profiler.average("integrate");
//! ```

#[cfg(feature = "metrics")]
mod event_counter;
#[cfg(feature = "metrics")]
mod sample_window;
#[cfg(feature = "metrics")]
mod system_profiler;
#[cfg(feature = "metrics")]
mod tick_timer;

#[cfg(feature = "metrics")]
pub use event_counter::EventCounter;
#[cfg(feature = "metrics")]
pub use sample_window::SampleWindow;
#[cfg(feature = "metrics")]
pub use system_profiler::{SystemProfiler, SystemTiming};
#[cfg(feature = "metrics")]
pub use tick_timer::TickTimer;

// ============================================================================
// No-op stubs when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
use std::time::Duration;

#[cfg(not(feature = "metrics"))]
pub struct SampleWindow;

#[cfg(not(feature = "metrics"))]
impl SampleWindow {
    pub fn new(_capacity: usize) -> Self { Self }
    pub fn push(&mut self, _sample: Duration) {}
    pub fn len(&self) -> usize { 0 }
    pub fn is_empty(&self) -> bool { true }
    pub fn average(&self) -> Duration { Duration::ZERO }
    pub fn min_max(&self) -> (Duration, Duration) { (Duration::ZERO, Duration::ZERO) }
}

#[cfg(not(feature = "metrics"))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SystemTiming {
    pub jobs: u64,
    pub total: Duration,
    pub average: Duration,
}

#[cfg(not(feature = "metrics"))]
pub struct SystemProfiler;

#[cfg(not(feature = "metrics"))]
impl SystemProfiler {
    pub fn new(_window: usize) -> Self { Self }
    pub fn record(&mut self, _name: &str, _elapsed: Duration) {}
    pub fn average(&self, _name: &str) -> Duration { Duration::ZERO }
    pub fn timing(&self, _name: &str) -> Option<SystemTiming> { None }
    pub fn reset(&mut self) {}
    pub fn iter(&self) -> impl Iterator<Item = (&str, SystemTiming)> { std::iter::empty() }
}

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct EventCounter;

#[cfg(not(feature = "metrics"))]
impl EventCounter {
    pub fn new() -> Self { Self }
    pub fn add(&mut self, _name: &str, _amount: u64) {}
    pub fn get(&self, _name: &str) -> u64 { 0 }
    pub fn reset(&mut self) {}
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> { std::iter::empty() }
}

#[cfg(not(feature = "metrics"))]
pub struct TickTimer;

#[cfg(not(feature = "metrics"))]
impl TickTimer {
    pub fn new(_capacity: usize) -> Self { Self }
    pub fn begin(&mut self) {}
    pub fn end(&mut self) {}
    pub fn ticks_per_second(&self) -> f64 { 0.0 }
    pub fn tick_time_ms(&self) -> f64 { 0.0 }
}
