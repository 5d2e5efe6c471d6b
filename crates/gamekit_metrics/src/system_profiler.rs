//! Per-system execution timings collected by the scheduler

use crate::sample_window::SampleWindow;
use std::collections::HashMap;
use std::time::Duration;

/// Snapshot of one system's accumulated timings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SystemTiming {
    /// Number of jobs recorded (a chunked system records one per chunk).
    pub jobs: u64,
    /// Total time across all recorded jobs.
    pub total: Duration,
    /// Rolling average over the profiler window.
    pub average: Duration,
}

struct Entry {
    jobs: u64,
    total: Duration,
    window: SampleWindow,
}

pub struct SystemProfiler {
    window: usize,
    entries: HashMap<String, Entry>,
}

impl SystemProfiler {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            entries: HashMap::new(),
        }
    }

    /// Record one job's wall time for the named system.
    pub fn record(&mut self, name: &str, elapsed: Duration) {
        let window = self.window;
        let entry = self
            .entries
            .entry(name.to_string())
            .or_insert_with(|| Entry {
                jobs: 0,
                total: Duration::ZERO,
                window: SampleWindow::new(window),
            });
        entry.jobs += 1;
        entry.total += elapsed;
        entry.window.push(elapsed);
    }

    pub fn average(&self, name: &str) -> Duration {
        self.entries
            .get(name)
            .map(|entry| entry.window.average())
            .unwrap_or(Duration::ZERO)
    }

    pub fn timing(&self, name: &str) -> Option<SystemTiming> {
        self.entries.get(name).map(|entry| SystemTiming {
            jobs: entry.jobs,
            total: entry.total,
            average: entry.window.average(),
        })
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, SystemTiming)> {
        self.entries.iter().map(|(name, entry)| {
            (
                name.as_str(),
                SystemTiming {
                    jobs: entry.jobs,
                    total: entry.total,
                    average: entry.window.average(),
                },
            )
        })
    }
}

impl Default for SystemProfiler {
    fn default() -> Self {
        Self::new(60)
    }
}
