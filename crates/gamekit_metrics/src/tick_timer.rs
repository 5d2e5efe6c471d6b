//! Wall-clock timing of whole scheduler ticks

use crate::sample_window::SampleWindow;
use std::time::{Duration, Instant};

pub struct TickTimer {
    tick_start: Instant,
    tick_times: SampleWindow,
}

impl TickTimer {
    pub fn new(capacity: usize) -> Self {
        Self {
            tick_start: Instant::now(),
            tick_times: SampleWindow::new(capacity.max(1)),
        }
    }

    pub fn begin(&mut self) {
        self.tick_start = Instant::now();
    }

    pub fn end(&mut self) {
        self.tick_times.push(self.tick_start.elapsed());
    }

    pub fn ticks_per_second(&self) -> f64 {
        let avg = self.tick_times.average();
        if avg > Duration::ZERO {
            1.0 / avg.as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn tick_time_ms(&self) -> f64 {
        self.tick_times.average().as_secs_f64() * 1000.0
    }
}
