//! Deterministic time
//!
//! Scheduler time is an unsigned nanosecond count so group accumulators
//! never drift the way floating-point seconds do.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use std::time::Duration;

const NANOS_PER_MICRO: u64 = 1_000;
const NANOS_PER_MILLI: u64 = 1_000_000;
const NANOS_PER_SECOND: u64 = 1_000_000_000;
const NANOS_PER_MINUTE: u64 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: u64 = 60 * NANOS_PER_MINUTE;

/// Nanosecond timestamp or interval.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EcsTime(u64);

impl EcsTime {
    pub const ZERO: EcsTime = EcsTime(0);

    pub const fn from_hours(hours: u64) -> Self {
        Self(hours * NANOS_PER_HOUR)
    }

    pub const fn from_minutes(minutes: u64) -> Self {
        Self(minutes * NANOS_PER_MINUTE)
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * NANOS_PER_SECOND)
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis * NANOS_PER_MILLI)
    }

    pub const fn from_micros(micros: u64) -> Self {
        Self(micros * NANOS_PER_MICRO)
    }

    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Period of a frequency in hertz (60 -> ~16.67ms).
    pub const fn from_hz(hz: u64) -> Self {
        assert!(hz > 0, "frequency must be non-zero");
        Self(NANOS_PER_SECOND / hz)
    }

    pub const fn as_hours(self) -> u64 {
        self.0 / NANOS_PER_HOUR
    }

    pub const fn as_minutes(self) -> u64 {
        self.0 / NANOS_PER_MINUTE
    }

    pub const fn as_secs(self) -> u64 {
        self.0 / NANOS_PER_SECOND
    }

    pub const fn as_millis(self) -> u64 {
        self.0 / NANOS_PER_MILLI
    }

    pub const fn as_micros(self) -> u64 {
        self.0 / NANOS_PER_MICRO
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SECOND as f64
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// How many whole `period`s fit in `self`.
    pub const fn periods(self, period: EcsTime) -> u64 {
        if period.0 == 0 {
            0
        } else {
            self.0 / period.0
        }
    }

    pub const fn saturating_sub(self, rhs: EcsTime) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Add for EcsTime {
    type Output = EcsTime;

    fn add(self, rhs: EcsTime) -> EcsTime {
        EcsTime(self.0 + rhs.0)
    }
}

impl AddAssign for EcsTime {
    fn add_assign(&mut self, rhs: EcsTime) {
        self.0 += rhs.0;
    }
}

impl Sub for EcsTime {
    type Output = EcsTime;

    fn sub(self, rhs: EcsTime) -> EcsTime {
        EcsTime(self.0 - rhs.0)
    }
}

impl SubAssign for EcsTime {
    fn sub_assign(&mut self, rhs: EcsTime) {
        self.0 -= rhs.0;
    }
}

impl Mul<u64> for EcsTime {
    type Output = EcsTime;

    fn mul(self, rhs: u64) -> EcsTime {
        EcsTime(self.0 * rhs)
    }
}

impl From<Duration> for EcsTime {
    fn from(duration: Duration) -> Self {
        Self(duration.as_nanos().min(u64::MAX as u128) as u64)
    }
}

impl From<EcsTime> for Duration {
    fn from(time: EcsTime) -> Self {
        Duration::from_nanos(time.0)
    }
}

impl fmt::Display for EcsTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}ms", self.0 as f64 / NANOS_PER_MILLI as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_conversions_agree() {
        assert_eq!(EcsTime::from_hours(1), EcsTime::from_minutes(60));
        assert_eq!(EcsTime::from_minutes(1), EcsTime::from_secs(60));
        assert_eq!(EcsTime::from_secs(2).as_millis(), 2_000);
        assert_eq!(EcsTime::from_millis(3).as_micros(), 3_000);
        assert_eq!(EcsTime::from_micros(5).as_nanos(), 5_000);
        assert_eq!(EcsTime::from_nanos(1_500_000).as_millis(), 1);
        assert_eq!(EcsTime::from_hz(50), EcsTime::from_millis(20));
    }

    #[test]
    fn periods_truncate() {
        let freq = EcsTime::from_millis(10);
        assert_eq!(EcsTime::from_millis(35).periods(freq), 3);
        assert_eq!(EcsTime::from_millis(9).periods(freq), 0);
        assert_eq!(EcsTime::from_millis(9).periods(EcsTime::ZERO), 0);
    }

    #[test]
    fn duration_round_trip() {
        let time = EcsTime::from(Duration::from_micros(250));
        assert_eq!(time, EcsTime::from_micros(250));
        assert_eq!(Duration::from(time), Duration::from_micros(250));
    }
}
