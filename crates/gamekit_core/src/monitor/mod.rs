//! Change monitors.
//!
//! A monitor keeps a ring of diffs for one component so earlier values can
//! be reconstructed by rolling back a number of revisions. What a diff is
//! and how it is undone is supplied by a [`MonitorInterface`];
//! [`BinaryMonitor`] is a generic byte-chunk implementation.
//!
//! ```
//! use gamekit_core::ecs::{ComponentId, Modifiers, StorageClass};
//! use gamekit_core::monitor::{BinaryMonitor, Monitor};
//!
//! let id = ComponentId::new(StorageClass::Packed, Modifiers::empty(), 0);
//! let mut monitor = Monitor::new(BinaryMonitor::new(4, 4), id, 8, 2, 256);
//! monitor.record_value(Some(&1u32));
//! monitor.record_value(Some(&2u32));
//!
//! let mut value = 2u32;
//! assert!(monitor.transform_value(&mut value, 1));
//! assert_eq!(value, 1);
//! ```

mod binary;
mod duplicate;
mod interface;
mod ring;

pub use binary::{BinaryContext, BinaryDiff, BinaryMonitor};
pub use duplicate::DuplicateMonitor;
pub use interface::{Diff, MonitorInterface};
pub use ring::{Monitor, PAGE_ZONE_BLOCK};
