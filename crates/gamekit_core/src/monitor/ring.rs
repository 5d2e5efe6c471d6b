// ring.rs - Paged diff ring for single-value components
//
// Slots are grouped in `page_count` pages of `page_size` diffs, each page
// backed by its own zone. Whenever the write index crosses into a page,
// that page (holding the oldest diffs) is purged and its zone reset, so at
// least one full page of history survives every purge.

use crate::config::MonitorConfig;
use crate::ecs::ComponentId;
use crate::memory::Zone;
use crate::monitor::{Diff, MonitorInterface};
use bytemuck::Pod;
use std::fmt;

/// Default block size of the per-page zones.
pub const PAGE_ZONE_BLOCK: usize = 1024;

pub struct Monitor<I: MonitorInterface> {
    interface: I,
    id: ComponentId,
    context: I::Context,
    page_size: usize,
    page_count: usize,
    index: usize,
    diffs: Vec<Option<Diff<I::Diff>>>,
    zones: Vec<Zone>,
}

impl<I: MonitorInterface> Monitor<I> {
    /// # Panics
    /// If `page_size` is 0 or `page_count` is below 2.
    pub fn new(
        interface: I,
        id: ComponentId,
        page_size: usize,
        page_count: usize,
        zone_block_size: usize,
    ) -> Self {
        assert!(page_size >= 1, "monitor page size must be at least 1");
        assert!(page_count >= 2, "monitor needs at least 2 pages");

        let context = interface.initialize(id);
        Self {
            interface,
            id,
            context,
            page_size,
            page_count,
            index: 0,
            diffs: (0..page_size * page_count).map(|_| None).collect(),
            zones: (0..page_count).map(|_| Zone::new(zone_block_size)).collect(),
        }
    }

    pub fn with_config(interface: I, id: ComponentId, config: &MonitorConfig) -> Self {
        Self::new(
            interface,
            id,
            config.page_size,
            config.page_count,
            PAGE_ZONE_BLOCK,
        )
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn interface(&self) -> &I {
        &self.interface
    }

    /// Total diff slots.
    pub fn capacity(&self) -> usize {
        self.page_size * self.page_count
    }

    /// Diffs currently held.
    pub fn len(&self) -> usize {
        self.diffs.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.diffs.iter().all(Option::is_none)
    }

    /// Record the current value (`None` if the component was removed).
    /// Returns whether a diff was stored.
    pub fn record(&mut self, data: Option<&[u8]>) -> bool {
        let index = self.index;
        let zone = &mut self.zones[index / self.page_size];
        let mark = zone.mark();

        match self.interface.diff(&mut self.context, zone, self.id, data) {
            Some(diff) => {
                self.diffs[index] = Some(diff);
                self.advance();
                true
            }
            None => {
                zone.rewind(mark);
                false
            }
        }
    }

    pub fn record_value<T: Pod>(&mut self, value: Option<&T>) -> bool {
        self.record(value.map(bytemuck::bytes_of))
    }

    /// Roll `data` back by up to `revisions` recorded changes.
    ///
    /// Returns `false` if nothing was ever recorded or the walk reached the
    /// point where the component did not exist; `data` is then left in its
    /// partially transformed state. Stops early, returning `true`, when the
    /// history runs out.
    pub fn transform(&self, data: &mut [u8], revisions: usize) -> bool {
        let capacity = self.capacity();
        let latest = (self.index + capacity - 1) % capacity;
        if self.diffs[latest].is_none() {
            return false;
        }

        for step in 0..revisions.min(capacity) {
            let slot = (latest + capacity - step) % capacity;
            match &self.diffs[slot] {
                None => break,
                Some(Diff::Removed) => return false,
                Some(Diff::Changed(diff)) => self.interface.transform(
                    &self.context,
                    &self.zones[slot / self.page_size],
                    diff,
                    self.id,
                    data,
                ),
            }
        }
        true
    }

    pub fn transform_value<T: Pod>(&self, value: &mut T, revisions: usize) -> bool {
        self.transform(bytemuck::bytes_of_mut(value), revisions)
    }

    /// Drop all history. The differ keeps its last seen value.
    pub fn clear(&mut self) {
        for page in 0..self.page_count {
            self.purge(page);
        }
        self.index = 0;
    }

    fn advance(&mut self) {
        let next = self.index + 1;
        self.index = if next % self.capacity() == 0 { 0 } else { next };
        if next % self.page_size == 0 {
            self.purge((next / self.page_size) % self.page_count);
        }
    }

    fn purge(&mut self, page: usize) {
        let slots = page * self.page_size..(page + 1) * self.page_size;
        for slot in &mut self.diffs[slots] {
            if let Some(Diff::Changed(diff)) = slot.take() {
                self.interface.destroy_diff(diff);
            }
        }
        self.zones[page].reset();
    }
}

impl<I: MonitorInterface> Drop for Monitor<I> {
    fn drop(&mut self) {
        for slot in &mut self.diffs {
            if let Some(Diff::Changed(diff)) = slot.take() {
                self.interface.destroy_diff(diff);
            }
        }
        self.interface.destroy_context(&mut self.context);
    }
}

impl<I: MonitorInterface> fmt::Debug for Monitor<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("id", &self.id)
            .field("page_size", &self.page_size)
            .field("page_count", &self.page_count)
            .field("index", &self.index)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{Modifiers, StorageClass};
    use crate::memory::ZoneSpan;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Keeps the previous u32 and stores it in the zone on change.
    struct Previous {
        destroyed: Rc<Cell<usize>>,
    }

    impl MonitorInterface for Previous {
        type Context = Option<u32>;
        type Diff = ZoneSpan;

        fn initialize(&self, _id: ComponentId) -> Option<u32> {
            None
        }

        fn diff(
            &self,
            context: &mut Option<u32>,
            zone: &mut Zone,
            _id: ComponentId,
            data: Option<&[u8]>,
        ) -> Option<Diff<ZoneSpan>> {
            let current = data.map(|bytes| *bytemuck::from_bytes::<u32>(bytes));
            match (*context, current) {
                (None, None) => None,
                (None, Some(_)) => {
                    *context = current;
                    Some(Diff::Removed)
                }
                (Some(old), new) if new != Some(old) => {
                    let span = zone.allocate(4);
                    zone.bytes_mut(span).copy_from_slice(&old.to_ne_bytes());
                    *context = new;
                    Some(Diff::Changed(span))
                }
                _ => None,
            }
        }

        fn transform(
            &self,
            _context: &Option<u32>,
            zone: &Zone,
            diff: &ZoneSpan,
            _id: ComponentId,
            data: &mut [u8],
        ) {
            data.copy_from_slice(zone.bytes(*diff));
        }

        fn destroy_diff(&self, _diff: ZoneSpan) {
            self.destroyed.set(self.destroyed.get() + 1);
        }
    }

    fn monitor(page_size: usize, page_count: usize) -> (Monitor<Previous>, Rc<Cell<usize>>) {
        let destroyed = Rc::new(Cell::new(0));
        let id = ComponentId::new(StorageClass::Packed, Modifiers::empty(), 0);
        let interface = Previous {
            destroyed: destroyed.clone(),
        };
        (Monitor::new(interface, id, page_size, page_count, 64), destroyed)
    }

    #[test]
    fn empty_ring_reports_absent() {
        let (monitor, _) = monitor(2, 2);
        let mut value = 7u32;
        assert!(!monitor.transform_value(&mut value, 0));
        assert!(!monitor.transform_value(&mut value, 3));
        assert_eq!(value, 7);
    }

    #[test]
    fn transform_walks_back_to_creation() {
        let (mut monitor, _) = monitor(4, 2);
        for value in [10u32, 20, 30] {
            assert!(monitor.record_value(Some(&value)));
        }
        assert!(!monitor.record_value(Some(&30u32)));
        assert_eq!(monitor.len(), 3);

        let mut value = 30u32;
        assert!(monitor.transform_value(&mut value, 0));
        assert_eq!(value, 30);

        assert!(monitor.transform_value(&mut value, 2));
        assert_eq!(value, 10);

        let mut value = 30u32;
        assert!(!monitor.transform_value(&mut value, 3));
    }

    #[test]
    fn full_page_purged_on_wrap() {
        let (mut monitor, destroyed) = monitor(4, 2);
        for n in 1..=9u32 {
            assert!(monitor.record_value(Some(&(n * 10))));
        }
        // Records 1-4 went with the first page; 5-9 remain.
        assert_eq!(monitor.len(), 5);
        assert_eq!(destroyed.get(), 3);

        let mut value = 90u32;
        assert!(monitor.transform_value(&mut value, 4));
        assert_eq!(value, 50);

        let mut value = 90u32;
        assert!(monitor.transform_value(&mut value, 100));
        assert_eq!(value, 40);
    }

    #[test]
    fn clear_and_drop_destroy_diffs() {
        let (mut monitor, destroyed) = monitor(2, 2);
        monitor.record_value(Some(&1u32));
        monitor.record_value(Some(&2u32));
        monitor.record_value(Some(&3u32));
        monitor.clear();
        assert_eq!(destroyed.get(), 2);
        assert!(monitor.is_empty());

        monitor.record_value(Some(&4u32));
        drop(monitor);
        assert_eq!(destroyed.get(), 3);
    }

    #[test]
    #[should_panic(expected = "at least 2 pages")]
    fn single_page_rejected() {
        monitor(4, 1);
    }
}
