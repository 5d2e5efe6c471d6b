// duplicate.rs - Diff ring for duplicate (array valued) components
//
// Every element is diffed with its own context. A record also keeps the
// element count the array had before it, since the array length is part
// of the history: rolling back over a record resizes the working array to
// that count before element diffs are applied. Element contexts are kept
// for the largest count any reachable record (or the live array) needs
// and released when a purge makes them unreachable.

use crate::config::MonitorConfig;
use crate::ecs::{ByteColumn, ComponentId};
use crate::memory::Zone;
use crate::monitor::ring::PAGE_ZONE_BLOCK;
use crate::monitor::{Diff, MonitorInterface};
use std::fmt;
use tracing::trace;

struct DuplicateRecord<D> {
    /// Element count before this record.
    count: usize,
    diffs: Vec<Option<Diff<D>>>,
}

pub struct DuplicateMonitor<I: MonitorInterface> {
    interface: I,
    id: ComponentId,
    page_size: usize,
    page_count: usize,
    index: usize,
    prev_count: usize,
    contexts: Vec<I::Context>,
    records: Vec<Option<DuplicateRecord<I::Diff>>>,
    zones: Vec<Zone>,
}

impl<I: MonitorInterface> DuplicateMonitor<I> {
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

        Self {
            interface,
            id,
            page_size,
            page_count,
            index: 0,
            prev_count: 0,
            contexts: Vec::new(),
            records: (0..page_size * page_count).map(|_| None).collect(),
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

    pub fn capacity(&self) -> usize {
        self.page_size * self.page_count
    }

    pub fn len(&self) -> usize {
        self.records.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.records.iter().all(Option::is_none)
    }

    /// Element contexts currently alive.
    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// Record the current array (`None` if the component was removed).
    pub fn record(&mut self, data: Option<&ByteColumn>) -> bool {
        let count = data.map_or(0, ByteColumn::len);
        let elements = count.max(self.prev_count);
        while self.contexts.len() < elements {
            self.contexts.push(self.interface.initialize(self.id));
        }

        let index = self.index;
        let zone = &mut self.zones[index / self.page_size];
        let mark = zone.mark();

        let mut changed = count != self.prev_count;
        let mut diffs = Vec::with_capacity(elements);
        for (i, context) in self.contexts[..elements].iter_mut().enumerate() {
            let element = data.and_then(|column| column.get(i));
            let diff = self.interface.diff(context, zone, self.id, element);
            changed |= diff.is_some();
            diffs.push(diff);
        }

        if !changed {
            zone.rewind(mark);
            return false;
        }

        self.records[index] = Some(DuplicateRecord {
            count: self.prev_count,
            diffs,
        });
        self.prev_count = count;
        self.advance();
        true
    }

    /// Roll `data` back by up to `revisions` records, resizing it to each
    /// record's element count on the way.
    ///
    /// Returns `false` if nothing was recorded or the walk reached a point
    /// where the component did not exist.
    pub fn transform(&self, data: &mut ByteColumn, revisions: usize) -> bool {
        let capacity = self.capacity();
        let latest = (self.index + capacity - 1) % capacity;
        if self.records[latest].is_none() {
            return false;
        }

        for step in 0..revisions.min(capacity) {
            let slot = (latest + capacity - step) % capacity;
            let Some(record) = &self.records[slot] else {
                break;
            };
            if record.count == 0 {
                return false;
            }

            data.resize(record.count);
            let zone = &self.zones[slot / self.page_size];
            for (i, diff) in record.diffs.iter().enumerate().take(record.count) {
                if let (Some(Diff::Changed(diff)), Some(element)) = (diff, data.get_mut(i)) {
                    self.interface
                        .transform(&self.contexts[i], zone, diff, self.id, element);
                }
            }
        }
        true
    }

    pub fn clear(&mut self) {
        for page in 0..self.page_count {
            self.purge(page);
        }
        self.index = 0;
        self.release_contexts();
    }

    fn advance(&mut self) {
        let next = self.index + 1;
        self.index = if next % self.capacity() == 0 { 0 } else { next };
        if next % self.page_size == 0 {
            self.purge((next / self.page_size) % self.page_count);
            self.release_contexts();
        }
    }

    fn purge(&mut self, page: usize) {
        let slots = page * self.page_size..(page + 1) * self.page_size;
        for slot in &mut self.records[slots] {
            if let Some(record) = slot.take() {
                for diff in record.diffs.into_iter().flatten() {
                    if let Diff::Changed(diff) = diff {
                        self.interface.destroy_diff(diff);
                    }
                }
            }
        }
        self.zones[page].reset();
    }

    /// Drop element contexts no reachable record or the live array needs.
    fn release_contexts(&mut self) {
        let needed = self
            .records
            .iter()
            .flatten()
            .map(|record| record.diffs.len())
            .fold(self.prev_count, usize::max);
        if needed < self.contexts.len() {
            trace!(
                component = %self.id,
                from = self.contexts.len(),
                to = needed,
                "releasing element contexts"
            );
            for mut context in self.contexts.drain(needed..) {
                self.interface.destroy_context(&mut context);
            }
        }
    }
}

impl<I: MonitorInterface> Drop for DuplicateMonitor<I> {
    fn drop(&mut self) {
        for slot in &mut self.records {
            if let Some(record) = slot.take() {
                for diff in record.diffs.into_iter().flatten() {
                    if let Diff::Changed(diff) = diff {
                        self.interface.destroy_diff(diff);
                    }
                }
            }
        }
        for context in &mut self.contexts {
            self.interface.destroy_context(context);
        }
    }
}

impl<I: MonitorInterface> fmt::Debug for DuplicateMonitor<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuplicateMonitor")
            .field("id", &self.id)
            .field("page_size", &self.page_size)
            .field("page_count", &self.page_count)
            .field("index", &self.index)
            .field("prev_count", &self.prev_count)
            .field("contexts", &self.contexts.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{Modifiers, StorageClass};
    use crate::monitor::BinaryMonitor;

    fn id() -> ComponentId {
        ComponentId::new(StorageClass::Packed, Modifiers::DUPLICATE, 0)
    }

    fn array(values: &[u32]) -> ByteColumn {
        let mut column = ByteColumn::new(4, 4);
        for &value in values {
            column.push_value(value);
        }
        column
    }

    fn monitor(page_size: usize, page_count: usize) -> DuplicateMonitor<BinaryMonitor> {
        DuplicateMonitor::new(BinaryMonitor::new(4, 4), id(), page_size, page_count, 64)
    }

    #[test]
    fn shrink_then_grow_rolls_back_to_three_elements() {
        let mut monitor = monitor(4, 2);
        assert!(monitor.record(Some(&array(&[1, 2, 3]))));
        assert!(monitor.record(Some(&array(&[7]))));
        assert!(monitor.record(Some(&array(&[8, 9, 10, 11]))));

        let mut data = array(&[8, 9, 10, 11]);
        assert!(monitor.transform(&mut data, 2));
        assert_eq!(data.as_slice::<u32>(), &[1, 2, 3]);

        let mut data = array(&[8, 9, 10, 11]);
        assert!(monitor.transform(&mut data, 1));
        assert_eq!(data.as_slice::<u32>(), &[7]);

        let mut data = array(&[8, 9, 10, 11]);
        assert!(!monitor.transform(&mut data, 3));
    }

    #[test]
    fn unchanged_array_is_not_recorded() {
        let mut monitor = monitor(2, 2);
        assert!(monitor.record(Some(&array(&[4, 5]))));
        assert!(!monitor.record(Some(&array(&[4, 5]))));
        assert_eq!(monitor.len(), 1);

        assert!(monitor.record(None));
        let mut data = ByteColumn::new(4, 4);
        assert!(monitor.transform(&mut data, 1));
        assert_eq!(data.as_slice::<u32>(), &[4, 5]);
    }

    #[test]
    fn purge_releases_unreachable_contexts() {
        let mut monitor = monitor(1, 2);
        monitor.record(Some(&array(&[1, 2, 3, 4, 5])));
        assert_eq!(monitor.context_count(), 5);

        monitor.record(Some(&array(&[1])));
        monitor.record(Some(&array(&[2])));
        monitor.record(Some(&array(&[3])));
        // Only the latest record survives and it covers a single element.
        assert_eq!(monitor.context_count(), 1);

        let mut data = array(&[3]);
        assert!(monitor.transform(&mut data, 8));
        assert_eq!(data.as_slice::<u32>(), &[2]);
    }
}
