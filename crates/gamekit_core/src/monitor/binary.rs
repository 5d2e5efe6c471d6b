//! Chunked byte differ.
//!
//! Values are compared in fixed-width chunks against a private copy of the
//! last value. A diff is a run of entries laid out back to back in the
//! page zone:
//!
//! ```text
//! [chunk index: offset_width bytes, little endian][old chunk bytes: chunk bytes]
//! ```
//!
//! The last chunk of a value whose size is not a multiple of the chunk
//! width only carries the remainder (the entry keeps its full width).

use crate::ecs::{ComponentId, ComponentInfo};
use crate::memory::{Zone, ZoneSpan};
use crate::monitor::{Diff, MonitorInterface};
use std::ops::Range;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryMonitor {
    size: usize,
    chunk: usize,
    chunks: usize,
    offset_width: usize,
}

#[derive(Clone, Debug, Default)]
pub struct BinaryContext {
    copy: Vec<u8>,
    created: bool,
}

impl BinaryContext {
    /// Last value seen, if the component currently exists.
    pub fn value(&self) -> Option<&[u8]> {
        self.created.then_some(self.copy.as_slice())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BinaryDiff {
    span: ZoneSpan,
    entries: usize,
}

impl BinaryDiff {
    /// Number of chunks restored by this diff.
    pub fn entries(&self) -> usize {
        self.entries
    }
}

impl BinaryMonitor {
    /// Differ for values of `size` bytes compared `chunk_size` bytes at a time.
    pub fn new(size: usize, chunk_size: usize) -> Self {
        let chunk = chunk_size.clamp(1, size.max(1));
        let chunks = size.div_ceil(chunk);
        let highest = chunks.saturating_sub(1);
        let bits = (usize::BITS - highest.leading_zeros()) as usize;
        Self {
            size,
            chunk,
            chunks,
            offset_width: bits.div_ceil(8).max(1),
        }
    }

    /// Differ sized for one value (or one duplicate element) of a component.
    pub fn for_component(info: &ComponentInfo, chunk_size: usize) -> Self {
        Self::new(info.size(), chunk_size)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    pub fn offset_width(&self) -> usize {
        self.offset_width
    }

    fn entry_width(&self) -> usize {
        self.offset_width + self.chunk
    }

    fn chunk_range(&self, chunk: usize) -> Range<usize> {
        let start = chunk * self.chunk;
        start..(start + self.chunk).min(self.size)
    }

    /// Write one entry per listed chunk, taking the bytes from `source`.
    fn emit(&self, zone: &mut Zone, chunks: &[usize], source: &[u8]) -> BinaryDiff {
        let width = self.entry_width();
        let span = zone.allocate(chunks.len() * width);
        let out = zone.bytes_mut(span);

        for (entry, &chunk) in out.chunks_exact_mut(width).zip(chunks) {
            let offset = (chunk as u64).to_le_bytes();
            entry[..self.offset_width].copy_from_slice(&offset[..self.offset_width]);
            let range = self.chunk_range(chunk);
            entry[self.offset_width..self.offset_width + range.len()]
                .copy_from_slice(&source[range]);
        }

        BinaryDiff {
            span,
            entries: chunks.len(),
        }
    }
}

impl MonitorInterface for BinaryMonitor {
    type Context = BinaryContext;
    type Diff = BinaryDiff;

    fn initialize(&self, _id: ComponentId) -> BinaryContext {
        BinaryContext {
            copy: vec![0; self.size],
            created: false,
        }
    }

    fn diff(
        &self,
        context: &mut BinaryContext,
        zone: &mut Zone,
        id: ComponentId,
        data: Option<&[u8]>,
    ) -> Option<Diff<BinaryDiff>> {
        match (context.created, data) {
            (true, Some(data)) => {
                assert_eq!(data.len(), self.size, "{id}: value size changed");
                let changed: Vec<usize> = (0..self.chunks)
                    .filter(|&chunk| {
                        let range = self.chunk_range(chunk);
                        context.copy[range.clone()] != data[range]
                    })
                    .collect();
                if changed.is_empty() {
                    return None;
                }

                let diff = self.emit(zone, &changed, &context.copy);
                for &chunk in &changed {
                    let range = self.chunk_range(chunk);
                    context.copy[range.clone()].copy_from_slice(&data[range]);
                }
                Some(Diff::Changed(diff))
            }
            (true, None) => {
                context.created = false;
                let all: Vec<usize> = (0..self.chunks).collect();
                Some(Diff::Changed(self.emit(zone, &all, &context.copy)))
            }
            (false, Some(data)) => {
                assert_eq!(data.len(), self.size, "{id}: value size changed");
                context.copy.copy_from_slice(data);
                context.created = true;
                Some(Diff::Removed)
            }
            (false, None) => None,
        }
    }

    fn transform(
        &self,
        _context: &BinaryContext,
        zone: &Zone,
        diff: &BinaryDiff,
        _id: ComponentId,
        data: &mut [u8],
    ) {
        let width = self.entry_width();
        for entry in zone.bytes(diff.span).chunks_exact(width).take(diff.entries) {
            let mut offset = [0u8; 8];
            offset[..self.offset_width].copy_from_slice(&entry[..self.offset_width]);
            let range = self.chunk_range(u64::from_le_bytes(offset) as usize);
            let len = range.len();
            data[range].copy_from_slice(&entry[self.offset_width..self.offset_width + len]);
        }
    }
}
