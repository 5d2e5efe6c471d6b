//! Memory zones
//!
//! A [`Zone`] is a bump allocator over a list of fixed-size blocks. Diff
//! payloads for change monitors live in zones: one zone per ring page,
//! reset wholesale when the page is purged. Allocations are addressed by
//! [`ZoneSpan`] handles instead of pointers so a span stays valid while
//! later allocations grow the block list.

/// Handle to a contiguous region allocated from a [`Zone`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ZoneSpan {
    block: u32,
    offset: u32,
    len: u32,
}

impl ZoneSpan {
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Position in a zone that can be rewound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZoneMark {
    block: usize,
    offset: usize,
}

/// Block-chained bump allocator.
pub struct Zone {
    block_size: usize,
    blocks: Vec<Box<[u8]>>,
    head: usize,
    offset: usize,
}

impl Zone {
    /// Create a zone whose blocks hold at least `block_size` bytes. The
    /// first block is allocated lazily.
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
            blocks: Vec::new(),
            head: 0,
            offset: 0,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Allocate `len` zeroed bytes. Requests larger than the block size get
    /// a dedicated block.
    pub fn allocate(&mut self, len: usize) -> ZoneSpan {
        if len == 0 {
            return ZoneSpan {
                block: self.head as u32,
                offset: self.offset as u32,
                len: 0,
            };
        }

        if self.blocks.is_empty() {
            let block = self.new_block(len);
            self.blocks.push(block);
            self.head = 0;
            self.offset = 0;
        }

        while self.offset + len > self.blocks[self.head].len() {
            self.head += 1;
            self.offset = 0;
            if self.head == self.blocks.len() {
                let block = self.new_block(len);
                self.blocks.push(block);
            } else if self.blocks[self.head].len() < len {
                let block = self.new_block(len);
                self.blocks[self.head] = block;
            }
        }

        let span = ZoneSpan {
            block: self.head as u32,
            offset: self.offset as u32,
            len: len as u32,
        };
        self.blocks[self.head][self.offset..self.offset + len].fill(0);
        self.offset += len;
        span
    }

    /// Free the most recent allocation. Spans must be released in reverse
    /// allocation order; anything else is a logic error.
    pub fn deallocate(&mut self, span: ZoneSpan) {
        debug_assert!(
            span.block as usize == self.head && span.offset as usize + span.len() == self.offset,
            "zone deallocation out of order"
        );
        self.rewind(ZoneMark {
            block: span.block as usize,
            offset: span.offset as usize,
        });
    }

    /// Current allocation position.
    pub fn mark(&self) -> ZoneMark {
        ZoneMark {
            block: self.head,
            offset: self.offset,
        }
    }

    /// Release everything allocated after `mark`.
    pub fn rewind(&mut self, mark: ZoneMark) {
        debug_assert!(
            (mark.block, mark.offset) <= (self.head, self.offset),
            "rewinding past the allocation head"
        );
        self.head = mark.block;
        self.offset = mark.offset;
    }

    /// Release every allocation, keeping the blocks for reuse.
    pub fn reset(&mut self) {
        self.head = 0;
        self.offset = 0;
    }

    /// Bytes handed out since the last reset, including block tail waste.
    pub fn used(&self) -> usize {
        if self.blocks.is_empty() {
            return 0;
        }
        self.blocks[..self.head].iter().map(|b| b.len()).sum::<usize>() + self.offset
    }

    /// Bytes reserved across all blocks.
    pub fn reserved(&self) -> usize {
        self.blocks.iter().map(|b| b.len()).sum()
    }

    pub fn bytes(&self, span: ZoneSpan) -> &[u8] {
        if span.is_empty() {
            return &[];
        }
        let start = span.offset as usize;
        &self.blocks[span.block as usize][start..start + span.len()]
    }

    pub fn bytes_mut(&mut self, span: ZoneSpan) -> &mut [u8] {
        if span.is_empty() {
            return &mut [];
        }
        let start = span.offset as usize;
        &mut self.blocks[span.block as usize][start..start + span.len()]
    }

    fn new_block(&self, min: usize) -> Box<[u8]> {
        vec![0u8; self.block_size.max(min)].into_boxed_slice()
    }
}

impl Default for Zone {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl std::fmt::Debug for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Zone")
            .field("block_size", &self.block_size)
            .field("blocks", &self.blocks.len())
            .field("used", &self.used())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_spill_into_new_blocks() {
        let mut zone = Zone::new(8);
        let a = zone.allocate(6);
        let b = zone.allocate(6);

        assert_ne!(a.block, b.block);
        zone.bytes_mut(a).copy_from_slice(&[1; 6]);
        zone.bytes_mut(b).copy_from_slice(&[2; 6]);
        assert_eq!(zone.bytes(a), &[1; 6]);
        assert_eq!(zone.bytes(b), &[2; 6]);
        assert_eq!(zone.reserved(), 16);
    }

    #[test]
    fn oversized_requests_get_their_own_block() {
        let mut zone = Zone::new(4);
        let span = zone.allocate(32);
        assert_eq!(zone.bytes(span).len(), 32);
    }

    #[test]
    fn rewind_and_reset_reuse_memory() {
        let mut zone = Zone::new(16);
        let first = zone.allocate(4);
        let mark = zone.mark();
        let scratch = zone.allocate(8);
        zone.bytes_mut(scratch).fill(0xff);

        zone.rewind(mark);
        assert_eq!(zone.used(), 4);

        let reused = zone.allocate(8);
        assert_eq!(reused, scratch);
        assert!(zone.bytes(reused).iter().all(|&b| b == 0), "allocations are zeroed");

        zone.deallocate(reused);
        assert_eq!(zone.used(), 4);
        assert_eq!(zone.bytes(first).len(), 4);

        zone.reset();
        assert_eq!(zone.used(), 0);
        assert_eq!(zone.reserved(), 16);
    }
}
