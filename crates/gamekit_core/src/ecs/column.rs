// column.rs - Type-erased component columns
//
// Components are stored as raw bytes in 16-byte aligned blocks so any
// registered layout (Rust or descriptor-defined) can share one column
// type. Typed access goes through bytemuck casts over the byte region.

use crate::config::STORAGE_ALIGN;
use crate::ecs::component_registry::stride_of;
use crate::ecs::ComponentInfo;
use bytemuck::{Pod, Zeroable};
use std::mem::size_of;

#[derive(Clone, Copy)]
#[repr(C, align(16))]
struct Block([u8; STORAGE_ALIGN]);

// SAFETY: a byte array with no padding; all-zero and every bit pattern are valid.
unsafe impl Zeroable for Block {}
// SAFETY: see above; size equals alignment so arrays of blocks carry no padding.
unsafe impl Pod for Block {}

impl Block {
    const ZERO: Block = Block([0; STORAGE_ALIGN]);
}

/// Growable array of fixed-size values stored as bytes.
#[derive(Clone)]
pub struct ByteColumn {
    size: usize,
    stride: usize,
    len: usize,
    blocks: Vec<Block>,
}

impl ByteColumn {
    /// Empty column for values of `size` bytes aligned to `align`.
    pub fn new(size: usize, align: usize) -> Self {
        assert!(
            align <= STORAGE_ALIGN,
            "column alignment {align} exceeds {STORAGE_ALIGN}"
        );
        Self {
            size,
            stride: stride_of(size, align.max(1)),
            len: 0,
            blocks: Vec::new(),
        }
    }

    pub fn with_capacity(size: usize, align: usize, capacity: usize) -> Self {
        let mut column = Self::new(size, align);
        column.reserve(capacity);
        column
    }

    pub fn for_component(info: &ComponentInfo) -> Self {
        Self::new(info.size(), info.align())
    }

    /// Size of one value.
    #[inline]
    pub fn element_size(&self) -> usize {
        self.size
    }

    /// Distance between consecutive values.
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        if self.stride == 0 {
            usize::MAX
        } else {
            self.blocks.len() * STORAGE_ALIGN / self.stride
        }
    }

    /// Ensure room for `additional` more values.
    pub fn reserve(&mut self, additional: usize) {
        let needed = ((self.len + additional) * self.stride).div_ceil(STORAGE_ALIGN);
        if needed > self.blocks.len() {
            let grown = needed.max(self.blocks.len() * 2);
            self.blocks.resize(grown, Block::ZERO);
        }
    }

    /// Append one value; `value` must be exactly `element_size()` bytes.
    pub fn push(&mut self, value: &[u8]) -> usize {
        assert_eq!(value.len(), self.size, "value size mismatch");
        let row = self.push_zeroed();
        let size = self.size;
        self.row_mut(row)[..size].copy_from_slice(value);
        row
    }

    pub fn push_zeroed(&mut self) -> usize {
        self.reserve(1);
        let row = self.len;
        self.len += 1;
        self.row_mut(row).fill(0);
        row
    }

    /// Append `count` values packed back to back at `element_size()` bytes.
    pub fn extend_from_bytes(&mut self, values: &[u8], count: usize) {
        assert_eq!(values.len(), self.size * count, "value buffer size mismatch");
        self.reserve(count);
        if self.size == self.stride {
            let start = self.len * self.stride;
            self.len += count;
            self.bytes_mut()[start..].copy_from_slice(values);
        } else {
            for value in values.chunks_exact(self.size) {
                self.push(value);
            }
        }
    }

    pub fn get(&self, row: usize) -> Option<&[u8]> {
        (row < self.len).then(|| {
            let start = row * self.stride;
            &self.bytes()[start..start + self.size]
        })
    }

    pub fn get_mut(&mut self, row: usize) -> Option<&mut [u8]> {
        if row >= self.len {
            return None;
        }
        let (start, size) = (row * self.stride, self.size);
        Some(&mut self.bytes_mut()[start..start + size])
    }

    /// Every live value, including stride padding.
    pub fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<Block, u8>(&self.blocks)[..self.len * self.stride]
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        let end = self.len * self.stride;
        &mut bytemuck::cast_slice_mut::<Block, u8>(&mut self.blocks)[..end]
    }

    /// Move the last value into `row`. Returns `true` when a value moved.
    pub fn swap_remove(&mut self, row: usize) -> bool {
        assert!(row < self.len, "row {row} out of bounds ({})", self.len);
        let last = self.len - 1;
        if row != last && self.stride > 0 {
            let stride = self.stride;
            self.bytes_mut()
                .copy_within(last * stride..(last + 1) * stride, row * stride);
        }
        self.len = last;
        row != last
    }

    /// Remove `count` values starting at `start`, keeping the order of the rest.
    pub fn remove_range(&mut self, start: usize, count: usize) {
        let end = start + count;
        assert!(end <= self.len, "range {start}..{end} out of bounds ({})", self.len);
        let stride = self.stride;
        let len = self.len;
        self.bytes_mut()
            .copy_within(end * stride..len * stride, start * stride);
        self.len -= count;
    }

    /// Grow with zeroed values or shrink to `len`.
    pub fn resize(&mut self, len: usize) {
        if len > self.len {
            self.reserve(len - self.len);
            let (start, end) = (self.len * self.stride, len * self.stride);
            self.len = len;
            self.bytes_mut()[start..end].fill(0);
        } else {
            self.len = len;
        }
    }

    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Typed view; `T` must match the registered layout.
    pub fn as_slice<T: Pod>(&self) -> &[T] {
        self.check_layout::<T>();
        bytemuck::cast_slice(self.bytes())
    }

    pub fn as_slice_mut<T: Pod>(&mut self) -> &mut [T] {
        self.check_layout::<T>();
        bytemuck::cast_slice_mut(self.bytes_mut())
    }

    /// Append a typed value.
    pub fn push_value<T: Pod>(&mut self, value: T) -> usize {
        self.check_layout::<T>();
        self.push(bytemuck::bytes_of(&value))
    }

    fn check_layout<T: Pod>(&self) {
        assert!(
            size_of::<T>() == self.size && self.size == self.stride && self.size > 0,
            "type of size {} does not match column layout (size {}, stride {})",
            size_of::<T>(),
            self.size,
            self.stride
        );
    }

    fn row_mut(&mut self, row: usize) -> &mut [u8] {
        let start = row * self.stride;
        let end = start + self.stride;
        &mut self.bytes_mut()[start..end]
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        self.blocks.as_mut_ptr().cast()
    }
}

impl std::fmt::Debug for ByteColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteColumn")
            .field("size", &self.size)
            .field("stride", &self.stride)
            .field("len", &self.len)
            .finish()
    }
}

/// Raw view of a column captured for the duration of a scheduler tick.
#[derive(Clone, Copy)]
pub(crate) enum RawColumn {
    Values {
        data: *mut u8,
        len: usize,
        size: usize,
        stride: usize,
    },
    Arrays {
        rows: *mut ByteColumn,
        len: usize,
    },
}

/// Storage for one component inside a bucket or packed/indexed array.
/// Duplicate components keep one element array per row.
#[derive(Clone, Debug)]
pub enum Column {
    Values(ByteColumn),
    Arrays {
        template: ByteColumn,
        capacity: usize,
        rows: Vec<ByteColumn>,
    },
}

impl Column {
    pub fn for_component(info: &ComponentInfo, duplicate_capacity: usize) -> Self {
        let values = ByteColumn::for_component(info);
        if info.id().is_duplicate() {
            Column::Arrays {
                template: values,
                capacity: duplicate_capacity,
                rows: Vec::new(),
            }
        } else {
            Column::Values(values)
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Values(values) => values.len(),
            Column::Arrays { rows, .. } => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a zeroed value or an empty array.
    pub fn push_empty(&mut self) -> usize {
        match self {
            Column::Values(values) => values.push_zeroed(),
            Column::Arrays {
                template,
                capacity,
                rows,
            } => {
                let mut array = template.clone();
                array.reserve(*capacity);
                rows.push(array);
                rows.len() - 1
            }
        }
    }

    pub(crate) fn push_bytes(&mut self, bytes: &[u8]) -> usize {
        match self {
            Column::Values(values) => values.push(bytes),
            Column::Arrays { .. } => panic!("duplicate columns take element arrays"),
        }
    }

    pub(crate) fn push_array(&mut self, array: ByteColumn) -> usize {
        match self {
            Column::Arrays { rows, .. } => {
                rows.push(array);
                rows.len() - 1
            }
            Column::Values(_) => panic!("value columns take bytes"),
        }
    }

    /// Fresh element array with the configured initial capacity.
    pub(crate) fn new_array(&self) -> ByteColumn {
        match self {
            Column::Arrays {
                template, capacity, ..
            } => {
                let mut array = template.clone();
                array.reserve(*capacity);
                array
            }
            Column::Values(_) => panic!("value columns hold no element arrays"),
        }
    }

    /// Copy (or take, for arrays) `row` of `source` onto the end of `self`.
    /// The source row is left for the caller to swap-remove.
    pub(crate) fn push_from(&mut self, source: &mut Column, row: usize) -> usize {
        match (self, source) {
            (Column::Values(dst), Column::Values(src)) => {
                let start = row * src.stride();
                let value = &src.bytes()[start..start + src.element_size()];
                dst.push(value)
            }
            (Column::Arrays { rows: dst, .. }, Column::Arrays { rows: src, template, .. }) => {
                let empty = template.clone();
                dst.push(std::mem::replace(&mut src[row], empty));
                dst.len() - 1
            }
            _ => panic!("column kinds differ"),
        }
    }

    /// Returns `true` when the last row moved into `row`.
    pub(crate) fn swap_remove(&mut self, row: usize) -> bool {
        match self {
            Column::Values(values) => values.swap_remove(row),
            Column::Arrays { rows, .. } => {
                rows.swap_remove(row);
                row != rows.len()
            }
        }
    }

    /// Grow with empty rows or shrink to `len`.
    pub(crate) fn resize(&mut self, len: usize) {
        match self {
            Column::Values(values) => values.resize(len),
            Column::Arrays {
                template,
                capacity,
                rows,
            } => {
                if len < rows.len() {
                    rows.truncate(len);
                } else {
                    let mut array = template.clone();
                    array.reserve(*capacity);
                    rows.resize(len, array);
                }
            }
        }
    }

    /// Run the component destructor over `row`.
    pub(crate) fn destroy_row(&mut self, row: usize, info: &ComponentInfo) {
        if info.destructor().is_none() {
            return;
        }
        match self {
            Column::Values(values) => {
                if let Some(value) = values.get_mut(row) {
                    info.destroy(value);
                }
            }
            Column::Arrays { rows, .. } => {
                if let Some(array) = rows.get_mut(row) {
                    info.destroy(array.bytes_mut());
                }
            }
        }
    }

    /// Zero a value or empty an array in place.
    pub(crate) fn reset_row(&mut self, row: usize) {
        match self {
            Column::Values(values) => {
                if let Some(value) = values.get_mut(row) {
                    value.fill(0);
                }
            }
            Column::Arrays { rows, .. } => {
                if let Some(array) = rows.get_mut(row) {
                    array.clear();
                }
            }
        }
    }

    pub fn value(&self, row: usize) -> Option<&[u8]> {
        match self {
            Column::Values(values) => values.get(row),
            Column::Arrays { .. } => None,
        }
    }

    pub fn value_mut(&mut self, row: usize) -> Option<&mut [u8]> {
        match self {
            Column::Values(values) => values.get_mut(row),
            Column::Arrays { .. } => None,
        }
    }

    pub fn array(&self, row: usize) -> Option<&ByteColumn> {
        match self {
            Column::Arrays { rows, .. } => rows.get(row),
            Column::Values(_) => None,
        }
    }

    pub fn array_mut(&mut self, row: usize) -> Option<&mut ByteColumn> {
        match self {
            Column::Arrays { rows, .. } => rows.get_mut(row),
            Column::Values(_) => None,
        }
    }

    pub fn values(&self) -> Option<&ByteColumn> {
        match self {
            Column::Values(values) => Some(values),
            Column::Arrays { .. } => None,
        }
    }

    pub fn arrays(&self) -> Option<&[ByteColumn]> {
        match self {
            Column::Arrays { rows, .. } => Some(rows),
            Column::Values(_) => None,
        }
    }

    pub(crate) fn raw(&mut self) -> RawColumn {
        match self {
            Column::Values(values) => RawColumn::Values {
                len: values.len(),
                size: values.element_size(),
                stride: values.stride(),
                data: values.as_mut_ptr(),
            },
            Column::Arrays { rows, .. } => RawColumn::Arrays {
                len: rows.len(),
                rows: rows.as_mut_ptr(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_get_and_swap_remove() {
        let mut column = ByteColumn::new(4, 4);
        for v in 0u32..4 {
            column.push_value(v);
        }

        assert!(column.swap_remove(1));
        assert_eq!(column.as_slice::<u32>(), &[0, 3, 2]);
        assert!(!column.swap_remove(2));
        assert_eq!(column.as_slice::<u32>(), &[0, 3]);
    }

    #[test]
    fn padded_layouts_keep_stride() {
        let mut column = ByteColumn::new(3, 2);
        assert_eq!(column.stride(), 4);
        column.extend_from_bytes(&[1, 2, 3, 4, 5, 6], 2);

        assert_eq!(column.len(), 2);
        assert_eq!(column.get(1), Some(&[4u8, 5, 6][..]));
        assert_eq!(column.bytes().len(), 8);
    }

    #[test]
    fn storage_is_sixteen_byte_aligned() {
        let mut column = ByteColumn::new(16, 16);
        column.push_zeroed();
        assert_eq!(column.bytes().as_ptr() as usize % STORAGE_ALIGN, 0);
    }

    #[test]
    fn ordered_removal_and_resize() {
        let mut column = ByteColumn::new(2, 2);
        for v in 0u16..5 {
            column.push_value(v);
        }
        column.remove_range(1, 2);
        assert_eq!(column.as_slice::<u16>(), &[0, 3, 4]);

        column.resize(5);
        assert_eq!(column.as_slice::<u16>(), &[0, 3, 4, 0, 0]);
        column.truncate(1);
        assert_eq!(column.as_slice::<u16>(), &[0]);
    }

    #[test]
    fn tag_columns_count_rows_without_bytes() {
        let mut column = ByteColumn::new(0, 1);
        column.push_zeroed();
        column.extend_from_bytes(&[], 3);
        assert_eq!(column.len(), 4);
        assert!(column.bytes().is_empty());
        assert!(column.swap_remove(0));
        assert_eq!(column.len(), 3);
    }
}
