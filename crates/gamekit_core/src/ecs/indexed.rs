// indexed.rs - Entity-indexed component arrays
//
// Values live at the entity's own index. The array grows in whole
// chunks; presence is tracked by the entity table, so slots that were
// never written (or were removed) simply hold zeroes.

use crate::ecs::column::Column;
use crate::ecs::{ByteColumn, ComponentId, ComponentInfo, Entity};

#[derive(Debug)]
pub struct IndexedStorage {
    id: ComponentId,
    column: Column,
    chunk: usize,
}

impl IndexedStorage {
    pub(crate) fn new(info: &ComponentInfo, chunk: usize, duplicate_capacity: usize) -> Self {
        Self {
            id: info.id(),
            column: Column::for_component(info, duplicate_capacity),
            chunk: chunk.max(1),
        }
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Slots currently allocated (a multiple of the growth chunk).
    pub fn len(&self) -> usize {
        self.column.len()
    }

    pub fn is_empty(&self) -> bool {
        self.column.is_empty()
    }

    pub fn column(&self) -> &Column {
        &self.column
    }

    pub(crate) fn column_mut(&mut self) -> &mut Column {
        &mut self.column
    }

    fn ensure(&mut self, entity: Entity) -> usize {
        let index = entity.index();
        if index >= self.column.len() {
            let len = (index + 1).div_ceil(self.chunk) * self.chunk;
            self.column.resize(len);
        }
        index
    }

    pub(crate) fn set_bytes(&mut self, entity: Entity, bytes: &[u8]) {
        let index = self.ensure(entity);
        if let Some(slot) = self.column.value_mut(index) {
            slot.copy_from_slice(bytes);
        }
    }

    pub(crate) fn set_array(&mut self, entity: Entity, array: ByteColumn) {
        let index = self.ensure(entity);
        if let Some(slot) = self.column.array_mut(index) {
            *slot = array;
        }
    }

    /// Make sure the slot exists and holds a zeroed value or empty array.
    pub(crate) fn set_empty(&mut self, entity: Entity) {
        let index = self.ensure(entity);
        self.column.reset_row(index);
    }

    pub(crate) fn clear(&mut self, entity: Entity) {
        self.column.reset_row(entity.index());
    }
}
