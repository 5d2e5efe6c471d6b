// packed.rs - Packed component arrays
//
// One dense array per packed component plus the owning entity of each
// row. Removal swap-removes, so rows are only stable until the next
// removal; entities keep their row in the entity table.

use crate::ecs::column::Column;
use crate::ecs::{ByteColumn, ComponentId, ComponentInfo, Entity};

#[derive(Debug)]
pub struct PackedStorage {
    id: ComponentId,
    column: Column,
    entities: Vec<Entity>,
}

impl PackedStorage {
    pub(crate) fn new(info: &ComponentInfo, duplicate_capacity: usize) -> Self {
        Self {
            id: info.id(),
            column: Column::for_component(info, duplicate_capacity),
            entities: Vec::new(),
        }
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Owner of each row.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn column(&self) -> &Column {
        &self.column
    }

    pub(crate) fn column_mut(&mut self) -> &mut Column {
        &mut self.column
    }

    pub(crate) fn push_bytes(&mut self, entity: Entity, bytes: &[u8]) -> usize {
        self.entities.push(entity);
        self.column.push_bytes(bytes)
    }

    pub(crate) fn push_array(&mut self, entity: Entity, array: ByteColumn) -> usize {
        self.entities.push(entity);
        self.column.push_array(array)
    }

    pub(crate) fn push_empty(&mut self, entity: Entity) -> usize {
        self.entities.push(entity);
        self.column.push_empty()
    }

    /// Remove `row`, returning the entity that moved into it.
    pub(crate) fn swap_remove(&mut self, row: usize) -> Option<Entity> {
        self.column.swap_remove(row);
        self.entities.swap_remove(row);
        self.entities.get(row).copied()
    }
}
