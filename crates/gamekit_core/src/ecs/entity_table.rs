// entity_table.rs - Per-entity component references
//
// The table answers "which components does this entity have, and where
// are they" without touching any storage backend.

use crate::ecs::{Entity, Location};

#[derive(Debug, Default, Clone)]
pub(crate) struct EntityRecord {
    pub location: Option<Location>,
    pub archetype_mask: u32,
    pub packed_mask: u64,
    /// Row in each packed array, by packed index. Only meaningful where the
    /// matching `packed_mask` bit is set.
    pub packed_rows: Vec<usize>,
    pub indexed_mask: u64,
}

impl EntityRecord {
    pub fn packed_row(&self, index: usize) -> Option<usize> {
        if self.packed_mask & (1 << index) == 0 {
            return None;
        }
        self.packed_rows.get(index).copied()
    }

    pub fn set_packed_row(&mut self, index: usize, row: usize) {
        if self.packed_rows.len() <= index {
            self.packed_rows.resize(index + 1, 0);
        }
        self.packed_rows[index] = row;
        self.packed_mask |= 1 << index;
    }
}

#[derive(Debug, Default)]
pub(crate) struct EntityTable {
    records: Vec<Option<EntityRecord>>,
    available: Vec<u32>,
    live: usize,
}

impl EntityTable {
    pub fn create(&mut self) -> Entity {
        self.live += 1;
        if let Some(index) = self.available.pop() {
            self.records[index as usize] = Some(EntityRecord::default());
            return Entity::new(index);
        }
        let index = self.records.len();
        assert!(index < (u32::MAX >> 1) as usize, "entity index space exhausted");
        self.records.push(Some(EntityRecord::default()));
        Entity::new(index as u32)
    }

    pub fn free(&mut self, entity: Entity) {
        if let Some(slot) = self.records.get_mut(entity.index()) {
            if slot.take().is_some() {
                self.live -= 1;
                self.available.push(entity.to_bits());
            }
        }
    }

    pub fn get(&self, entity: Entity) -> Option<&EntityRecord> {
        self.records.get(entity.index())?.as_ref()
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut EntityRecord> {
        self.records.get_mut(entity.index())?.as_mut()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn alive(&self) -> impl Iterator<Item = Entity> + '_ {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.is_some())
            .map(|(index, _)| Entity::new(index as u32))
    }
}
