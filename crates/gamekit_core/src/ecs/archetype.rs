// archetype.rs - Archetype buckets
//
// Entities whose archetype-class component set is identical share a
// bucket: one entity list plus one column per component, all indexed by
// the same row. Buckets are keyed by (component count, rank) and are
// created on first use and kept for the lifetime of the world.

use crate::ecs::archetype_index::{ordinals_of_mask, rank, unrank};
use crate::ecs::column::Column;
use crate::ecs::{ComponentId, ComponentInfo, ComponentRegistry, Entity, StorageClass};
use std::collections::HashMap;
use std::fmt;

/// Identifies an archetype-component combination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchetypeId {
    count: u8,
    rank: u32,
}

impl ArchetypeId {
    pub fn from_ordinals(ordinals: &[usize]) -> Self {
        Self {
            count: ordinals.len() as u8,
            rank: rank(ordinals) as u32,
        }
    }

    pub fn from_mask(mask: u32) -> Self {
        let ordinals: Vec<usize> = ordinals_of_mask(mask).collect();
        Self::from_ordinals(&ordinals)
    }

    /// Number of components in the combination.
    pub fn count(self) -> usize {
        self.count as usize
    }

    pub fn rank(self) -> usize {
        self.rank as usize
    }

    pub fn ordinals(self) -> Vec<usize> {
        unrank(self.rank(), self.count())
    }

    pub fn mask(self) -> u32 {
        self.ordinals().iter().fold(0, |mask, &ordinal| mask | 1 << ordinal)
    }
}

impl fmt::Display for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "archetype({}:{})", self.count, self.rank)
    }
}

/// Where an entity's archetype data lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location {
    pub archetype: ArchetypeId,
    pub row: usize,
}

/// Bucket matched by an archetype query: which bucket, and the column
/// index of each queried component inside it (in query order).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchetypePointer {
    pub archetype: ArchetypeId,
    pub columns: Vec<usize>,
}

/// All entities sharing one archetype-component set.
#[derive(Debug)]
pub struct ArchetypeBucket {
    id: ArchetypeId,
    mask: u32,
    components: Vec<ComponentId>,
    entities: Vec<Entity>,
    columns: Vec<Column>,
}

impl ArchetypeBucket {
    fn new(mask: u32, registry: &ComponentRegistry, duplicate_capacity: usize) -> Self {
        let infos: Vec<&ComponentInfo> = ordinals_of_mask(mask)
            .map(|ordinal| &registry.class(StorageClass::Archetype)[ordinal])
            .collect();
        Self {
            id: ArchetypeId::from_mask(mask),
            mask,
            components: infos.iter().map(|info| info.id()).collect(),
            entities: Vec::new(),
            columns: infos
                .iter()
                .map(|info| Column::for_component(info, duplicate_capacity))
                .collect(),
        }
    }

    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    /// Components in ascending ordinal order; column `i` stores component `i`.
    pub fn components(&self) -> &[ComponentId] {
        &self.components
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        self.mask & (1 << id.index()) != 0
    }

    pub fn column_index(&self, id: ComponentId) -> Option<usize> {
        if !self.contains(id) {
            return None;
        }
        let below = self.mask & ((1u32 << id.index()) - 1);
        Some(below.count_ones() as usize)
    }

    pub fn column(&self, id: ComponentId) -> Option<&Column> {
        self.column_index(id).map(|index| &self.columns[index])
    }

    pub fn column_mut(&mut self, id: ComponentId) -> Option<&mut Column> {
        self.column_index(id).map(move |index| &mut self.columns[index])
    }

    pub(crate) fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    /// Remove `row`, returning the entity that moved into it.
    pub(crate) fn swap_remove(&mut self, row: usize) -> Option<Entity> {
        for column in &mut self.columns {
            column.swap_remove(row);
        }
        self.entities.swap_remove(row);
        self.entities.get(row).copied()
    }

    /// Run destructors for every component of `row`.
    pub(crate) fn destroy_row(&mut self, row: usize, registry: &ComponentRegistry) {
        for (column, &id) in self.columns.iter_mut().zip(&self.components) {
            if id.has_destructor() {
                column.destroy_row(row, registry.expect_info(id));
            }
        }
    }
}

/// Payload for a component entering a bucket row.
pub(crate) enum Incoming<'a> {
    Bytes(&'a [u8]),
    Array(crate::ecs::ByteColumn),
    Empty,
}

/// Result of moving an entity between buckets.
#[derive(Debug)]
pub(crate) struct Relocation {
    pub to: Option<Location>,
    /// Entity swapped into the vacated source row.
    pub moved: Option<(Entity, usize)>,
}

/// Every archetype bucket of a world.
#[derive(Debug, Default)]
pub struct ArchetypeStorage {
    buckets: Vec<ArchetypeBucket>,
    lookup: HashMap<ArchetypeId, usize>,
}

impl ArchetypeStorage {
    pub fn bucket(&self, id: ArchetypeId) -> Option<&ArchetypeBucket> {
        self.lookup.get(&id).map(|&index| &self.buckets[index])
    }

    pub fn bucket_mut(&mut self, id: ArchetypeId) -> Option<&mut ArchetypeBucket> {
        self.lookup.get(&id).map(|&index| &mut self.buckets[index])
    }

    pub fn buckets(&self) -> &[ArchetypeBucket] {
        &self.buckets
    }

    pub(crate) fn buckets_mut(&mut self) -> &mut [ArchetypeBucket] {
        &mut self.buckets
    }

    fn ensure(&mut self, mask: u32, registry: &ComponentRegistry, duplicate_capacity: usize) -> usize {
        let id = ArchetypeId::from_mask(mask);
        if let Some(&index) = self.lookup.get(&id) {
            return index;
        }
        let index = self.buckets.len();
        self.buckets
            .push(ArchetypeBucket::new(mask, registry, duplicate_capacity));
        self.lookup.insert(id, index);
        tracing::debug!(archetype = %id, mask, "created archetype bucket");
        index
    }

    /// Buckets containing every component in `components`, in creation order.
    pub fn pointers(&self, components: &[ComponentId]) -> Vec<ArchetypePointer> {
        let wanted = components
            .iter()
            .filter(|id| id.storage() == StorageClass::Archetype)
            .fold(0u32, |mask, id| mask | 1 << id.index());
        self.buckets
            .iter()
            .filter(|bucket| bucket.mask & wanted == wanted)
            .map(|bucket| ArchetypePointer {
                archetype: bucket.id,
                columns: components
                    .iter()
                    .filter_map(|&id| bucket.column_index(id))
                    .collect(),
            })
            .collect()
    }

    /// Move `entity` from `from` into the bucket for `to_mask`. Components in
    /// both sets move across; new ones are filled from `incoming`. Components
    /// dropped by the move must already have been destroyed by the caller.
    pub(crate) fn relocate<'a>(
        &mut self,
        registry: &ComponentRegistry,
        duplicate_capacity: usize,
        entity: Entity,
        from: Option<Location>,
        to_mask: u32,
        mut incoming: impl FnMut(ComponentId) -> Incoming<'a>,
    ) -> Relocation {
        let from_index = from.map(|location| self.lookup[&location.archetype]);
        let to_index = (to_mask != 0).then(|| self.ensure(to_mask, registry, duplicate_capacity));

        let to = match (from_index, to_index) {
            (_, None) => None,
            (source, Some(target)) => {
                let (dst, mut src) = match source {
                    Some(source) => {
                        let (dst, src) = pair_mut(&mut self.buckets, target, source);
                        (dst, Some(src))
                    }
                    None => (&mut self.buckets[target], None),
                };
                let row = dst.entities.len();
                for (column, &id) in dst.columns.iter_mut().zip(&dst.components) {
                    let carried = match (src.as_deref_mut(), from) {
                        (Some(src), Some(location)) => match src.column_index(id) {
                            Some(index) => {
                                column.push_from(&mut src.columns[index], location.row);
                                true
                            }
                            None => false,
                        },
                        _ => false,
                    };
                    if !carried {
                        match incoming(id) {
                            Incoming::Bytes(bytes) => column.push_bytes(bytes),
                            Incoming::Array(array) => column.push_array(array),
                            Incoming::Empty => column.push_empty(),
                        };
                    }
                }
                dst.entities.push(entity);
                Some(Location {
                    archetype: dst.id,
                    row,
                })
            }
        };

        let moved = match (from_index, from) {
            (Some(source), Some(location)) => self.buckets[source]
                .swap_remove(location.row)
                .map(|moved| (moved, location.row)),
            _ => None,
        };

        Relocation { to, moved }
    }
}

fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    assert_ne!(a, b, "pair_mut requires distinct indices");
    if a < b {
        let (left, right) = items.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = items.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}
