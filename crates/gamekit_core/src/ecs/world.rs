// world.rs - ECS World with entity management and component storage
//
// The world owns one backend per storage class and the entity table that
// records, per entity, which components it has and where they live.
// Structural changes made while systems run go through the mutation
// queue and land here in `apply_mutations`. Links between entities are
// kept in a side table and released when either entity is destroyed.

use crate::config::EcsConfig;
use crate::ecs::archetype::{Incoming, Relocation};
use crate::ecs::entity_table::{EntityRecord, EntityTable};
use crate::ecs::mutation::{StagedLink, StagedUnlink};
use crate::ecs::{
    AppliedMutations, ArchetypeBucket, ArchetypeId, ArchetypePointer, ArchetypeStorage, Associate,
    ByteColumn, Component, ComponentBytes, ComponentId, ComponentInfo, ComponentRegistry, Entity,
    EntityBuilder, EntityRegistry, IndexedStorage, Link, LinkEnd, LinkId, LinkTable, LocalStorage,
    Location, MutationQueue, PackedStorage, Side, StorageClass,
};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorldError {
    #[error("{entity} is not alive")]
    DeadEntity { entity: Entity },

    #[error("component {id} is not registered with this world")]
    UnknownComponent { id: ComponentId },

    #[error("type '{name}' is not registered with this world")]
    UnregisteredType { name: &'static str },

    #[error("component {id} expects {expected} bytes but received {actual}")]
    SizeMismatch {
        id: ComponentId,
        expected: usize,
        actual: usize,
    },

    #[error("component {id} is a context local and cannot be attached to entities")]
    LocalComponent { id: ComponentId },

    #[error("component {id} is not a local component")]
    NotLocal { id: ComponentId },

    #[error("component {id} is not a duplicate component")]
    NotDuplicate { id: ComponentId },

    #[error("link {id} is not defined on this world")]
    UnknownLink { id: LinkId },

    #[error("elements {start}..{end} are out of range for {len} elements of component {id}")]
    ElementRange {
        id: ComponentId,
        start: usize,
        end: usize,
        len: usize,
    },
}

/// The main ECS world containing all entities and components.
pub struct World {
    registry: Arc<ComponentRegistry>,
    config: EcsConfig,
    pub(crate) entities: EntityTable,
    pub(crate) archetypes: ArchetypeStorage,
    pub(crate) packed: Vec<PackedStorage>,
    pub(crate) indexed: Vec<IndexedStorage>,
    pub(crate) locals: LocalStorage,
    ids: EntityRegistry,
    links: LinkTable,
    mutations: MutationQueue,
}

impl World {
    /// Create an empty world for the components in `registry`.
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self::with_config(registry, EcsConfig::default())
    }

    pub fn with_config(registry: Arc<ComponentRegistry>, config: EcsConfig) -> Self {
        let packed = registry
            .class(StorageClass::Packed)
            .iter()
            .map(|info| PackedStorage::new(info, config.duplicate_capacity))
            .collect();
        let indexed = registry
            .class(StorageClass::Indexed)
            .iter()
            .map(|info| IndexedStorage::new(info, config.indexed_chunk, config.duplicate_capacity))
            .collect();
        let locals = LocalStorage::new(&registry, config.duplicate_capacity);

        tracing::debug!(?registry, "created world");

        Self {
            registry,
            config,
            entities: EntityTable::default(),
            archetypes: ArchetypeStorage::default(),
            packed,
            indexed,
            locals,
            ids: EntityRegistry::new(),
            links: LinkTable::new(),
            mutations: MutationQueue::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EcsConfig {
        &self.config
    }

    // ---------------------------------------------------------------------
    // Entities
    // ---------------------------------------------------------------------

    pub fn create_entity(&mut self) -> Entity {
        self.entities.create()
    }

    pub fn create_entities(&mut self, count: usize) -> Vec<Entity> {
        (0..count).map(|_| self.entities.create()).collect()
    }

    /// Create an entity and attach every component in `builder`.
    pub fn spawn(&mut self, builder: &EntityBuilder) -> Result<Entity, WorldError> {
        let entity = self.create_entity();
        if let Err(err) = self.add_components(entity, builder) {
            self.entities.free(entity);
            return Err(err);
        }
        Ok(entity)
    }

    /// Destroy an entity, running destructors for all of its components and
    /// dropping its registry ID and links. The index is recycled.
    ///
    /// Releasing links may cascade into destroying partners. An error from
    /// that is returned after the entity itself is gone.
    pub fn destroy_entity(&mut self, entity: Entity) -> Result<(), WorldError> {
        self.record(entity)?;
        let unlinked = self.unlink_every(entity, true);
        if !self.is_alive(entity) {
            // A cascade came back around and destroyed it already.
            return unlinked;
        }
        let record = self.record(entity)?.clone();
        let registry = Arc::clone(&self.registry);

        if let Some(location) = record.location {
            if let Some(bucket) = self.archetypes.bucket_mut(location.archetype) {
                bucket.destroy_row(location.row, &registry);
                if let Some(moved) = bucket.swap_remove(location.row) {
                    self.set_location(moved, Some(location));
                }
            }
        }

        for index in mask_bits(record.packed_mask) {
            if let Some(row) = record.packed_row(index) {
                self.remove_packed_row(&registry, index, row);
            }
        }

        for index in mask_bits(record.indexed_mask) {
            let storage = &mut self.indexed[index];
            let info = &registry.class(StorageClass::Indexed)[index];
            storage.column_mut().destroy_row(entity.index(), info);
            storage.clear(entity);
        }

        self.ids.deregister(entity);
        self.entities.free(entity);
        tracing::trace!(%entity, "destroyed entity");
        unlinked
    }

    pub fn destroy_entities(&mut self, entities: &[Entity]) -> Result<(), WorldError> {
        entities
            .iter()
            .try_for_each(|&entity| self.destroy_entity(entity))
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.get(entity).is_some()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.alive()
    }

    // ---------------------------------------------------------------------
    // Components
    // ---------------------------------------------------------------------

    /// Attach (or overwrite) a component from raw bytes. For duplicate
    /// components the bytes are one element, appended to the array.
    pub fn add_component(
        &mut self,
        entity: Entity,
        id: ComponentId,
        bytes: &[u8],
    ) -> Result<(), WorldError> {
        if id.is_duplicate() {
            return self.add_duplicate_bytes(entity, id, bytes, 1);
        }
        let info = self.attachable(id)?;
        check_size(&info, bytes.len(), 1)?;
        self.record(entity)?;
        self.insert_value(&info, entity, bytes);
        Ok(())
    }

    pub fn add<T: Component>(&mut self, entity: Entity, value: T) -> Result<(), WorldError> {
        let id = self.type_id::<T>()?;
        self.add_component(entity, id, bytemuck::bytes_of(&value))
    }

    pub fn add_tag(&mut self, entity: Entity, id: ComponentId) -> Result<(), WorldError> {
        self.add_component(entity, id, &[])
    }

    /// Attach every component in `builder`, migrating archetype data once.
    pub fn add_components(
        &mut self,
        entity: Entity,
        builder: &EntityBuilder,
    ) -> Result<(), WorldError> {
        let record = self.record(entity)?.clone();
        let components = builder.components();
        for component in &components {
            let info = self.attachable(component.id())?;
            check_size(&info, component.bytes().len(), component.count())?;
        }

        let registry = Arc::clone(&self.registry);
        let mut entering = 0u32;
        for component in &components {
            let id = component.id();
            let info = registry.expect_info(id);
            if id.storage() == StorageClass::Archetype && record.archetype_mask & bit32(id) == 0 {
                entering |= bit32(id);
            } else if id.is_duplicate() {
                self.append_duplicates(info, entity, component.bytes(), component.count());
            } else {
                self.insert_value(info, entity, component.bytes());
            }
        }

        if entering != 0 {
            let capacity = self.config.duplicate_capacity;
            let relocation = self.archetypes.relocate(
                &registry,
                capacity,
                entity,
                record.location,
                record.archetype_mask | entering,
                |id| match builder.find(id) {
                    Some(component) => incoming(registry.expect_info(id), component, capacity),
                    None => Incoming::Empty,
                },
            );
            self.finish_relocation(entity, record.archetype_mask | entering, relocation);
        }
        Ok(())
    }

    /// Detach a component, running its destructor. Returns whether the
    /// entity had it.
    pub fn remove_component(&mut self, entity: Entity, id: ComponentId) -> Result<bool, WorldError> {
        self.remove_components(entity, &[id])
            .map(|removed| removed > 0)
    }

    /// Detach several components; archetype data migrates once. Returns how
    /// many were present.
    pub fn remove_components(
        &mut self,
        entity: Entity,
        ids: &[ComponentId],
    ) -> Result<usize, WorldError> {
        let record = self.record(entity)?.clone();
        for &id in ids {
            self.attachable(id)?;
        }

        let registry = Arc::clone(&self.registry);
        let mut leaving = 0u32;
        let mut removed = 0;
        for &id in ids {
            let info = registry.expect_info(id);
            match id.storage() {
                StorageClass::Archetype => {
                    if record.archetype_mask & bit32(id) != 0 && leaving & bit32(id) == 0 {
                        leaving |= bit32(id);
                        removed += 1;
                    }
                }
                StorageClass::Packed => {
                    let row = self.entities.get(entity).and_then(|r| r.packed_row(id.index()));
                    if let Some(row) = row {
                        self.remove_packed_row(&registry, id.index(), row);
                        removed += 1;
                    }
                }
                StorageClass::Indexed => {
                    let Some(record) = self.entities.get_mut(entity) else {
                        continue;
                    };
                    if record.indexed_mask & bit64(id) != 0 {
                        record.indexed_mask &= !bit64(id);
                        let storage = &mut self.indexed[id.index()];
                        storage.column_mut().destroy_row(entity.index(), info);
                        storage.clear(entity);
                        removed += 1;
                    }
                }
                StorageClass::Local => unreachable!("rejected by attachable"),
            }
        }

        if leaving != 0 {
            if let Some(location) = record.location {
                if let Some(bucket) = self.archetypes.bucket_mut(location.archetype) {
                    for id in bucket.components().to_vec() {
                        if leaving & bit32(id) != 0 {
                            if let Some(column) = bucket.column_mut(id) {
                                column.destroy_row(location.row, registry.expect_info(id));
                            }
                        }
                    }
                }
            }
            let mask = record.archetype_mask & !leaving;
            let relocation = self.archetypes.relocate(
                &registry,
                self.config.duplicate_capacity,
                entity,
                record.location,
                mask,
                |_| Incoming::Empty,
            );
            self.finish_relocation(entity, mask, relocation);
        }
        Ok(removed)
    }

    pub fn remove<T: Component>(&mut self, entity: Entity) -> Result<bool, WorldError> {
        let id = self.type_id::<T>()?;
        self.remove_component(entity, id)
    }

    /// Whether `entity` has `id`. Context locals are never attached.
    pub fn has_component(&self, entity: Entity, id: ComponentId) -> bool {
        let Some(record) = self.entities.get(entity) else {
            return false;
        };
        match id.storage() {
            StorageClass::Archetype => record.archetype_mask & bit32(id) != 0,
            StorageClass::Packed => record.packed_mask & bit64(id) != 0,
            StorageClass::Indexed => record.indexed_mask & bit64(id) != 0,
            StorageClass::Local => false,
        }
    }

    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.registry
            .id_of::<T>()
            .is_some_and(|id| self.has_component(entity, id))
    }

    /// Raw bytes of a non-duplicate component.
    pub fn component_bytes(&self, entity: Entity, id: ComponentId) -> Option<&[u8]> {
        if !self.has_component(entity, id) {
            return None;
        }
        let record = self.entities.get(entity)?;
        match id.storage() {
            StorageClass::Archetype => {
                let location = record.location?;
                self.archetypes
                    .bucket(location.archetype)?
                    .column(id)?
                    .value(location.row)
            }
            StorageClass::Packed => {
                let row = record.packed_row(id.index())?;
                self.packed[id.index()].column().value(row)
            }
            StorageClass::Indexed => self.indexed[id.index()].column().value(entity.index()),
            StorageClass::Local => None,
        }
    }

    pub fn component_bytes_mut(&mut self, entity: Entity, id: ComponentId) -> Option<&mut [u8]> {
        self.column_slot_mut(entity, id)
            .and_then(|(column, row)| column.value_mut(row))
    }

    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        let id = self.registry.id_of::<T>()?;
        self.component_bytes(entity, id).map(bytemuck::from_bytes)
    }

    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        let id = self.registry.id_of::<T>()?;
        self.component_bytes_mut(entity, id)
            .map(bytemuck::from_bytes_mut)
    }

    // ---------------------------------------------------------------------
    // Duplicate components
    // ---------------------------------------------------------------------

    /// Append `count` elements (packed back to back) to a duplicate
    /// component, attaching it first if needed.
    pub fn add_duplicate_bytes(
        &mut self,
        entity: Entity,
        id: ComponentId,
        bytes: &[u8],
        count: usize,
    ) -> Result<(), WorldError> {
        let info = self.attachable(id)?;
        if !id.is_duplicate() {
            return Err(WorldError::NotDuplicate { id });
        }
        check_size(&info, bytes.len(), count)?;
        let record = self.record(entity)?.clone();

        if id.storage() == StorageClass::Archetype && record.archetype_mask & bit32(id) == 0 {
            let builder = EntityBuilder::new().with_duplicate_bytes(id, bytes, count);
            return self.add_components(entity, &builder);
        }
        self.append_duplicates(&info, entity, bytes, count);
        Ok(())
    }

    pub fn add_duplicates<T: Component>(
        &mut self,
        entity: Entity,
        elements: &[T],
    ) -> Result<(), WorldError> {
        let id = self.type_id::<T>()?;
        self.add_duplicate_bytes(entity, id, bytemuck::cast_slice(elements), elements.len())
    }

    /// Remove `count` elements starting at `start`, keeping the order of the
    /// rest. Removing the whole array detaches the component.
    pub fn remove_duplicates(
        &mut self,
        entity: Entity,
        id: ComponentId,
        start: usize,
        count: usize,
    ) -> Result<(), WorldError> {
        let info = self.attachable(id)?;
        if !id.is_duplicate() {
            return Err(WorldError::NotDuplicate { id });
        }
        self.record(entity)?;
        let Some(array) = self.duplicates_mut(entity, id) else {
            return Ok(());
        };

        let end = start + count;
        if end > array.len() {
            return Err(WorldError::ElementRange {
                id,
                start,
                end,
                len: array.len(),
            });
        }
        if start == 0 && end == array.len() {
            return self.remove_component(entity, id).map(|_| ());
        }
        let stride = array.stride();
        info.destroy(&mut array.bytes_mut()[start * stride..end * stride]);
        array.remove_range(start, count);
        Ok(())
    }

    pub fn duplicates(&self, entity: Entity, id: ComponentId) -> Option<&ByteColumn> {
        if !id.is_duplicate() || !self.has_component(entity, id) {
            return None;
        }
        let record = self.entities.get(entity)?;
        match id.storage() {
            StorageClass::Archetype => {
                let location = record.location?;
                self.archetypes
                    .bucket(location.archetype)?
                    .column(id)?
                    .array(location.row)
            }
            StorageClass::Packed => {
                let row = record.packed_row(id.index())?;
                self.packed[id.index()].column().array(row)
            }
            StorageClass::Indexed => self.indexed[id.index()].column().array(entity.index()),
            StorageClass::Local => None,
        }
    }

    pub fn duplicates_mut(&mut self, entity: Entity, id: ComponentId) -> Option<&mut ByteColumn> {
        if !id.is_duplicate() {
            return None;
        }
        self.column_slot_mut(entity, id)
            .and_then(|(column, row)| column.array_mut(row))
    }

    pub fn duplicates_of<T: Component>(&self, entity: Entity) -> Option<&[T]> {
        let id = self.registry.id_of::<T>()?;
        self.duplicates(entity, id).map(ByteColumn::as_slice)
    }

    // ---------------------------------------------------------------------
    // Context locals
    // ---------------------------------------------------------------------

    pub fn local_bytes(&self, id: ComponentId) -> Option<&[u8]> {
        let info = self.local_info(id).ok()?;
        (!id.is_duplicate()).then(|| self.locals.bytes(info))
    }

    pub fn local_bytes_mut(&mut self, id: ComponentId) -> Option<&mut [u8]> {
        let registry = Arc::clone(&self.registry);
        let info = registry.info(id)?;
        if id.storage() != StorageClass::Local || id.is_duplicate() {
            return None;
        }
        Some(self.locals.bytes_mut(info))
    }

    pub fn local<T: Component>(&self) -> Option<&T> {
        let id = self.registry.id_of::<T>()?;
        self.local_bytes(id).map(bytemuck::from_bytes)
    }

    pub fn local_mut<T: Component>(&mut self) -> Option<&mut T> {
        let id = self.registry.id_of::<T>()?;
        self.local_bytes_mut(id).map(bytemuck::from_bytes_mut)
    }

    /// Replace a local value, running the destructor on the old one.
    pub fn set_local<T: Component>(&mut self, value: T) -> Result<(), WorldError> {
        let id = self.type_id::<T>()?;
        let registry = Arc::clone(&self.registry);
        let info = self.local_info(id)?.clone();
        if id.is_duplicate() {
            return Err(WorldError::NotLocal { id });
        }
        let slot = self.locals.bytes_mut(&info);
        if id.has_destructor() {
            registry.expect_info(id).destroy(slot);
        }
        slot.copy_from_slice(bytemuck::bytes_of(&value));
        Ok(())
    }

    pub fn local_array(&self, id: ComponentId) -> Option<&ByteColumn> {
        let info = self.local_info(id).ok()?;
        self.locals.array(info)
    }

    pub fn local_array_mut(&mut self, id: ComponentId) -> Option<&mut ByteColumn> {
        let registry = Arc::clone(&self.registry);
        let info = registry.info(id)?;
        if id.storage() != StorageClass::Local {
            return None;
        }
        self.locals.array_mut(info)
    }

    // ---------------------------------------------------------------------
    // Storage access
    // ---------------------------------------------------------------------

    /// Buckets holding every archetype component in `components`, with the
    /// column index of each (in `components` order).
    pub fn archetype_pointers(&self, components: &[ComponentId]) -> Vec<ArchetypePointer> {
        self.archetypes.pointers(components)
    }

    pub fn bucket(&self, id: ArchetypeId) -> Option<&ArchetypeBucket> {
        self.archetypes.bucket(id)
    }

    pub fn buckets(&self) -> &[ArchetypeBucket] {
        self.archetypes.buckets()
    }

    pub fn location(&self, entity: Entity) -> Option<Location> {
        self.entities.get(entity)?.location
    }

    pub fn packed_storage(&self, id: ComponentId) -> Option<&PackedStorage> {
        (id.storage() == StorageClass::Packed)
            .then(|| self.packed.get(id.index()))
            .flatten()
    }

    pub fn indexed_storage(&self, id: ComponentId) -> Option<&IndexedStorage> {
        (id.storage() == StorageClass::Indexed)
            .then(|| self.indexed.get(id.index()))
            .flatten()
    }

    pub(crate) fn packed_row(&self, entity: Entity, id: ComponentId) -> Option<usize> {
        self.entities.get(entity)?.packed_row(id.index())
    }

    // ---------------------------------------------------------------------
    // Links
    // ---------------------------------------------------------------------

    pub fn define_link(&mut self, link: Link) -> LinkId {
        self.links.define(link)
    }

    pub fn links(&self) -> &LinkTable {
        &self.links
    }

    /// Entities linked to `entity`, which sits on `side` of `id`.
    pub fn linked(&self, entity: Entity, id: LinkId, side: Side) -> &[Entity] {
        self.links.partners(entity, id, side)
    }

    pub fn is_linked(&self, left: Entity, id: LinkId, right: Entity) -> bool {
        self.links.is_linked(left, id, right)
    }

    pub fn link(&mut self, left: Entity, id: LinkId, right: Entity) -> Result<(), WorldError> {
        self.link_with(left, None, id, right, None)
    }

    /// Link `left` to `right` and attach each end's association. The data
    /// replaces an end's default component value, or is handed to its add
    /// callback. When an end only holds one entity, the partner it held
    /// before is released (and destroyed if its end cascades).
    pub fn link_with(
        &mut self,
        left: Entity,
        left_data: Option<&[u8]>,
        id: LinkId,
        right: Entity,
        right_data: Option<&[u8]>,
    ) -> Result<(), WorldError> {
        let link = self.link_type(id)?;
        self.record(left)?;
        self.record(right)?;
        let Some(displaced) = self.links.insert(id, left, right) else {
            return Ok(());
        };

        let mut result = Ok(());
        for (previous, side, entity, data) in [
            (displaced[0], Side::Left, left, left_data),
            (displaced[1], Side::Right, right, right_data),
        ] {
            let end = link.end(side);
            if previous.is_some() {
                if let Associate::Callback { remove, .. } = end.associate() {
                    remove(self, entity);
                }
            }
            result = result.and(self.associate(end, entity, data));
            if let Some(previous) = previous {
                result = result.and(self.release(link.end(side.opposite()), previous, false));
            }
        }
        result
    }

    /// Remove one pairing, releasing both ends.
    pub fn unlink(&mut self, left: Entity, id: LinkId, right: Entity) -> Result<(), WorldError> {
        let link = self.link_type(id)?;
        if !self.links.remove(id, left, right) {
            return Ok(());
        }
        let first = self.release(link.end(Side::Left), left, false);
        first.and(self.release(link.end(Side::Right), right, false))
    }

    /// Remove every `id` link `entity` holds on `side`.
    pub fn unlink_entity(&mut self, entity: Entity, id: LinkId, side: Side) -> Result<(), WorldError> {
        self.unlink_side(entity, id, side, false)
    }

    pub fn unlink_all(&mut self, entity: Entity) -> Result<(), WorldError> {
        self.unlink_every(entity, false)
    }

    /// Remove every link directly between `a` and `b`, of any type.
    pub fn unlink_between(&mut self, a: Entity, b: Entity) -> Result<(), WorldError> {
        let mut result = Ok(());
        for (id, side) in self.links.keys(a) {
            let removed = match side {
                Side::Left => self.unlink(a, id, b),
                Side::Right => self.unlink(b, id, a),
            };
            result = result.and(removed);
        }
        result
    }

    /// Remove every pairing of a link type.
    pub fn clear_link(&mut self, id: LinkId) -> Result<(), WorldError> {
        self.link_type(id)?;
        let mut result = Ok(());
        for entity in self.links.holders(id, Side::Left) {
            result = result.and(self.unlink_side(entity, id, Side::Left, false));
        }
        result
    }

    fn link_type(&self, id: LinkId) -> Result<Link, WorldError> {
        self.links
            .get(id)
            .cloned()
            .ok_or(WorldError::UnknownLink { id })
    }

    /// `dying` marks `entity` as about to be destroyed; see `release`.
    fn unlink_side(
        &mut self,
        entity: Entity,
        id: LinkId,
        side: Side,
        dying: bool,
    ) -> Result<(), WorldError> {
        let link = self.link_type(id)?;
        let partners = self.links.take(entity, id, side);
        if partners.is_empty() {
            return Ok(());
        }
        let mut result = Ok(());
        for partner in partners {
            result = result.and(self.release(link.end(side.opposite()), partner, false));
        }
        result.and(self.release(link.end(side), entity, dying))
    }

    fn unlink_every(&mut self, entity: Entity, dying: bool) -> Result<(), WorldError> {
        let mut result = Ok(());
        for (id, side) in self.links.keys(entity) {
            result = result.and(self.unlink_side(entity, id, side, dying));
        }
        result
    }

    fn associate(&mut self, end: &LinkEnd, entity: Entity, data: Option<&[u8]>) -> Result<(), WorldError> {
        if !self.is_alive(entity) {
            return Ok(());
        }
        match end.associate() {
            Associate::None => Ok(()),
            Associate::Component { id, default } => {
                self.add_component(entity, *id, data.unwrap_or(default.as_slice()))
            }
            Associate::Callback { add, .. } => {
                add(self, entity, data);
                Ok(())
            }
        }
    }

    /// Undo an end's association on an entity that lost a link. A dying
    /// entity only gets its remove callback; its components go with it.
    fn release(&mut self, end: &LinkEnd, entity: Entity, dying: bool) -> Result<(), WorldError> {
        if !self.is_alive(entity) {
            return Ok(());
        }
        match end.associate() {
            Associate::Callback { remove, .. } => remove(self, entity),
            Associate::Component { id, .. } if !dying => {
                self.remove_component(entity, *id)?;
            }
            Associate::Component { .. } | Associate::None => {}
        }
        if end.is_cascading() && !dying && self.is_alive(entity) {
            self.destroy_entity(entity)?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Registry and deferred mutations
    // ---------------------------------------------------------------------

    pub fn entity_registry(&self) -> &EntityRegistry {
        &self.ids
    }

    pub fn entity_registry_mut(&mut self) -> &mut EntityRegistry {
        &mut self.ids
    }

    pub fn mutations(&self) -> &MutationQueue {
        &self.mutations
    }

    /// Apply everything staged in the mutation queue.
    ///
    /// The whole batch is applied. A mutation that fails is logged and
    /// reported in [`AppliedMutations::failures`]; the rest still run and
    /// the queue is left empty.
    pub fn apply_mutations(&mut self) -> AppliedMutations {
        let staged = self.mutations.take();
        let created = self.create_entities(staged.create);
        let mut failures = Vec::new();
        let mut note = |result: Result<(), WorldError>| {
            if let Err(err) = result {
                tracing::warn!(%err, "deferred mutation failed");
                failures.push(err);
            }
        };

        for (proxy, id, acquire) in staged.reregister {
            let entity = proxy.resolve(&created);
            note(self.record(entity).map(|_| ()));
            if self.is_alive(entity) {
                self.ids.reregister(entity, id, acquire);
            }
        }
        for proxy in staged.register {
            let entity = proxy.resolve(&created);
            note(self.record(entity).map(|_| ()));
            if self.is_alive(entity) {
                self.ids.register(entity);
            }
        }
        for StagedLink {
            left,
            left_data,
            id,
            right,
            right_data,
        } in staged.link
        {
            note(self.link_with(
                left.resolve(&created),
                left_data.as_deref(),
                id,
                right.resolve(&created),
                right_data.as_deref(),
            ));
        }
        for (proxy, id) in staged.remove {
            note(self.remove_component(proxy.resolve(&created), id).map(|_| ()));
        }
        for (proxy, components) in staged.add {
            note(self.add_components(proxy.resolve(&created), &components));
        }
        for callback in staged.callbacks {
            callback(self, &created);
        }
        for unlink in staged.unlink {
            note(match unlink {
                StagedUnlink::Pair(left, id, right) => {
                    self.unlink(left.resolve(&created), id, right.resolve(&created))
                }
                StagedUnlink::Side(entity, id, side) => {
                    self.unlink_entity(entity.resolve(&created), id, side)
                }
                StagedUnlink::All(entity) => self.unlink_all(entity.resolve(&created)),
                StagedUnlink::Between(a, b) => {
                    self.unlink_between(a.resolve(&created), b.resolve(&created))
                }
                StagedUnlink::Link(id) => self.clear_link(id),
            });
        }
        for proxy in staged.deregister {
            self.ids.deregister(proxy.resolve(&created));
        }
        for proxy in staged.destroy {
            let entity = proxy.resolve(&created);
            if self.is_alive(entity) {
                note(self.destroy_entity(entity));
            }
        }

        if !created.is_empty() || !failures.is_empty() {
            tracing::trace!(created = created.len(), failed = failures.len(), "applied mutations");
        }
        AppliedMutations { created, failures }
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn record(&self, entity: Entity) -> Result<&EntityRecord, WorldError> {
        self.entities
            .get(entity)
            .ok_or(WorldError::DeadEntity { entity })
    }

    fn type_id<T: Component>(&self) -> Result<ComponentId, WorldError> {
        self.registry
            .id_of::<T>()
            .ok_or(WorldError::UnregisteredType { name: T::NAME })
    }

    /// Registered, entity-attachable component info.
    fn attachable(&self, id: ComponentId) -> Result<ComponentInfo, WorldError> {
        let info = self
            .registry
            .info(id)
            .ok_or(WorldError::UnknownComponent { id })?;
        if id.storage() == StorageClass::Local {
            return Err(WorldError::LocalComponent { id });
        }
        Ok(info.clone())
    }

    fn local_info(&self, id: ComponentId) -> Result<&ComponentInfo, WorldError> {
        let info = self
            .registry
            .info(id)
            .ok_or(WorldError::UnknownComponent { id })?;
        if id.storage() != StorageClass::Local {
            return Err(WorldError::NotLocal { id });
        }
        Ok(info)
    }

    fn column_slot_mut(
        &mut self,
        entity: Entity,
        id: ComponentId,
    ) -> Option<(&mut crate::ecs::Column, usize)> {
        if !self.has_component(entity, id) {
            return None;
        }
        let record = self.entities.get(entity)?;
        match id.storage() {
            StorageClass::Archetype => {
                let location = record.location?;
                let column = self.archetypes.bucket_mut(location.archetype)?.column_mut(id)?;
                Some((column, location.row))
            }
            StorageClass::Packed => {
                let row = record.packed_row(id.index())?;
                Some((self.packed[id.index()].column_mut(), row))
            }
            StorageClass::Indexed => {
                Some((self.indexed[id.index()].column_mut(), entity.index()))
            }
            StorageClass::Local => None,
        }
    }

    /// Write a non-duplicate value, replacing (and destroying) any previous
    /// one. Archetype components not yet present migrate the entity.
    fn insert_value(&mut self, info: &ComponentInfo, entity: Entity, bytes: &[u8]) {
        let id = info.id();
        if let Some((column, row)) = self.column_slot_mut(entity, id) {
            column.destroy_row(row, info);
            if let Some(slot) = column.value_mut(row) {
                slot.copy_from_slice(bytes);
            }
            return;
        }

        match id.storage() {
            StorageClass::Archetype => {
                let Some(record) = self.entities.get(entity) else {
                    return;
                };
                let (location, mask) = (record.location, record.archetype_mask | bit32(id));
                let registry = Arc::clone(&self.registry);
                let relocation = self.archetypes.relocate(
                    &registry,
                    self.config.duplicate_capacity,
                    entity,
                    location,
                    mask,
                    |_| Incoming::Bytes(bytes),
                );
                self.finish_relocation(entity, mask, relocation);
            }
            StorageClass::Packed => {
                let row = self.packed[id.index()].push_bytes(entity, bytes);
                if let Some(record) = self.entities.get_mut(entity) {
                    record.set_packed_row(id.index(), row);
                }
            }
            StorageClass::Indexed => {
                self.indexed[id.index()].set_bytes(entity, bytes);
                if let Some(record) = self.entities.get_mut(entity) {
                    record.indexed_mask |= bit64(id);
                }
            }
            StorageClass::Local => {}
        }
    }

    /// Append elements to a present duplicate component, or attach a new
    /// packed/indexed one. Archetype attachment goes through relocation.
    fn append_duplicates(&mut self, info: &ComponentInfo, entity: Entity, bytes: &[u8], count: usize) {
        let id = info.id();
        if let Some(array) = self.duplicates_mut(entity, id) {
            array.extend_from_bytes(bytes, count);
            return;
        }
        let mut array = ByteColumn::with_capacity(
            info.size(),
            info.align(),
            self.config.duplicate_capacity.max(count),
        );
        array.extend_from_bytes(bytes, count);

        match id.storage() {
            StorageClass::Packed => {
                let row = self.packed[id.index()].push_array(entity, array);
                if let Some(record) = self.entities.get_mut(entity) {
                    record.set_packed_row(id.index(), row);
                }
            }
            StorageClass::Indexed => {
                self.indexed[id.index()].set_array(entity, array);
                if let Some(record) = self.entities.get_mut(entity) {
                    record.indexed_mask |= bit64(id);
                }
            }
            StorageClass::Archetype | StorageClass::Local => {}
        }
    }

    fn remove_packed_row(&mut self, registry: &ComponentRegistry, index: usize, row: usize) {
        let info = &registry.class(StorageClass::Packed)[index];
        let storage = &mut self.packed[index];
        storage.column_mut().destroy_row(row, info);
        let owner = storage.entities()[row];
        if let Some(moved) = storage.swap_remove(row) {
            if let Some(record) = self.entities.get_mut(moved) {
                record.set_packed_row(index, row);
            }
        }
        if let Some(record) = self.entities.get_mut(owner) {
            record.packed_mask &= !(1 << index);
        }
    }

    fn finish_relocation(&mut self, entity: Entity, mask: u32, relocation: Relocation) {
        if let Some((moved, row)) = relocation.moved {
            if let Some(record) = self.entities.get_mut(moved) {
                if let Some(location) = record.location.as_mut() {
                    location.row = row;
                }
            }
        }
        if let Some(record) = self.entities.get_mut(entity) {
            record.location = relocation.to;
            record.archetype_mask = mask;
        }
    }

    fn set_location(&mut self, entity: Entity, location: Option<Location>) {
        if let Some(record) = self.entities.get_mut(entity) {
            record.location = location;
        }
    }
}

impl Drop for World {
    fn drop(&mut self) {
        let registry = Arc::clone(&self.registry);
        if !registry.iter().any(|info| info.id().has_destructor()) {
            return;
        }
        for bucket in self.archetypes.buckets_mut() {
            for row in 0..bucket.len() {
                bucket.destroy_row(row, &registry);
            }
        }
        for (storage, info) in self
            .packed
            .iter_mut()
            .zip(registry.class(StorageClass::Packed))
        {
            for row in 0..storage.len() {
                storage.column_mut().destroy_row(row, info);
            }
        }
        let live: Vec<(Entity, u64)> = self
            .entities
            .alive()
            .filter_map(|entity| Some((entity, self.entities.get(entity)?.indexed_mask)))
            .collect();
        for (entity, mask) in live {
            for index in mask_bits(mask) {
                let info = &registry.class(StorageClass::Indexed)[index];
                self.indexed[index]
                    .column_mut()
                    .destroy_row(entity.index(), info);
            }
        }
        self.locals.destroy(&registry);
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.entities.len())
            .field("buckets", &self.archetypes.buckets().len())
            .field("registry", &self.registry)
            .finish()
    }
}

fn incoming<'a>(info: &ComponentInfo, component: &'a ComponentBytes, capacity: usize) -> Incoming<'a> {
    if info.id().is_duplicate() {
        let mut array =
            ByteColumn::with_capacity(info.size(), info.align(), capacity.max(component.count()));
        array.extend_from_bytes(component.bytes(), component.count());
        Incoming::Array(array)
    } else {
        Incoming::Bytes(component.bytes())
    }
}

fn check_size(info: &ComponentInfo, actual: usize, count: usize) -> Result<(), WorldError> {
    let expected = info.size() * count;
    if actual != expected {
        return Err(WorldError::SizeMismatch {
            id: info.id(),
            expected,
            actual,
        });
    }
    Ok(())
}

#[inline]
fn bit32(id: ComponentId) -> u32 {
    1 << id.index()
}

#[inline]
fn bit64(id: ComponentId) -> u64 {
    1 << id.index()
}

fn mask_bits(mask: u64) -> impl Iterator<Item = usize> {
    (0..64).filter(move |&bit| mask & (1 << bit) != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{ComponentDescriptor, ComponentRegistry, ProxyEntity};
    use bytemuck::{Pod, Zeroable};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct A {
        v: [i32; 1],
    }
    crate::define_component!(A, "A");

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct B {
        v: [i32; 2],
    }
    crate::define_component!(B, "B");

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Health(f32);
    crate::define_component!(Health, "Health", Packed);

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Cell(u32);
    crate::define_component!(Cell, "Cell", Indexed);

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Waypoint {
        x: f32,
        y: f32,
    }
    crate::define_component!(Waypoint, "Waypoint", Packed, DUPLICATE);

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Gravity(f32);
    crate::define_component!(Gravity, "Gravity", Local);

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Attached(u32);
    crate::define_component!(Attached, "Attached", Packed);

    fn registry() -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        registry.register::<A>().unwrap();
        registry.register::<B>().unwrap();
        registry.register::<Health>().unwrap();
        registry.register::<Cell>().unwrap();
        registry.register::<Waypoint>().unwrap();
        registry.register::<Gravity>().unwrap();
        registry.register::<Attached>().unwrap();
        registry
    }

    fn world() -> World {
        World::new(Arc::new(registry()))
    }

    #[test]
    fn migration_keeps_payload() {
        let mut world = world();
        let entity = world.create_entity();
        world.add(entity, A { v: [5] }).unwrap();
        world.add(entity, B { v: [1, 2] }).unwrap();

        let registry = world.registry().clone();
        let a = registry.id_of::<A>().unwrap();
        let b = registry.id_of::<B>().unwrap();

        let location = world.location(entity).unwrap();
        assert_eq!(
            location.archetype,
            ArchetypeId::from_ordinals(&[a.index(), b.index()])
        );
        assert_eq!(world.get::<A>(entity), Some(&A { v: [5] }));
        assert_eq!(world.get::<B>(entity), Some(&B { v: [1, 2] }));

        assert!(world.remove::<B>(entity).unwrap());
        let location = world.location(entity).unwrap();
        assert_eq!(location.archetype, ArchetypeId::from_ordinals(&[a.index()]));
        assert_eq!(world.get::<A>(entity), Some(&A { v: [5] }));
        assert!(!world.has::<B>(entity));
        assert!(!world.remove::<B>(entity).unwrap());
    }

    #[test]
    fn buckets_stay_dense() {
        let mut world = world();
        let a = world_id::<A>(&world);
        let entities: Vec<_> = (0..4)
            .map(|i| {
                world
                    .spawn(&EntityBuilder::new().with_component(a, A { v: [i] }))
                    .unwrap()
            })
            .collect();

        world.add(entities[1], B { v: [7, 7] }).unwrap();

        let a_only = world.location(entities[0]).unwrap().archetype;
        let bucket = world.bucket(a_only).unwrap();
        assert_eq!(bucket.len(), 3);
        // The last entity was swapped into the vacated row.
        assert_eq!(bucket.entities(), &[entities[0], entities[3], entities[2]]);
        assert_eq!(world.location(entities[3]).unwrap().row, 1);

        for (i, &entity) in entities.iter().enumerate() {
            assert_eq!(world.get::<A>(entity), Some(&A { v: [i as i32] }));
        }
    }

    fn world_id<T: Component>(world: &World) -> ComponentId {
        world.registry().id_of::<T>().unwrap()
    }

    #[test]
    fn packed_and_indexed_are_independent() {
        let mut world = world();
        let first = world.create_entity();
        let second = world.create_entity();
        for &entity in &[first, second] {
            world.add(entity, Health(entity.index() as f32 + 1.0)).unwrap();
            world.add(entity, Cell(entity.index() as u32 * 10)).unwrap();
        }

        assert!(world.remove::<Health>(first).unwrap());
        assert_eq!(world.get::<Health>(first), None);
        assert_eq!(world.get::<Cell>(first), Some(&Cell(0)));
        assert_eq!(world.get::<Health>(second), Some(&Health(2.0)));
        assert_eq!(world.get::<Cell>(second), Some(&Cell(10)));

        let health = world.packed_storage(world_id::<Health>(&world)).unwrap();
        assert_eq!(health.entities(), &[second]);
    }

    #[test]
    fn indexed_slots_are_absent_until_set() {
        let mut world = world();
        let entities = world.create_entities(40);
        world.add(entities[33], Cell(3)).unwrap();

        assert_eq!(world.get::<Cell>(entities[33]), Some(&Cell(3)));
        assert_eq!(world.get::<Cell>(entities[2]), None);

        let storage = world.indexed_storage(world_id::<Cell>(&world)).unwrap();
        assert!(storage.len() >= 34);
    }

    #[test]
    fn duplicates_append_and_remove_ranges() {
        let mut world = world();
        let entity = world.create_entity();
        let points: Vec<Waypoint> = (0..5)
            .map(|i| Waypoint {
                x: i as f32,
                y: 0.0,
            })
            .collect();
        world.add_duplicates(entity, &points[..3]).unwrap();
        world.add_duplicates(entity, &points[3..]).unwrap();
        assert_eq!(world.duplicates_of::<Waypoint>(entity), Some(&points[..]));

        let id = world_id::<Waypoint>(&world);
        world.remove_duplicates(entity, id, 1, 2).unwrap();
        let remaining: Vec<f32> = world
            .duplicates_of::<Waypoint>(entity)
            .unwrap()
            .iter()
            .map(|w| w.x)
            .collect();
        assert_eq!(remaining, vec![0.0, 3.0, 4.0]);

        assert_eq!(
            world.remove_duplicates(entity, id, 2, 5),
            Err(WorldError::ElementRange {
                id,
                start: 2,
                end: 7,
                len: 3
            })
        );

        world.remove_duplicates(entity, id, 0, 3).unwrap();
        assert!(!world.has::<Waypoint>(entity));
        assert_eq!(world.duplicates_of::<Waypoint>(entity), None);
    }

    #[test]
    fn locals_live_on_the_world() {
        let mut world = world();
        assert_eq!(world.local::<Gravity>(), Some(&Gravity(0.0)));
        world.set_local(Gravity(-9.8)).unwrap();
        assert_eq!(world.local::<Gravity>(), Some(&Gravity(-9.8)));
        world.local_mut::<Gravity>().unwrap().0 = -1.6;
        assert_eq!(world.local::<Gravity>(), Some(&Gravity(-1.6)));

        let entity = world.create_entity();
        let id = world_id::<Gravity>(&world);
        assert_eq!(
            world.add(entity, Gravity(1.0)),
            Err(WorldError::LocalComponent { id })
        );
        assert!(!world.has_component(entity, id));
    }

    #[test]
    fn destructors_run_once_per_value() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let mut registry = ComponentRegistry::new();
        let counter = dropped.clone();
        registry
            .register_with_destructor::<A>(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        registry.register::<B>().unwrap();
        let mut world = World::new(Arc::new(registry));

        let e0 = world.create_entity();
        let e1 = world.create_entity();
        let e2 = world.create_entity();
        for &entity in &[e0, e1, e2] {
            world.add(entity, A { v: [1] }).unwrap();
        }

        // Migration moves the value without tearing it down.
        world.add(e0, B { v: [0, 0] }).unwrap();
        assert_eq!(dropped.load(Ordering::SeqCst), 0);

        // Overwriting tears down the old value.
        world.add(e0, A { v: [2] }).unwrap();
        assert_eq!(dropped.load(Ordering::SeqCst), 1);

        world.remove::<A>(e1).unwrap();
        assert_eq!(dropped.load(Ordering::SeqCst), 2);

        world.destroy_entity(e2).unwrap();
        assert_eq!(dropped.load(Ordering::SeqCst), 3);

        drop(world);
        assert_eq!(dropped.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn freed_indices_are_recycled_most_recent_first() {
        let mut world = world();
        let entities = world.create_entities(3);
        world.destroy_entities(&[entities[0], entities[2]]).unwrap();
        assert_eq!(world.entity_count(), 1);
        assert!(!world.is_alive(entities[0]));

        assert_eq!(world.create_entity(), entities[2]);
        assert_eq!(world.create_entity(), entities[0]);
        let fresh = world.create_entity();
        assert_eq!(fresh.index(), 3);
        assert_eq!(world.destroy_entity(fresh), Ok(()));
    }

    #[test]
    fn dead_entities_are_rejected() {
        let mut world = world();
        let entity = world.create_entity();
        world.destroy_entity(entity).unwrap();
        assert_eq!(
            world.add(entity, A { v: [1] }),
            Err(WorldError::DeadEntity { entity })
        );
        assert_eq!(
            world.destroy_entity(entity),
            Err(WorldError::DeadEntity { entity })
        );
    }

    #[test]
    fn raw_components_check_sizes() {
        let mut registry = registry();
        let blob = registry
            .register_raw(ComponentDescriptor::new("Blob", StorageClass::Packed).layout(12, 4))
            .unwrap();
        let marker = registry
            .register_raw(ComponentDescriptor::new("Marker", StorageClass::Archetype).tag())
            .unwrap();
        let mut world = World::new(Arc::new(registry));
        let entity = world.create_entity();

        assert_eq!(
            world.add_component(entity, blob, &[0; 8]),
            Err(WorldError::SizeMismatch {
                id: blob,
                expected: 12,
                actual: 8
            })
        );
        world.add_component(entity, blob, &[1; 12]).unwrap();
        world.add_tag(entity, marker).unwrap();
        assert_eq!(world.component_bytes(entity, blob), Some(&[1u8; 12][..]));
        assert!(world.has_component(entity, marker));
    }

    #[test]
    fn deferred_mutations_apply_in_order() {
        let mut world = world();
        let existing = world.create_entity();
        world.add(existing, A { v: [1] }).unwrap();
        world.entity_registry_mut().init(100);

        let a = world_id::<A>(&world);
        let b = world_id::<B>(&world);
        let queue = world.mutations();
        let first = queue.create_entities(2);
        let second = ProxyEntity::relative(1);
        queue.add_component(first, a, A { v: [10] });
        queue.add_component(second, b, B { v: [3, 4] });
        queue.register(second);
        queue.remove_component(existing, a);
        queue.callback(move |world, created| {
            let value = world.get::<A>(created[0]).map(|a| a.v[0]).unwrap_or(-1);
            world.set_local(Gravity(value as f32)).unwrap();
        });
        queue.destroy_entity(existing);
        assert!(!queue.is_empty());

        let created = world.apply_mutations().into_result().unwrap();
        assert_eq!(created.len(), 2);
        assert!(world.mutations().is_empty());

        assert_eq!(world.get::<A>(created[0]), Some(&A { v: [10] }));
        assert_eq!(world.get::<B>(created[1]), Some(&B { v: [3, 4] }));
        assert_eq!(world.local::<Gravity>(), Some(&Gravity(10.0)));
        assert_eq!(world.entity_registry().id_of(created[1]), Some(100));
        assert_eq!(world.entity_registry().lookup(100), Some(created[1]));
        assert!(!world.is_alive(existing));
    }

    #[test]
    fn registry_ids_follow_entities() {
        let mut world = world();
        world.entity_registry_mut().init(1);
        let entity = world.create_entity();
        let other = world.create_entity();

        let id = world.entity_registry_mut().register(entity);
        assert_eq!(world.entity_registry_mut().register(entity), id);

        world.entity_registry_mut().reregister(other, id, true);
        assert_eq!(world.entity_registry().lookup(id), Some(other));
        assert_eq!(world.entity_registry().id_of(entity), None);

        world.destroy_entity(other).unwrap();
        assert_eq!(world.entity_registry().lookup(id), None);
        let next = world.entity_registry_mut().register(entity);
        assert_ne!(next, id);
    }

    #[test]
    fn failed_mutation_does_not_drop_the_batch() {
        let mut world = world();
        let a = world_id::<A>(&world);
        let victim = world.create_entity();
        let survivor = world.create_entity();
        let ran = Arc::new(AtomicUsize::new(0));

        let queue = world.mutations();
        queue.add_component_bytes(victim, a, &[0; 1]);
        queue.add_component(survivor, a, A { v: [4] });
        let counter = ran.clone();
        queue.callback(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        queue.destroy_entity(victim);

        let applied = world.apply_mutations();
        assert!(!applied.is_clean());
        assert_eq!(
            applied.failures,
            vec![WorldError::SizeMismatch {
                id: a,
                expected: 4,
                actual: 1
            }]
        );
        assert!(world.mutations().is_empty());
        assert_eq!(world.get::<A>(survivor), Some(&A { v: [4] }));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(!world.is_alive(victim));
    }

    #[test]
    fn links_attach_components_and_release_on_destroy() {
        let mut world = world();
        let attached = world_id::<Attached>(&world);
        let parent = world.define_link(Link::new(
            "parent",
            LinkEnd::one(),
            LinkEnd::many().with_component(attached, Attached(1)),
        ));
        let root = world.create_entity();
        let children = world.create_entities(3);

        world.link(root, parent, children[0]).unwrap();
        world
            .link_with(root, None, parent, children[1], Some(bytemuck::bytes_of(&Attached(7))))
            .unwrap();
        assert_eq!(world.linked(root, parent, Side::Left), &[children[0], children[1]]);
        assert_eq!(world.linked(children[1], parent, Side::Right), &[root]);
        assert_eq!(world.get::<Attached>(children[0]), Some(&Attached(1)));
        assert_eq!(world.get::<Attached>(children[1]), Some(&Attached(7)));
        assert!(!world.has::<Attached>(children[2]));

        world.unlink(root, parent, children[0]).unwrap();
        assert!(!world.is_linked(root, parent, children[0]));
        assert!(!world.has::<Attached>(children[0]));

        world.destroy_entity(root).unwrap();
        assert!(world.is_alive(children[1]));
        assert!(!world.has::<Attached>(children[1]));
        assert!(world.linked(children[1], parent, Side::Right).is_empty());

        let reused = world.create_entity();
        assert_eq!(reused, root);
        assert!(world.links().keys(reused).is_empty());
    }

    #[test]
    fn cascading_ends_take_partners_down() {
        let mut world = world();
        let owner = world.define_link(Link::new("owner", LinkEnd::one(), LinkEnd::many().cascading()));
        let player = world.create_entity();
        let thief = world.create_entity();
        let items = world.create_entities(2);
        for &item in &items {
            world.link(player, owner, item).unwrap();
        }

        // An item only has one owner; taking it leaves the old owner alive.
        world.link(thief, owner, items[0]).unwrap();
        assert_eq!(world.linked(player, owner, Side::Left), &[items[1]]);
        assert_eq!(world.linked(items[0], owner, Side::Right), &[thief]);
        assert!(world.is_alive(player));

        world.destroy_entity(player).unwrap();
        assert!(!world.is_alive(items[1]));
        assert!(world.is_alive(items[0]));

        world.unlink_between(items[0], thief).unwrap();
        assert!(!world.is_alive(items[0]));
        assert!(world.is_alive(thief));
    }

    #[test]
    fn link_callbacks_follow_the_pairing() {
        let mut world = world();
        let follow = world.define_link(Link::new(
            "follow",
            LinkEnd::one().with_callbacks(
                |world, _, _| world.local_mut::<Gravity>().unwrap().0 += 1.0,
                |world, _| world.local_mut::<Gravity>().unwrap().0 -= 1.0,
            ),
            LinkEnd::many(),
        ));
        let follower = world.create_entity();
        let leaders = world.create_entities(2);

        world.link(follower, follow, leaders[0]).unwrap();
        world.link(follower, follow, leaders[1]).unwrap();
        assert_eq!(world.local::<Gravity>(), Some(&Gravity(2.0)));

        world.unlink(follower, follow, leaders[0]).unwrap();
        assert_eq!(world.local::<Gravity>(), Some(&Gravity(1.0)));

        world.destroy_entity(follower).unwrap();
        assert_eq!(world.local::<Gravity>(), Some(&Gravity(0.0)));
        assert!(world.linked(leaders[1], follow, Side::Right).is_empty());
    }

    #[test]
    fn deferred_links_resolve_proxies() {
        let mut world = world();
        let pair = world.define_link(Link::one_to_one("pair"));
        let existing = world.create_entity();

        let queue = world.mutations();
        let first = queue.create_entities(2);
        queue.link(first, pair, ProxyEntity::relative(1));
        queue.link(existing, pair, ProxyEntity::relative(1));
        let applied = world.apply_mutations();
        assert!(applied.is_clean());
        let created = applied.created;
        // One-to-one: the second link took the right end away from `first`.
        assert!(world.is_linked(existing, pair, created[1]));
        assert!(world.links().keys(created[0]).is_empty());

        world.link(created[0], pair, created[1]).unwrap();
        assert!(world.is_linked(created[0], pair, created[1]));
        assert!(world.links().keys(existing).is_empty());

        world.mutations().unlink_all(created[1]);
        assert!(world.apply_mutations().is_clean());
        assert!(!world.is_linked(created[0], pair, created[1]));
        assert!(world.links().keys(created[0]).is_empty());
    }

    #[test]
    fn unknown_links_are_rejected() {
        let mut world = world();
        let other = {
            let mut scratch = World::new(world.registry().clone());
            scratch.define_link(Link::one_to_one("elsewhere"))
        };
        let (a, b) = (world.create_entity(), world.create_entity());
        assert_eq!(world.link(a, other, b), Err(WorldError::UnknownLink { id: other }));
    }
}
