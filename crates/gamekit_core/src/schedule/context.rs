// context.rs - What a running system can see
//
// Storage layout is frozen for the duration of a tick: structural changes
// go through the mutation queue. At tick start the scheduler captures a
// raw view of every column; jobs then borrow slices out of that view.
// Soundness rests on three rules enforced here and in the executor:
//
// 1. Systems that conflict never run at the same time (dependency graph
//    inside a level, access tracker across groups).
// 2. Jobs of one system cover disjoint rows, and anything that could
//    reach outside a job's rows is only available to single-job systems.
// 3. Within one invocation, overlapping borrows of a component are
//    rejected at runtime.

use crate::config::STORAGE_ALIGN;
use crate::ecs::{
    ArchetypeId, ByteColumn, ComponentId, Entity, MutationQueue, RawColumn, StorageClass, World,
};
use crate::schedule::SystemDescriptor;
use crate::time::EcsTime;
use bytemuck::Pod;
use std::cell::RefCell;
use std::collections::HashMap;
use std::mem::{align_of, size_of};
use std::ops::Range;

/// Raw column table captured from a world at tick start.
pub(crate) struct TickView {
    buckets: HashMap<ArchetypeId, Vec<RawColumn>>,
    packed: Vec<RawColumn>,
    indexed: Vec<RawColumn>,
    local_blob: (*mut u8, usize),
    local_arrays: (*mut ByteColumn, usize),
}

// SAFETY: the view only hands out column memory under the access rules
// documented at the top of this module; the pointers themselves are plain
// addresses into heap allocations owned by the world, which outlives the tick.
unsafe impl Send for TickView {}
// SAFETY: see above.
unsafe impl Sync for TickView {}

impl TickView {
    pub(crate) fn capture(world: &mut World) -> Self {
        let buckets = world
            .archetypes
            .buckets_mut()
            .iter_mut()
            .map(|bucket| {
                let id = bucket.id();
                (id, bucket.columns_mut().iter_mut().map(|c| c.raw()).collect())
            })
            .collect();
        let packed = world
            .packed
            .iter_mut()
            .map(|storage| storage.column_mut().raw())
            .collect();
        let indexed = world
            .indexed
            .iter_mut()
            .map(|storage| storage.column_mut().raw())
            .collect();

        Self {
            buckets,
            packed,
            indexed,
            local_blob: world.locals.blob_ptr(),
            local_arrays: world.locals.arrays_ptr(),
        }
    }
}

/// Rows a job covers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Scope {
    /// Systems with neither archetype nor packed components.
    Whole,
    Bucket {
        archetype: ArchetypeId,
        range: Range<usize>,
    },
    Packed {
        id: ComponentId,
        range: Range<usize>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct Borrow {
    id: ComponentId,
    entity: Option<Entity>,
    exclusive: bool,
}

/// Handle passed to a system's update callback.
///
/// Slice accessors (`read`, `write`, and the duplicate variants) cover the
/// current scope: the rows of the current bucket range for archetype
/// components, or of the driving packed range. Other packed and indexed
/// arrays are readable whole; writing them whole, and writing locals, is
/// reserved for systems that run as a single job. When a system is split
/// into several jobs, components it writes are only reachable through the
/// job's own rows.
pub struct SystemContext<'a> {
    world: &'a World,
    view: &'a TickView,
    system: &'a SystemDescriptor,
    scope: Scope,
    time: EcsTime,
    single_job: bool,
    borrows: RefCell<Vec<Borrow>>,
}

impl<'a> SystemContext<'a> {
    pub(crate) fn new(
        world: &'a World,
        view: &'a TickView,
        system: &'a SystemDescriptor,
        scope: Scope,
        time: EcsTime,
        single_job: bool,
    ) -> Self {
        Self {
            world,
            view,
            system,
            scope,
            time,
            single_job,
            borrows: RefCell::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        self.system.name()
    }

    /// Time covered by this run of the system's group.
    pub fn time(&self) -> EcsTime {
        self.time
    }

    /// Bucket being visited, if any.
    pub fn archetype(&self) -> Option<ArchetypeId> {
        match &self.scope {
            Scope::Bucket { archetype, .. } => Some(*archetype),
            _ => None,
        }
    }

    /// Row range of this invocation.
    pub fn range(&self) -> Range<usize> {
        match &self.scope {
            Scope::Whole => 0..0,
            Scope::Bucket { range, .. } | Scope::Packed { range, .. } => range.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.range().len()
    }

    pub fn is_empty(&self) -> bool {
        self.range().is_empty()
    }

    /// Entities of the rows in range.
    pub fn entities(&self) -> &[Entity] {
        match &self.scope {
            Scope::Whole => &[],
            Scope::Bucket { archetype, range } => self
                .world
                .bucket(*archetype)
                .map_or(&[][..], |bucket| &bucket.entities()[range.clone()]),
            Scope::Packed { id, range } => self
                .world
                .packed_storage(*id)
                .map_or(&[][..], |storage| &storage.entities()[range.clone()]),
        }
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.world.is_alive(entity)
    }

    pub fn has_component(&self, entity: Entity, id: ComponentId) -> bool {
        self.world.has_component(entity, id)
    }

    /// Deferred structural changes, applied after the tick.
    pub fn mutations(&self) -> &MutationQueue {
        self.world.mutations()
    }

    /// Values of `id` over the current scope.
    pub fn read<T: Pod>(&self, id: ComponentId) -> &[T] {
        self.check_declared(id, false);
        let (column, range) = self.slice_column(id, false);
        self.borrow(id, None, false);
        // SAFETY: `slice_column` bounds-checked the range; `typed_values`
        // checks the layout; no writer of `id` is live (borrow tracking).
        unsafe { typed_values::<T>(column, range) }
    }

    /// Mutable values of `id` over the current scope.
    #[allow(clippy::mut_from_ref)]
    pub fn write<T: Pod>(&self, id: ComponentId) -> &mut [T] {
        self.check_declared(id, true);
        let (column, range) = self.slice_column(id, true);
        self.borrow(id, None, true);
        // SAFETY: as for `read`; exclusivity within the job comes from the
        // borrow check above. Across jobs, slices of a written component
        // only ever cover the job's own rows (`slice_column`).
        unsafe { typed_values_mut::<T>(column, range) }
    }

    /// Element arrays of a duplicate component over the current scope.
    pub fn read_duplicates(&self, id: ComponentId) -> &[ByteColumn] {
        self.check_declared(id, false);
        let (column, range) = self.slice_column(id, false);
        self.borrow(id, None, false);
        // SAFETY: see `read`.
        unsafe { arrays(column, range) }
    }

    #[allow(clippy::mut_from_ref)]
    pub fn write_duplicates(&self, id: ComponentId) -> &mut [ByteColumn] {
        self.check_declared(id, true);
        let (column, range) = self.slice_column(id, true);
        self.borrow(id, None, true);
        // SAFETY: see `write`.
        unsafe { arrays_mut(column, range) }
    }

    /// One entity's value of any attachable component.
    pub fn component<T: Pod>(&self, entity: Entity, id: ComponentId) -> Option<&T> {
        self.check_declared(id, false);
        assert!(
            !self.shared_with_writers(id) || self.in_scope(entity),
            "{}: {entity} is outside this job's rows and component {id} is written by other jobs",
            self.name()
        );
        let (column, row) = self.entity_slot(entity, id)?;
        self.borrow(id, Some(entity), false);
        // SAFETY: `entity_slot` resolved a live row of this column, and rows
        // other jobs may write were rejected above.
        unsafe { typed_values::<T>(column, row..row + 1) }.first()
    }

    #[allow(clippy::mut_from_ref)]
    pub fn component_mut<T: Pod>(&self, entity: Entity, id: ComponentId) -> Option<&mut T> {
        self.check_declared(id, true);
        assert!(
            self.single_job || self.in_scope(entity),
            "{}: {entity} is outside this job's rows",
            self.name()
        );
        let (column, row) = self.entity_slot(entity, id)?;
        self.borrow(id, Some(entity), true);
        // SAFETY: as for `component`; the row belongs to this job.
        unsafe { typed_values_mut::<T>(column, row..row + 1) }.first_mut()
    }

    pub fn local<T: Pod>(&self, id: ComponentId) -> &T {
        self.check_declared(id, false);
        let range = self.local_range(id);
        self.borrow(id, None, false);
        // SAFETY: the blob outlives the tick and the range lies inside it.
        let bytes = unsafe { std::slice::from_raw_parts(self.view.local_blob.0.add(range.start), range.len()) };
        bytemuck::from_bytes(bytes)
    }

    #[allow(clippy::mut_from_ref)]
    pub fn local_mut<T: Pod>(&self, id: ComponentId) -> &mut T {
        self.check_declared(id, true);
        self.require_single_job(id);
        let range = self.local_range(id);
        self.borrow(id, None, true);
        // SAFETY: single job and exclusive borrow; see `local`.
        let bytes = unsafe {
            std::slice::from_raw_parts_mut(self.view.local_blob.0.add(range.start), range.len())
        };
        bytemuck::from_bytes_mut(bytes)
    }

    pub fn local_array(&self, id: ComponentId) -> &ByteColumn {
        self.check_declared(id, false);
        let slot = self.local_array_slot(id);
        self.borrow(id, None, false);
        // SAFETY: slot is within the captured local array table.
        unsafe { &*self.view.local_arrays.0.add(slot) }
    }

    #[allow(clippy::mut_from_ref)]
    pub fn local_array_mut(&self, id: ComponentId) -> &mut ByteColumn {
        self.check_declared(id, true);
        self.require_single_job(id);
        let slot = self.local_array_slot(id);
        self.borrow(id, None, true);
        // SAFETY: single job and exclusive borrow; see `local_array`.
        unsafe { &mut *self.view.local_arrays.0.add(slot) }
    }

    fn check_declared(&self, id: ComponentId, write: bool) {
        let access = self.system.access();
        let declared = if write {
            access.writes_component(id)
        } else {
            access.reads_component(id)
        };
        assert!(
            declared,
            "{}: component {id} is not declared for {}",
            self.name(),
            if write { "writing" } else { "reading" }
        );
    }

    fn require_single_job(&self, id: ComponentId) {
        assert!(
            self.single_job,
            "{}: component {id} can only be written by a single-job system",
            self.name()
        );
    }

    /// Other jobs of this system may hold rows of `id` mutably.
    fn shared_with_writers(&self, id: ComponentId) -> bool {
        !self.single_job && self.system.access().writes_component(id)
    }

    fn borrow(&self, id: ComponentId, entity: Option<Entity>, exclusive: bool) {
        let mut borrows = self.borrows.borrow_mut();
        let clash = borrows.iter().any(|b| {
            b.id == id
                && (b.exclusive || exclusive)
                && (b.entity.is_none() || entity.is_none() || b.entity == entity)
        });
        assert!(!clash, "{}: component {id} is already borrowed", self.name());
        borrows.push(Borrow {
            id,
            entity,
            exclusive,
        });
    }

    fn in_scope(&self, entity: Entity) -> bool {
        match &self.scope {
            Scope::Whole => true,
            Scope::Bucket { archetype, range } => self
                .world
                .location(entity)
                .is_some_and(|l| l.archetype == *archetype && range.contains(&l.row)),
            Scope::Packed { id, range } => self
                .world
                .packed_row(entity, *id)
                .is_some_and(|row| range.contains(&row)),
        }
    }

    /// Column and row range for slice access to `id` in this scope.
    fn slice_column(&self, id: ComponentId, write: bool) -> (&RawColumn, Range<usize>) {
        match (&self.scope, id.storage()) {
            (Scope::Bucket { archetype, range }, StorageClass::Archetype) => {
                let index = self
                    .world
                    .bucket(*archetype)
                    .and_then(|bucket| bucket.column_index(id))
                    .unwrap_or_else(|| panic!("{}: bucket lacks component {id}", self.name()));
                (&self.view.buckets[archetype][index], range.clone())
            }
            (Scope::Packed { id: driver, range }, StorageClass::Packed) if *driver == id => {
                (&self.view.packed[id.index()], range.clone())
            }
            (_, StorageClass::Packed | StorageClass::Indexed) => {
                if write {
                    self.require_single_job(id);
                }
                assert!(
                    !self.shared_with_writers(id),
                    "{}: component {id} is written by this system and can only be read whole by a single-job system",
                    self.name()
                );
                let column = if id.storage() == StorageClass::Packed {
                    &self.view.packed[id.index()]
                } else {
                    &self.view.indexed[id.index()]
                };
                (column, 0..raw_len(column))
            }
            _ => panic!(
                "{}: component {id} has no rows in this scope",
                self.name()
            ),
        }
    }

    fn entity_slot(&self, entity: Entity, id: ComponentId) -> Option<(&RawColumn, usize)> {
        if !self.world.has_component(entity, id) {
            return None;
        }
        match id.storage() {
            StorageClass::Archetype => {
                let location = self.world.location(entity)?;
                let index = self.world.bucket(location.archetype)?.column_index(id)?;
                Some((&self.view.buckets[&location.archetype][index], location.row))
            }
            StorageClass::Packed => {
                let row = self.world.packed_row(entity, id)?;
                Some((&self.view.packed[id.index()], row))
            }
            StorageClass::Indexed => Some((&self.view.indexed[id.index()], entity.index())),
            StorageClass::Local => None,
        }
    }

    fn local_range(&self, id: ComponentId) -> Range<usize> {
        let info = self
            .world
            .registry()
            .info(id)
            .filter(|info| info.id().storage() == StorageClass::Local && !info.id().is_duplicate())
            .unwrap_or_else(|| panic!("{}: component {id} is not a local value", self.name()));
        let start = info.local_slot().unwrap_or(0);
        let range = start..start + info.size();
        assert!(range.end <= self.view.local_blob.1);
        range
    }

    fn local_array_slot(&self, id: ComponentId) -> usize {
        let slot = self
            .world
            .registry()
            .info(id)
            .filter(|info| info.id().storage() == StorageClass::Local && info.id().is_duplicate())
            .and_then(|info| info.local_slot())
            .unwrap_or_else(|| panic!("{}: component {id} is not a local array", self.name()));
        assert!(slot < self.view.local_arrays.1);
        slot
    }
}

fn raw_len(column: &RawColumn) -> usize {
    match *column {
        RawColumn::Values { len, .. } | RawColumn::Arrays { len, .. } => len,
    }
}

fn check_layout<T: Pod>(size: usize, stride: usize) {
    assert!(
        size_of::<T>() == size && size == stride && size > 0 && align_of::<T>() <= STORAGE_ALIGN,
        "type of size {} does not match column layout (size {size}, stride {stride})",
        size_of::<T>()
    );
}

/// # Safety
/// `range` must lie within the column and no exclusive borrow of it may be live.
unsafe fn typed_values<'s, T: Pod>(column: &RawColumn, range: Range<usize>) -> &'s [T] {
    match *column {
        RawColumn::Values {
            data,
            len,
            size,
            stride,
        } => {
            check_layout::<T>(size, stride);
            assert!(range.end <= len, "rows {range:?} out of bounds ({len})");
            std::slice::from_raw_parts(data.cast::<T>().add(range.start), range.len())
        }
        RawColumn::Arrays { .. } => panic!("duplicate components are read as arrays"),
    }
}

/// # Safety
/// As for [`typed_values`], and no other borrow of the rows may be live.
unsafe fn typed_values_mut<'s, T: Pod>(column: &RawColumn, range: Range<usize>) -> &'s mut [T] {
    match *column {
        RawColumn::Values {
            data,
            len,
            size,
            stride,
        } => {
            check_layout::<T>(size, stride);
            assert!(range.end <= len, "rows {range:?} out of bounds ({len})");
            std::slice::from_raw_parts_mut(data.cast::<T>().add(range.start), range.len())
        }
        RawColumn::Arrays { .. } => panic!("duplicate components are written as arrays"),
    }
}

/// # Safety
/// See [`typed_values`].
unsafe fn arrays<'s>(column: &RawColumn, range: Range<usize>) -> &'s [ByteColumn] {
    match *column {
        RawColumn::Arrays { rows, len } => {
            assert!(range.end <= len, "rows {range:?} out of bounds ({len})");
            std::slice::from_raw_parts(rows.add(range.start), range.len())
        }
        RawColumn::Values { .. } => panic!("component is not a duplicate"),
    }
}

/// # Safety
/// See [`typed_values_mut`].
unsafe fn arrays_mut<'s>(column: &RawColumn, range: Range<usize>) -> &'s mut [ByteColumn] {
    match *column {
        RawColumn::Arrays { rows, len } => {
            assert!(range.end <= len, "rows {range:?} out of bounds ({len})");
            std::slice::from_raw_parts_mut(rows.add(range.start), range.len())
        }
        RawColumn::Values { .. } => panic!("component is not a duplicate"),
    }
}
