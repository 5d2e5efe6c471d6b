// entity_registry.rs - Stable entity IDs
//
// Entity handles are recycled; registry IDs are not. A registered entity
// gets a monotonically increasing 64-bit ID that survives save/load and
// can be handed to peers. Deregistering never returns an ID to the pool.

use crate::ecs::Entity;
use std::collections::HashMap;

pub type RegistryId = u64;

#[derive(Debug, Default)]
pub struct EntityRegistry {
    next: RegistryId,
    entities: HashMap<RegistryId, Entity>,
    ids: HashMap<Entity, RegistryId>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start handing out IDs from `start`. IDs never move backwards.
    pub fn init(&mut self, start: RegistryId) {
        assert!(
            start >= self.next,
            "registry cannot restart at {start}, IDs up to {} may be in use",
            self.next
        );
        self.next = start;
    }

    /// ID for `entity`, assigning the next one if it has none.
    pub fn register(&mut self, entity: Entity) -> RegistryId {
        if let Some(&id) = self.ids.get(&entity) {
            return id;
        }
        let id = self.next;
        self.next += 1;
        self.entities.insert(id, entity);
        self.ids.insert(entity, id);
        id
    }

    /// Drop the mapping for `entity`. Its ID is never reused.
    pub fn deregister(&mut self, entity: Entity) -> Option<RegistryId> {
        let id = self.ids.remove(&entity)?;
        self.entities.remove(&id);
        Some(id)
    }

    /// Bind `entity` to a specific `id` (e.g. from a snapshot or a peer).
    ///
    /// When `id` is already bound to another entity the call panics unless
    /// `acquire` is set, in which case the other entity loses its ID.
    pub fn reregister(&mut self, entity: Entity, id: RegistryId, acquire: bool) {
        if let Some(&holder) = self.entities.get(&id) {
            if holder == entity {
                return;
            }
            assert!(
                acquire,
                "registry id {id} is already held by {holder}"
            );
            self.ids.remove(&holder);
        }

        if let Some(previous) = self.ids.remove(&entity) {
            self.entities.remove(&previous);
        }
        if id >= self.next {
            self.next = id + 1;
        }
        self.entities.insert(id, entity);
        self.ids.insert(entity, id);
    }

    pub fn lookup(&self, id: RegistryId) -> Option<Entity> {
        self.entities.get(&id).copied()
    }

    pub fn id_of(&self, entity: Entity) -> Option<RegistryId> {
        self.ids.get(&entity).copied()
    }

    /// Next ID `register` would assign.
    pub fn next_id(&self) -> RegistryId {
        self.next
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent_and_ids_are_never_reused() {
        let mut registry = EntityRegistry::new();
        registry.init(100);
        let a = Entity::from_bits(0);
        let b = Entity::from_bits(1);

        assert_eq!(registry.register(a), 100);
        assert_eq!(registry.register(a), 100);
        assert_eq!(registry.deregister(a), Some(100));
        assert_eq!(registry.lookup(100), None);
        assert_eq!(registry.register(b), 101);
        assert_eq!(registry.register(a), 102);
    }

    #[test]
    fn reregister_advances_counter_and_can_acquire() {
        let mut registry = EntityRegistry::new();
        let a = Entity::from_bits(0);
        let b = Entity::from_bits(1);

        registry.reregister(a, 50, false);
        assert_eq!(registry.next_id(), 51);
        assert_eq!(registry.lookup(50), Some(a));

        registry.reregister(b, 50, true);
        assert_eq!(registry.lookup(50), Some(b));
        assert_eq!(registry.id_of(a), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    #[should_panic(expected = "already held")]
    fn reregister_without_acquire_panics_on_conflict() {
        let mut registry = EntityRegistry::new();
        registry.reregister(Entity::from_bits(0), 7, false);
        registry.reregister(Entity::from_bits(1), 7, false);
    }

    #[test]
    #[should_panic(expected = "cannot restart")]
    fn init_cannot_move_backwards() {
        let mut registry = EntityRegistry::new();
        registry.init(10);
        registry.register(Entity::from_bits(0));
        registry.init(5);
    }
}
