// builder.rs - Batched component payloads
//
// An EntityBuilder collects component payloads so they can be attached
// in one call: every archetype component in the batch lands through a
// single bucket migration.

use crate::ecs::{Component, ComponentId};
use bytemuck::Pod;

/// Owned payload for one component in a batch.
#[derive(Debug, Clone)]
pub struct ComponentBytes {
    id: ComponentId,
    bytes: Box<[u8]>,
    count: usize,
}

impl ComponentBytes {
    #[inline]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Element count for duplicate components, 1 otherwise.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }
}

/// Builder for attaching several components at once.
#[derive(Debug, Default, Clone)]
pub struct EntityBuilder {
    components: Vec<ComponentBytes>,
}

impl EntityBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value by ID.
    pub fn with<T: Pod>(self, id: ComponentId, value: T) -> Self {
        self.with_bytes(id, bytemuck::bytes_of(&value))
    }

    /// Add a registered Rust component; `id` must be the ID the registry
    /// assigned to `T`.
    pub fn with_component<T: Component>(self, id: ComponentId, value: T) -> Self {
        self.with(id, value)
    }

    /// Add a value from raw bytes (scripting, serialization, etc.).
    pub fn with_bytes(self, id: ComponentId, bytes: &[u8]) -> Self {
        self.push(id, bytes, 1)
    }

    pub fn with_tag(self, id: ComponentId) -> Self {
        self.push(id, &[], 1)
    }

    /// Add duplicate-component elements.
    pub fn with_duplicates<T: Pod>(self, id: ComponentId, elements: &[T]) -> Self {
        self.push(id, bytemuck::cast_slice(elements), elements.len())
    }

    pub fn with_duplicate_bytes(self, id: ComponentId, bytes: &[u8], count: usize) -> Self {
        self.push(id, bytes, count)
    }

    fn push(mut self, id: ComponentId, bytes: &[u8], count: usize) -> Self {
        self.components.retain(|component| component.id != id);
        self.components.push(ComponentBytes {
            id,
            bytes: bytes.into(),
            count,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Payloads sorted by component ID.
    pub fn components(&self) -> Vec<&ComponentBytes> {
        let mut sorted: Vec<&ComponentBytes> = self.components.iter().collect();
        sorted.sort_by_key(|component| component.id);
        sorted
    }

    pub(crate) fn find(&self, id: ComponentId) -> Option<&ComponentBytes> {
        self.components.iter().find(|component| component.id == id)
    }
}
