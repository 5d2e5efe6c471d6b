//! Entity handles
//!
//! Entities are plain 32-bit indices into the world's entity table.
//! Destroyed indices are recycled, so stale handles are the caller's
//! responsibility (the entity registry provides stable 64-bit IDs).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity handle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity(u32);

impl Entity {
    /// Handle that never refers to a live entity.
    pub const NULL: Entity = Entity(u32::MAX);

    pub(crate) const fn new(index: u32) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn is_null(self) -> bool {
        self.0 == u32::MAX
    }

    pub const fn to_bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("Entity(null)")
        } else {
            write!(f, "Entity({})", self.0)
        }
    }
}

/// Entity reference inside a deferred mutation batch: either a concrete
/// entity or an index into the entities the batch itself creates.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ProxyEntity(u32);

impl ProxyEntity {
    const RELATIVE: u32 = 1 << 31;

    /// Refer to an existing entity.
    pub fn entity(entity: Entity) -> Self {
        assert!(
            entity.0 & Self::RELATIVE == 0,
            "{entity} cannot be used as a proxy"
        );
        Self(entity.0)
    }

    /// Refer to the `index`-th entity created by the same batch.
    pub fn relative(index: usize) -> Self {
        assert!(index < Self::RELATIVE as usize, "relative index {index} out of range");
        Self(index as u32 | Self::RELATIVE)
    }

    pub const fn is_relative(self) -> bool {
        self.0 & Self::RELATIVE != 0
    }

    /// Concrete entity, looking relative proxies up in `created`.
    pub fn resolve(self, created: &[Entity]) -> Entity {
        if self.is_relative() {
            let index = (self.0 & !Self::RELATIVE) as usize;
            assert!(
                index < created.len(),
                "relative proxy {index} resolved against {} created entities",
                created.len()
            );
            created[index]
        } else {
            Entity(self.0)
        }
    }
}

impl From<Entity> for ProxyEntity {
    fn from(entity: Entity) -> Self {
        ProxyEntity::entity(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxies_resolve_concrete_and_relative() {
        let created = [Entity::new(7), Entity::new(9)];

        assert_eq!(ProxyEntity::entity(Entity::new(3)).resolve(&created), Entity::new(3));
        assert_eq!(ProxyEntity::relative(1).resolve(&created), Entity::new(9));
        assert!(ProxyEntity::relative(0).is_relative());
        assert!(!ProxyEntity::from(Entity::new(0)).is_relative());
    }

    #[test]
    #[should_panic(expected = "resolved against")]
    fn relative_proxy_out_of_range_panics() {
        ProxyEntity::relative(2).resolve(&[Entity::new(0)]);
    }

    #[test]
    fn null_entity() {
        assert!(Entity::NULL.is_null());
        assert_eq!(Entity::NULL.to_string(), "Entity(null)");
        assert_eq!(Entity::from_bits(5).index(), 5);
    }
}
