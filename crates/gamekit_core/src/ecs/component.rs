// component.rs - Component identity
//
// A component ID is a single u32 that carries everything the hot paths
// need to dispatch without a registry lookup: the storage class, the
// modifier flags and the dense index within that class.

use bitflags::bitflags;
use bytemuck::Pod;
use std::fmt;

/// Which backend stores a component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum StorageClass {
    /// Bucketed by the exact set of archetype components an entity has.
    Archetype = 0,
    /// Dense array per component, holes filled by swap-remove.
    Packed = 1,
    /// Sparse array addressed directly by entity index.
    Indexed = 2,
    /// One instance per world, not attached to entities.
    Local = 3,
}

impl StorageClass {
    const fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0 => StorageClass::Archetype,
            1 => StorageClass::Packed,
            2 => StorageClass::Indexed,
            _ => StorageClass::Local,
        }
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageClass::Archetype => "archetype",
            StorageClass::Packed => "packed",
            StorageClass::Indexed => "indexed",
            StorageClass::Local => "local",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Per-component behaviour flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Modifiers: u32 {
        /// Teardown callback runs when the value is discarded.
        const DESTRUCTOR = 1 << 0;
        /// Presence only, no payload.
        const TAG = 1 << 1;
        /// Growable array of elements per entity.
        const DUPLICATE = 1 << 2;
    }
}

/// Packed component identifier.
///
/// Layout: `[storage:2][modifiers:3][index:27]`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u32);

impl ComponentId {
    const STORAGE_SHIFT: u32 = 30;
    const MODIFIER_SHIFT: u32 = 27;
    const INDEX_MASK: u32 = (1 << Self::MODIFIER_SHIFT) - 1;

    /// Largest index a single storage class can hand out.
    pub const MAX_INDEX: usize = Self::INDEX_MASK as usize;

    pub const fn new(storage: StorageClass, modifiers: Modifiers, index: usize) -> Self {
        assert!(index <= Self::MAX_INDEX, "component index out of range");
        Self(
            ((storage as u32) << Self::STORAGE_SHIFT)
                | (modifiers.bits() << Self::MODIFIER_SHIFT)
                | index as u32,
        )
    }

    pub const fn storage(self) -> StorageClass {
        StorageClass::from_bits(self.0 >> Self::STORAGE_SHIFT)
    }

    pub const fn modifiers(self) -> Modifiers {
        Modifiers::from_bits_truncate((self.0 >> Self::MODIFIER_SHIFT) & 0b111)
    }

    /// Dense index within the storage class. For archetype components this
    /// is the ordinal used by bucket ranking.
    pub const fn index(self) -> usize {
        (self.0 & Self::INDEX_MASK) as usize
    }

    pub const fn is_duplicate(self) -> bool {
        self.modifiers().contains(Modifiers::DUPLICATE)
    }

    pub const fn is_tag(self) -> bool {
        self.modifiers().contains(Modifiers::TAG)
    }

    pub const fn has_destructor(self) -> bool {
        self.modifiers().contains(Modifiers::DESTRUCTOR)
    }

    pub const fn to_bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.storage(), self.index())
    }
}

/// Trait for Rust-defined components.
///
/// Components are plain data: the storage layer moves them as raw bytes.
/// Payload-free tags and raw layouts are registered through
/// [`ComponentDescriptor`](crate::ecs::ComponentDescriptor) instead.
pub trait Component: Pod + Send + Sync {
    /// Human-readable name, unique per registry.
    const NAME: &'static str;

    const STORAGE: StorageClass = StorageClass::Archetype;

    /// `TAG` is not valid here; use a descriptor for tags.
    const MODIFIERS: Modifiers = Modifiers::empty();
}

/// Implement [`Component`] for a plain-data type.
///
/// ```ignore
/// #[derive(Clone, Copy, Pod, Zeroable)]
/// #[repr(C)]
/// struct Position { x: f32, y: f32 }
///
/// define_component!(Position, "Position");
/// define_component!(Waypoint, "Waypoint", Packed, DUPLICATE);
/// ```
#[macro_export]
macro_rules! define_component {
    ($ty:ty, $name:expr) => {
        $crate::define_component!($ty, $name, Archetype);
    };
    ($ty:ty, $name:expr, $storage:ident) => {
        impl $crate::ecs::Component for $ty {
            const NAME: &'static str = $name;
            const STORAGE: $crate::ecs::StorageClass = $crate::ecs::StorageClass::$storage;
        }
    };
    ($ty:ty, $name:expr, $storage:ident, $($modifier:ident)|+) => {
        impl $crate::ecs::Component for $ty {
            const NAME: &'static str = $name;
            const STORAGE: $crate::ecs::StorageClass = $crate::ecs::StorageClass::$storage;
            const MODIFIERS: $crate::ecs::Modifiers =
                $crate::ecs::Modifiers::empty()$(.union($crate::ecs::Modifiers::$modifier))+;
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_packs_storage_modifiers_and_index() {
        let id = ComponentId::new(
            StorageClass::Indexed,
            Modifiers::DUPLICATE | Modifiers::DESTRUCTOR,
            42,
        );

        assert_eq!(id.storage(), StorageClass::Indexed);
        assert_eq!(id.index(), 42);
        assert!(id.is_duplicate());
        assert!(id.has_destructor());
        assert!(!id.is_tag());
        assert_eq!(ComponentId::from_bits(id.to_bits()), id);
    }

    #[test]
    fn every_storage_class_survives_packing() {
        for storage in [
            StorageClass::Archetype,
            StorageClass::Packed,
            StorageClass::Indexed,
            StorageClass::Local,
        ] {
            let id = ComponentId::new(storage, Modifiers::all(), ComponentId::MAX_INDEX);
            assert_eq!(id.storage(), storage);
            assert_eq!(id.modifiers(), Modifiers::all());
            assert_eq!(id.index(), ComponentId::MAX_INDEX);
        }
    }

    #[test]
    fn display_names_class_and_index() {
        let id = ComponentId::new(StorageClass::Packed, Modifiers::TAG, 3);
        assert_eq!(id.to_string(), "packed#3");
    }
}
