//! Entity Component System.
//!
//! Components are registered up front in a [`ComponentRegistry`] and live
//! in one of four storage classes:
//!
//! - **archetype**: entities bucketed by their exact archetype-component
//!   set, one column per component ([`ArchetypeBucket`])
//! - **packed**: one dense array per component ([`PackedStorage`])
//! - **indexed**: one array per component addressed by entity index
//!   ([`IndexedStorage`])
//! - **local**: one instance per world ([`LocalStorage`])
//!
//! Any component may be a *duplicate* (an element array per entity) or a
//! *tag* (presence only), and may carry a destructor.
//!
//! Entities can also be related through typed [`Link`]s.

mod archetype;
pub mod archetype_index;
mod builder;
mod column;
mod component;
mod component_registry;
mod entity;
mod entity_registry;
mod entity_table;
mod indexed;
mod link;
mod local;
mod mutation;
mod packed;
mod registration_error;
mod world;

pub use archetype::{ArchetypeBucket, ArchetypeId, ArchetypePointer, ArchetypeStorage, Location};
pub use builder::{ComponentBytes, EntityBuilder};
pub use column::{ByteColumn, Column};
pub(crate) use column::RawColumn;
pub use component::{Component, ComponentId, Modifiers, StorageClass};
pub use component_registry::{ComponentDescriptor, ComponentInfo, ComponentRegistry, Destructor};
pub use entity::{Entity, ProxyEntity};
pub use entity_registry::{EntityRegistry, RegistryId};
pub use indexed::IndexedStorage;
pub use link::{Associate, Link, LinkAddFn, LinkEnd, LinkId, LinkRemoveFn, LinkTable, Side};
pub use local::LocalStorage;
pub use mutation::{AppliedMutations, MutationCallback, MutationQueue};
pub use packed::PackedStorage;
pub use registration_error::RegistrationError;
pub use world::{World, WorldError};
