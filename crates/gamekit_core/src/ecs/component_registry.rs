// component_registry.rs - Component layout registry
//
// Every world is built from one registry. Registration hands out dense
// per-class indices, validates layouts and modifier combinations, and
// lays out the context-local blob. The registry is frozen (wrapped in an
// Arc) before the first world is created from it.

use crate::config::{
    MAX_ARCHETYPE_COMPONENTS, MAX_INDEXED_COMPONENTS, MAX_PACKED_COMPONENTS, STORAGE_ALIGN,
};
use crate::ecs::{Component, ComponentId, Modifiers, RegistrationError, StorageClass};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::mem::{align_of, size_of};
use std::sync::Arc;

/// Teardown callback invoked with the bytes of one value (or one duplicate
/// element) before it is discarded.
pub type Destructor = Arc<dyn Fn(&mut [u8]) + Send + Sync>;

/// Registration request for a component.
#[derive(Clone)]
pub struct ComponentDescriptor {
    name: String,
    storage: StorageClass,
    modifiers: Modifiers,
    size: usize,
    align: usize,
    destructor: Option<Destructor>,
}

impl ComponentDescriptor {
    /// A payload-less descriptor; use [`layout`](Self::layout) for data.
    pub fn new(name: impl Into<String>, storage: StorageClass) -> Self {
        Self {
            name: name.into(),
            storage,
            modifiers: Modifiers::empty(),
            size: 0,
            align: 1,
            destructor: None,
        }
    }

    pub fn of<T: Component>() -> Self {
        Self::new(T::NAME, T::STORAGE)
            .layout(size_of::<T>(), align_of::<T>())
            .modifiers(T::MODIFIERS)
    }

    /// Value size (element size for duplicates) and alignment.
    pub fn layout(mut self, size: usize, align: usize) -> Self {
        self.size = size;
        self.align = align.max(1);
        self
    }

    pub fn modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers |= modifiers & !Modifiers::DESTRUCTOR;
        self
    }

    pub fn tag(mut self) -> Self {
        self.modifiers |= Modifiers::TAG;
        self
    }

    pub fn duplicate(mut self) -> Self {
        self.modifiers |= Modifiers::DUPLICATE;
        self
    }

    pub fn destructor(mut self, destructor: impl Fn(&mut [u8]) + Send + Sync + 'static) -> Self {
        self.destructor = Some(Arc::new(destructor));
        self
    }
}

/// Registered layout of one component.
#[derive(Clone)]
pub struct ComponentInfo {
    id: ComponentId,
    name: String,
    size: usize,
    align: usize,
    /// Byte offset in the local blob, or duplicate-array slot, for locals.
    local_slot: Option<usize>,
    destructor: Option<Destructor>,
}

impl ComponentInfo {
    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of one value, or of one element for duplicate components.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn align(&self) -> usize {
        self.align
    }

    /// Distance between consecutive values in a column.
    pub fn stride(&self) -> usize {
        stride_of(self.size, self.align)
    }

    pub fn local_slot(&self) -> Option<usize> {
        self.local_slot
    }

    pub fn destructor(&self) -> Option<&Destructor> {
        self.destructor.as_ref()
    }

    /// Run the destructor over one value, or every element of a duplicate
    /// array laid out at `stride()`.
    pub(crate) fn destroy(&self, bytes: &mut [u8]) {
        let Some(destructor) = &self.destructor else {
            return;
        };
        if self.id.is_duplicate() {
            let stride = self.stride();
            if stride == 0 {
                return;
            }
            for element in bytes.chunks_exact_mut(stride) {
                destructor(&mut element[..self.size]);
            }
        } else {
            destructor(bytes);
        }
    }
}

impl fmt::Debug for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("size", &self.size)
            .field("align", &self.align)
            .field("local_slot", &self.local_slot)
            .field("destructor", &self.destructor.is_some())
            .finish()
    }
}

pub(crate) const fn stride_of(size: usize, align: usize) -> usize {
    (size + align - 1) / align * align
}

/// Registry of every component a world can hold.
#[derive(Default)]
pub struct ComponentRegistry {
    archetype: Vec<ComponentInfo>,
    packed: Vec<ComponentInfo>,
    indexed: Vec<ComponentInfo>,
    local: Vec<ComponentInfo>,
    by_type: HashMap<TypeId, ComponentId>,
    by_name: HashMap<String, ComponentId>,
    local_size: usize,
    local_arrays: usize,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a Rust component type.
    pub fn register<T: Component>(&mut self) -> Result<ComponentId, RegistrationError> {
        self.register_typed::<T>(ComponentDescriptor::of::<T>())
    }

    /// Register a Rust component type with a teardown callback.
    pub fn register_with_destructor<T: Component>(
        &mut self,
        destructor: impl Fn(&mut T) + Send + Sync + 'static,
    ) -> Result<ComponentId, RegistrationError> {
        let descriptor = ComponentDescriptor::of::<T>().destructor(move |bytes: &mut [u8]| {
            destructor(bytemuck::from_bytes_mut(bytes))
        });
        self.register_typed::<T>(descriptor)
    }

    fn register_typed<T: Component>(
        &mut self,
        descriptor: ComponentDescriptor,
    ) -> Result<ComponentId, RegistrationError> {
        if T::MODIFIERS.contains(Modifiers::TAG) {
            return Err(RegistrationError::TaggedPayload {
                name: descriptor.name,
                size: size_of::<T>(),
            });
        }
        let id = self.register_raw(descriptor)?;
        self.by_type.insert(TypeId::of::<T>(), id);
        Ok(id)
    }

    /// Register a component from a raw layout description.
    pub fn register_raw(
        &mut self,
        descriptor: ComponentDescriptor,
    ) -> Result<ComponentId, RegistrationError> {
        let ComponentDescriptor {
            name,
            storage,
            mut modifiers,
            mut size,
            align,
            destructor,
        } = descriptor;

        if self.by_name.contains_key(&name) {
            return Err(RegistrationError::DuplicateName { name });
        }
        if align > STORAGE_ALIGN || !align.is_power_of_two() {
            return Err(RegistrationError::AlignmentTooLarge {
                name,
                align,
                max: STORAGE_ALIGN,
            });
        }
        if modifiers.contains(Modifiers::TAG) {
            if size != 0 {
                return Err(RegistrationError::TaggedPayload { name, size });
            }
            if storage == StorageClass::Local && modifiers.contains(Modifiers::DUPLICATE) {
                return Err(RegistrationError::UnsupportedModifiers {
                    name,
                    storage,
                    modifiers,
                });
            }
            size = 0;
        }
        if destructor.is_some() {
            modifiers |= Modifiers::DESTRUCTOR;
        }

        let (index, max) = match storage {
            StorageClass::Archetype => (self.archetype.len(), MAX_ARCHETYPE_COMPONENTS),
            StorageClass::Packed => (self.packed.len(), MAX_PACKED_COMPONENTS),
            StorageClass::Indexed => (self.indexed.len(), MAX_INDEXED_COMPONENTS),
            StorageClass::Local => (self.local.len(), ComponentId::MAX_INDEX + 1),
        };
        if index >= max {
            return Err(RegistrationError::TooManyComponents { name, storage, max });
        }

        let id = ComponentId::new(storage, modifiers, index);
        let local_slot = (storage == StorageClass::Local).then(|| {
            if modifiers.contains(Modifiers::DUPLICATE) {
                self.local_arrays += 1;
                self.local_arrays - 1
            } else {
                let offset = stride_of(self.local_size, align);
                self.local_size = offset + size;
                offset
            }
        });

        tracing::debug!(component = %name, %id, size, align, "registered component");

        let info = ComponentInfo {
            id,
            name: name.clone(),
            size,
            align,
            local_slot,
            destructor,
        };
        match storage {
            StorageClass::Archetype => self.archetype.push(info),
            StorageClass::Packed => self.packed.push(info),
            StorageClass::Indexed => self.indexed.push(info),
            StorageClass::Local => self.local.push(info),
        }
        self.by_name.insert(name, id);
        Ok(id)
    }

    /// ID registered for a Rust component type.
    pub fn id_of<T: Component>(&self) -> Option<ComponentId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    pub fn id_by_name(&self, name: &str) -> Option<ComponentId> {
        self.by_name.get(name).copied()
    }

    pub fn info(&self, id: ComponentId) -> Option<&ComponentInfo> {
        self.class(id.storage())
            .get(id.index())
            .filter(|info| info.id == id)
    }

    /// Infallible lookup for IDs already validated against this registry.
    pub(crate) fn expect_info(&self, id: ComponentId) -> &ComponentInfo {
        match self.info(id) {
            Some(info) => info,
            None => panic!("component {id} is not registered"),
        }
    }

    pub fn count(&self, storage: StorageClass) -> usize {
        self.class(storage).len()
    }

    pub fn class(&self, storage: StorageClass) -> &[ComponentInfo] {
        match storage {
            StorageClass::Archetype => &self.archetype,
            StorageClass::Packed => &self.packed,
            StorageClass::Indexed => &self.indexed,
            StorageClass::Local => &self.local,
        }
    }

    /// Size of the blob holding every non-duplicate local component.
    pub fn local_size(&self) -> usize {
        self.local_size
    }

    pub(crate) fn local_array_count(&self) -> usize {
        self.local_arrays
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentInfo> {
        self.archetype
            .iter()
            .chain(&self.packed)
            .chain(&self.indexed)
            .chain(&self.local)
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("archetype", &self.archetype.len())
            .field("packed", &self.packed.len())
            .field("indexed", &self.indexed.len())
            .field("local", &self.local.len())
            .field("local_size", &self.local_size)
            .finish()
    }
}
