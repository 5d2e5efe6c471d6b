// local.rs - Context-local components
//
// Locals are not attached to entities: each world holds exactly one
// instance of every local component. Plain locals share one blob laid
// out by the registry; duplicate locals get an element array each.

use crate::config::STORAGE_ALIGN;
use crate::ecs::{ByteColumn, ComponentInfo, ComponentRegistry, StorageClass};

#[derive(Debug)]
pub struct LocalStorage {
    blob: ByteColumn,
    arrays: Vec<ByteColumn>,
}

impl LocalStorage {
    pub(crate) fn new(registry: &ComponentRegistry, duplicate_capacity: usize) -> Self {
        let mut blob = ByteColumn::new(registry.local_size(), STORAGE_ALIGN);
        blob.push_zeroed();

        let mut arrays = Vec::with_capacity(registry.local_array_count());
        for info in registry.class(StorageClass::Local) {
            if info.id().is_duplicate() {
                arrays.push(ByteColumn::with_capacity(
                    info.size(),
                    info.align(),
                    duplicate_capacity,
                ));
            }
        }

        Self { blob, arrays }
    }

    pub fn bytes(&self, info: &ComponentInfo) -> &[u8] {
        let offset = info.local_slot().unwrap_or(0);
        &self.blob.bytes()[offset..offset + info.size()]
    }

    pub fn bytes_mut(&mut self, info: &ComponentInfo) -> &mut [u8] {
        let offset = info.local_slot().unwrap_or(0);
        &mut self.blob.bytes_mut()[offset..offset + info.size()]
    }

    pub fn array(&self, info: &ComponentInfo) -> Option<&ByteColumn> {
        self.arrays.get(info.local_slot()?)
    }

    pub fn array_mut(&mut self, info: &ComponentInfo) -> Option<&mut ByteColumn> {
        self.arrays.get_mut(info.local_slot()?)
    }

    pub(crate) fn blob_ptr(&mut self) -> (*mut u8, usize) {
        let len = self.blob.bytes().len();
        (self.blob.as_mut_ptr(), len)
    }

    pub(crate) fn arrays_ptr(&mut self) -> (*mut ByteColumn, usize) {
        (self.arrays.as_mut_ptr(), self.arrays.len())
    }

    /// Run every local destructor. Called once when the world is dropped.
    pub(crate) fn destroy(&mut self, registry: &ComponentRegistry) {
        for info in registry.class(StorageClass::Local) {
            if !info.id().has_destructor() {
                continue;
            }
            if info.id().is_duplicate() {
                if let Some(array) = self.array_mut(info) {
                    info.destroy(array.bytes_mut());
                    array.clear();
                }
            } else {
                info.destroy(self.bytes_mut(info));
            }
        }
    }
}
