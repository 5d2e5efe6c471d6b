// access_tracker.rs - Runtime component locks
//
// Conflicts inside a priority level are resolved statically by the
// dependency graph. Systems from different groups can still be in flight
// at once, so every submission also takes reader/writer counts on the
// components it touches.

use crate::ecs::ComponentId;
use crate::schedule::SystemAccess;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub(crate) struct AccessTracker {
    readers: HashMap<ComponentId, usize>,
    writers: HashSet<ComponentId>,
}

impl AccessTracker {
    fn written(&self, id: &ComponentId) -> bool {
        self.writers.contains(id)
    }

    fn read(&self, id: &ComponentId) -> bool {
        self.readers.get(id).copied().unwrap_or(0) > 0
    }

    /// Take the locks for `access`, or nothing if any is unavailable.
    pub fn try_acquire(&mut self, access: &SystemAccess) -> bool {
        let blocked = access.read_components().iter().any(|id| self.written(id))
            || access
                .write_components()
                .iter()
                .any(|id| self.written(id) || self.read(id));
        if blocked {
            return false;
        }

        for id in access.read_components() {
            *self.readers.entry(*id).or_default() += 1;
        }
        self.writers.extend(access.write_components());
        true
    }

    pub fn release(&mut self, access: &SystemAccess) {
        for id in access.read_components() {
            if let Some(count) = self.readers.get_mut(id) {
                *count = count.saturating_sub(1);
            }
        }
        for id in access.write_components() {
            self.writers.remove(id);
        }
    }

    pub fn is_idle(&self) -> bool {
        self.readers.values().all(|&count| count == 0) && self.writers.is_empty()
    }
}
