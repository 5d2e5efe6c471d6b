use crate::ecs::{ComponentId, StorageClass};

/// Components a system reads and writes.
///
/// A component listed in both sets is treated as written.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SystemAccess {
    reads: Vec<ComponentId>,
    writes: Vec<ComponentId>,
    components: Vec<ComponentId>,
}

impl SystemAccess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the read-only component set.
    pub fn reads<I>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = ComponentId>,
    {
        self.reads = sanitize(components);
        self.rebuild();
        self
    }

    /// Replace the written component set.
    pub fn writes<I>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = ComponentId>,
    {
        self.writes = sanitize(components);
        self.rebuild();
        self
    }

    pub fn add_read(&mut self, component: ComponentId) {
        self.reads.push(component);
        self.rebuild();
    }

    pub fn add_write(&mut self, component: ComponentId) {
        self.writes.push(component);
        self.rebuild();
    }

    pub fn read_components(&self) -> &[ComponentId] {
        &self.reads
    }

    pub fn write_components(&self) -> &[ComponentId] {
        &self.writes
    }

    /// Union of read and written components, sorted.
    pub fn all_components(&self) -> &[ComponentId] {
        &self.components
    }

    /// Archetype-class components; these select the buckets a system visits.
    pub fn archetype_components(&self) -> Vec<ComponentId> {
        self.of_class(StorageClass::Archetype).collect()
    }

    /// First packed component, which drives iteration when a system has no
    /// archetype components.
    pub fn packed_driver(&self) -> Option<ComponentId> {
        self.of_class(StorageClass::Packed).next()
    }

    fn of_class(&self, storage: StorageClass) -> impl Iterator<Item = ComponentId> + '_ {
        self.components
            .iter()
            .copied()
            .filter(move |id| id.storage() == storage)
    }

    pub fn reads_component(&self, component: ComponentId) -> bool {
        self.components.binary_search(&component).is_ok()
    }

    pub fn writes_component(&self, component: ComponentId) -> bool {
        self.writes.binary_search(&component).is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Whether two systems touch a shared component with at least one writer.
    pub fn conflicts_with(&self, other: &SystemAccess) -> bool {
        self.writes.iter().any(|id| other.reads_component(*id))
            || other.writes.iter().any(|id| self.reads_component(*id))
    }

    fn rebuild(&mut self) {
        self.writes = sanitize(std::mem::take(&mut self.writes));
        let writes = &self.writes;
        self.reads = sanitize(std::mem::take(&mut self.reads))
            .into_iter()
            .filter(|id| writes.binary_search(id).is_err())
            .collect();
        self.components.clear();
        self.components.extend(&self.reads);
        self.components.extend(&self.writes);
        self.components.sort_unstable();
    }
}

fn sanitize<I>(components: I) -> Vec<ComponentId>
where
    I: IntoIterator<Item = ComponentId>,
{
    let mut list: Vec<ComponentId> = components.into_iter().collect();
    list.sort_unstable();
    list.dedup();
    list
}
