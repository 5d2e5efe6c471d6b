// mutation.rs - Deferred structural changes
//
// Systems run against a frozen storage layout, so anything that would
// move data between buckets or arrays is staged here and applied between
// ticks. The queue is shared by every job of a tick and locks internally.
//
// Apply order: create, reregister, register, add links, remove
// components, add components, callbacks, remove links, deregister,
// destroy. A failing mutation does not stop the rest of the batch.

use crate::ecs::{
    ComponentId, Entity, EntityBuilder, LinkId, ProxyEntity, RegistryId, Side, World, WorldError,
};
use bytemuck::Pod;
use std::sync::{Mutex, PoisonError};

/// Deferred callback run with the world and the entities created by the batch.
pub type MutationCallback = Box<dyn FnOnce(&mut World, &[Entity]) + Send>;

/// Outcome of [`World::apply_mutations`].
#[derive(Debug, Default)]
pub struct AppliedMutations {
    /// Entities the batch created, in the order their proxies were handed out.
    pub created: Vec<Entity>,
    /// Mutations that could not be applied, in apply order.
    pub failures: Vec<WorldError>,
}

impl AppliedMutations {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// The created entities, or the first failure.
    pub fn into_result(self) -> Result<Vec<Entity>, WorldError> {
        match self.failures.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(self.created),
        }
    }
}

pub(crate) struct StagedLink {
    pub left: ProxyEntity,
    pub left_data: Option<Vec<u8>>,
    pub id: LinkId,
    pub right: ProxyEntity,
    pub right_data: Option<Vec<u8>>,
}

pub(crate) enum StagedUnlink {
    Pair(ProxyEntity, LinkId, ProxyEntity),
    Side(ProxyEntity, LinkId, Side),
    All(ProxyEntity),
    Between(ProxyEntity, ProxyEntity),
    Link(LinkId),
}

#[derive(Default)]
pub(crate) struct StagedMutations {
    pub create: usize,
    pub reregister: Vec<(ProxyEntity, RegistryId, bool)>,
    pub register: Vec<ProxyEntity>,
    pub link: Vec<StagedLink>,
    pub remove: Vec<(ProxyEntity, ComponentId)>,
    pub add: Vec<(ProxyEntity, EntityBuilder)>,
    pub callbacks: Vec<MutationCallback>,
    pub unlink: Vec<StagedUnlink>,
    pub deregister: Vec<ProxyEntity>,
    pub destroy: Vec<ProxyEntity>,
}

impl StagedMutations {
    fn is_empty(&self) -> bool {
        self.create == 0
            && self.reregister.is_empty()
            && self.register.is_empty()
            && self.link.is_empty()
            && self.remove.is_empty()
            && self.add.is_empty()
            && self.callbacks.is_empty()
            && self.unlink.is_empty()
            && self.deregister.is_empty()
            && self.destroy.is_empty()
    }
}

/// Thread-safe staging area for structural world changes.
#[derive(Default)]
pub struct MutationQueue {
    staged: Mutex<StagedMutations>,
}

impl MutationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut StagedMutations) -> R) -> R {
        let mut staged = self.staged.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut staged)
    }

    /// Stage `count` new entities. The returned proxy refers to the first;
    /// the rest follow at consecutive relative indices.
    pub fn create_entities(&self, count: usize) -> ProxyEntity {
        self.with(|staged| {
            let first = staged.create;
            staged.create += count;
            ProxyEntity::relative(first)
        })
    }

    pub fn create_entity(&self) -> ProxyEntity {
        self.create_entities(1)
    }

    pub fn destroy_entity(&self, entity: impl Into<ProxyEntity>) {
        let entity = entity.into();
        self.with(|staged| staged.destroy.push(entity));
    }

    pub fn register(&self, entity: impl Into<ProxyEntity>) {
        let entity = entity.into();
        self.with(|staged| staged.register.push(entity));
    }

    pub fn deregister(&self, entity: impl Into<ProxyEntity>) {
        let entity = entity.into();
        self.with(|staged| staged.deregister.push(entity));
    }

    pub fn reregister(&self, entity: impl Into<ProxyEntity>, id: RegistryId, acquire: bool) {
        let entity = entity.into();
        self.with(|staged| staged.reregister.push((entity, id, acquire)));
    }

    pub fn add_component<T: Pod>(&self, entity: impl Into<ProxyEntity>, id: ComponentId, value: T) {
        self.add_components(entity, EntityBuilder::new().with(id, value));
    }

    pub fn add_component_bytes(&self, entity: impl Into<ProxyEntity>, id: ComponentId, bytes: &[u8]) {
        self.add_components(entity, EntityBuilder::new().with_bytes(id, bytes));
    }

    pub fn add_components(&self, entity: impl Into<ProxyEntity>, components: EntityBuilder) {
        let entity = entity.into();
        self.with(|staged| staged.add.push((entity, components)));
    }

    pub fn remove_component(&self, entity: impl Into<ProxyEntity>, id: ComponentId) {
        let entity = entity.into();
        self.with(|staged| staged.remove.push((entity, id)));
    }

    pub fn link(&self, left: impl Into<ProxyEntity>, id: LinkId, right: impl Into<ProxyEntity>) {
        self.link_with(left, None, id, right, None);
    }

    /// Stage a link whose ends take `left_data` / `right_data` in place of
    /// their default component values, or hand them to the add callbacks.
    pub fn link_with(
        &self,
        left: impl Into<ProxyEntity>,
        left_data: Option<&[u8]>,
        id: LinkId,
        right: impl Into<ProxyEntity>,
        right_data: Option<&[u8]>,
    ) {
        let link = StagedLink {
            left: left.into(),
            left_data: left_data.map(<[u8]>::to_vec),
            id,
            right: right.into(),
            right_data: right_data.map(<[u8]>::to_vec),
        };
        self.with(|staged| staged.link.push(link));
    }

    pub fn unlink(&self, left: impl Into<ProxyEntity>, id: LinkId, right: impl Into<ProxyEntity>) {
        let unlink = StagedUnlink::Pair(left.into(), id, right.into());
        self.with(|staged| staged.unlink.push(unlink));
    }

    /// Stage removal of every `id` link the entity holds on `side`.
    pub fn unlink_entity(&self, entity: impl Into<ProxyEntity>, id: LinkId, side: Side) {
        let unlink = StagedUnlink::Side(entity.into(), id, side);
        self.with(|staged| staged.unlink.push(unlink));
    }

    pub fn unlink_all(&self, entity: impl Into<ProxyEntity>) {
        let unlink = StagedUnlink::All(entity.into());
        self.with(|staged| staged.unlink.push(unlink));
    }

    pub fn unlink_between(&self, a: impl Into<ProxyEntity>, b: impl Into<ProxyEntity>) {
        let unlink = StagedUnlink::Between(a.into(), b.into());
        self.with(|staged| staged.unlink.push(unlink));
    }

    /// Stage removal of every pairing of a link type.
    pub fn clear_link(&self, id: LinkId) {
        self.with(|staged| staged.unlink.push(StagedUnlink::Link(id)));
    }

    pub fn callback(&self, f: impl FnOnce(&mut World, &[Entity]) + Send + 'static) {
        self.with(|staged| staged.callbacks.push(Box::new(f)));
    }

    pub fn is_empty(&self) -> bool {
        self.with(|staged| staged.is_empty())
    }

    pub(crate) fn take(&self) -> StagedMutations {
        self.with(std::mem::take)
    }
}

impl std::fmt::Debug for MutationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.with(|staged| {
            f.debug_struct("MutationQueue")
                .field("create", &staged.create)
                .field("add", &staged.add.len())
                .field("link", &staged.link.len())
                .field("unlink", &staged.unlink.len())
                .field("remove", &staged.remove.len())
                .field("destroy", &staged.destroy.len())
                .field("callbacks", &staged.callbacks.len())
                .finish()
        })
    }
}
