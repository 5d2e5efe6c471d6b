// link.rs - Relationships between entities
//
// A link type describes two ends (left and right). Each end says how many
// entities may sit on it for one partner, what is attached to an entity
// while it is linked (nothing, a component, or add/remove callbacks), and
// whether the entity is destroyed when a link through that end goes away.
//
// The table only keeps the bookkeeping: per entity index, a map from
// (link, side) to the partners on the opposite end. Every pairing is stored
// on both entities. Side effects (components, callbacks, cascades) are run
// by the world once the table has been updated.

use crate::ecs::{ComponentId, Entity, World};
use bytemuck::Pod;
use std::collections::BTreeMap;
use std::fmt;

/// Called when an entity gains a link; receives the data passed to the link call.
pub type LinkAddFn = fn(&mut World, Entity, Option<&[u8]>);
/// Called when an entity loses a link.
pub type LinkRemoveFn = fn(&mut World, Entity);

/// Handle of a link type defined on a world.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(u32);

impl LinkId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Link({})", self.0)
    }
}

/// End of a link an entity sits on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// What an entity carries while it sits on an end of a link.
#[derive(Clone, Debug, Default)]
pub enum Associate {
    #[default]
    None,
    /// Attach `id`, initialised from `default` unless the link call passes data.
    Component { id: ComponentId, default: Vec<u8> },
    Callback { add: LinkAddFn, remove: LinkRemoveFn },
}

#[derive(Clone, Debug, Default)]
pub struct LinkEnd {
    many: bool,
    associate: Associate,
    cascade: bool,
}

impl LinkEnd {
    /// At most one entity on this end per partner.
    pub fn one() -> Self {
        Self::default()
    }

    /// Any number of entities on this end per partner.
    pub fn many() -> Self {
        Self {
            many: true,
            ..Self::default()
        }
    }

    pub fn with_component<T: Pod>(self, id: ComponentId, default: T) -> Self {
        self.with_component_bytes(id, bytemuck::bytes_of(&default))
    }

    pub fn with_component_bytes(mut self, id: ComponentId, default: &[u8]) -> Self {
        self.associate = Associate::Component {
            id,
            default: default.to_vec(),
        };
        self
    }

    pub fn with_callbacks(mut self, add: LinkAddFn, remove: LinkRemoveFn) -> Self {
        self.associate = Associate::Callback { add, remove };
        self
    }

    /// Destroy entities on this end when their link is removed.
    pub fn cascading(mut self) -> Self {
        self.cascade = true;
        self
    }

    pub fn is_many(&self) -> bool {
        self.many
    }

    pub fn associate(&self) -> &Associate {
        &self.associate
    }

    pub fn is_cascading(&self) -> bool {
        self.cascade
    }
}

/// A link type.
#[derive(Clone, Debug)]
pub struct Link {
    name: &'static str,
    left: LinkEnd,
    right: LinkEnd,
}

impl Link {
    pub fn new(name: &'static str, left: LinkEnd, right: LinkEnd) -> Self {
        Self { name, left, right }
    }

    pub fn one_to_one(name: &'static str) -> Self {
        Self::new(name, LinkEnd::one(), LinkEnd::one())
    }

    /// One left entity linked to many right entities.
    pub fn one_to_many(name: &'static str) -> Self {
        Self::new(name, LinkEnd::one(), LinkEnd::many())
    }

    pub fn many_to_many(name: &'static str) -> Self {
        Self::new(name, LinkEnd::many(), LinkEnd::many())
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn end(&self, side: Side) -> &LinkEnd {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}

#[derive(Clone, Debug)]
enum Partners {
    One(Entity),
    /// Sorted, no repeats.
    Many(Vec<Entity>),
}

impl Partners {
    fn as_slice(&self) -> &[Entity] {
        match self {
            Partners::One(entity) => std::slice::from_ref(entity),
            Partners::Many(entities) => entities,
        }
    }
}

type Key = (LinkId, Side);

/// Link definitions plus the per-entity partner maps.
#[derive(Debug, Default)]
pub struct LinkTable {
    links: Vec<Link>,
    associations: Vec<BTreeMap<Key, Partners>>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, link: Link) -> LinkId {
        let id = LinkId(self.links.len() as u32);
        tracing::debug!(%id, name = link.name, "defined link");
        self.links.push(link);
        id
    }

    pub fn get(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Partners of `entity` sitting on the end opposite `side`.
    pub fn partners(&self, entity: Entity, id: LinkId, side: Side) -> &[Entity] {
        self.associations
            .get(entity.index())
            .and_then(|map| map.get(&(id, side)))
            .map_or(&[], Partners::as_slice)
    }

    pub fn is_linked(&self, left: Entity, id: LinkId, right: Entity) -> bool {
        self.partners(left, id, Side::Left).contains(&right)
    }

    /// Every (link, side) the entity currently takes part in.
    pub fn keys(&self, entity: Entity) -> Vec<(LinkId, Side)> {
        self.associations
            .get(entity.index())
            .map(|map| map.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Entities holding `id` on `side`, in index order.
    pub fn holders(&self, id: LinkId, side: Side) -> Vec<Entity> {
        self.associations
            .iter()
            .enumerate()
            .filter(|(_, map)| map.contains_key(&(id, side)))
            .map(|(index, _)| Entity::new(index as u32))
            .collect()
    }

    /// Record a pairing. Returns `None` when the two are already linked,
    /// otherwise the partner each side lost because its end only allows one.
    pub(crate) fn insert(
        &mut self,
        id: LinkId,
        left: Entity,
        right: Entity,
    ) -> Option<[Option<Entity>; 2]> {
        let link = self.links.get(id.index())?.clone();
        if self.is_linked(left, id, right) {
            return None;
        }
        let needed = left.index().max(right.index()) + 1;
        if self.associations.len() < needed {
            self.associations.resize_with(needed, BTreeMap::new);
        }

        let mut displaced = [None, None];
        for (slot, side, entity, partner) in [
            (0, Side::Left, left, right),
            (1, Side::Right, right, left),
        ] {
            if link.end(side.opposite()).many {
                let partners = self.associations[entity.index()]
                    .entry((id, side))
                    .or_insert_with(|| Partners::Many(Vec::new()));
                if let Partners::Many(entities) = partners {
                    if let Err(at) = entities.binary_search(&partner) {
                        entities.insert(at, partner);
                    }
                }
                continue;
            }

            let previous = self.associations[entity.index()].insert((id, side), Partners::One(partner));
            if let Some(Partners::One(previous)) = previous {
                self.detach(previous, (id, side.opposite()), entity);
                displaced[slot] = Some(previous);
            }
        }
        Some(displaced)
    }

    /// Drop one pairing. Returns whether it existed.
    pub(crate) fn remove(&mut self, id: LinkId, left: Entity, right: Entity) -> bool {
        if !self.is_linked(left, id, right) {
            return false;
        }
        self.detach(left, (id, Side::Left), right);
        self.detach(right, (id, Side::Right), left);
        true
    }

    /// Drop every pairing of `entity` through `side` of `id`, returning the
    /// partners it had.
    pub(crate) fn take(&mut self, entity: Entity, id: LinkId, side: Side) -> Vec<Entity> {
        let Some(partners) = self
            .associations
            .get_mut(entity.index())
            .and_then(|map| map.remove(&(id, side)))
        else {
            return Vec::new();
        };
        let partners = partners.as_slice().to_vec();
        for &partner in &partners {
            self.detach(partner, (id, side.opposite()), entity);
        }
        partners
    }

    fn detach(&mut self, entity: Entity, key: Key, partner: Entity) {
        let Some(map) = self.associations.get_mut(entity.index()) else {
            return;
        };
        let empty = match map.get_mut(&key) {
            Some(Partners::One(current)) => *current == partner,
            Some(Partners::Many(entities)) => {
                if let Ok(at) = entities.binary_search(&partner) {
                    entities.remove(at);
                }
                entities.is_empty()
            }
            None => false,
        };
        if empty {
            map.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(index: u32) -> Entity {
        Entity::from_bits(index)
    }

    #[test]
    fn one_to_many_keeps_both_directions() {
        let mut table = LinkTable::new();
        let parent = table.define(Link::one_to_many("parent"));

        for child in [3, 1, 2] {
            assert_eq!(table.insert(parent, e(0), e(child)), Some([None, None]));
        }
        assert_eq!(table.partners(e(0), parent, Side::Left), &[e(1), e(2), e(3)]);
        assert_eq!(table.partners(e(2), parent, Side::Right), &[e(0)]);
        assert!(table.is_linked(e(0), parent, e(3)));
        assert!(!table.is_linked(e(3), parent, e(0)));
        assert_eq!(table.insert(parent, e(0), e(1)), None);
    }

    #[test]
    fn single_end_is_replaced() {
        let mut table = LinkTable::new();
        let parent = table.define(Link::one_to_many("parent"));

        table.insert(parent, e(0), e(5));
        // Entity 5 may only have one parent.
        assert_eq!(table.insert(parent, e(1), e(5)), Some([None, Some(e(0))]));
        assert!(table.partners(e(0), parent, Side::Left).is_empty());
        assert!(table.keys(e(0)).is_empty());
        assert_eq!(table.partners(e(5), parent, Side::Right), &[e(1)]);
    }

    #[test]
    fn remove_and_take() {
        let mut table = LinkTable::new();
        let friends = table.define(Link::many_to_many("friends"));
        table.insert(friends, e(0), e(1));
        table.insert(friends, e(0), e(2));
        table.insert(friends, e(3), e(2));

        assert!(table.remove(friends, e(0), e(1)));
        assert!(!table.remove(friends, e(0), e(1)));
        assert!(table.keys(e(1)).is_empty());

        assert_eq!(table.take(e(2), friends, Side::Right), vec![e(0), e(3)]);
        assert!(table.keys(e(0)).is_empty());
        assert!(table.keys(e(3)).is_empty());
        assert!(table.take(e(2), friends, Side::Right).is_empty());
    }

    #[test]
    fn unknown_link_is_ignored() {
        let mut table = LinkTable::new();
        assert_eq!(table.insert(LinkId(4), e(0), e(1)), None);
        assert!(table.partners(e(0), LinkId(4), Side::Left).is_empty());
    }
}
