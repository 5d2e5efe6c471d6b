//! Intra-priority system ordering.
//!
//! Row `i` of a [`DependencyGraph`] is a bitmask over the systems of the
//! same priority level: bit `j` is set when system `j` was declared before
//! `i` and the two conflict, so `j` must finish before `i` starts.
//! Systems whose rows are clear of unfinished work may run concurrently.

use crate::schedule::SystemAccess;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DependencyGraph {
    systems: usize,
    block_count: usize,
    bits: Vec<u8>,
}

impl DependencyGraph {
    /// Build the graph for systems in declaration order.
    pub fn build<'a>(accesses: impl IntoIterator<Item = &'a SystemAccess>) -> Self {
        let accesses: Vec<&SystemAccess> = accesses.into_iter().collect();
        let systems = accesses.len();
        let block_count = block_count(systems);
        let mut bits = vec![0u8; systems * block_count];

        for (i, access) in accesses.iter().enumerate() {
            let row = &mut bits[i * block_count..(i + 1) * block_count];
            for (j, earlier) in accesses[..i].iter().enumerate() {
                if access.conflicts_with(earlier) {
                    row[j / 8] |= 1 << (j % 8);
                }
            }
        }

        Self {
            systems,
            block_count,
            bits,
        }
    }

    pub fn len(&self) -> usize {
        self.systems
    }

    pub fn is_empty(&self) -> bool {
        self.systems == 0
    }

    /// Bytes per row.
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    pub fn row(&self, system: usize) -> &[u8] {
        &self.bits[system * self.block_count..(system + 1) * self.block_count]
    }

    /// Whether `system` must wait for `other`.
    pub fn depends_on(&self, system: usize, other: usize) -> bool {
        test_bit(self.row(system), other)
    }

    /// Whether every system `system` waits for is marked in `completed`.
    pub fn ready(&self, system: usize, completed: &[u8]) -> bool {
        self.row(system)
            .iter()
            .zip(completed)
            .all(|(&needs, &done)| needs & !done == 0)
    }
}

pub(crate) fn block_count(systems: usize) -> usize {
    systems.div_ceil(8)
}

pub(crate) fn test_bit(bits: &[u8], index: usize) -> bool {
    bits[index / 8] & (1 << (index % 8)) != 0
}

pub(crate) fn set_bit(bits: &mut [u8], index: usize) {
    bits[index / 8] |= 1 << (index % 8);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{ComponentId, Modifiers, StorageClass};

    fn id(index: usize) -> ComponentId {
        ComponentId::new(StorageClass::Archetype, Modifiers::empty(), index)
    }

    #[test]
    fn conflicting_pairs_are_ordered_by_declaration() {
        let accesses = [
            SystemAccess::new().writes([id(0)]),
            SystemAccess::new().reads([id(0)]).writes([id(1)]),
            SystemAccess::new().reads([id(2)]),
            SystemAccess::new().reads([id(1)]),
        ];
        let graph = DependencyGraph::build(&accesses);

        assert!(graph.depends_on(1, 0));
        assert!(!graph.depends_on(0, 1));
        assert!(!graph.depends_on(2, 0) && !graph.depends_on(2, 1));
        assert!(graph.depends_on(3, 1));
        assert!(!graph.depends_on(3, 0));
    }

    #[test]
    fn every_conflicting_pair_has_an_edge_and_disjoint_pairs_have_none() {
        let accesses: Vec<SystemAccess> = (0..12)
            .map(|i| {
                let access = SystemAccess::new().reads([id(i % 5)]);
                if i % 3 == 0 {
                    access.writes([id((i + 1) % 5)])
                } else {
                    access
                }
            })
            .collect();
        let graph = DependencyGraph::build(&accesses);
        assert_eq!(graph.block_count(), 2);

        for i in 0..accesses.len() {
            for j in 0..i {
                let edge = graph.depends_on(i, j) || graph.depends_on(j, i);
                assert_eq!(edge, accesses[i].conflicts_with(&accesses[j]), "pair ({i}, {j})");
            }
        }
    }

    #[test]
    fn ready_checks_completed_mask() {
        let accesses = [
            SystemAccess::new().writes([id(0)]),
            SystemAccess::new().writes([id(0)]),
        ];
        let graph = DependencyGraph::build(&accesses);
        let mut completed = vec![0u8; graph.block_count()];

        assert!(graph.ready(0, &completed));
        assert!(!graph.ready(1, &completed));
        set_bit(&mut completed, 0);
        assert!(graph.ready(1, &completed));
    }
}
