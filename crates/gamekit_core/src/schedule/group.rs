// group.rs - System groups
//
// A group is a set of systems that share an update frequency. Its systems
// are split into priority levels that run in order; each level may also
// wait on a level of another group. Within a level the dependency graph
// decides what may run side by side.

use crate::schedule::{DependencyGraph, SystemDescriptor};
use crate::time::EcsTime;

/// Level `priority` of group `group` must finish before the dependent
/// level starts (when both groups run in the same tick).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GroupDependency {
    pub group: usize,
    pub priority: usize,
}

impl GroupDependency {
    pub fn new(group: usize, priority: usize) -> Self {
        Self { group, priority }
    }
}

/// Builder for a [`Group`].
#[derive(Debug)]
pub struct GroupBuilder {
    name: String,
    freq: EcsTime,
    dynamic: bool,
    priorities: Vec<(Option<GroupDependency>, Vec<SystemDescriptor>)>,
}

impl GroupBuilder {
    /// A group that runs every `freq` of accumulated time.
    pub fn new(name: impl Into<String>, freq: EcsTime) -> Self {
        Self {
            name: name.into(),
            freq,
            dynamic: false,
            priorities: Vec::new(),
        }
    }

    /// Dynamic groups run once per tick with every elapsed period folded
    /// into their delta; fixed groups run one period per tick and carry the
    /// backlog forward.
    pub fn dynamic(mut self, dynamic: bool) -> Self {
        self.dynamic = dynamic;
        self
    }

    /// Append a priority level.
    pub fn priority(mut self, systems: impl IntoIterator<Item = SystemDescriptor>) -> Self {
        self.priorities.push((None, systems.into_iter().collect()));
        self
    }

    /// Append a priority level that waits on another group's level.
    pub fn priority_after(
        mut self,
        dependency: GroupDependency,
        systems: impl IntoIterator<Item = SystemDescriptor>,
    ) -> Self {
        self.priorities
            .push((Some(dependency), systems.into_iter().collect()));
        self
    }

    pub(crate) fn build(self) -> Group {
        let priorities = self
            .priorities
            .into_iter()
            .map(|(dependency, systems)| Priority {
                graph: DependencyGraph::build(systems.iter().map(|system| system.access())),
                dependency,
                systems,
            })
            .collect();
        Group {
            name: self.name,
            freq: self.freq,
            dynamic: self.dynamic,
            priorities,
        }
    }
}

/// One priority level of a group.
#[derive(Debug)]
pub struct Priority {
    dependency: Option<GroupDependency>,
    systems: Vec<SystemDescriptor>,
    graph: DependencyGraph,
}

impl Priority {
    pub fn dependency(&self) -> Option<GroupDependency> {
        self.dependency
    }

    pub fn systems(&self) -> &[SystemDescriptor] {
        &self.systems
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }
}

#[derive(Debug)]
pub struct Group {
    name: String,
    freq: EcsTime,
    dynamic: bool,
    priorities: Vec<Priority>,
}

impl Group {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn freq(&self) -> EcsTime {
        self.freq
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn priorities(&self) -> &[Priority] {
        &self.priorities
    }
}
