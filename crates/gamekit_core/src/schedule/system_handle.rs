use std::fmt;

/// Position of a system inside a scheduler: group, priority level, and
/// declaration index within that level.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemHandle {
    pub group: u32,
    pub priority: u32,
    pub index: u32,
}

impl SystemHandle {
    pub(crate) fn new(group: usize, priority: usize, index: usize) -> Self {
        Self {
            group: group as u32,
            priority: priority as u32,
            index: index as u32,
        }
    }
}

impl fmt::Display for SystemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.group, self.priority, self.index)
    }
}
