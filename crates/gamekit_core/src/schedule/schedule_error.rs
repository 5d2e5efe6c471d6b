use crate::schedule::SystemHandle;
use thiserror::Error;

/// Errors raised while building or running a schedule.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("group '{group}' has a zero update frequency")]
    ZeroFrequency { group: String },

    #[error("system name '{name}' is used by {first} and {second}")]
    DuplicateSystemName {
        name: String,
        first: SystemHandle,
        second: SystemHandle,
    },

    #[error("group {group} priority {priority} depends on missing group {target_group} priority {target_priority}")]
    UnknownDependency {
        group: usize,
        priority: usize,
        target_group: usize,
        target_priority: usize,
    },

    #[error("group dependencies form a cycle through group {group} priority {priority}")]
    DependencyCycle { group: usize, priority: usize },

    #[error("tick stalled at group {group} priority {priority} with no work in flight")]
    Stalled { group: usize, priority: usize },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
