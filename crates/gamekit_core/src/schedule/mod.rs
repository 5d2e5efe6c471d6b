//! System scheduling.
//!
//! Systems declare the components they read and write ([`SystemAccess`]).
//! They are grouped by update frequency ([`GroupBuilder`]) and ordered in
//! priority levels; inside a level, conflicting systems run in declaration
//! order and everything else runs side by side on the [`Scheduler`]'s
//! worker pool.

mod access_tracker;
mod context;
mod graph;
mod group;
mod schedule_error;
mod scheduler;
mod system_access;
mod system_descriptor;
mod system_handle;

pub use context::SystemContext;
pub use graph::DependencyGraph;
pub use group::{Group, GroupBuilder, GroupDependency, Priority};
pub use schedule_error::ScheduleError;
pub use scheduler::{GroupState, Scheduler, TickReport, IDLE};
pub use system_access::SystemAccess;
pub use system_descriptor::{ExecutionMode, SystemDescriptor, SystemFn};
pub use system_handle::SystemHandle;
