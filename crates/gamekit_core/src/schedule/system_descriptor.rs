use crate::schedule::{SystemAccess, SystemContext};
use std::fmt;
use std::sync::Arc;

/// System update callback. Invoked once per job scope (bucket, chunk, or
/// packed range) with a context restricted to the declared access.
pub type SystemFn = dyn Fn(&SystemContext<'_>) + Send + Sync;

/// How a system's work is split into jobs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One job visiting every matching bucket in turn.
    #[default]
    Sequential,
    /// One job per matching bucket.
    PerArchetype,
    /// Buckets (or the driving packed array) split into ranges of at most
    /// `chunk_size` rows. `usize::MAX` means whole buckets.
    Chunked { chunk_size: usize },
}

impl ExecutionMode {
    pub const WHOLE: usize = usize::MAX;
}

/// Everything the scheduler needs to know about a system.
#[derive(Clone)]
pub struct SystemDescriptor {
    name: String,
    access: SystemAccess,
    mode: ExecutionMode,
    update: Arc<SystemFn>,
}

impl SystemDescriptor {
    pub fn new(
        name: impl Into<String>,
        access: SystemAccess,
        update: impl Fn(&SystemContext<'_>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            access,
            mode: ExecutionMode::Sequential,
            update: Arc::new(update),
        }
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn per_archetype(self) -> Self {
        self.mode(ExecutionMode::PerArchetype)
    }

    pub fn chunked(self, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        self.mode(ExecutionMode::Chunked { chunk_size })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn access(&self) -> &SystemAccess {
        &self.access
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.mode
    }

    pub(crate) fn run(&self, context: &SystemContext<'_>) {
        (self.update)(context)
    }
}

impl fmt::Debug for SystemDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemDescriptor")
            .field("name", &self.name)
            .field("access", &self.access)
            .field("mode", &self.mode)
            .finish()
    }
}
