use crate::ecs::ComponentId;
use crate::memory::Zone;

/// A recorded change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Diff<D> {
    /// Payload that undoes one change when transformed.
    Changed(D),
    /// The component did not exist before this revision.
    Removed,
}

/// Differ/transformer pair plugged into a monitor.
///
/// The implementing value is the state shared by every context of one
/// monitor (sizes, chunk widths). A context is the per-value state the
/// differ keeps between records, usually a copy of the last value seen;
/// duplicate monitors keep one context per element.
pub trait MonitorInterface {
    type Context;
    type Diff;

    fn initialize(&self, id: ComponentId) -> Self::Context;

    /// Compare `data` with the context's previous value and update it.
    ///
    /// `None` data means the value was removed. Returns `None` when there is
    /// nothing to record; anything allocated from `zone` is released again
    /// in that case.
    fn diff(
        &self,
        context: &mut Self::Context,
        zone: &mut Zone,
        id: ComponentId,
        data: Option<&[u8]>,
    ) -> Option<Diff<Self::Diff>>;

    /// Undo the change described by `diff` in place.
    fn transform(
        &self,
        context: &Self::Context,
        zone: &Zone,
        diff: &Self::Diff,
        id: ComponentId,
        data: &mut [u8],
    );

    /// Called when a diff is purged or the monitor is dropped.
    fn destroy_diff(&self, _diff: Self::Diff) {}

    /// Called once before a context is dropped.
    fn destroy_context(&self, _context: &mut Self::Context) {}
}
