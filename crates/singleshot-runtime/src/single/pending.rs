use crate::tensor::TensorsData;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, derive_more::Display)]
#[display("buffer#{_0}")]
pub(crate) struct BufferId(u64);

/// Backend-allocated outputs produced by the worker and not yet handed to a
/// caller.
///
/// An entry leaves the set exactly once: either [`claim`](Self::claim) moves it
/// to the caller, or [`release`](Self::release) drops it, which hands the memory
/// back to the backend through the release callback.
#[derive(Default)]
pub(crate) struct PendingReleases {
    entries: HashMap<BufferId, TensorsData>,
    next: u64,
}

impl PendingReleases {
    pub(crate) fn track(&mut self, data: TensorsData) -> BufferId {
        self.next += 1;
        let id = BufferId(self.next);
        self.entries.insert(id, data);
        id
    }

    pub(crate) fn claim(&mut self, id: BufferId) -> Option<TensorsData> {
        self.entries.remove(&id)
    }

    pub(crate) fn release(&mut self, id: BufferId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Releases every entry but `keep`. Returns how many were released.
    pub(crate) fn release_all_except(&mut self, keep: Option<BufferId>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|id, _| Some(*id) == keep);
        before - self.entries.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
