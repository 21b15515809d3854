//! Request id to result handle map shared with the receiver thread.

use chaincalc_wire::RequestId;
use dashmap::DashMap;

use crate::handle::ResultHandle;

#[derive(Debug, Default)]
pub(crate) struct Registry {
    handles: DashMap<RequestId, ResultHandle>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, handle: ResultHandle) {
        self.handles.insert(handle.request_id(), handle);
    }

    pub(crate) fn get(&self, request_id: RequestId) -> Option<ResultHandle> {
        self.handles
            .get(&request_id)
            .map(|entry| entry.value().clone())
    }

    /// Fails every unsettled handle; returns how many changed.
    pub(crate) fn fail_unsettled(&self, reason: &str) -> usize {
        self.handles
            .iter()
            .filter(|entry| entry.value().fail(reason))
            .count()
    }

    /// Cancels every unsettled handle and forgets all of them.
    pub(crate) fn discard(&self) -> usize {
        let cancelled = self
            .handles
            .iter()
            .filter(|entry| entry.value().cancel())
            .count();
        self.handles.clear();
        cancelled
    }
}
