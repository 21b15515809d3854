//! Deferred results filled in by the receiver thread.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chaincalc_wire::RequestId;

use crate::errors::ResultError;

/// Lifecycle of a dispatched request as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultState {
    /// Chunks are still queued or being written.
    Pending,
    /// Every chunk reached the wire; waiting for the server.
    Sent,
    /// The server answered.
    Done,
    /// Cancelled locally, or discarded when the client closed.
    Cancelled,
    /// A chunk could not be written or the reply connection was lost.
    Failed,
}

impl ResultState {
    const fn is_settled(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for ResultState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        formatter.write_str(label)
    }
}

#[derive(Debug)]
struct Slot {
    state: ResultState,
    value: Option<f64>,
    unsent: u32,
    failure: Option<Arc<str>>,
}

#[derive(Debug)]
struct Shared {
    request_id: RequestId,
    deadline: Duration,
    slot: Mutex<Slot>,
    settled: Condvar,
}

/// Handle to the eventual result of one calculation.
///
/// Clones share the same slot. The value is written at most once; after a
/// handle settles as done, cancelled or failed it never changes again.
#[derive(Debug, Clone)]
pub struct ResultHandle {
    shared: Arc<Shared>,
}

impl ResultHandle {
    pub(crate) fn new(request_id: RequestId, chunks: u32, deadline: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                request_id,
                deadline,
                slot: Mutex::new(Slot {
                    state: ResultState::Pending,
                    value: None,
                    unsent: chunks,
                    failure: None,
                }),
                settled: Condvar::new(),
            }),
        }
    }

    /// Identifier the request was dispatched under.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.shared.request_id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ResultState {
        self.lock().state
    }

    /// The value, once the server has answered.
    #[must_use]
    pub fn value(&self) -> Option<f64> {
        self.lock().value
    }

    /// Blocks until the handle settles or the configured request deadline
    /// passes.
    ///
    /// # Errors
    ///
    /// See [`ResultHandle::wait_timeout`].
    pub fn wait(&self) -> Result<f64, ResultError> {
        self.wait_timeout(self.shared.deadline)
    }

    /// Blocks until the handle settles or `timeout` passes.
    ///
    /// # Errors
    ///
    /// Returns [`ResultError::TimedOut`] when no answer arrived in time,
    /// [`ResultError::Cancelled`] for cancelled requests and
    /// [`ResultError::Failed`] when the request could not be delivered.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<f64, ResultError> {
        let started = Instant::now();
        let mut slot = self.lock();
        while !slot.state.is_settled() {
            let remaining = timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(ResultError::TimedOut {
                    request_id: self.shared.request_id,
                    waited: timeout,
                });
            }
            slot = self
                .shared
                .settled
                .wait_timeout(slot, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        self.outcome(&slot)
    }

    fn outcome(&self, slot: &Slot) -> Result<f64, ResultError> {
        let request_id = self.shared.request_id;
        match (slot.state, slot.value) {
            (ResultState::Done, Some(value)) => Ok(value),
            (ResultState::Cancelled, _) => Err(ResultError::Cancelled { request_id }),
            _ => Err(ResultError::Failed {
                request_id,
                reason: slot
                    .failure
                    .clone()
                    .unwrap_or_else(|| Arc::from("no result recorded")),
            }),
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.lock().state == ResultState::Cancelled
    }

    /// Records one chunk written; the last one moves the handle to `Sent`.
    pub(crate) fn chunk_written(&self) {
        let mut slot = self.lock();
        slot.unsent = slot.unsent.saturating_sub(1);
        if slot.unsent == 0 && slot.state == ResultState::Pending {
            slot.state = ResultState::Sent;
        }
    }

    /// Stores the server's answer. Returns false if the handle had settled.
    pub(crate) fn resolve(&self, value: f64) -> bool {
        self.settle(ResultState::Done, |slot| slot.value = Some(value))
    }

    /// Returns false if the handle had already settled.
    pub(crate) fn cancel(&self) -> bool {
        self.settle(ResultState::Cancelled, |_| {})
    }

    /// Returns false if the handle had already settled.
    pub(crate) fn fail(&self, reason: &str) -> bool {
        self.settle(ResultState::Failed, |slot| {
            slot.failure = Some(Arc::from(reason));
        })
    }

    fn settle(&self, state: ResultState, update: impl FnOnce(&mut Slot)) -> bool {
        let mut slot = self.lock();
        if slot.state.is_settled() {
            return false;
        }
        slot.state = state;
        update(&mut slot);
        drop(slot);
        self.shared.settled.notify_all();
        true
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.shared
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
