//! Reassembly of out-of-order chunks into complete requests.
//!
//! The table is keyed by [`RequestKey`] so two clients reusing the same
//! request identifier never collide. A written request leaves the table at
//! once; clients never reuse an identifier. A failed or cancelled request
//! stays behind as a chunk-free tombstone so chunks still in flight cannot
//! open it again. Tombstones are dropped with the rest of a client's requests
//! when that client closes.

use std::fmt;
use std::mem;

use chaincalc_wire::{Operand, RequestChunk, RequestKey};
use dashmap::DashMap;
use thiserror::Error;

/// Lifecycle of a request on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestState {
    /// Chunks are still arriving.
    Loading,
    /// Every chunk arrived and the request was handed to the pool.
    Computing,
    /// A result is waiting in the reply port's ready queue.
    Ready,
    /// The result sender is writing the response; too late to cancel.
    Sending,
    /// The request can never produce a result.
    Failed,
    /// The client or the operator abandoned the request.
    Cancelled,
}

impl RequestState {
    const fn is_live(self) -> bool {
        matches!(
            self,
            Self::Loading | Self::Computing | Self::Ready | Self::Sending
        )
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Loading => "loading",
            Self::Computing => "computing",
            Self::Ready => "ready",
            Self::Sending => "sending",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        formatter.write_str(label)
    }
}

/// A request whose chunks have all arrived.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AssembledRequest {
    key: RequestKey,
    chunks: Vec<RequestChunk>,
}

impl AssembledRequest {
    pub(crate) fn key(&self) -> RequestKey {
        self.key
    }

    /// Operands in chain order.
    pub(crate) fn into_operands(mut self) -> Vec<Operand> {
        self.chunks.sort_unstable_by_key(|chunk| chunk.order);
        self.chunks.into_iter().map(|chunk| chunk.operand).collect()
    }
}

/// Outcome of offering a chunk to the assembler.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Accepted {
    /// The chunk was stored; more are expected.
    Pending {
        /// Distinct chunks received so far.
        received: usize,
        /// Chunks the request declared.
        total: u32,
    },
    /// The chunk completed its request, which must now be computed.
    Complete(AssembledRequest),
    /// The request already settled; the chunk was dropped.
    Settled(RequestState),
    /// A chunk with the same position was already stored.
    Duplicate {
        /// Repeated position.
        order: u32,
    },
}

/// A chunk contradicted the request it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum AssemblyError {
    /// Chunks of one request declared different totals.
    #[error("request {key} declared {expected} chunks but a later chunk declared {actual}")]
    TotalMismatch {
        /// Request that was failed.
        key: RequestKey,
        /// Total from the first chunk.
        expected: u32,
        /// Total from the offending chunk.
        actual: u32,
    },
}

#[derive(Debug)]
struct Slot {
    state: RequestState,
    total_chunks: u32,
    chunks: Vec<RequestChunk>,
}

impl Slot {
    fn loading(total_chunks: u32) -> Self {
        Self {
            state: RequestState::Loading,
            total_chunks,
            chunks: Vec::new(),
        }
    }

    fn settled(state: RequestState) -> Self {
        Self {
            state,
            total_chunks: 0,
            chunks: Vec::new(),
        }
    }

    fn settle(&mut self, state: RequestState) -> bool {
        if !self.state.is_live() {
            return false;
        }
        if self.state == RequestState::Sending && state == RequestState::Cancelled {
            return false;
        }
        self.state = state;
        self.chunks = Vec::new();
        true
    }
}

/// Concurrent table of in-flight requests.
#[derive(Debug, Default)]
pub(crate) struct Assembler {
    requests: DashMap<RequestKey, Slot>,
}

impl Assembler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Stores a chunk, returning the whole request once it is complete.
    pub(crate) fn accept(&self, chunk: RequestChunk) -> Result<Accepted, AssemblyError> {
        let key = chunk.key();
        let mut slot = self
            .requests
            .entry(key)
            .or_insert_with(|| Slot::loading(chunk.total_chunks));

        if slot.state != RequestState::Loading {
            return Ok(Accepted::Settled(slot.state));
        }
        if slot.total_chunks != chunk.total_chunks {
            let expected = slot.total_chunks;
            slot.settle(RequestState::Failed);
            return Err(AssemblyError::TotalMismatch {
                key,
                expected,
                actual: chunk.total_chunks,
            });
        }
        if slot.chunks.iter().any(|stored| stored.order == chunk.order) {
            return Ok(Accepted::Duplicate { order: chunk.order });
        }

        slot.chunks.push(chunk);
        let received = slot.chunks.len();
        if u32::try_from(received).is_ok_and(|count| count == slot.total_chunks) {
            slot.state = RequestState::Computing;
            let chunks = mem::take(&mut slot.chunks);
            return Ok(Accepted::Complete(AssembledRequest { key, chunks }));
        }
        Ok(Accepted::Pending {
            received,
            total: slot.total_chunks,
        })
    }

    /// Moves a computed request to `Ready`; false when it settled meanwhile.
    pub(crate) fn mark_ready(&self, key: RequestKey) -> bool {
        self.requests.get_mut(&key).is_some_and(|mut slot| {
            if slot.state == RequestState::Computing {
                slot.state = RequestState::Ready;
                true
            } else {
                false
            }
        })
    }

    /// Claims a ready result for writing.
    ///
    /// Returns false when the request settled first. Once this returns true
    /// a cancel no longer applies.
    pub(crate) fn begin_send(&self, key: RequestKey) -> bool {
        self.requests.get_mut(&key).is_some_and(|mut slot| {
            if slot.state == RequestState::Ready {
                slot.state = RequestState::Sending;
                true
            } else {
                false
            }
        })
    }

    /// Forgets a request whose result was written.
    pub(crate) fn mark_sent(&self, key: RequestKey) -> bool {
        self.requests
            .remove_if(&key, |_, slot| slot.state == RequestState::Sending)
            .is_some()
    }

    /// Fails a request so it never produces a result.
    pub(crate) fn fail(&self, key: RequestKey) -> bool {
        self.settle(key, RequestState::Failed)
    }

    /// Cancels a request, including one whose chunks have not arrived yet.
    ///
    /// Returns false for settled requests and for results already being
    /// written.
    pub(crate) fn cancel(&self, key: RequestKey) -> bool {
        self.settle(key, RequestState::Cancelled)
    }

    /// Cancels a request only if it is still waiting for chunks.
    pub(crate) fn cancel_if_loading(&self, key: RequestKey) -> bool {
        self.requests.get_mut(&key).is_some_and(|mut slot| {
            slot.state == RequestState::Loading && slot.settle(RequestState::Cancelled)
        })
    }

    /// Drops every request of a client, returning how many were still live.
    pub(crate) fn cancel_client(&self, reply_port: u16) -> usize {
        let mut live = 0;
        self.requests.retain(|key, slot| {
            if key.reply_port != reply_port {
                return true;
            }
            if slot.state.is_live() {
                live += 1;
            }
            false
        });
        live
    }

    /// Current state of a request, if the table still tracks it.
    pub(crate) fn state(&self, key: RequestKey) -> Option<RequestState> {
        self.requests.get(&key).map(|slot| slot.state)
    }

    /// Number of tracked requests, tombstones included.
    pub(crate) fn len(&self) -> usize {
        self.requests.len()
    }

    fn settle(&self, key: RequestKey, state: RequestState) -> bool {
        let mut inserted = false;
        let mut slot = self.requests.entry(key).or_insert_with(|| {
            inserted = true;
            Slot::settled(state)
        });
        inserted || slot.settle(state)
    }
}
