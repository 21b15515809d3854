//! In-memory model of operand chains and the chunks that carry them.

use std::fmt;

use crate::operator::OperatorTag;

/// Client-assigned request identifier, unique per client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub i32);

impl fmt::Display for RequestId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Server-side identity of a request: request ids are only unique per client,
/// and clients are told apart by the port they receive results on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestKey {
    /// Reply port of the owning client.
    pub reply_port: u16,
    /// Client-assigned identifier.
    pub request_id: RequestId,
}

impl RequestKey {
    /// Builds a key.
    #[must_use]
    pub const fn new(reply_port: u16, request_id: RequestId) -> Self {
        Self {
            reply_port,
            request_id,
        }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}@{}", self.request_id, self.reply_port)
    }
}

/// One step of a chain: `unary(value)` followed by the operator that combines
/// it with the next step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Operand {
    /// Leading operator; `None` behaves as identity.
    pub unary: Option<OperatorTag>,
    /// Operand value.
    pub value: f64,
    /// Trailing operator; only optional on the terminal operand.
    pub binary: Option<OperatorTag>,
}

impl Operand {
    /// Operand with no leading operator.
    #[must_use]
    pub const fn new(value: f64, binary: OperatorTag) -> Self {
        Self {
            unary: None,
            value,
            binary: Some(binary),
        }
    }

    /// Operand with both operators.
    #[must_use]
    pub const fn with_unary(unary: OperatorTag, value: f64, binary: OperatorTag) -> Self {
        Self {
            unary: Some(unary),
            value,
            binary: Some(binary),
        }
    }

    /// Terminal operand with no trailing operator.
    #[must_use]
    pub const fn terminal(unary: Option<OperatorTag>, value: f64) -> Self {
        Self {
            unary,
            value,
            binary: None,
        }
    }
}

/// Unit of network transfer: one operand plus enough context to place it.
///
/// `total_chunks` is repeated on every chunk so whichever chunk arrives first
/// can open the server's assembly state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestChunk {
    /// Port the client receives the result on.
    pub reply_port: u16,
    /// Zero-based position in the chain.
    pub order: u32,
    /// Owning request.
    pub request_id: RequestId,
    /// Number of chunks in the request.
    pub total_chunks: u32,
    /// Carried operand.
    pub operand: Operand,
}

impl RequestChunk {
    /// Server-side identity of the owning request.
    #[must_use]
    pub const fn key(&self) -> RequestKey {
        RequestKey::new(self.reply_port, self.request_id)
    }
}
