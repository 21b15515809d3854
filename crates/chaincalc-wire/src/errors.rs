//! Error types for operator interpretation and frame decoding.

use thiserror::Error;

use crate::frame::FrameKind;
use crate::operand::{RequestId, RequestKey};
use crate::operator::OperatorTag;

/// An operator tag used in a position it has no meaning in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OperatorError {
    /// The tag was found in the leading position.
    #[error("operator {0} cannot be applied as a unary operator")]
    NotUnary(OperatorTag),
    /// The tag was found in the trailing position of a non-terminal operand.
    #[error("operator {0} cannot combine two operands")]
    NotBinary(OperatorTag),
    /// A non-terminal operand carried no trailing operator.
    #[error("operand {order} is not terminal but carries no binary operator")]
    MissingBinary {
        /// Position of the offending operand.
        order: u32,
    },
}

/// Errors raised while decoding a frame from the wire.
///
/// [`DecodeError::UnknownOperator`] is the only variant scoped to a single
/// request: the frame boundary is intact, so the connection can keep going.
/// Every other variant means the byte stream can no longer be trusted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The input did not hold exactly one whole frame.
    #[error("frame is {actual} bytes but {expected} were expected")]
    Incomplete {
        /// Bytes the frame declares.
        expected: usize,
        /// Bytes supplied.
        actual: usize,
    },
    /// The length prefix was zero.
    #[error("frame length must include the kind byte")]
    EmptyFrame,
    /// The length prefix exceeded the largest frame the decoder accepts.
    #[error("frame length {length} exceeds the maximum of {max} bytes")]
    FrameTooLarge {
        /// Declared length.
        length: usize,
        /// Largest accepted length.
        max: usize,
    },
    /// The kind byte did not name a frame kind.
    #[error("unknown frame kind {0}")]
    UnknownKind(u8),
    /// The body ended before a field could be read.
    #[error("truncated {kind} frame while reading {field}")]
    Truncated {
        /// Kind of the frame being decoded.
        kind: FrameKind,
        /// Field that could not be read.
        field: &'static str,
    },
    /// Bytes remained after the last field of the body.
    #[error("{count} trailing bytes after {kind} frame")]
    TrailingBytes {
        /// Kind of the frame being decoded.
        kind: FrameKind,
        /// Number of unread bytes.
        count: usize,
    },
    /// A port field fell outside `1..=65535`.
    #[error("invalid port {0}")]
    InvalidPort(i32),
    /// An operator length was neither `-1` nor a plausible tag length.
    #[error("invalid operator length {0}")]
    InvalidOperatorLength(i32),
    /// The chunk position or total was inconsistent.
    #[error("chunk order {order} is outside the declared total {total}")]
    OrderOutOfRange {
        /// Declared position.
        order: i32,
        /// Declared total.
        total: i32,
    },
    /// A well-delimited chunk named an operator outside the fixed set.
    #[error("unknown operator tag {tag:?} in request {request_id} for reply port {reply_port}")]
    UnknownOperator {
        /// Reply port of the owning request.
        reply_port: u16,
        /// Identifier of the owning request.
        request_id: RequestId,
        /// Offending tag, lossily decoded.
        tag: String,
    },
}

impl DecodeError {
    /// Request the error is confined to, if any.
    #[must_use]
    pub fn owning_request(&self) -> Option<RequestKey> {
        match self {
            Self::UnknownOperator {
                reply_port,
                request_id,
                ..
            } => Some(RequestKey::new(*reply_port, *request_id)),
            _ => None,
        }
    }

    /// Returns true when the connection that produced the error must be torn down.
    #[must_use]
    pub fn is_connection_fatal(&self) -> bool {
        self.owning_request().is_none()
    }
}
