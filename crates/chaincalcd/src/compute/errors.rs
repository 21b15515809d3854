//! Failures raised while evaluating a request.

use chaincalc_wire::{OperatorError, RequestKey};
use thiserror::Error;

/// The operand chain could not be folded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReductionError {
    /// An operator appeared where it has no meaning.
    #[error("invalid operator at position {order}: {source}")]
    InvalidOperator {
        /// Position of the operand carrying the operator.
        order: u32,
        /// What was wrong with it.
        #[source]
        source: OperatorError,
    },
    /// The request carried no operands.
    #[error("request has no operands")]
    Empty,
}

/// A worker failed to produce a result for a request.
#[derive(Debug, Error)]
pub enum ComputeError {
    /// The reduction rejected the operand chain.
    #[error("request {key} failed: {source}")]
    Reduction {
        /// Request that failed.
        key: RequestKey,
        /// Underlying reduction failure.
        #[source]
        source: ReductionError,
    },
    /// The reduction panicked.
    #[error("request {key} panicked during reduction: {message}")]
    Panicked {
        /// Request that failed.
        key: RequestKey,
        /// Panic payload, when it was a string.
        message: String,
    },
}
