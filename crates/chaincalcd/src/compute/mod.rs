//! Evaluation of assembled requests on a fixed pool of worker threads.

mod errors;
mod pool;
mod reduce;

pub use self::errors::{ComputeError, ReductionError};
pub(crate) use self::pool::{Completion, ReadyNotifier, WorkerPool};

const COMPUTE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::compute");
