//! Error types for the dispatcher, result handles and the CLI.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use chaincalc_config::ConfigError;
use chaincalc_wire::RequestId;
use thiserror::Error;

use crate::tokens::OperandParseError;

/// Errors surfaced by [`Client`](crate::Client).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The options cannot drive a client.
    #[error("invalid client options: {source}")]
    Options {
        /// The rejected setting.
        #[source]
        source: ConfigError,
    },
    /// The server host did not resolve.
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        /// Configured host.
        host: String,
        /// Port being connected to.
        port: u16,
        /// Resolver failure.
        #[source]
        source: io::Error,
    },
    /// Connecting to the server failed.
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        /// Configured host.
        host: String,
        /// Port being connected to.
        port: u16,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A control frame could not be written to the reply connection.
    #[error("failed to send control frame: {source}")]
    Control {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A client thread could not be started.
    #[error("failed to spawn {role} thread: {source}")]
    Spawn {
        /// Which thread failed to start.
        role: &'static str,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A calculation needs at least one operand.
    #[error("a calculation needs at least one operand")]
    EmptyCalculation,
    /// The chain has more operands than a chunk can number.
    #[error("a calculation cannot have {count} operands")]
    TooManyOperands {
        /// Operands supplied.
        count: usize,
    },
    /// The client has been stopped.
    #[error("the client has been stopped")]
    Stopped,
}

/// Why a result handle did not produce a value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResultError {
    /// No result arrived before the deadline.
    #[error("request {request_id} timed out after {waited:?}")]
    TimedOut {
        /// The request waited on.
        request_id: RequestId,
        /// How long the caller waited.
        waited: Duration,
    },
    /// The request was cancelled or its client closed.
    #[error("request {request_id} was cancelled")]
    Cancelled {
        /// The cancelled request.
        request_id: RequestId,
    },
    /// The request could not be delivered or answered.
    #[error("request {request_id} failed: {reason}")]
    Failed {
        /// The failed request.
        request_id: RequestId,
        /// What went wrong.
        reason: Arc<str>,
    },
}

/// Errors reported by the `chaincalc` command line.
#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(ConfigError),
    #[error("invalid log filter: {0}")]
    LogFilter(String),
    #[error(transparent)]
    Operand(#[from] OperandParseError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Calculation(#[from] ResultError),
    #[error("failed to write the result: {0}")]
    WriteResult(io::Error),
}
