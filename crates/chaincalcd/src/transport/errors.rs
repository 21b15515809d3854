//! Error types for starting and stopping the server.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced while starting or stopping the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// No listening port was supplied.
    #[error("at least one listen port is required")]
    NoListenPorts,
    /// The compute pool would have no threads.
    #[error("the worker pool needs at least one thread")]
    NoWorkers,
    /// The listen host could not be resolved.
    #[error("failed to resolve TCP address {host}:{port}: {source}")]
    Resolve {
        /// Configured host.
        host: String,
        /// Port being bound.
        port: u16,
        /// Resolver failure.
        #[source]
        source: io::Error,
    },
    /// The listen host resolved to nothing.
    #[error("no TCP addresses resolved for {host}:{port}")]
    ResolveEmpty {
        /// Configured host.
        host: String,
        /// Port being bound.
        port: u16,
    },
    /// Binding a listening socket failed.
    #[error("failed to bind TCP listener at {addr}: {source}")]
    BindTcp {
        /// Address being bound.
        addr: SocketAddr,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Creating or registering with the poll instance failed.
    #[error("failed to set up the event loop: {source}")]
    Poll {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A server thread could not be started.
    #[error("failed to spawn {role} thread: {source}")]
    Spawn {
        /// Which thread failed to start.
        role: &'static str,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A server thread panicked.
    #[error("{role} thread panicked")]
    ThreadPanic {
        /// Which thread panicked.
        role: &'static str,
    },
    /// The server threads were still draining when the deadline passed.
    #[error("server did not stop within {timeout:?}")]
    DrainTimeout {
        /// Deadline that was missed.
        timeout: Duration,
    },
}
