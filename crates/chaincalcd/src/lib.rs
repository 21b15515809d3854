//! The chaincalc compute server.
//!
//! Clients split a chained arithmetic expression into chunks and ship them
//! over several TCP ports. The server reassembles each request from its
//! chunks, whatever order they arrive in, evaluates it on a worker pool and
//! writes one 12-byte result frame back over the client's reply connection.
//!
//! Four roles share the work:
//!
//! - a single `mio` event loop owns every socket, decodes frames and feeds
//!   the assembler; it never computes and never writes;
//! - the assembler tracks each `(reply port, request id)` through
//!   `LOADING → COMPUTING → READY → SENDING`, dropping it once the result is
//!   written, or settles it as `FAILED`/`CANCELLED`;
//! - a fixed pool of worker threads reduces complete requests;
//! - one sender thread writes every result frame.
//!
//! [`Server::start`] wires these together and returns a [`ServerHandle`].
//! The `chaincalcd` binary adds configuration loading, telemetry and signal
//! handling through [`run_server`].

mod assembler;
mod bootstrap;
mod compute;
mod health;
mod process;
mod ready;
mod sender;
mod server;
mod telemetry;
mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use compute::{ComputeError, ReductionError};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_server};
pub use server::{DRAIN_TIMEOUT, Server, ServerHandle, ServerOptions};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};
pub use transport::ServerError;

#[cfg(test)]
mod tests;
