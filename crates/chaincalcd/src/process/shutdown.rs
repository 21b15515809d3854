//! Waiting for the operator to stop the server.
//!
//! The launch sequence parks in [`ShutdownSignal::wait`] once every port is
//! listening. Handlers are removed as soon as the first termination signal
//! arrives, so a second one during the drain takes the default action and
//! ends the process.

use std::ffi::c_int;
use std::io;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::{debug, info};

use super::PROCESS_TARGET;

const TERMINATION_SIGNALS: [c_int; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Trigger the launch sequence blocks on before draining the server.
pub trait ShutdownSignal: Send + Sync {
    /// Returns once the server should stop.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError`] when the trigger cannot be armed.
    fn wait(&self) -> Result<(), ShutdownError>;
}

/// Errors raised while arming a shutdown trigger.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Stops the server on the first SIGTERM, SIGINT, SIGQUIT or SIGHUP.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemShutdownSignal;

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let mut signals = Signals::new(TERMINATION_SIGNALS)
            .map_err(|source| ShutdownError::Install { source })?;
        debug!(target: PROCESS_TARGET, "waiting for a termination signal");
        let received = signals.forever().next();
        info!(
            target: PROCESS_TARGET,
            signal = received.map_or("none", signal_name),
            "stopping server"
        );
        Ok(())
    }
}

fn signal_name(signal: c_int) -> &'static str {
    match signal {
        SIGTERM => "SIGTERM",
        SIGINT => "SIGINT",
        SIGQUIT => "SIGQUIT",
        SIGHUP => "SIGHUP",
        _ => "unknown",
    }
}
