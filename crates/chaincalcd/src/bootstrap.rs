//! Server bootstrap orchestration.

use std::sync::Arc;

use chaincalc_config::{Config, ConfigError};
use ortho_config::OrthoError;
use thiserror::Error;

use crate::health::HealthReporter;
use crate::server::{DRAIN_TIMEOUT, Server, ServerHandle, ServerOptions};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::transport::ServerError;

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the server configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader error when a configuration source is unusable.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader that always yields a fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already resolved configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Configuration loaded but cannot drive a server.
    #[error("invalid configuration: {source}")]
    InvalidConfiguration {
        /// The rejected setting.
        #[source]
        source: ConfigError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
}

/// Result of a successful bootstrap invocation.
pub struct Daemon {
    config: Config,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl Daemon {
    fn new(config: Config, telemetry: TelemetryHandle, reporter: Arc<dyn HealthReporter>) -> Self {
        Self {
            config,
            telemetry,
            reporter,
        }
    }

    /// Accessor for the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Binds the configured ports and starts serving.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when a port cannot be bound or a server thread
    /// cannot be started.
    pub fn start_server(&self) -> Result<ServerHandle, ServerError> {
        let handle = Server::start(&ServerOptions::from_config(&self.config))?;
        self.reporter.server_listening(handle.local_ports());
        Ok(handle)
    }

    /// Stops a server started by [`Daemon::start_server`], giving it
    /// [`DRAIN_TIMEOUT`] to drain.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::ThreadPanic`] when a server thread panicked and
    /// [`ServerError::DrainTimeout`] when the threads outlive the deadline.
    pub fn stop_server(&self, handle: ServerHandle) -> Result<(), ServerError> {
        let result = handle.stop_within(DRAIN_TIMEOUT);
        self.reporter.server_stopped();
        result
    }
}

/// Bootstraps the server using the supplied collaborators.
///
/// # Errors
///
/// Returns [`BootstrapError`] when configuration cannot be loaded or
/// validated, or telemetry cannot be installed. The failure is reported to
/// `reporter` before it is returned.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    if let Err(source) = config.validate_server() {
        let error = BootstrapError::InvalidConfiguration { source };
        reporter.bootstrap_failed(&error);
        return Err(error);
    }

    let telemetry = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    reporter.bootstrap_succeeded(&config);
    Ok(Daemon::new(config, telemetry, reporter))
}
