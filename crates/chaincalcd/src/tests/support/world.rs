//! BDD world for the bootstrap suite: loader, reporter and bootstrap outcome.

use std::cell::RefCell;
use std::sync::Arc;

use crate::bootstrap::{BootstrapError, ConfigLoader, Daemon, bootstrap_with};
use crate::server::ServerHandle;
use crate::transport::ServerError;

use super::config_loader::{FailingConfigLoader, InvalidConfigLoader, TestConfigLoader};
use super::reporter::RecordingHealthReporter;

/// Scenario world shared across BDD steps.
pub struct TestWorld {
    loader: Box<dyn ConfigLoader>,
    pub reporter: Arc<RecordingHealthReporter>,
    daemon: Option<Daemon>,
    bootstrap_error: Option<BootstrapError>,
    server: Option<ServerHandle>,
    server_error: Option<ServerError>,
}

impl TestWorld {
    /// Builds a world with a successful configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            loader: Box::new(TestConfigLoader::new()),
            reporter: Arc::new(RecordingHealthReporter::default()),
            daemon: None,
            bootstrap_error: None,
            server: None,
            server_error: None,
        }
    }

    pub fn use_successful_loader(&mut self) {
        self.loader = Box::new(TestConfigLoader::new());
    }

    pub fn use_failing_loader(&mut self) {
        self.loader = Box::new(FailingConfigLoader);
    }

    pub fn use_invalid_loader(&mut self) {
        self.loader = Box::new(InvalidConfigLoader);
    }

    /// Runs the bootstrap sequence once.
    pub fn bootstrap(&mut self) {
        if self.daemon.is_some() || self.bootstrap_error.is_some() {
            return;
        }
        match bootstrap_with(&*self.loader, self.reporter.clone()) {
            Ok(daemon) => self.daemon = Some(daemon),
            Err(error) => self.bootstrap_error = Some(error),
        }
    }

    /// Starts the server from the bootstrapped daemon.
    pub fn start_server(&mut self) -> Result<(), String> {
        let daemon = self
            .daemon
            .as_ref()
            .ok_or_else(|| String::from("bootstrap has not succeeded"))?;
        match daemon.start_server() {
            Ok(handle) => self.server = Some(handle),
            Err(error) => self.server_error = Some(error),
        }
        Ok(())
    }

    /// Stops the server started by [`TestWorld::start_server`].
    pub fn stop_server(&mut self) -> Result<(), String> {
        let daemon = self
            .daemon
            .as_ref()
            .ok_or_else(|| String::from("bootstrap has not succeeded"))?;
        let handle = self
            .server
            .take()
            .ok_or_else(|| String::from("server is not running"))?;
        daemon.stop_server(handle).map_err(|error| error.to_string())
    }

    #[must_use]
    pub fn bootstrap_error(&self) -> Option<&BootstrapError> {
        self.bootstrap_error.as_ref()
    }

    #[must_use]
    pub fn daemon(&self) -> Option<&Daemon> {
        self.daemon.as_ref()
    }

    #[must_use]
    pub fn server(&self) -> Option<&ServerHandle> {
        self.server.as_ref()
    }

    #[must_use]
    pub fn server_error(&self) -> Option<&ServerError> {
        self.server_error.as_ref()
    }
}

/// Fixture constructing a fresh world for each scenario.
#[must_use]
pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
