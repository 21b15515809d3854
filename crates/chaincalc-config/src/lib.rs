//! Shared configuration for the chaincalc server and client.
//!
//! Both binaries load the same [`Config`] through `ortho_config`, so a single
//! file or environment can describe a whole deployment. Values are layered in
//! the usual order: built-in defaults, then the configuration file, then
//! `CHAINCALC_*` environment variables, then command-line flags.

mod defaults;
mod logging;
mod ports;

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_DESTINATION_PORTS, DEFAULT_HOST, DEFAULT_LISTEN_PORTS, DEFAULT_LOG_FILTER,
    DEFAULT_MAX_SENDER_THREADS, DEFAULT_REPLY_PORT, DEFAULT_REQUEST_TIMEOUT_MS,
    DEFAULT_WORKER_THREADS, default_destination_ports, default_host, default_listen_ports,
    default_log_filter, default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use ports::{PortList, PortListParseError};

/// Layered runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "CHAINCALC")]
pub struct Config {
    /// Host the server binds and the client connects to.
    #[serde(default = "defaults::default_host")]
    pub host: String,
    /// Ports the server accepts connections on.
    #[serde(default = "defaults::default_listen_ports")]
    pub listen_ports: PortList,
    /// Size of the server's compute pool.
    #[serde(default = "defaults::default_worker_threads")]
    pub worker_threads: usize,
    /// Server ports the client ships chunks to.
    #[serde(default = "defaults::default_destination_ports")]
    pub destination_ports: PortList,
    /// Server port the client receives results on.
    #[serde(default = "defaults::default_reply_port")]
    pub reply_port: u16,
    /// Upper bound on concurrently running client sender threads.
    #[serde(default = "defaults::default_max_sender_threads")]
    pub max_sender_threads: usize,
    /// Deadline applied by the client CLI when waiting for a result.
    #[serde(default = "defaults::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// `tracing` filter expression.
    #[serde(default = "defaults::default_log_filter_string")]
    pub log_filter: String,
    /// Output format for log events.
    #[serde(default = "defaults::default_log_format")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: defaults::default_host(),
            listen_ports: defaults::default_listen_ports(),
            worker_threads: DEFAULT_WORKER_THREADS,
            destination_ports: defaults::default_destination_ports(),
            reply_port: DEFAULT_REPLY_PORT,
            max_sender_threads: DEFAULT_MAX_SENDER_THREADS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            log_filter: defaults::default_log_filter_string(),
            log_format: defaults::default_log_format(),
        }
    }
}

impl Config {
    /// Loads configuration from the process arguments and environment.
    ///
    /// # Errors
    ///
    /// Returns the loader error when a source cannot be read or parsed.
    pub fn load() -> Result<Self, Arc<OrthoError>> {
        <Self as OrthoConfig>::load()
    }

    /// Loads configuration from an explicit argument list.
    ///
    /// # Errors
    ///
    /// Returns the loader error when a source cannot be read or parsed. When
    /// several files fail, the error aggregates every failure.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as OrthoConfig>::load_from_iter(args)
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Client request deadline.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Checks the values the server depends on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a listen port is missing or unusable, or
    /// when the compute pool would be empty.
    pub fn validate_server(&self) -> Result<(), ConfigError> {
        if self.listen_ports.is_empty() {
            return Err(ConfigError::NoListenPorts);
        }
        if self.listen_ports.as_slice().contains(&0) {
            return Err(ConfigError::ZeroPort);
        }
        if self.worker_threads == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }

    /// Checks the values the client depends on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a port is unusable or the sender cap
    /// cannot cover every destination port.
    pub fn validate_client(&self) -> Result<(), ConfigError> {
        if self.destination_ports.is_empty() {
            return Err(ConfigError::NoDestinationPorts);
        }
        if self.reply_port == 0 || self.destination_ports.as_slice().contains(&0) {
            return Err(ConfigError::ZeroPort);
        }
        if self.max_sender_threads < self.destination_ports.len() {
            return Err(ConfigError::SenderCapBelowPorts {
                cap: self.max_sender_threads,
                ports: self.destination_ports.len(),
            });
        }
        Ok(())
    }
}

/// Configuration values that load cleanly but cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The server was given no port to listen on.
    #[error("at least one listen port must be configured")]
    NoListenPorts,
    /// The compute pool would have no threads.
    #[error("worker_threads must be at least 1")]
    NoWorkers,
    /// The client was given no port to send chunks to.
    #[error("at least one destination port must be configured")]
    NoDestinationPorts,
    /// A configured port was zero.
    #[error("port 0 is not a usable port")]
    ZeroPort,
    /// The client could not give every destination port its own sender.
    #[error("max_sender_threads ({cap}) is below the number of destination ports ({ports})")]
    SenderCapBelowPorts {
        /// Configured sender cap.
        cap: usize,
        /// Number of destination ports.
        ports: usize,
    },
}
