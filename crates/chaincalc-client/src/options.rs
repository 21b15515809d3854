//! Settings needed to start a [`Client`](crate::Client).

use std::time::Duration;

use chaincalc_config::{Config, ConfigError};

/// Capacity of each destination port's chunk queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Server host.
    pub host: String,
    /// Server ports chunks are spread across.
    pub destination_ports: Vec<u16>,
    /// Server port the client receives results on.
    pub reply_port: u16,
    /// Upper bound on concurrently running sender threads.
    pub max_sender_threads: usize,
    /// Deadline used by [`ResultHandle::wait`](crate::ResultHandle::wait).
    pub request_timeout: Duration,
    /// Chunks buffered per destination port before `calculate` blocks.
    pub queue_capacity: usize,
}

impl ClientOptions {
    /// Extracts the client settings from a loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.host.clone(),
            destination_ports: config.destination_ports.as_slice().to_vec(),
            reply_port: config.reply_port,
            max_sender_threads: config.max_sender_threads,
            request_timeout: config.request_timeout(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.destination_ports.is_empty() {
            return Err(ConfigError::NoDestinationPorts);
        }
        if self.reply_port == 0 || self.destination_ports.contains(&0) {
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
