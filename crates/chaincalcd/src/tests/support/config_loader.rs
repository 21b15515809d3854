//! Configuration loaders covering success and failure paths.

use std::ffi::OsString;
use std::net::TcpListener;
use std::sync::Arc;

use chaincalc_config::{Config, PortList};
use ortho_config::OrthoError;

use crate::bootstrap::ConfigLoader;

/// Returns distinct loopback ports that were free a moment ago.
pub fn free_ports(count: usize) -> Vec<u16> {
    let probes: Vec<TcpListener> = (0..count)
        .map(|_| TcpListener::bind("127.0.0.1:0").expect("bind probe listener"))
        .collect();
    probes
        .iter()
        .map(|probe| probe.local_addr().expect("probe address").port())
        .collect()
}

/// Loader that yields a valid loopback configuration on unused ports.
pub struct TestConfigLoader {
    ports: Vec<u16>,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ports: free_ports(2),
        }
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            host: String::from("127.0.0.1"),
            listen_ports: PortList::from(self.ports.clone()),
            worker_threads: 2,
            ..Config::default()
        })
    }
}

/// Loader that fails by passing an unparseable CLI flag.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load_from_iter([
            OsString::from("chaincalcd"),
            OsString::from("--worker-threads"),
            OsString::from("many"),
        ])
    }
}

/// Loader that parses but describes a server with no workers.
pub struct InvalidConfigLoader;

impl ConfigLoader for InvalidConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            worker_threads: 0,
            ..Config::default()
        })
    }
}
