//! Tests covering the supervised run of the server process.

use std::io;
use std::net::TcpStream;
use std::sync::{Arc, Mutex};

use rstest::rstest;

use crate::process::{LaunchError, LaunchPlan, ShutdownError, ShutdownSignal, run_server_with};

use super::support::{
    FailingConfigLoader, HealthEvent, RecordingHealthReporter, TestConfigLoader,
};

/// Signal that fires as soon as it is awaited, after probing the server.
struct ImmediateSignal {
    ports: Vec<u16>,
    reachable: Mutex<Vec<bool>>,
    fail: bool,
}

impl ImmediateSignal {
    fn new(ports: Vec<u16>, fail: bool) -> Self {
        Self {
            ports,
            reachable: Mutex::new(Vec::new()),
            fail,
        }
    }

    fn reachable(&self) -> Vec<bool> {
        self.reachable.lock().expect("probe lock").clone()
    }
}

impl ShutdownSignal for ImmediateSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let probes = self
            .ports
            .iter()
            .map(|port| TcpStream::connect(("127.0.0.1", *port)).is_ok())
            .collect();
        *self.reachable.lock().expect("probe lock") = probes;
        if self.fail {
            return Err(ShutdownError::Install {
                source: io::Error::other("signal handlers unavailable"),
            });
        }
        Ok(())
    }
}

impl ShutdownSignal for Arc<ImmediateSignal> {
    fn wait(&self) -> Result<(), ShutdownError> {
        (**self).wait()
    }
}

#[test]
fn server_runs_until_shutdown_then_stops() {
    let loader = TestConfigLoader::new();
    let ports = crate::bootstrap::ConfigLoader::load(&loader)
        .expect("test config")
        .listen_ports
        .as_slice()
        .to_vec();
    let reporter = Arc::new(RecordingHealthReporter::default());
    let signal = Arc::new(ImmediateSignal::new(ports.clone(), false));

    run_server_with(LaunchPlan {
        loader,
        reporter: reporter.clone(),
        shutdown: Arc::clone(&signal),
    })
    .expect("server run");

    assert_eq!(signal.reachable(), vec![true; ports.len()]);
    assert_eq!(
        reporter.events(),
        vec![
            HealthEvent::BootstrapStarting,
            HealthEvent::BootstrapSucceeded,
            HealthEvent::ServerListening(ports),
            HealthEvent::ServerStopped,
        ]
    );
}

#[rstest]
fn signal_failures_still_stop_the_server() {
    let reporter = Arc::new(RecordingHealthReporter::default());
    let error = run_server_with(LaunchPlan {
        loader: TestConfigLoader::new(),
        reporter: reporter.clone(),
        shutdown: ImmediateSignal::new(Vec::new(), true),
    })
    .expect_err("signal failure surfaces");

    assert!(matches!(error, LaunchError::Shutdown { .. }));
    assert_eq!(reporter.events().last(), Some(&HealthEvent::ServerStopped));
}

#[rstest]
fn bootstrap_failures_abort_the_launch() {
    let reporter = Arc::new(RecordingHealthReporter::default());
    let error = run_server_with(LaunchPlan {
        loader: FailingConfigLoader,
        reporter: reporter.clone(),
        shutdown: ImmediateSignal::new(Vec::new(), false),
    })
    .expect_err("bootstrap failure surfaces");

    assert!(matches!(error, LaunchError::Bootstrap { .. }));
    assert!(
        !reporter
            .events()
            .iter()
            .any(|event| matches!(event, HealthEvent::ServerListening(_))),
        "server must not start after a failed bootstrap"
    );
}
