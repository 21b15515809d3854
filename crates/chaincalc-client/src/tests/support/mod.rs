//! Shared fixtures for client tests.

mod chains;
mod fake_server;

pub(crate) use chains::{named_chain, parse_value};
pub(crate) use fake_server::FakeServer;

use std::time::Duration;

use chaincalcd::{Server, ServerHandle, ServerOptions};

use crate::options::ClientOptions;

/// Starts a real server on `count` ephemeral loopback ports.
pub(crate) fn live_server(count: usize) -> Result<ServerHandle, String> {
    let options = ServerOptions {
        host: String::from("127.0.0.1"),
        listen_ports: vec![0; count],
        worker_threads: 2,
    };
    Server::start(&options).map_err(|error| error.to_string())
}

/// Options that reply on the first port and send to the rest.
pub(crate) fn options_for(ports: &[u16], request_timeout: Duration) -> Result<ClientOptions, String> {
    let (reply_port, destination_ports) = ports
        .split_first()
        .ok_or_else(|| String::from("server has no ports"))?;
    Ok(ClientOptions {
        host: String::from("127.0.0.1"),
        destination_ports: destination_ports.to_vec(),
        reply_port: *reply_port,
        max_sender_threads: destination_ports.len(),
        request_timeout,
        queue_capacity: 16,
    })
}
