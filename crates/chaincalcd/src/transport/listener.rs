//! Binding of the server's listening sockets.

use std::net::{SocketAddr, ToSocketAddrs};

use mio::net::TcpListener;

use super::ServerError;

/// A bound listening socket and the port it actually holds.
#[derive(Debug)]
pub(crate) struct Listener {
    pub(crate) socket: TcpListener,
    pub(super) port: u16,
}

impl Listener {
    /// Binds `host:port`; port `0` lets the OS choose.
    pub(crate) fn bind(host: &str, port: u16) -> Result<Self, ServerError> {
        let mut addrs = (host, port)
            .to_socket_addrs()
            .map_err(|source| ServerError::Resolve {
                host: host.to_owned(),
                port,
                source,
            })?;
        let addr = addrs
            .find(|addr| matches!(addr, SocketAddr::V4(_) | SocketAddr::V6(_)))
            .ok_or_else(|| ServerError::ResolveEmpty {
                host: host.to_owned(),
                port,
            })?;
        let socket =
            TcpListener::bind(addr).map_err(|source| ServerError::BindTcp { addr, source })?;
        let port = socket
            .local_addr()
            .map_err(|source| ServerError::BindTcp { addr, source })?
            .port();
        Ok(Self { socket, port })
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }
}
