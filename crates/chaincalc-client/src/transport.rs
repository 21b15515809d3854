//! Connection helpers shared by the sender and receiver threads.

use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::BytesMut;
use chaincalc_wire::{Frame, encode_frame};

use crate::errors::ClientError;

pub(crate) const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a blocking connection to `host:port` with Nagle disabled.
pub(crate) fn connect(host: &str, port: u16) -> Result<TcpStream, ClientError> {
    let address = resolve_tcp_address(host, port).map_err(|source| ClientError::Resolve {
        host: host.to_owned(),
        port,
        source,
    })?;
    let stream = TcpStream::connect_timeout(&address, CONNECTION_TIMEOUT).map_err(|source| {
        ClientError::Connect {
            host: host.to_owned(),
            port,
            source,
        }
    })?;
    stream
        .set_nodelay(true)
        .map_err(|source| ClientError::Connect {
            host: host.to_owned(),
            port,
            source,
        })?;
    Ok(stream)
}

fn resolve_tcp_address(host: &str, port: u16) -> io::Result<SocketAddr> {
    let mut addrs = (host, port).to_socket_addrs()?;
    addrs
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved addresses"))
}

/// Encodes `frame` and writes it in full.
pub(crate) fn write_frame(
    stream: &mut impl Write,
    frame: &Frame,
    buffer: &mut BytesMut,
) -> io::Result<()> {
    buffer.clear();
    encode_frame(frame, buffer);
    stream.write_all(buffer)
}
