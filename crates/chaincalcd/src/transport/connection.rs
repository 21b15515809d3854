//! Per-connection state owned by the event loop.

use std::collections::HashSet;
use std::io::{self, Read};
use std::net::{Shutdown, SocketAddr};
use std::sync::Arc;

use chaincalc_wire::{DecodeError, Frame, FrameDecoder, RequestKey};
use mio::net::TcpStream;

use crate::assembler::{Assembler, RequestState};

const READ_BUFFER_LEN: usize = 4096;
/// Contributed keys are pruned of settled requests past this size.
const CONTRIBUTED_PRUNE_THRESHOLD: usize = 1024;

/// What a drain of the socket's receive buffer found.
#[derive(Debug)]
pub(super) enum ReadOutcome {
    /// Everything available was read; the peer is still there.
    Open,
    /// The peer closed its side.
    Closed,
    /// The read failed.
    Failed(io::Error),
}

/// An accepted connection.
pub(super) struct Connection {
    stream: Arc<TcpStream>,
    peer: SocketAddr,
    local_port: u16,
    decoder: FrameDecoder,
    reply_port: Option<u16>,
    contributed: HashSet<RequestKey>,
}

impl Connection {
    pub(super) fn new(stream: TcpStream, peer: SocketAddr, local_port: u16) -> Self {
        Self {
            stream: Arc::new(stream),
            peer,
            local_port,
            decoder: FrameDecoder::new(),
            reply_port: None,
            contributed: HashSet::new(),
        }
    }

    pub(super) fn stream(&self) -> &Arc<TcpStream> {
        &self.stream
    }

    pub(super) fn stream_mut(&mut self) -> Option<&mut TcpStream> {
        Arc::get_mut(&mut self.stream)
    }

    pub(super) fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub(super) fn local_port(&self) -> u16 {
        self.local_port
    }

    pub(super) fn reply_port(&self) -> Option<u16> {
        self.reply_port
    }

    pub(super) fn set_reply_port(&mut self, reply_port: Option<u16>) -> Option<u16> {
        std::mem::replace(&mut self.reply_port, reply_port)
    }

    /// Reads until the socket would block, buffering bytes for decoding.
    pub(super) fn read_available(&mut self) -> ReadOutcome {
        let mut buffer = [0_u8; READ_BUFFER_LEN];
        loop {
            match (&*self.stream).read(&mut buffer) {
                Ok(0) => return ReadOutcome::Closed,
                Ok(count) => self.decoder.extend(buffer.get(..count).unwrap_or_default()),
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    return ReadOutcome::Open;
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return ReadOutcome::Failed(error),
            }
        }
    }

    pub(super) fn next_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        self.decoder.next_frame()
    }

    /// Remembers that this connection carried a chunk of `key`.
    pub(super) fn record_contribution(&mut self, key: RequestKey, assembler: &Assembler) {
        if self.contributed.len() >= CONTRIBUTED_PRUNE_THRESHOLD {
            self.contributed
                .retain(|known| assembler.state(*known) == Some(RequestState::Loading));
        }
        self.contributed.insert(key);
    }

    /// Requests this connection carried chunks for.
    pub(super) fn contributions(&self) -> impl Iterator<Item = RequestKey> + '_ {
        self.contributed.iter().copied()
    }

    /// Shuts both directions so a writer holding the stream fails fast.
    pub(super) fn shutdown(&self) -> io::Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Err(error) if error.kind() != io::ErrorKind::NotConnected => Err(error),
            _ => Ok(()),
        }
    }
}
