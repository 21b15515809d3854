//! The single-threaded readiness loop.
//!
//! The loop owns every socket. It reads and decodes frames, feeds chunks to
//! the assembler, and hands ready results to the result sender. It never
//! evaluates a request and never writes to a socket.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use chaincalc_wire::{DecodeError, Frame, RequestChunk, RequestKey};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use mio::{Events, Interest, Poll, Token};
use slab::Slab;
use tracing::{debug, error, info, warn};

use crate::assembler::{Accepted, AssembledRequest, Assembler, RequestState};
use crate::ready::ReadyQueues;
use crate::sender::{Delivery, ResponseSink};

use super::TRANSPORT_TARGET;
use super::connection::{Connection, ReadOutcome};
use super::listener::Listener;

/// Token reserved for the waker shared with workers, the sender and the handle.
pub(crate) const WAKER: Token = Token(usize::MAX);
const EVENTS_CAPACITY: usize = 256;

/// Requests delivered to the loop from outside its thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    /// Cancel one request.
    Cancel(RequestKey),
    /// Cancel everything for a client and drop its reply connection.
    CloseClient(u16),
    /// Stop the loop.
    Shutdown,
}

/// Shared state and queues the loop feeds.
pub(crate) struct LoopContext {
    pub(crate) assembler: Arc<Assembler>,
    pub(crate) ready: Arc<ReadyQueues>,
    pub(crate) jobs: Sender<AssembledRequest>,
    pub(crate) deliveries: Sender<Delivery>,
    pub(crate) commands: Receiver<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
    /// The peer closed its side cleanly.
    PeerClosed,
    /// The stream could not be read or decoded.
    Fault,
    /// The client asked for its state to be dropped.
    ClientClosed,
}

/// Readiness loop over the listeners, their connections and the waker.
pub(crate) struct EventLoop {
    poll: Poll,
    listeners: Vec<Listener>,
    connections: Slab<Connection>,
    routes: HashMap<u16, usize>,
    context: LoopContext,
}

impl EventLoop {
    /// Builds a loop over listeners already registered with `poll`.
    ///
    /// Listener `i` must be registered under `Token(i)`.
    pub(crate) fn new(poll: Poll, listeners: Vec<Listener>, context: LoopContext) -> Self {
        Self {
            poll,
            listeners,
            connections: Slab::new(),
            routes: HashMap::new(),
            context,
        }
    }

    /// Runs until a shutdown command arrives or polling fails.
    pub(crate) fn run(mut self) {
        let ports: Vec<u16> = self.listeners.iter().map(Listener::port).collect();
        info!(
            target: TRANSPORT_TARGET,
            ports = ?ports,
            "event loop active"
        );
        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        loop {
            if let Err(error) = self.poll.poll(&mut events, None) {
                if error.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!(
                    target: TRANSPORT_TARGET,
                    error = %error,
                    "polling failed; stopping event loop"
                );
                break;
            }

            for event in &events {
                let token = event.token();
                if token == WAKER {
                    continue;
                }
                if token.0 < self.listeners.len() {
                    self.accept(token.0);
                } else {
                    self.service(token.0 - self.listeners.len());
                }
            }

            if !self.drain_commands() {
                break;
            }
            self.flush_ready();
        }
        self.close_all();
        info!(target: TRANSPORT_TARGET, "event loop stopped");
    }

    fn accept(&mut self, index: usize) {
        let offset = self.listeners.len();
        let Some(listener) = self.listeners.get(index) else {
            return;
        };
        loop {
            match listener.socket.accept() {
                Ok((mut stream, peer)) => {
                    let entry = self.connections.vacant_entry();
                    let token = Token(offset + entry.key());
                    if let Err(error) = self.poll.registry().register(
                        &mut stream,
                        token,
                        Interest::READABLE | Interest::WRITABLE,
                    ) {
                        warn!(
                            target: TRANSPORT_TARGET,
                            error = %error,
                            peer = %peer,
                            "failed to register connection"
                        );
                        continue;
                    }
                    if let Err(error) = stream.set_nodelay(true) {
                        debug!(
                            target: TRANSPORT_TARGET,
                            error = %error,
                            "failed to disable Nagle's algorithm"
                        );
                    }
                    debug!(
                        target: TRANSPORT_TARGET,
                        peer = %peer,
                        port = listener.port,
                        "connection accepted"
                    );
                    entry.insert(Connection::new(stream, peer, listener.port));
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => break,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => {
                    warn!(
                        target: TRANSPORT_TARGET,
                        error = %error,
                        port = listener.port,
                        "socket accept error"
                    );
                    break;
                }
            }
        }
    }

    fn service(&mut self, key: usize) {
        let Some(connection) = self.connections.get_mut(key) else {
            return;
        };
        let outcome = connection.read_available();

        loop {
            let Some(connection) = self.connections.get_mut(key) else {
                return;
            };
            match connection.next_frame() {
                Ok(Some(frame)) => self.dispatch(key, frame),
                Ok(None) => break,
                Err(error) => {
                    if !self.decode_failed(key, &error) {
                        return;
                    }
                }
            }
        }

        match outcome {
            ReadOutcome::Open => {}
            ReadOutcome::Closed => self.close_connection(key, Teardown::PeerClosed),
            ReadOutcome::Failed(error) => {
                warn!(
                    target: TRANSPORT_TARGET,
                    error = %error,
                    "connection read failed"
                );
                self.close_connection(key, Teardown::Fault);
            }
        }
    }

    /// Handles a decode failure; returns false when the connection was closed.
    fn decode_failed(&mut self, key: usize, error: &DecodeError) -> bool {
        if let Some(request) = error.owning_request() {
            self.context.assembler.fail(request);
            warn!(
                target: TRANSPORT_TARGET,
                request = %request,
                error = %error,
                "failing request with an undecodable chunk"
            );
            return true;
        }
        warn!(
            target: TRANSPORT_TARGET,
            error = %error,
            "malformed frame; closing connection"
        );
        self.close_connection(key, Teardown::Fault);
        false
    }

    fn dispatch(&mut self, key: usize, frame: Frame) {
        match frame {
            Frame::Chunk(chunk) => self.accept_chunk(key, chunk),
            Frame::Register { reply_port } => self.register(key, reply_port),
            Frame::Cancel {
                reply_port,
                request_id,
            } => self.cancel_request(RequestKey::new(reply_port, request_id)),
            Frame::CloseClient { reply_port } => self.close_client(reply_port),
        }
    }

    fn accept_chunk(&mut self, key: usize, chunk: RequestChunk) {
        let request = chunk.key();
        if let Some(connection) = self.connections.get_mut(key) {
            connection.record_contribution(request, &self.context.assembler);
        }
        match self.context.assembler.accept(chunk) {
            Ok(Accepted::Complete(assembled)) => {
                debug!(
                    target: TRANSPORT_TARGET,
                    request = %request,
                    "request assembled"
                );
                if self.context.jobs.send(assembled).is_err() {
                    self.context.assembler.fail(request);
                    warn!(
                        target: TRANSPORT_TARGET,
                        request = %request,
                        "worker pool is gone; failing request"
                    );
                }
            }
            Ok(Accepted::Pending { received, total }) => {
                debug!(
                    target: TRANSPORT_TARGET,
                    request = %request,
                    received,
                    total,
                    "chunk stored"
                );
            }
            Ok(Accepted::Settled(state)) => {
                debug!(
                    target: TRANSPORT_TARGET,
                    request = %request,
                    state = %state,
                    "dropping chunk for settled request"
                );
            }
            Ok(Accepted::Duplicate { order }) => {
                debug!(
                    target: TRANSPORT_TARGET,
                    request = %request,
                    order,
                    "dropping duplicate chunk"
                );
            }
            Err(error) => {
                warn!(
                    target: TRANSPORT_TARGET,
                    error = %error,
                    "inconsistent chunk failed its request"
                );
            }
        }
    }

    fn register(&mut self, key: usize, reply_port: u16) {
        let Some(connection) = self.connections.get_mut(key) else {
            return;
        };
        let peer = connection.peer();
        let previous_port = connection.set_reply_port(Some(reply_port));
        if let Some(previous_port) = previous_port.filter(|port| *port != reply_port)
            && self.routes.get(&previous_port) == Some(&key)
        {
            self.routes.remove(&previous_port);
        }
        if let Some(previous) = self.routes.insert(reply_port, key).filter(|old| *old != key) {
            if let Some(replaced) = self.connections.get_mut(previous) {
                replaced.set_reply_port(None);
            }
            warn!(
                target: TRANSPORT_TARGET,
                reply_port,
                "reply port registered again; replacing the earlier connection"
            );
        }
        info!(
            target: TRANSPORT_TARGET,
            reply_port,
            peer = %peer,
            "reply connection registered"
        );
        self.flush_port(reply_port);
    }

    fn cancel_request(&mut self, request: RequestKey) {
        if self.context.assembler.cancel(request) {
            info!(
                target: TRANSPORT_TARGET,
                request = %request,
                "request cancelled"
            );
        } else if self.context.assembler.state(request) == Some(RequestState::Sending) {
            info!(
                target: TRANSPORT_TARGET,
                request = %request,
                "cancel arrived while the result was being written"
            );
        }
    }

    fn close_client(&mut self, reply_port: u16) {
        let cancelled = self.context.assembler.cancel_client(reply_port);
        let dropped = self.context.ready.discard(reply_port);
        if let Some(key) = self.routes.remove(&reply_port) {
            self.close_connection(key, Teardown::ClientClosed);
        }
        info!(
            target: TRANSPORT_TARGET,
            reply_port,
            cancelled,
            dropped,
            "client closed"
        );
    }

    fn close_connection(&mut self, key: usize, reason: Teardown) {
        let Some(mut connection) = self.connections.try_remove(key) else {
            return;
        };
        if let Some(stream) = connection.stream_mut()
            && let Err(error) = self.poll.registry().deregister(stream)
        {
            debug!(
                target: TRANSPORT_TARGET,
                error = %error,
                "failed to deregister connection"
            );
        }
        if let Err(error) = connection.shutdown() {
            debug!(
                target: TRANSPORT_TARGET,
                error = %error,
                "failed to shut down connection"
            );
        }

        if reason == Teardown::Fault {
            let cancelled = connection
                .contributions()
                .filter(|request| self.context.assembler.cancel_if_loading(*request))
                .count();
            if cancelled > 0 {
                info!(
                    target: TRANSPORT_TARGET,
                    cancelled,
                    "cancelled requests fed by a failed connection"
                );
            }
        }

        debug!(
            target: TRANSPORT_TARGET,
            peer = %connection.peer(),
            port = connection.local_port(),
            reason = ?reason,
            "connection closed"
        );

        if let Some(reply_port) = connection.reply_port()
            && self.routes.get(&reply_port) == Some(&key)
        {
            self.routes.remove(&reply_port);
            if reason != Teardown::ClientClosed {
                self.close_client(reply_port);
            }
        }
    }

    /// Applies queued commands; returns false once the loop must stop.
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.context.commands.try_recv() {
                Ok(Command::Cancel(request)) => self.cancel_request(request),
                Ok(Command::CloseClient(reply_port)) => self.close_client(reply_port),
                Ok(Command::Shutdown) | Err(TryRecvError::Disconnected) => return false,
                Err(TryRecvError::Empty) => return true,
            }
        }
    }

    fn flush_ready(&self) {
        for reply_port in self.context.ready.pending_ports() {
            self.flush_port(reply_port);
        }
    }

    fn flush_port(&self, reply_port: u16) {
        let Some(connection) = self
            .routes
            .get(&reply_port)
            .and_then(|key| self.connections.get(*key))
        else {
            return;
        };
        for frame in self.context.ready.drain(reply_port) {
            let sink: Arc<dyn ResponseSink> = connection.stream().clone();
            let delivery = Delivery {
                sink,
                reply_port,
                frame,
            };
            if self.context.deliveries.send(delivery).is_err() {
                warn!(
                    target: TRANSPORT_TARGET,
                    reply_port,
                    "result sender is gone; dropping ready results"
                );
                return;
            }
        }
    }

    fn close_all(&mut self) {
        for (_, connection) in &self.connections {
            if let Err(error) = connection.shutdown() {
                debug!(
                    target: TRANSPORT_TARGET,
                    error = %error,
                    "failed to shut down connection"
                );
            }
        }
        self.connections.clear();
        self.routes.clear();
    }
}
