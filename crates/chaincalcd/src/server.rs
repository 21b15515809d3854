//! Assembly of the server's threads behind a single handle.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chaincalc_config::Config;
use chaincalc_wire::{RequestId, RequestKey};
use crossbeam_channel::Sender;
use mio::{Interest, Poll, Token, Waker};
use tracing::warn;

use crate::assembler::Assembler;
use crate::compute::{Completion, ReadyNotifier, WorkerPool};
use crate::ready::ReadyQueues;
use crate::sender::{ReplyTeardown, ResultSender};
use crate::transport::{Command, EventLoop, Listener, LoopContext, ServerError, WAKER};

const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");

/// How long a daemon waits for its server threads once asked to stop.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings needed to start a [`Server`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// Address to bind every listening port on.
    pub host: String,
    /// Ports to listen on; `0` binds an ephemeral port.
    pub listen_ports: Vec<u16>,
    /// Size of the compute pool.
    pub worker_threads: usize,
}

impl ServerOptions {
    /// Extracts the server settings from a loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.host.clone(),
            listen_ports: config.listen_ports.as_slice().to_vec(),
            worker_threads: config.worker_threads,
        }
    }
}

/// Entry point for starting the server.
#[derive(Debug, Clone, Copy, Default)]
pub struct Server;

impl Server {
    /// Binds every port and starts the event loop, worker pool and sender.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the options are unusable, a port cannot
    /// be bound, or a thread cannot be spawned.
    pub fn start(options: &ServerOptions) -> Result<ServerHandle, ServerError> {
        if options.listen_ports.is_empty() {
            return Err(ServerError::NoListenPorts);
        }
        if options.worker_threads == 0 {
            return Err(ServerError::NoWorkers);
        }

        let poll = Poll::new().map_err(|source| ServerError::Poll { source })?;
        let waker = Arc::new(
            Waker::new(poll.registry(), WAKER).map_err(|source| ServerError::Poll { source })?,
        );
        let mut listeners = Vec::with_capacity(options.listen_ports.len());
        for (index, port) in options.listen_ports.iter().enumerate() {
            let mut listener = Listener::bind(&options.host, *port)?;
            poll.registry()
                .register(&mut listener.socket, Token(index), Interest::READABLE)
                .map_err(|source| ServerError::Poll { source })?;
            listeners.push(listener);
        }
        let local_ports = listeners.iter().map(Listener::port).collect();

        let assembler = Arc::new(Assembler::new());
        let ready = Arc::new(ReadyQueues::new());
        let notifier: Arc<dyn ReadyNotifier> = waker.clone();
        let pool = WorkerPool::start(
            options.worker_threads,
            Completion {
                assembler: Arc::clone(&assembler),
                ready: Arc::clone(&ready),
                notifier,
            },
        )?;
        let (commands, command_queue) = crossbeam_channel::unbounded();
        let commands = LoopCommands { commands, waker };
        let sender = ResultSender::start(Arc::clone(&assembler), Arc::new(commands.clone()))?;

        let event_loop = EventLoop::new(
            poll,
            listeners,
            LoopContext {
                assembler,
                ready,
                jobs: pool.submitter(),
                deliveries: sender.queue(),
                commands: command_queue,
            },
        );
        let event_loop = thread::Builder::new()
            .name(String::from("chaincalcd-event-loop"))
            .spawn(move || event_loop.run())
            .map_err(|source| ServerError::Spawn {
                role: "event loop",
                source,
            })?;

        Ok(ServerHandle {
            local_ports,
            commands,
            event_loop: Some(event_loop),
            pool: Some(pool),
            sender: Some(sender),
        })
    }
}

/// Sends commands to the event loop and wakes it.
#[derive(Clone)]
struct LoopCommands {
    commands: Sender<Command>,
    waker: Arc<Waker>,
}

impl LoopCommands {
    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!(
                target: SERVER_TARGET,
                command = ?command,
                "event loop has stopped; command dropped"
            );
            return;
        }
        self.waker.notify();
    }
}

impl ReplyTeardown for LoopCommands {
    fn close_client(&self, reply_port: u16) {
        self.send(Command::CloseClient(reply_port));
    }
}

/// Handle to a running server.
///
/// Dropping the handle stops the server; [`ServerHandle::stop`] does the same
/// but reports thread failures.
pub struct ServerHandle {
    local_ports: Vec<u16>,
    commands: LoopCommands,
    event_loop: Option<JoinHandle<()>>,
    pool: Option<WorkerPool>,
    sender: Option<ResultSender>,
}

impl ServerHandle {
    /// Ports actually bound, in the order they were configured.
    #[must_use]
    pub fn local_ports(&self) -> &[u16] {
        &self.local_ports
    }

    /// Cancels one request; no result is written for it afterwards.
    pub fn cancel_request(&self, reply_port: u16, request_id: RequestId) {
        self.commands
            .send(Command::Cancel(RequestKey::new(reply_port, request_id)));
    }

    /// Cancels every request of a client and closes its reply connection.
    pub fn close_client(&self, reply_port: u16) {
        self.commands.close_client(reply_port);
    }

    /// Stops the event loop, then drains the pool and the sender.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::ThreadPanic`] when a server thread panicked.
    pub fn stop(mut self) -> Result<(), ServerError> {
        self.shutdown()
    }

    /// Like [`ServerHandle::stop`], but gives up after `timeout`.
    ///
    /// Threads still draining at the deadline are left to finish on their
    /// own. If the drain thread cannot be spawned the handle is dropped,
    /// which stops the server without a deadline.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::DrainTimeout`] when the deadline passes first,
    /// and the errors of [`ServerHandle::stop`] otherwise.
    pub fn stop_within(self, timeout: Duration) -> Result<(), ServerError> {
        finish_within(timeout, move || self.stop())?
            .unwrap_or(Err(ServerError::DrainTimeout { timeout }))
    }

    fn shutdown(&mut self) -> Result<(), ServerError> {
        let Some(event_loop) = self.event_loop.take() else {
            return Ok(());
        };
        self.commands.send(Command::Shutdown);
        let mut result = event_loop.join().map_err(|_| ServerError::ThreadPanic {
            role: "event loop",
        });
        if let Some(pool) = self.pool.take() {
            result = result.and(pool.shutdown());
        }
        if let Some(sender) = self.sender.take() {
            result = result.and(sender.shutdown());
        }
        result
    }
}

/// Runs `work` on a helper thread and waits up to `timeout` for its result.
fn finish_within<T, F>(timeout: Duration, work: F) -> Result<Option<T>, ServerError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (done, finished) = crossbeam_channel::bounded(1);
    thread::Builder::new()
        .name(String::from("chaincalcd-drain"))
        .spawn(move || {
            done.send(work()).ok();
        })
        .map_err(|source| ServerError::Spawn {
            role: "drain",
            source,
        })?;
    Ok(finished.recv_timeout(timeout).ok())
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Err(error) = self.shutdown() {
            warn!(
                target: SERVER_TARGET,
                error = %error,
                "server stopped with an error"
            );
        }
    }
}
