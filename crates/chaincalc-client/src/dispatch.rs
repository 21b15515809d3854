//! The client dispatcher.
//!
//! A [`Client`] keeps one reply connection to the server, registered for its
//! reply port, and one sender thread per destination port it has used. Each
//! calculation is split into chunks that are spread round-robin across the
//! destination ports; the cursor persists across calls so consecutive
//! calculations start on different ports.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::BytesMut;
use chaincalc_wire::{Frame, MAX_FRAME_LEN, Operand, RequestChunk, RequestId};
use tracing::{debug, info, warn};

use crate::errors::ClientError;
use crate::handle::ResultHandle;
use crate::options::ClientOptions;
use crate::receiver::ReceiverTask;
use crate::registry::Registry;
use crate::sender::{Outbound, SenderTask};
use crate::transport::{connect, write_frame};

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_CRATE_NAME"), "::dispatch");

/// Writer half of the reply connection, used for control frames.
struct Control {
    stream: TcpStream,
    buffer: BytesMut,
}

impl Control {
    fn send(&mut self, frame: &Frame) -> Result<(), ClientError> {
        write_frame(&mut self.stream, frame, &mut self.buffer)
            .map_err(|source| ClientError::Control { source })
    }
}

/// Splits calculations into chunks and collects their results.
///
/// All methods take `&self`; a client may be shared between threads.
pub struct Client {
    options: ClientOptions,
    next_request: AtomicI32,
    cursor: AtomicUsize,
    registry: Arc<Registry>,
    senders: Mutex<HashMap<u16, SenderTask>>,
    control: Mutex<Control>,
    receiver: Mutex<Option<ReceiverTask>>,
    stopping: Arc<AtomicBool>,
}

impl Client {
    /// Connects to the reply port, registers for results and starts the
    /// receiver thread. Sender threads start on first use of their port.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Options`] for unusable options and connection
    /// or spawn errors when the reply side cannot be set up.
    pub fn start(options: ClientOptions) -> Result<Self, ClientError> {
        options
            .validate()
            .map_err(|source| ClientError::Options { source })?;
        let reply = connect(&options.host, options.reply_port)?;
        let mut control = Control {
            stream: reply
                .try_clone()
                .map_err(|source| ClientError::Control { source })?,
            buffer: BytesMut::with_capacity(MAX_FRAME_LEN),
        };
        control.send(&Frame::Register {
            reply_port: options.reply_port,
        })?;

        let registry = Arc::new(Registry::new());
        let stopping = Arc::new(AtomicBool::new(false));
        let receiver = ReceiverTask::start(reply, Arc::clone(&registry), Arc::clone(&stopping))?;
        info!(
            target: DISPATCH_TARGET,
            host = %options.host,
            reply_port = options.reply_port,
            destination_ports = ?options.destination_ports,
            "client started"
        );
        Ok(Self {
            options,
            next_request: AtomicI32::new(0),
            cursor: AtomicUsize::new(0),
            registry,
            senders: Mutex::new(HashMap::new()),
            control: Mutex::new(control),
            receiver: Mutex::new(Some(receiver)),
            stopping,
        })
    }

    /// Options the client was started with.
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Dispatches a chain and returns the handle its result will land in.
    ///
    /// Blocks while a destination port's queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::EmptyCalculation`] for an empty chain,
    /// [`ClientError::TooManyOperands`] when the chain cannot be numbered,
    /// [`ClientError::Stopped`] after [`Client::stop`], and spawn errors
    /// when a sender thread cannot start.
    pub fn calculate(&self, operands: &[Operand]) -> Result<ResultHandle, ClientError> {
        if self.stopping.load(Ordering::Acquire) {
            return Err(ClientError::Stopped);
        }
        if operands.is_empty() {
            return Err(ClientError::EmptyCalculation);
        }
        let total_chunks = u32::try_from(operands.len()).map_err(|_| ClientError::TooManyOperands {
            count: operands.len(),
        })?;

        let request_id = RequestId(self.next_request.fetch_add(1, Ordering::Relaxed));
        let handle = ResultHandle::new(request_id, total_chunks, self.options.request_timeout);
        self.registry.insert(handle.clone());

        let mut senders = lock(&self.senders);
        for (order, operand) in (0_u32..).zip(operands) {
            let start = self.cursor.fetch_add(1, Ordering::Relaxed);
            let Some(port) = choose_port(
                &self.options.destination_ports,
                start,
                senders.len(),
                self.options.max_sender_threads,
                |port| senders.contains_key(&port),
            ) else {
                handle.fail("no destination port available");
                break;
            };
            let task = match senders.entry(port) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    debug!(target: DISPATCH_TARGET, port, "starting sender");
                    match SenderTask::start(
                        &self.options.host,
                        port,
                        self.options.queue_capacity,
                        Arc::clone(&self.stopping),
                    ) {
                        Ok(task) => entry.insert(task),
                        Err(error) => {
                            handle.fail(&error.to_string());
                            return Err(error);
                        }
                    }
                }
            };
            let chunk = RequestChunk {
                reply_port: self.options.reply_port,
                order,
                request_id,
                total_chunks,
                operand: *operand,
            };
            let outbound = Outbound {
                chunk,
                handle: handle.clone(),
            };
            if task.enqueue(outbound).is_err() {
                handle.fail(&format!("sender for port {port} has stopped"));
                break;
            }
        }
        drop(senders);

        debug!(
            target: DISPATCH_TARGET,
            request = %request_id,
            chunks = total_chunks,
            "calculation dispatched"
        );
        Ok(handle)
    }

    /// Looks up the handle of an earlier calculation.
    #[must_use]
    pub fn get_result(&self, request_id: RequestId) -> Option<ResultHandle> {
        self.registry.get(request_id)
    }

    /// Cancels a request that has not settled yet.
    ///
    /// Queued chunks of the request are skipped; chunks already written are
    /// not recalled, but the server discards them once it sees the Cancel
    /// frame. Returns `false` for unknown or already settled requests.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Control`] when the Cancel frame cannot be
    /// written. The handle is cancelled regardless.
    pub fn cancel(&self, request_id: RequestId) -> Result<bool, ClientError> {
        let Some(handle) = self.registry.get(request_id) else {
            return Ok(false);
        };
        if !handle.cancel() {
            return Ok(false);
        }
        info!(target: DISPATCH_TARGET, request = %request_id, "request cancelled");
        lock(&self.control).send(&Frame::Cancel {
            reply_port: self.options.reply_port,
            request_id,
        })?;
        Ok(true)
    }

    /// Stops every thread and releases the connections.
    ///
    /// Queued chunks are dropped and unsettled handles fail. Calling this
    /// more than once is harmless.
    pub fn stop(&self) {
        if !self.stopping.swap(true, Ordering::AcqRel) {
            self.release();
        }
    }

    /// Tells the server to forget this client, cancels every unresolved
    /// handle and stops.
    pub fn close(&self) {
        let running = !self.stopping.swap(true, Ordering::AcqRel);
        if running
            && let Err(error) = lock(&self.control).send(&Frame::CloseClient {
                reply_port: self.options.reply_port,
            })
        {
            warn!(target: DISPATCH_TARGET, error = %error, "failed to send CloseClient");
        }
        let cancelled = self.registry.discard();
        if running {
            self.release();
        }
        info!(target: DISPATCH_TARGET, cancelled, "client closed");
    }

    /// Joins every thread; `stopping` must already be set.
    fn release(&self) {
        let senders: Vec<SenderTask> = lock(&self.senders).drain().map(|(_, task)| task).collect();
        for task in senders {
            task.join();
        }

        if let Err(error) = lock(&self.control).stream.shutdown(Shutdown::Both) {
            debug!(target: DISPATCH_TARGET, error = %error, "failed to shut down reply connection");
        }
        if let Some(receiver) = lock(&self.receiver).take() {
            receiver.join();
        }

        let failed = self.registry.fail_unsettled("client stopped");
        info!(target: DISPATCH_TARGET, failed, "client stopped");
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Picks the destination port for the next chunk.
///
/// Ports are tried in round-robin order from `start`. Once `running` has
/// reached `cap`, only ports that already have a sender qualify.
fn choose_port(
    ports: &[u16],
    start: usize,
    running: usize,
    cap: usize,
    is_running: impl Fn(u16) -> bool,
) -> Option<u16> {
    let len = ports.len();
    if len == 0 {
        return None;
    }
    let first = start % len;
    let mut candidates = (0..len).filter_map(|offset| ports.get((first + offset) % len).copied());
    if running < cap {
        candidates.next()
    } else {
        candidates.find(|port| is_running(*port))
    }
}
