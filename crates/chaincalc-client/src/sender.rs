//! Per-destination-port sender threads.
//!
//! Each thread owns one persistent connection to its port and a bounded
//! queue of chunks. Chunks of cancelled requests are skipped; chunks already
//! written are not recalled.

use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use bytes::BytesMut;
use chaincalc_wire::{Frame, MAX_FRAME_LEN, RequestChunk};
use crossbeam_channel::{Receiver, SendError, Sender};
use tracing::{debug, warn};

use crate::errors::ClientError;
use crate::handle::ResultHandle;
use crate::transport::{connect, write_frame};

use crate::dispatch::DISPATCH_TARGET;

/// A chunk waiting for its port's connection.
pub(crate) struct Outbound {
    pub(crate) chunk: RequestChunk,
    pub(crate) handle: ResultHandle,
}

pub(crate) struct SenderTask {
    queue: Sender<Outbound>,
    thread: JoinHandle<()>,
}

impl SenderTask {
    pub(crate) fn start(
        host: &str,
        port: u16,
        capacity: usize,
        stopping: Arc<AtomicBool>,
    ) -> Result<Self, ClientError> {
        let (queue, outbound) = crossbeam_channel::bounded(capacity);
        let host = host.to_owned();
        let thread = thread::Builder::new()
            .name(format!("chaincalc-sender-{port}"))
            .spawn(move || {
                PortSender::new(host, port).run(&outbound, &stopping);
            })
            .map_err(|source| ClientError::Spawn {
                role: "sender",
                source,
            })?;
        Ok(Self { queue, thread })
    }

    /// Queues a chunk, blocking while the queue is full.
    pub(crate) fn enqueue(&self, outbound: Outbound) -> Result<(), Outbound> {
        self.queue
            .send(outbound)
            .map_err(|SendError(outbound)| outbound)
    }

    /// Closes the queue and waits for the thread to finish.
    pub(crate) fn join(self) {
        let Self { queue, thread } = self;
        drop(queue);
        if thread.join().is_err() {
            warn!(target: DISPATCH_TARGET, "sender thread panicked");
        }
    }
}

struct PortSender {
    host: String,
    port: u16,
    stream: Option<TcpStream>,
    buffer: BytesMut,
}

impl PortSender {
    fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            stream: None,
            buffer: BytesMut::with_capacity(MAX_FRAME_LEN),
        }
    }

    fn run(mut self, outbound: &Receiver<Outbound>, stopping: &AtomicBool) {
        for Outbound { chunk, handle } in outbound {
            if stopping.load(Ordering::Acquire) {
                continue;
            }
            if handle.is_cancelled() {
                debug!(
                    target: DISPATCH_TARGET,
                    request = %chunk.request_id,
                    order = chunk.order,
                    "skipping chunk of cancelled request"
                );
                continue;
            }
            match self.send(&chunk) {
                Ok(()) => handle.chunk_written(),
                Err(reason) => {
                    warn!(
                        target: DISPATCH_TARGET,
                        request = %chunk.request_id,
                        port = self.port,
                        reason = %reason,
                        "failed to send chunk"
                    );
                    handle.fail(&reason);
                }
            }
        }
    }

    fn send(&mut self, chunk: &RequestChunk) -> Result<(), String> {
        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => connect(&self.host, self.port).map_err(|error| error.to_string())?,
        };
        write_frame(&mut stream, &Frame::Chunk(*chunk), &mut self.buffer)
            .map_err(|error| format!("write to port {} failed: {error}", self.port))?;
        self.stream = Some(stream);
        Ok(())
    }
}
