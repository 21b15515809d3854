//! The single writer of response frames.
//!
//! Every result leaves the server through this thread, so frames written to
//! one reply connection never interleave. Responses carry no length prefix:
//! a write that fails or cannot finish before [`FLUSH_DEADLINE`] leaves the
//! stream out of step, so the connection is shut down and its client closed.

use std::io::{self, Write};
use std::net::Shutdown;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chaincalc_wire::{RequestKey, ResponseFrame, encode_response};
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, warn};

use crate::assembler::Assembler;
use crate::transport::ServerError;

const SENDER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::sender");

/// Longest time spent pushing one frame into a full socket buffer.
pub(crate) const FLUSH_DEADLINE: Duration = Duration::from_secs(2);
const WRITE_BACKOFF: Duration = Duration::from_millis(1);

/// Destination of response frames.
pub(crate) trait ResponseSink: Send + Sync {
    /// Writes part of `bytes`, returning how many were accepted.
    fn write_some(&self, bytes: &[u8]) -> io::Result<usize>;

    /// Stops all further traffic in both directions.
    fn close(&self) -> io::Result<()>;
}

impl ResponseSink for mio::net::TcpStream {
    fn write_some(&self, bytes: &[u8]) -> io::Result<usize> {
        let mut stream = self;
        stream.write(bytes)
    }

    fn close(&self) -> io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            Err(error) if error.kind() != io::ErrorKind::NotConnected => Err(error),
            _ => Ok(()),
        }
    }
}

/// Drops a client whose reply connection can no longer carry responses.
pub(crate) trait ReplyTeardown: Send + Sync {
    /// Cancels the client's requests and forgets its reply connection.
    fn close_client(&self, reply_port: u16);
}

/// A ready result paired with the connection it must be written to.
pub(crate) struct Delivery {
    pub(crate) sink: Arc<dyn ResponseSink>,
    pub(crate) reply_port: u16,
    pub(crate) frame: ResponseFrame,
}

impl Delivery {
    fn key(&self) -> RequestKey {
        RequestKey::new(self.reply_port, self.frame.request_id)
    }
}

/// Handle to the sender thread.
pub(crate) struct ResultSender {
    queue: Sender<Delivery>,
    thread: JoinHandle<()>,
}

impl ResultSender {
    pub(crate) fn start(
        assembler: Arc<Assembler>,
        teardown: Arc<dyn ReplyTeardown>,
    ) -> Result<Self, ServerError> {
        let (queue, deliveries) = crossbeam_channel::unbounded::<Delivery>();
        let writer = Writer {
            assembler,
            teardown,
            flush_deadline: FLUSH_DEADLINE,
        };
        let thread = thread::Builder::new()
            .name(String::from("chaincalcd-sender"))
            .spawn(move || writer.run(&deliveries))
            .map_err(|source| ServerError::Spawn {
                role: "result sender",
                source,
            })?;
        Ok(Self { queue, thread })
    }

    /// Queue handle used by the event loop.
    pub(crate) fn queue(&self) -> Sender<Delivery> {
        self.queue.clone()
    }

    /// Stops accepting deliveries and waits for the queue to drain.
    ///
    /// The thread exits once every queue handle has been dropped.
    pub(crate) fn shutdown(self) -> Result<(), ServerError> {
        let Self { queue, thread } = self;
        drop(queue);
        thread.join().map_err(|_| ServerError::ThreadPanic {
            role: "result sender",
        })
    }
}

struct Writer {
    assembler: Arc<Assembler>,
    teardown: Arc<dyn ReplyTeardown>,
    flush_deadline: Duration,
}

impl Writer {
    fn run(&self, deliveries: &Receiver<Delivery>) {
        for delivery in deliveries {
            self.deliver(&delivery);
        }
    }

    fn deliver(&self, delivery: &Delivery) {
        let key = delivery.key();
        if !self.assembler.begin_send(key) {
            debug!(
                target: SENDER_TARGET,
                request = %key,
                "skipping result for settled request"
            );
            return;
        }

        let bytes = encode_response(&delivery.frame);
        let deadline = Instant::now() + self.flush_deadline;
        match write_fully(delivery.sink.as_ref(), &bytes, deadline) {
            Ok(()) => {
                self.assembler.mark_sent(key);
                debug!(
                    target: SENDER_TARGET,
                    request = %key,
                    value = delivery.frame.value,
                    "result sent"
                );
            }
            Err(failure) => {
                self.assembler.fail(key);
                warn!(
                    target: SENDER_TARGET,
                    request = %key,
                    written = failure.written,
                    error = %failure.error,
                    "failed to write result; closing the reply connection"
                );
                if let Err(error) = delivery.sink.close() {
                    debug!(
                        target: SENDER_TARGET,
                        error = %error,
                        "failed to shut down reply connection"
                    );
                }
                self.teardown.close_client(delivery.reply_port);
            }
        }
    }
}

/// A write that stopped part way through a frame.
#[derive(Debug)]
struct WriteFailure {
    /// Bytes of the frame already on the wire.
    written: usize,
    error: io::Error,
}

fn write_fully(
    sink: &dyn ResponseSink,
    bytes: &[u8],
    deadline: Instant,
) -> Result<(), WriteFailure> {
    let mut written = 0;
    while written < bytes.len() {
        let remaining = bytes.get(written..).unwrap_or_default();
        let error = match sink.write_some(remaining) {
            Ok(0) => io::Error::from(io::ErrorKind::WriteZero),
            Ok(count) => {
                written += count;
                continue;
            }
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                if Instant::now() < deadline {
                    thread::sleep(WRITE_BACKOFF);
                    continue;
                }
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    "reply connection did not drain before the flush deadline",
                )
            }
            Err(error) => error,
        };
        return Err(WriteFailure { written, error });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use chaincalc_wire::{
        Operand, OperatorTag, RESPONSE_FRAME_LEN, RequestChunk, RequestId, decode_response,
    };
    use rstest::rstest;

    use crate::assembler::RequestState;

    const PORT: u16 = 7000;
    const TEST_DEADLINE: Duration = Duration::from_millis(100);

    /// Sink that replays scripted write outcomes before accepting bytes.
    struct ScriptedSink {
        script: Mutex<VecDeque<io::ErrorKind>>,
        max_chunk: usize,
        capacity: usize,
        written: Mutex<Vec<u8>>,
        closed: AtomicBool,
    }

    impl ScriptedSink {
        fn new(script: &[io::ErrorKind], max_chunk: usize) -> Self {
            Self {
                script: Mutex::new(script.iter().copied().collect()),
                max_chunk,
                capacity: usize::MAX,
                written: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }
        }

        /// Accepts `capacity` bytes in total, then blocks forever.
        fn stalling_after(mut self, capacity: usize) -> Self {
            self.capacity = capacity;
            self
        }

        fn written(&self) -> Vec<u8> {
            self.written.lock().expect("sink lock").clone()
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    impl ResponseSink for ScriptedSink {
        fn write_some(&self, bytes: &[u8]) -> io::Result<usize> {
            if self.is_closed() {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }
            if let Some(kind) = self.script.lock().expect("sink lock").pop_front() {
                return Err(io::Error::from(kind));
            }
            let mut written = self.written.lock().expect("sink lock");
            let room = self.capacity.saturating_sub(written.len());
            if room == 0 {
                return Err(io::Error::from(io::ErrorKind::WouldBlock));
            }
            let count = bytes.len().min(self.max_chunk).min(room);
            written.extend_from_slice(&bytes[..count]);
            Ok(count)
        }

        fn close(&self) -> io::Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingTeardown(Mutex<Vec<u16>>);

    impl RecordingTeardown {
        fn closed_clients(&self) -> Vec<u16> {
            self.0.lock().expect("teardown lock").clone()
        }
    }

    impl ReplyTeardown for RecordingTeardown {
        fn close_client(&self, reply_port: u16) {
            self.0.lock().expect("teardown lock").push(reply_port);
        }
    }

    struct Harness {
        assembler: Arc<Assembler>,
        teardown: Arc<RecordingTeardown>,
        writer: Writer,
    }

    fn harness() -> Harness {
        let assembler = Arc::new(Assembler::new());
        let teardown = Arc::new(RecordingTeardown::default());
        let writer = Writer {
            assembler: Arc::clone(&assembler),
            teardown: teardown.clone(),
            flush_deadline: TEST_DEADLINE,
        };
        Harness {
            assembler,
            teardown,
            writer,
        }
    }

    fn ready_request(assembler: &Assembler, id: i32) -> RequestKey {
        let chunk = RequestChunk {
            reply_port: PORT,
            order: 0,
            request_id: RequestId(id),
            total_chunks: 1,
            operand: Operand::terminal(Some(OperatorTag::Plus), 1.0),
        };
        assembler.accept(chunk).expect("single chunk");
        let key = chunk.key();
        assert!(assembler.mark_ready(key));
        key
    }

    fn delivery(sink: &Arc<ScriptedSink>, id: i32, value: f64) -> Delivery {
        let sink: Arc<dyn ResponseSink> = sink.clone();
        Delivery {
            sink,
            reply_port: PORT,
            frame: ResponseFrame {
                request_id: RequestId(id),
                value,
            },
        }
    }

    #[rstest]
    #[case::whole_frame(&[], RESPONSE_FRAME_LEN)]
    #[case::partial_writes(&[], 5)]
    #[case::transient_errors(
        &[io::ErrorKind::WouldBlock, io::ErrorKind::Interrupted, io::ErrorKind::WouldBlock],
        3
    )]
    fn writes_the_whole_frame(#[case] script: &[io::ErrorKind], #[case] max_chunk: usize) {
        let harness = harness();
        let key = ready_request(&harness.assembler, 1);
        let sink = Arc::new(ScriptedSink::new(script, max_chunk));

        harness.writer.deliver(&delivery(&sink, 1, 34.0));

        let bytes: [u8; RESPONSE_FRAME_LEN] =
            sink.written().try_into().expect("exactly one frame");
        assert_eq!(
            decode_response(&bytes),
            ResponseFrame {
                request_id: RequestId(1),
                value: 34.0
            }
        );
        assert_eq!(harness.assembler.state(key), None);
        assert!(!sink.is_closed());
        assert!(harness.teardown.closed_clients().is_empty());
    }

    #[test]
    fn cancelled_results_are_never_written() {
        let harness = harness();
        let key = ready_request(&harness.assembler, 2);
        harness.assembler.cancel(key);
        let sink = Arc::new(ScriptedSink::new(&[], RESPONSE_FRAME_LEN));

        harness.writer.deliver(&delivery(&sink, 2, 1.0));

        assert!(sink.written().is_empty());
        assert_eq!(harness.assembler.state(key), Some(RequestState::Cancelled));
    }

    #[test]
    fn a_result_already_being_written_is_not_written_twice() {
        let harness = harness();
        let key = ready_request(&harness.assembler, 6);
        assert!(harness.assembler.begin_send(key));
        let sink = Arc::new(ScriptedSink::new(&[], RESPONSE_FRAME_LEN));

        harness.writer.deliver(&delivery(&sink, 6, 1.0));

        assert!(sink.written().is_empty());
    }

    #[test]
    fn hard_write_errors_close_the_client() {
        let harness = harness();
        let key = ready_request(&harness.assembler, 3);
        let sink = Arc::new(ScriptedSink::new(
            &[io::ErrorKind::BrokenPipe],
            RESPONSE_FRAME_LEN,
        ));

        harness.writer.deliver(&delivery(&sink, 3, 1.0));

        assert!(sink.written().is_empty());
        assert_eq!(harness.assembler.state(key), Some(RequestState::Failed));
        assert!(sink.is_closed());
        assert_eq!(harness.teardown.closed_clients(), vec![PORT]);
    }

    #[test]
    fn a_stalled_partial_frame_shuts_the_reply_connection() {
        let harness = harness();
        let stalled = ready_request(&harness.assembler, 5);
        let next = ready_request(&harness.assembler, 7);
        let sink = Arc::new(ScriptedSink::new(&[], RESPONSE_FRAME_LEN).stalling_after(5));

        harness.writer.deliver(&delivery(&sink, 5, 1.0));
        harness.writer.deliver(&delivery(&sink, 7, 2.0));

        assert_eq!(sink.written().len(), 5, "no bytes follow the torn frame");
        assert!(sink.is_closed());
        assert_eq!(harness.assembler.state(stalled), Some(RequestState::Failed));
        assert_eq!(harness.assembler.state(next), Some(RequestState::Failed));
        assert_eq!(harness.teardown.closed_clients(), vec![PORT, PORT]);
    }

    #[test]
    fn write_failures_report_the_bytes_already_written() {
        let sink = ScriptedSink::new(&[], RESPONSE_FRAME_LEN).stalling_after(5);
        let failure = write_fully(&sink, &[1; RESPONSE_FRAME_LEN], Instant::now() + TEST_DEADLINE)
            .expect_err("sink stalls mid-frame");
        assert_eq!(failure.written, 5);
        assert_eq!(failure.error.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn a_sink_that_never_drains_hits_the_deadline() {
        let sink = ScriptedSink::new(&[io::ErrorKind::WouldBlock; 64], RESPONSE_FRAME_LEN);
        let failure = write_fully(&sink, &[0; 4], Instant::now())
            .expect_err("deadline already passed");
        assert_eq!(failure.written, 0);
        assert_eq!(failure.error.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn sender_thread_drains_its_queue_before_stopping() {
        let assembler = Arc::new(Assembler::new());
        let key = ready_request(&assembler, 4);
        let sink = Arc::new(ScriptedSink::new(&[], RESPONSE_FRAME_LEN));
        let teardown = Arc::new(RecordingTeardown::default());
        let sender =
            ResultSender::start(Arc::clone(&assembler), teardown).expect("start sender");

        let queue = sender.queue();
        queue.send(delivery(&sink, 4, 2.5)).expect("queue delivery");
        drop(queue);
        sender.shutdown().expect("sender stops");

        assert_eq!(sink.written().len(), RESPONSE_FRAME_LEN);
        assert_eq!(assembler.state(key), None);
    }
}
