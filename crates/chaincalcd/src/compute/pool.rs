//! Fixed-size worker pool.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chaincalc_wire::{Operand, ResponseFrame};
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, warn};

use crate::assembler::{AssembledRequest, Assembler};
use crate::ready::ReadyQueues;
use crate::transport::ServerError;

use super::errors::{ComputeError, ReductionError};
use super::reduce::reduce;
use super::COMPUTE_TARGET;

/// Wakes whoever delivers ready results.
pub(crate) trait ReadyNotifier: Send + Sync {
    /// Signals that a ready queue gained a result.
    fn notify(&self);
}

impl ReadyNotifier for mio::Waker {
    fn notify(&self) {
        if let Err(error) = self.wake() {
            warn!(
                target: COMPUTE_TARGET,
                error = %error,
                "failed to wake the event loop"
            );
        }
    }
}

/// Where workers publish their outcomes.
pub(crate) struct Completion {
    pub(crate) assembler: Arc<Assembler>,
    pub(crate) ready: Arc<ReadyQueues>,
    pub(crate) notifier: Arc<dyn ReadyNotifier>,
}

impl Completion {
    fn complete(&self, request: AssembledRequest) {
        let key = request.key();
        match evaluate(request, reduce) {
            Ok(value) => {
                if !self.assembler.mark_ready(key) {
                    debug!(
                        target: COMPUTE_TARGET,
                        request = %key,
                        "request settled before its result was ready"
                    );
                    return;
                }
                let frame = ResponseFrame {
                    request_id: key.request_id,
                    value,
                };
                self.ready.push(key.reply_port, frame);
                self.notifier.notify();
                debug!(
                    target: COMPUTE_TARGET,
                    request = %key,
                    value,
                    "result ready"
                );
            }
            Err(error) => {
                self.assembler.fail(key);
                warn!(
                    target: COMPUTE_TARGET,
                    request = %key,
                    error = %error,
                    "request failed"
                );
            }
        }
    }
}

/// Pool of named threads consuming assembled requests.
pub(crate) struct WorkerPool {
    jobs: Sender<AssembledRequest>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub(crate) fn start(size: usize, completion: Completion) -> Result<Self, ServerError> {
        let (jobs, receiver) = crossbeam_channel::unbounded::<AssembledRequest>();
        let completion = Arc::new(completion);
        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let receiver = receiver.clone();
            let completion = Arc::clone(&completion);
            let handle = thread::Builder::new()
                .name(format!("chaincalcd-worker-{index}"))
                .spawn(move || run_worker(&receiver, &completion))
                .map_err(|source| ServerError::Spawn {
                    role: "worker",
                    source,
                })?;
            workers.push(handle);
        }
        Ok(Self { jobs, workers })
    }

    /// Queue handle used by the event loop to submit complete requests.
    pub(crate) fn submitter(&self) -> Sender<AssembledRequest> {
        self.jobs.clone()
    }

    /// Closes the queue and waits for in-flight jobs to finish.
    ///
    /// Workers exit once every submitter has been dropped.
    pub(crate) fn shutdown(self) -> Result<(), ServerError> {
        let Self { jobs, workers } = self;
        drop(jobs);
        let mut panicked = false;
        for worker in workers {
            panicked |= worker.join().is_err();
        }
        if panicked {
            return Err(ServerError::ThreadPanic { role: "worker" });
        }
        Ok(())
    }
}

fn run_worker(jobs: &Receiver<AssembledRequest>, completion: &Completion) {
    for request in jobs {
        completion.complete(request);
    }
}

fn evaluate<F>(request: AssembledRequest, reducer: F) -> Result<f64, ComputeError>
where
    F: FnOnce(&[Operand]) -> Result<f64, ReductionError>,
{
    let key = request.key();
    let operands = request.into_operands();
    match panic::catch_unwind(AssertUnwindSafe(|| reducer(&operands))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(ComputeError::Reduction { key, source }),
        Err(payload) => Err(ComputeError::Panicked {
            key,
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_owned();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    String::from("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chaincalc_wire::{OperatorTag, RequestChunk, RequestId, RequestKey};
    use rstest::{fixture, rstest};

    use crate::assembler::{Accepted, RequestState};

    const PORT: u16 = 4000;

    struct ChannelNotifier(Sender<()>);

    impl ReadyNotifier for ChannelNotifier {
        fn notify(&self) {
            self.0.send(()).ok();
        }
    }

    struct Harness {
        assembler: Arc<Assembler>,
        ready: Arc<ReadyQueues>,
        woken: Receiver<()>,
        pool: WorkerPool,
    }

    #[fixture]
    fn harness() -> Harness {
        let assembler = Arc::new(Assembler::new());
        let ready = Arc::new(ReadyQueues::new());
        let (notify, woken) = crossbeam_channel::unbounded();
        let completion = Completion {
            assembler: Arc::clone(&assembler),
            ready: Arc::clone(&ready),
            notifier: Arc::new(ChannelNotifier(notify)),
        };
        let pool = WorkerPool::start(2, completion).expect("start pool");
        Harness {
            assembler,
            ready,
            woken,
            pool,
        }
    }

    fn assemble(assembler: &Assembler, id: i32, operands: &[Operand]) -> AssembledRequest {
        let total = u32::try_from(operands.len()).expect("small request");
        let mut complete = None;
        for (order, operand) in (0..total).zip(operands) {
            let chunk = RequestChunk {
                reply_port: PORT,
                order,
                request_id: RequestId(id),
                total_chunks: total,
                operand: *operand,
            };
            if let Accepted::Complete(request) = assembler.accept(chunk).expect("valid chunk") {
                complete = Some(request);
            }
        }
        complete.expect("request complete")
    }

    #[rstest]
    fn publishes_results_and_wakes_the_loop(harness: Harness) {
        let request = assemble(
            &harness.assembler,
            1,
            &[
                Operand::new(10.0, OperatorTag::Plus),
                Operand::new(10.0, OperatorTag::Plus),
                Operand::new(14.0, OperatorTag::Equals),
            ],
        );
        let jobs = harness.pool.submitter();
        jobs.send(request).expect("submit job");

        harness
            .woken
            .recv_timeout(Duration::from_secs(5))
            .expect("worker wakes the loop");
        let frames = harness.ready.drain(PORT);
        assert_eq!(
            frames,
            vec![ResponseFrame {
                request_id: RequestId(1),
                value: 34.0
            }]
        );
        let key = RequestKey::new(PORT, RequestId(1));
        assert_eq!(harness.assembler.state(key), Some(RequestState::Ready));

        drop(jobs);
        harness.pool.shutdown().expect("pool shuts down");
    }

    #[rstest]
    fn invalid_operators_fail_without_a_result(harness: Harness) {
        let request = assemble(
            &harness.assembler,
            2,
            &[
                Operand::new(1.0, OperatorTag::Sin),
                Operand::new(2.0, OperatorTag::Equals),
            ],
        );
        let jobs = harness.pool.submitter();
        jobs.send(request).expect("submit job");
        drop(jobs);
        harness.pool.shutdown().expect("pool drains its queue");

        let key = RequestKey::new(PORT, RequestId(2));
        assert_eq!(harness.assembler.state(key), Some(RequestState::Failed));
        assert!(harness.ready.pending_ports().is_empty());
        assert!(harness.woken.try_recv().is_err());
    }

    #[rstest]
    fn cancelled_requests_never_reach_the_ready_queue(harness: Harness) {
        let request = assemble(
            &harness.assembler,
            3,
            &[Operand::terminal(None, 1.0)],
        );
        let key = request.key();
        harness.assembler.cancel(key);
        let jobs = harness.pool.submitter();
        jobs.send(request).expect("submit job");
        drop(jobs);
        harness.pool.shutdown().expect("pool drains its queue");

        assert_eq!(harness.assembler.state(key), Some(RequestState::Cancelled));
        assert!(harness.ready.pending_ports().is_empty());
    }

    #[test]
    fn panics_inside_the_reduction_are_reported() {
        let assembler = Assembler::new();
        let request = assemble(&assembler, 4, &[Operand::terminal(None, 1.0)]);
        let error = evaluate(request, |_| panic!("reduction exploded"))
            .expect_err("panic becomes an error");
        assert!(matches!(
            error,
            ComputeError::Panicked { ref message, .. } if message == "reduction exploded"
        ));
    }
}
