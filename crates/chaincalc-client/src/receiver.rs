//! Reply-connection reader.

use std::io::{ErrorKind, Read};
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use chaincalc_wire::{RESPONSE_FRAME_LEN, decode_response};
use tracing::{debug, warn};

use crate::dispatch::DISPATCH_TARGET;
use crate::errors::ClientError;
use crate::registry::Registry;

pub(crate) struct ReceiverTask {
    thread: JoinHandle<()>,
}

impl ReceiverTask {
    pub(crate) fn start(
        stream: TcpStream,
        registry: Arc<Registry>,
        stopping: Arc<AtomicBool>,
    ) -> Result<Self, ClientError> {
        let thread = thread::Builder::new()
            .name(String::from("chaincalc-receiver"))
            .spawn(move || receive(stream, &registry, &stopping))
            .map_err(|source| ClientError::Spawn {
                role: "receiver",
                source,
            })?;
        Ok(Self { thread })
    }

    /// Waits for the thread; the caller must have shut the socket down.
    pub(crate) fn join(self) {
        if self.thread.join().is_err() {
            warn!(target: DISPATCH_TARGET, "receiver thread panicked");
        }
    }
}

fn receive(mut stream: TcpStream, registry: &Registry, stopping: &AtomicBool) {
    let mut frame = [0_u8; RESPONSE_FRAME_LEN];
    loop {
        if let Err(error) = stream.read_exact(&mut frame) {
            if stopping.load(Ordering::Acquire) {
                debug!(target: DISPATCH_TARGET, "receiver stopped");
                return;
            }
            let reason = if error.kind() == ErrorKind::UnexpectedEof {
                String::from("reply connection closed by the server")
            } else {
                format!("reply connection failed: {error}")
            };
            let failed = registry.fail_unsettled(&reason);
            warn!(target: DISPATCH_TARGET, failed, reason = %reason, "lost reply connection");
            return;
        }
        let response = decode_response(&frame);
        match registry.get(response.request_id) {
            Some(handle) => {
                if !handle.resolve(response.value) {
                    debug!(
                        target: DISPATCH_TARGET,
                        request = %response.request_id,
                        state = %handle.state(),
                        "dropping result for settled request"
                    );
                }
            }
            None => warn!(
                target: DISPATCH_TARGET,
                request = %response.request_id,
                "dropping result for unknown request"
            ),
        }
    }
}
