//! Per-client queues of computed results awaiting delivery.

use std::collections::VecDeque;

use chaincalc_wire::ResponseFrame;
use dashmap::DashMap;

/// Ready results keyed by the reply port they must be written to.
#[derive(Debug, Default)]
pub(crate) struct ReadyQueues {
    queues: DashMap<u16, VecDeque<ResponseFrame>>,
}

impl ReadyQueues {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, reply_port: u16, frame: ResponseFrame) {
        self.queues.entry(reply_port).or_default().push_back(frame);
    }

    /// Takes every queued result for a port, oldest first.
    pub(crate) fn drain(&self, reply_port: u16) -> Vec<ResponseFrame> {
        self.queues
            .get_mut(&reply_port)
            .map(|mut queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    /// Ports that currently hold at least one result.
    pub(crate) fn pending_ports(&self) -> Vec<u16> {
        self.queues
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| *entry.key())
            .collect()
    }

    /// Drops a client's queue along with anything still in it.
    pub(crate) fn discard(&self, reply_port: u16) -> usize {
        self.queues
            .remove(&reply_port)
            .map_or(0, |(_, queue)| queue.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaincalc_wire::RequestId;

    fn frame(id: i32) -> ResponseFrame {
        ResponseFrame {
            request_id: RequestId(id),
            value: f64::from(id),
        }
    }

    #[test]
    fn drains_in_arrival_order() {
        let queues = ReadyQueues::new();
        queues.push(1, frame(2));
        queues.push(1, frame(1));
        queues.push(2, frame(3));

        assert_eq!(queues.drain(1), vec![frame(2), frame(1)]);
        assert!(queues.drain(1).is_empty());
        assert_eq!(queues.pending_ports(), vec![2]);
    }

    #[test]
    fn discarding_a_port_reports_dropped_results() {
        let queues = ReadyQueues::new();
        queues.push(5, frame(1));
        queues.push(5, frame(2));

        assert_eq!(queues.discard(5), 2);
        assert!(queues.pending_ports().is_empty());
    }
}
