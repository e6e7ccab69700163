//! Per-channel counters. Each channel owns its own set; nothing is shared
//! across channels.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub(crate) struct Counter(AtomicU64);

impl Counter {
    pub(crate) fn incr(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub(crate) struct OutboundStats {
    pub(crate) transmitted: Counter,
    pub(crate) retransmitted: Counter,
    pub(crate) acknowledged: Counter,
    pub(crate) failed: Counter,
    pub(crate) dropped: Counter,
    pub(crate) overwritten: Counter,
}

impl OutboundStats {
    pub(crate) fn snapshot(&self) -> OutboundCounters {
        OutboundCounters {
            transmitted: self.transmitted.get(),
            retransmitted: self.retransmitted.get(),
            acknowledged: self.acknowledged.get(),
            failed: self.failed.get(),
            dropped: self.dropped.get(),
            overwritten: self.overwritten.get(),
        }
    }
}

/// Snapshot of an outbound channel's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutboundCounters {
    /// Frames successfully handed to the transport, retransmissions included.
    pub transmitted: u64,
    /// Attempts made after an ack timeout.
    pub retransmitted: u64,
    /// Reliable items confirmed by the device.
    pub acknowledged: u64,
    /// Reliable items abandoned after the retry budget ran out.
    pub failed: u64,
    /// Payloads dropped because the queue was full.
    pub dropped: u64,
    /// Queued payloads evicted by newer ones.
    pub overwritten: u64,
}

#[derive(Debug, Default)]
pub(crate) struct InboundStats {
    pub(crate) accepted: Counter,
    pub(crate) rejected: Counter,
    pub(crate) acks_sent: Counter,
    pub(crate) dropped: Counter,
}

impl InboundStats {
    pub(crate) fn snapshot(&self) -> InboundCounters {
        InboundCounters {
            accepted: self.accepted.get(),
            rejected: self.rejected.get(),
            acks_sent: self.acks_sent.get(),
            dropped: self.dropped.get(),
        }
    }
}

/// Snapshot of an inbound channel's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InboundCounters {
    /// Frames that passed the sequence window.
    pub accepted: u64,
    /// Stale or duplicate frames rejected by the sequence window.
    pub rejected: u64,
    /// Acknowledgements queued back to the device.
    pub acks_sent: u64,
    /// Accepted payloads lost because the readable queue was full.
    pub dropped: u64,
}
