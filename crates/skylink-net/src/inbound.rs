use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use skylink_frame::Frame;
use tracing::{debug, trace, warn};

use crate::ack::ack_payload;
use crate::buffer::{Buffer, Dequeue, Enqueue};
use crate::config::ChannelConfig;
use crate::error::{NetError, Result};
use crate::outbound::OutboundSink;
use crate::stats::{InboundCounters, InboundStats};

/// Backward jump (in sequence numbers) at which a lower sequence number is
/// taken as a counter wraparound instead of a stale duplicate.
pub const SEQUENCE_WRAP_WINDOW: u8 = 10;

/// Duplicate and out-of-order filter over 8-bit sequence numbers.
///
/// A frame is accepted when no frame has been seen yet, when its sequence
/// number is greater than the last accepted one, or when it is lower by at
/// least [`SEQUENCE_WRAP_WINDOW`]. The last jump case is a heuristic: a long
/// stall followed by stale traffic can be mistaken for a wraparound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceWindow {
    last: Option<u8>,
}

impl SequenceWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide on `seq`, recording it when accepted.
    pub fn accept(&mut self, seq: u8) -> bool {
        let accepted = match self.last {
            None => true,
            Some(last) if seq > last => true,
            Some(last) => last - seq >= SEQUENCE_WRAP_WINDOW,
        };
        if accepted {
            self.last = Some(seq);
        }
        accepted
    }

    /// Last accepted sequence number.
    pub fn last(&self) -> Option<u8> {
        self.last
    }
}

/// Read endpoint of an inbound channel: payloads that passed the window.
#[derive(Clone, Debug)]
pub struct InboundSource {
    id: u8,
    readable: Buffer<Bytes>,
    stats: Arc<InboundStats>,
}

impl InboundSource {
    /// Block for the next accepted payload. `None` once the channel is shut
    /// down and drained.
    pub fn recv(&self) -> Option<Bytes> {
        self.readable.dequeue()
    }

    /// Block for at most `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Dequeue<Bytes> {
        self.readable.dequeue_timeout(timeout)
    }

    /// Take an accepted payload without blocking.
    pub fn try_recv(&self) -> Option<Bytes> {
        self.readable.try_dequeue()
    }

    /// Channel ID this source drains.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Counter snapshot for this channel.
    pub fn counters(&self) -> InboundCounters {
        self.stats.snapshot()
    }
}

/// Consumer side of an inbound channel: acks, filters, forwards.
pub(crate) struct InboundChannel {
    config: ChannelConfig,
    incoming: Buffer<Frame>,
    readable: Buffer<Bytes>,
    ack_sink: Option<OutboundSink>,
    window: SequenceWindow,
    stats: Arc<InboundStats>,
}

impl InboundChannel {
    /// Build a channel, the buffer the manager routes raw frames into, and
    /// the read endpoint.
    ///
    /// `ack_sink` is the paired outbound ack channel; it must be present
    /// exactly when the channel requires acknowledgement.
    pub(crate) fn new(
        config: ChannelConfig,
        ack_sink: Option<OutboundSink>,
    ) -> (Self, Buffer<Frame>, InboundSource) {
        let incoming = Buffer::new(config.capacity, config.overwrite);
        let readable = Buffer::new(config.capacity, config.overwrite);
        let stats = Arc::new(InboundStats::default());
        let source = InboundSource {
            id: config.id,
            readable: readable.clone(),
            stats: Arc::clone(&stats),
        };
        let channel = Self {
            config,
            incoming: incoming.clone(),
            readable,
            ack_sink,
            window: SequenceWindow::new(),
            stats,
        };
        (channel, incoming, source)
    }

    /// Run the receive loop on its own thread.
    pub(crate) fn spawn(self) -> Result<JoinHandle<()>> {
        let name = format!("skylink-in-{}", self.config.id);
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || self.run())
            .map_err(|source| NetError::Spawn { name, source })
    }

    fn run(mut self) {
        debug!(channel = self.config.id, kind = ?self.config.kind, "receive loop started");

        while let Some(frame) = self.incoming.dequeue() {
            self.handle(frame);
        }

        self.readable.close();
        debug!(channel = self.config.id, "receive loop stopped");
    }

    fn handle(&mut self, frame: Frame) {
        // Ack before filtering: a duplicate means our previous ack was lost.
        if let Some(ack_sink) = &self.ack_sink {
            match ack_sink.send(ack_payload(frame.seq)) {
                Ok(_) => self.stats.acks_sent.incr(),
                Err(err) => {
                    warn!(channel = self.config.id, seq = frame.seq, %err, "failed to queue ack");
                }
            }
        }

        if !self.window.accept(frame.seq) {
            self.stats.rejected.incr();
            debug!(
                channel = self.config.id,
                seq = frame.seq,
                last = ?self.window.last(),
                "rejected stale or duplicate frame"
            );
            return;
        }

        self.stats.accepted.incr();
        trace!(channel = self.config.id, seq = frame.seq, "accepted frame");
        if self.readable.enqueue(frame.payload) == Enqueue::DroppedNewest {
            self.stats.dropped.incr();
            debug!(channel = self.config.id, seq = frame.seq, "inbound queue full, dropped payload");
        }
    }
}
