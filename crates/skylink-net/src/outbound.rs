use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use bytes::Bytes;
use skylink_frame::{Frame, FrameType};
use skylink_transport::Transport;
use tracing::{debug, trace, warn};

use crate::ack::acknowledges;
use crate::buffer::{Buffer, Dequeue, Enqueue};
use crate::config::ChannelConfig;
use crate::error::{NetError, Result};
use crate::stats::{OutboundCounters, OutboundStats};

/// Enqueue endpoint of an outbound channel.
///
/// `send` returns as soon as the payload is queued; the channel's send loop
/// transmits it (and retries it, for reliable channels) in the background.
#[derive(Clone, Debug)]
pub struct OutboundSink {
    id: u8,
    max_payload_size: usize,
    queue: Buffer<Bytes>,
    stats: Arc<OutboundStats>,
}

impl OutboundSink {
    /// Queue a payload for transmission.
    ///
    /// A full queue is not an error: the payload is dropped, or the oldest
    /// queued payload is evicted, depending on the channel's policy. The
    /// returned [`Enqueue`] says which happened.
    pub fn send(&self, payload: impl Into<Bytes>) -> Result<Enqueue> {
        let payload = payload.into();
        if payload.len() > self.max_payload_size {
            return Err(NetError::PayloadTooLarge {
                channel: self.id,
                size: payload.len(),
                max: self.max_payload_size,
            });
        }

        let outcome = self.queue.enqueue(payload);
        match outcome {
            Enqueue::Queued => {}
            Enqueue::DroppedNewest => {
                self.stats.dropped.incr();
                debug!(channel = self.id, "outbound queue full, dropped newest payload");
            }
            Enqueue::Overwrote => {
                self.stats.overwritten.incr();
                trace!(channel = self.id, "outbound queue full, evicted oldest payload");
            }
            Enqueue::Closed => return Err(NetError::Closed(self.id)),
        }
        Ok(outcome)
    }

    /// Channel ID this sink feeds.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Payloads waiting to be transmitted.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Counter snapshot for this channel.
    pub fn counters(&self) -> OutboundCounters {
        self.stats.snapshot()
    }

    pub(crate) fn close(&self) {
        self.queue.close();
    }
}

/// Result of pushing one queued payload through the send loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Sent,
    Acknowledged,
    Failed,
    Aborted,
}

/// Consumer side of an outbound channel: frames, transmits and retries.
pub(crate) struct OutboundChannel {
    config: ChannelConfig,
    frame_type: FrameType,
    queue: Buffer<Bytes>,
    acks: Option<Buffer<Bytes>>,
    transport: Arc<dyn Transport>,
    stats: Arc<OutboundStats>,
    seq: u8,
}

impl OutboundChannel {
    /// Build a channel and its sink.
    ///
    /// `acks` is the ack-wait point fed by the paired inbound ack channel; it
    /// must be present exactly when the channel requires acknowledgement.
    pub(crate) fn new(
        config: ChannelConfig,
        transport: Arc<dyn Transport>,
        acks: Option<Buffer<Bytes>>,
    ) -> (Self, OutboundSink) {
        let queue = Buffer::new(config.capacity, config.overwrite);
        let stats = Arc::new(OutboundStats::default());
        let sink = OutboundSink {
            id: config.id,
            max_payload_size: config.max_payload_size,
            queue: queue.clone(),
            stats: Arc::clone(&stats),
        };
        let channel = Self {
            frame_type: config.kind.frame_type(),
            config,
            queue,
            acks,
            transport,
            stats,
            seq: 0,
        };
        (channel, sink)
    }

    /// Run the send loop on its own thread.
    pub(crate) fn spawn(self) -> Result<JoinHandle<()>> {
        let name = format!("skylink-out-{}", self.config.id);
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || self.run())
            .map_err(|source| NetError::Spawn { name, source })
    }

    fn run(mut self) {
        debug!(channel = self.config.id, kind = ?self.config.kind, "send loop started");

        while let Some(payload) = self.queue.dequeue() {
            if self.transport.is_closed() {
                break;
            }

            self.seq = self.seq.wrapping_add(1);
            let frame = Frame::new(self.frame_type, self.config.id, self.seq, payload);
            let datagram = match frame.to_bytes() {
                Ok(datagram) => datagram,
                Err(err) => {
                    warn!(channel = self.config.id, seq = self.seq, %err, "failed to encode frame");
                    continue;
                }
            };

            if self.deliver(&datagram) == Delivery::Aborted {
                break;
            }
        }

        debug!(channel = self.config.id, "send loop stopped");
    }

    fn deliver(&self, datagram: &[u8]) -> Delivery {
        let Some(acks) = &self.acks else {
            self.transmit(datagram, 1);
            return Delivery::Sent;
        };

        let mut attempts = 0u32;
        loop {
            attempts = attempts.saturating_add(1);
            self.transmit(datagram, attempts);

            match self.await_ack(acks) {
                Delivery::Acknowledged => {
                    self.stats.acknowledged.incr();
                    trace!(channel = self.config.id, seq = self.seq, attempts, "acknowledged");
                    return Delivery::Acknowledged;
                }
                Delivery::Aborted => return Delivery::Aborted,
                _ => {}
            }

            if !self.config.may_retry(attempts) {
                self.stats.failed.incr();
                warn!(
                    channel = self.config.id,
                    seq = self.seq,
                    attempts,
                    "delivery failed: no acknowledgement"
                );
                return Delivery::Failed;
            }
            if self.transport.is_closed() {
                return Delivery::Aborted;
            }
            self.stats.retransmitted.incr();
        }
    }

    fn await_ack(&self, acks: &Buffer<Bytes>) -> Delivery {
        let deadline = Instant::now() + self.config.ack_timeout();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match acks.dequeue_timeout(remaining) {
                Dequeue::Item(payload) if acknowledges(&payload, self.seq) => {
                    return Delivery::Acknowledged;
                }
                Dequeue::Item(payload) => {
                    trace!(
                        channel = self.config.id,
                        seq = self.seq,
                        ack = %String::from_utf8_lossy(&payload),
                        "ignoring unrelated ack"
                    );
                }
                Dequeue::TimedOut => return Delivery::Failed,
                Dequeue::Closed => return Delivery::Aborted,
            }
        }
    }

    fn transmit(&self, datagram: &[u8], attempt: u32) {
        match self.transport.send(datagram) {
            Ok(()) => {
                self.stats.transmitted.incr();
                trace!(channel = self.config.id, seq = self.seq, attempt, "frame sent");
            }
            Err(err) => {
                warn!(channel = self.config.id, seq = self.seq, attempt, %err, "transport send failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use skylink_frame::decode_datagram;
    use skylink_transport::FakeTransport;

    use super::*;
    use crate::ack::ack_payload;
    use crate::config::INFINITE_RETRIES;

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    fn sent_frames(fake: &FakeTransport) -> Vec<Frame> {
        fake.sent()
            .iter()
            .flat_map(|datagram| decode_datagram(datagram).unwrap())
            .collect()
    }

    #[test]
    fn best_effort_frames_get_increasing_sequence() {
        let fake = Arc::new(FakeTransport::new());
        let (channel, sink) =
            OutboundChannel::new(ChannelConfig::outbound(10, 8), fake.clone(), None);
        let worker = channel.spawn().unwrap();

        for payload in [&b"a"[..], b"b", b"c"] {
            assert_eq!(sink.send(payload).unwrap(), Enqueue::Queued);
        }
        assert!(fake.wait_for_sent(3, Duration::from_secs(2)));

        let frames = sent_frames(&fake);
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.frame_type == FrameType::Data && f.channel == 10));
        assert_eq!(
            frames.iter().map(|f| f.seq).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(frames[2].payload.as_ref(), b"c");

        sink.close();
        worker.join().unwrap();
        assert_eq!(sink.counters().transmitted, 3);
    }

    #[test]
    fn low_latency_frames_are_sent_without_ack_wait() {
        let fake = Arc::new(FakeTransport::new());
        let config = ChannelConfig::outbound(13, 4).low_latency();
        assert!(config.ack_pair().is_none());
        let (channel, sink) = OutboundChannel::new(config, fake.clone(), None);
        let worker = channel.spawn().unwrap();

        sink.send(&b"frag-1"[..]).unwrap();
        sink.send(&b"frag-2"[..]).unwrap();
        assert!(fake.wait_for_sent(2, Duration::from_secs(2)));

        let frames = sent_frames(&fake);
        assert!(frames
            .iter()
            .all(|f| f.frame_type == FrameType::LowLatency && f.channel == 13));
        assert_eq!(frames.iter().map(|f| f.seq).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(sink.counters().retransmitted, 0);
        assert_eq!(sink.counters().acknowledged, 0);

        sink.close();
        worker.join().unwrap();
    }

    #[test]
    fn reliable_send_completes_on_matching_ack() {
        let fake = Arc::new(FakeTransport::new());
        let acks = Buffer::new(4, true);
        let config = ChannelConfig::outbound(11, 4).with_ack(Duration::from_millis(500), 3);
        let (channel, sink) = OutboundChannel::new(config, fake.clone(), Some(acks.clone()));
        let worker = channel.spawn().unwrap();

        sink.send(&b"takeoff"[..]).unwrap();
        assert!(fake.wait_for_sent(1, Duration::from_secs(2)));
        acks.enqueue(ack_payload(1));

        assert!(wait_until(Duration::from_secs(2), || {
            sink.counters().acknowledged == 1
        }));
        assert_eq!(fake.sent_count(), 1);
        assert_eq!(sink.counters().retransmitted, 0);

        sink.close();
        acks.close();
        worker.join().unwrap();
    }

    #[test]
    fn exhausted_retries_report_delivery_failure() {
        let fake = Arc::new(FakeTransport::new());
        let acks = Buffer::new(4, true);
        let config = ChannelConfig::outbound(11, 4).with_ack(Duration::from_millis(30), 1);
        let (channel, sink) = OutboundChannel::new(config, fake.clone(), Some(acks.clone()));
        let worker = channel.spawn().unwrap();

        sink.send(&b"lost"[..]).unwrap();
        assert!(wait_until(Duration::from_secs(2), || sink.counters().failed == 1));

        let frames = sent_frames(&fake);
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.seq == 1));
        assert_eq!(sink.counters().retransmitted, 1);

        sink.close();
        acks.close();
        worker.join().unwrap();
    }

    #[test]
    fn channel_continues_after_delivery_failure() {
        let fake = Arc::new(FakeTransport::new());
        let acks = Buffer::new(4, true);
        let config = ChannelConfig::outbound(11, 4).with_ack(Duration::from_millis(20), 0);
        let (channel, sink) = OutboundChannel::new(config, fake.clone(), Some(acks.clone()));
        let worker = channel.spawn().unwrap();

        sink.send(&b"first"[..]).unwrap();
        sink.send(&b"second"[..]).unwrap();
        assert!(wait_until(Duration::from_secs(2), || sink.counters().failed == 2));

        let seqs: Vec<u8> = sent_frames(&fake).iter().map(|f| f.seq).collect();
        assert_eq!(seqs, vec![1, 2]);

        sink.close();
        acks.close();
        worker.join().unwrap();
    }

    #[test]
    fn mismatched_ack_is_ignored() {
        let fake = Arc::new(FakeTransport::new());
        let acks = Buffer::new(4, true);
        let config = ChannelConfig::outbound(11, 4).with_ack(Duration::from_millis(80), 1);
        let (channel, sink) = OutboundChannel::new(config, fake.clone(), Some(acks.clone()));
        let worker = channel.spawn().unwrap();

        sink.send(&b"cmd"[..]).unwrap();
        assert!(fake.wait_for_sent(1, Duration::from_secs(2)));
        acks.enqueue(Bytes::from_static(b"7"));

        assert!(fake.wait_for_sent(2, Duration::from_secs(2)));
        acks.enqueue(ack_payload(1));
        assert!(wait_until(Duration::from_secs(2), || {
            sink.counters().acknowledged == 1
        }));
        assert_eq!(sink.counters().failed, 0);

        sink.close();
        acks.close();
        worker.join().unwrap();
    }

    #[test]
    fn closing_ack_point_aborts_infinite_retry() {
        let fake = Arc::new(FakeTransport::new());
        let acks = Buffer::new(4, true);
        let config =
            ChannelConfig::outbound(12, 1).with_ack(Duration::from_millis(10), INFINITE_RETRIES);
        let (channel, sink) = OutboundChannel::new(config, fake.clone(), Some(acks.clone()));
        let worker = channel.spawn().unwrap();

        sink.send(&b"emergency"[..]).unwrap();
        assert!(fake.wait_for_sent(3, Duration::from_secs(2)));

        sink.close();
        acks.close();
        worker.join().unwrap();
        assert_eq!(sink.counters().failed, 0);
    }

    #[test]
    fn transport_failure_counts_as_attempt() {
        let fake = Arc::new(FakeTransport::new());
        fake.fail_next_sends(1);
        let acks = Buffer::new(4, true);
        let config = ChannelConfig::outbound(11, 4).with_ack(Duration::from_millis(20), 2);
        let (channel, sink) = OutboundChannel::new(config, fake.clone(), Some(acks.clone()));
        let worker = channel.spawn().unwrap();

        sink.send(&b"cmd"[..]).unwrap();
        assert!(wait_until(Duration::from_secs(2), || sink.counters().failed == 1));
        assert_eq!(fake.sent_count(), 2);
        assert_eq!(sink.counters().retransmitted, 2);

        sink.close();
        acks.close();
        worker.join().unwrap();
    }

    #[test]
    fn rejects_oversized_payload() {
        let fake = Arc::new(FakeTransport::new());
        let config = ChannelConfig::outbound(10, 2).with_max_payload_size(4);
        let (_channel, sink) = OutboundChannel::new(config, fake, None);

        assert!(matches!(
            sink.send(&b"too long"[..]),
            Err(NetError::PayloadTooLarge {
                channel: 10,
                size: 8,
                max: 4
            })
        ));
    }

    #[test]
    fn full_queue_policies_are_counted() {
        let fake = Arc::new(FakeTransport::new());
        let (_drop, drop_sink) =
            OutboundChannel::new(ChannelConfig::outbound(10, 1), fake.clone(), None);
        let (_over, over_sink) = OutboundChannel::new(
            ChannelConfig::outbound(20, 1).with_overwrite(true),
            fake,
            None,
        );

        drop_sink.send(&b"1"[..]).unwrap();
        assert_eq!(drop_sink.send(&b"2"[..]).unwrap(), Enqueue::DroppedNewest);
        over_sink.send(&b"1"[..]).unwrap();
        assert_eq!(over_sink.send(&b"2"[..]).unwrap(), Enqueue::Overwrote);

        assert_eq!(drop_sink.counters().dropped, 1);
        assert_eq!(over_sink.counters().overwritten, 1);
        assert_eq!(over_sink.pending(), 1);
    }

    #[test]
    fn send_after_close_fails() {
        let fake = Arc::new(FakeTransport::new());
        let (_channel, sink) = OutboundChannel::new(ChannelConfig::outbound(10, 2), fake, None);
        sink.close();
        assert!(matches!(sink.send(&b"x"[..]), Err(NetError::Closed(10))));
    }
}
