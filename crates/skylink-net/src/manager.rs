use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use skylink_frame::{decode_datagram, Frame, FrameType};
use skylink_transport::{Transport, TransportError};
use tracing::{debug, info, trace, warn};

use crate::buffer::{Buffer, Enqueue};
use crate::config::{ChannelConfig, Direction, ManagerConfig};
use crate::error::{NetError, Result};
use crate::inbound::{InboundChannel, InboundSource};
use crate::outbound::{OutboundChannel, OutboundSink};

/// Where the receive loop delivers frames for one inbound channel id.
#[derive(Clone)]
enum Route {
    /// Data channel: raw frames go through the channel's sequence window.
    Data(Buffer<Frame>),
    /// Ack channel: payloads go straight to the owning sender's ack-wait point.
    Ack(Buffer<Bytes>),
}

impl Route {
    fn close(&self) {
        match self {
            Route::Data(buffer) => buffer.close(),
            Route::Ack(buffer) => buffer.close(),
        }
    }
}

/// Owns every channel of one device link and the datagram receive loop.
///
/// Construction validates the whole configuration, provisions the ack channel
/// paired with every reliable channel (id + 128, opposite direction), and
/// starts one worker per channel plus one receive worker. Dropping the manager
/// shuts everything down.
pub struct ChannelManager {
    transport: Arc<dyn Transport>,
    outbound: BTreeMap<u8, OutboundSink>,
    inbound: BTreeMap<u8, InboundSource>,
    ack_senders: Vec<OutboundSink>,
    routes: Arc<HashMap<u8, Route>>,
    workers: Vec<JoinHandle<()>>,
}

impl ChannelManager {
    /// Validate `config`, build all channels and start their workers.
    pub fn start(transport: Arc<dyn Transport>, config: impl Into<ManagerConfig>) -> Result<Self> {
        let config = config.into();
        config.link.validate()?;

        let mut manager = Self {
            transport: Arc::clone(&transport),
            outbound: BTreeMap::new(),
            inbound: BTreeMap::new(),
            ack_senders: Vec::new(),
            routes: Arc::new(HashMap::new()),
            workers: Vec::new(),
        };
        let mut routes = HashMap::new();

        // Outbound: reliable channels and the inbound ack point they wait on
        // are created together.
        for channel in config.link.direction(Direction::Outbound) {
            let acks = channel.ack_pair().map(|pair| {
                let acks = Buffer::new(pair.capacity, pair.overwrite);
                routes.insert(pair.id, Route::Ack(acks.clone()));
                acks
            });
            let (worker, sink) = OutboundChannel::new(channel.clone(), Arc::clone(&transport), acks);
            manager.spawn_worker(worker.spawn(), &routes)?;
            manager.outbound.insert(channel.id, sink);
        }

        // Inbound: reliable channels and the outbound ack sender they reply
        // through are created together.
        for channel in config.link.direction(Direction::Inbound) {
            let ack_sink = match channel.ack_pair() {
                Some(pair) => Some(manager.start_ack_sender(pair, &transport, &routes)?),
                None => None,
            };
            let (worker, incoming, source) = InboundChannel::new(channel.clone(), ack_sink);
            routes.insert(channel.id, Route::Data(incoming));
            manager.spawn_worker(worker.spawn(), &routes)?;
            manager.inbound.insert(channel.id, source);
        }

        let routes = Arc::new(routes);
        manager.routes = Arc::clone(&routes);
        let sinks = manager
            .outbound
            .values()
            .chain(manager.ack_senders.iter())
            .cloned()
            .collect();
        let receiver = spawn_receive_loop(
            Arc::clone(&transport),
            routes,
            sinks,
            config.recv_error_backoff,
        );
        manager.spawn_worker(receiver, &HashMap::new())?;

        info!(
            transport = transport.transport_name(),
            outbound = ?manager.outbound_ids(),
            inbound = ?manager.inbound_ids(),
            "channel manager started"
        );
        Ok(manager)
    }

    fn start_ack_sender(
        &mut self,
        pair: ChannelConfig,
        transport: &Arc<dyn Transport>,
        routes: &HashMap<u8, Route>,
    ) -> Result<OutboundSink> {
        let (worker, sink) = OutboundChannel::new(pair, Arc::clone(transport), None);
        self.spawn_worker(worker.spawn(), routes)?;
        self.ack_senders.push(sink.clone());
        Ok(sink)
    }

    /// Record a started worker, or tear down what was built so far.
    fn spawn_worker(
        &mut self,
        spawned: Result<JoinHandle<()>>,
        pending_routes: &HashMap<u8, Route>,
    ) -> Result<()> {
        match spawned {
            Ok(handle) => {
                self.workers.push(handle);
                Ok(())
            }
            Err(err) => {
                for route in pending_routes.values() {
                    route.close();
                }
                self.shutdown();
                Err(err)
            }
        }
    }

    /// Enqueue endpoint for a configured outbound channel.
    ///
    /// `None` means the id is not configured; that is a configuration error,
    /// not something to retry.
    pub fn outbound_handle(&self, id: u8) -> Option<OutboundSink> {
        self.outbound.get(&id).cloned()
    }

    /// Read endpoint for a configured inbound channel.
    pub fn inbound_handle(&self, id: u8) -> Option<InboundSource> {
        self.inbound.get(&id).cloned()
    }

    /// Like [`ChannelManager::outbound_handle`], as an error.
    pub fn require_outbound(&self, id: u8) -> Result<OutboundSink> {
        self.outbound_handle(id).ok_or(NetError::UnknownChannel(id))
    }

    /// Like [`ChannelManager::inbound_handle`], as an error.
    pub fn require_inbound(&self, id: u8) -> Result<InboundSource> {
        self.inbound_handle(id).ok_or(NetError::UnknownChannel(id))
    }

    /// Configured outbound channel ids, ascending.
    pub fn outbound_ids(&self) -> Vec<u8> {
        self.outbound.keys().copied().collect()
    }

    /// Configured inbound channel ids, ascending.
    pub fn inbound_ids(&self) -> Vec<u8> {
        self.inbound.keys().copied().collect()
    }

    /// The shared transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Close the transport and every buffer, then join all workers.
    ///
    /// Idempotent. Payloads still queued for transmission are discarded.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }

        self.transport.close();
        for sink in self.outbound.values().chain(self.ack_senders.iter()) {
            sink.close();
        }
        for route in self.routes.values() {
            route.close();
        }

        for worker in self.workers.drain(..) {
            let name = worker.thread().name().unwrap_or("worker").to_string();
            if worker.join().is_err() {
                warn!(worker = %name, "worker panicked");
            }
        }
        info!("channel manager stopped");
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelManager")
            .field("transport", &self.transport.transport_name())
            .field("outbound", &self.outbound_ids())
            .field("inbound", &self.inbound_ids())
            .field("workers", &self.workers.len())
            .finish()
    }
}

fn spawn_receive_loop(
    transport: Arc<dyn Transport>,
    routes: Arc<HashMap<u8, Route>>,
    sinks: Vec<OutboundSink>,
    error_backoff: Duration,
) -> Result<JoinHandle<()>> {
    let name = "skylink-recv".to_string();
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            receive_loop(transport.as_ref(), &routes, error_backoff);
            // Transport closed: wake every channel loop.
            for route in routes.values() {
                route.close();
            }
            for sink in &sinks {
                sink.close();
            }
            info!("transport closed, channel buffers closed");
        })
        .map_err(|source| NetError::Spawn { name, source })
}

fn receive_loop(transport: &dyn Transport, routes: &HashMap<u8, Route>, error_backoff: Duration) {
    debug!("receive loop started");
    loop {
        let datagram = match transport.recv() {
            Ok(datagram) => datagram,
            Err(TransportError::Closed) => break,
            Err(err) => {
                if transport.is_closed() {
                    break;
                }
                warn!(%err, "transport receive failed");
                thread::sleep(error_backoff);
                continue;
            }
        };

        let frames = match decode_datagram(&datagram) {
            Ok(frames) => frames,
            Err(err) => {
                warn!(%err, len = datagram.len(), "discarding malformed datagram");
                continue;
            }
        };

        for frame in frames {
            route_frame(routes, frame);
        }
    }
    debug!("receive loop stopped");
}

fn route_frame(routes: &HashMap<u8, Route>, frame: Frame) {
    let channel = frame.channel;
    match routes.get(&channel) {
        Some(Route::Data(incoming)) => {
            if frame.frame_type == FrameType::Ack {
                warn!(channel, "ack frame on a data channel, dropping");
                return;
            }
            if incoming.enqueue(frame) == Enqueue::DroppedNewest {
                debug!(channel, "inbound frame queue full, dropped frame");
            }
        }
        Some(Route::Ack(acks)) => {
            if frame.frame_type != FrameType::Ack {
                warn!(channel, frame_type = ?frame.frame_type, "non-ack frame on an ack channel, dropping");
                return;
            }
            trace!(channel, seq = frame.seq, "ack received");
            acks.enqueue(frame.payload);
        }
        None => {
            warn!(channel, seq = frame.seq, "frame for unconfigured channel, dropping");
        }
    }
}
