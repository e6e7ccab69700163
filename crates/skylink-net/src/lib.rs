//! Channel layer of the device link.
//!
//! Bounded buffers, best-effort and acknowledged outbound channels,
//! sequence-filtered inbound channels, the [`ChannelManager`] that routes
//! datagrams between them, and the one-shot negotiation exchange that learns
//! the device's listening port.

pub mod ack;
pub mod buffer;
pub mod config;
pub mod connector;
pub mod error;
pub mod inbound;
pub mod manager;
pub mod negotiate;
pub mod outbound;
mod stats;

pub use buffer::{Buffer, Dequeue, Enqueue};
pub use config::{
    ChannelConfig, ChannelKind, Direction, LinkConfig, ManagerConfig, DEFAULT_MAX_PAYLOAD,
    INFINITE_RETRIES,
};
pub use connector::{connect, ConnectConfig, Connection};
pub use error::{NetError, Result};
pub use inbound::{InboundSource, SequenceWindow, SEQUENCE_WRAP_WINDOW};
pub use manager::ChannelManager;
pub use negotiate::{
    negotiate, negotiate_stream, Negotiated, NegotiationConfig, NegotiationRequest,
    NegotiationResponse, DEFAULT_LISTEN_PORT, DEFAULT_NEGOTIATION_PORT,
};
pub use outbound::OutboundSink;
pub use stats::{InboundCounters, OutboundCounters};
