//! Datagram transport abstraction.
//!
//! The link layer above this crate only needs three things from the network:
//! send one datagram, block until one datagram arrives, and close. This crate
//! provides:
//! - [`UdpTransport`] for talking to a real device over Wi-Fi
//! - [`FakeTransport`] for driving the stack in tests
//!
//! Everything else in skylink builds on the [`Transport`] trait defined here.

pub mod error;
pub mod fake;
pub mod traits;
pub mod udp;

pub use error::{Result, TransportError};
pub use fake::FakeTransport;
pub use traits::Transport;
pub use udp::{UdpTransport, MAX_DATAGRAM_SIZE};
