//! Controller-side link stack for Wi-Fi drones.
//!
//! skylink carries reliable and best-effort traffic between a controller and
//! a device over UDP: frame codec, per-channel send/ack/retry and ordering
//! loops, the channel manager, the connection negotiation exchange, and a
//! typed command layer on top.
//!
//! # Crate Structure
//!
//! - [`transport`]: Datagram transport abstraction (UDP, in-memory fake)
//! - [`frame`]: Wire frame codec and well-known channel ids
//! - [`net`]: Buffers, channels, channel manager, negotiation, `connect`
//! - [`command`]: Command payload codec, registry, dispatcher and sender

/// Re-export transport types.
pub mod transport {
    pub use skylink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use skylink_frame::*;
}

/// Re-export channel layer types.
pub mod net {
    pub use skylink_net::*;
}

/// Re-export command layer types.
pub mod command {
    pub use skylink_command::*;
}
