//! Wire frame codec for skylink datagrams.
//!
//! Every unit of link-layer data is framed with:
//! - A 1-byte frame type (ack, data, low-latency data, data-with-ack)
//! - A 1-byte channel ID for multiplexing
//! - A 1-byte sequence number that wraps at 256
//! - A 4-byte little-endian total length (header included)
//!
//! Several frames may be packed back-to-back in one datagram. A datagram is
//! decoded all-or-nothing: one malformed frame discards the whole datagram.

pub mod channel;
pub mod codec;
pub mod error;

pub use channel::{
    ack_channel_for, channel_name, ACK_CHANNEL_OFFSET, C2D_ACK, C2D_EMERGENCY, C2D_NON_ACK,
    D2C_EVENT, D2C_NAVDATA,
};
pub use codec::{
    decode_datagram, encode_datagram, encode_frame, Frame, FrameType, HEADER_SIZE,
    MAX_FRAME_SIZE,
};
pub use error::{FrameError, Result};
