/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    /// The payload does not fit in the 32-bit length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Fewer bytes than a frame header remain in the datagram.
    #[error("truncated frame header at offset {offset} ({available} bytes left, need 7)")]
    TruncatedHeader { offset: usize, available: usize },

    /// The declared frame length runs past the end of the datagram.
    #[error("frame on channel {channel} declares {declared} bytes but only {available} remain")]
    LengthOverrun {
        channel: u8,
        declared: usize,
        available: usize,
    },

    /// The declared frame length is smaller than the header itself.
    #[error("frame on channel {channel} declares invalid length {declared}")]
    InvalidLength { channel: u8, declared: usize },

    /// The frame type byte is not one the protocol defines.
    #[error("unknown frame type {0:#04x}")]
    UnknownFrameType(u8),
}

pub type Result<T> = std::result::Result<T, FrameError>;
