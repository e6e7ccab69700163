use std::time::Duration;

/// Errors that can occur in channel and negotiation operations.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] skylink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] skylink_frame::FrameError),

    /// A channel configuration entry is invalid.
    #[error("invalid configuration for channel {channel}: {reason}")]
    InvalidConfig { channel: u8, reason: String },

    /// The requested channel is not configured.
    #[error("channel {0} is not configured")]
    UnknownChannel(u8),

    /// The payload exceeds the channel's maximum payload size.
    #[error("payload too large for channel {channel} ({size} bytes, max {max})")]
    PayloadTooLarge { channel: u8, size: usize, max: usize },

    /// The channel has been shut down.
    #[error("channel {0} is closed")]
    Closed(u8),

    /// A worker thread could not be started.
    #[error("failed to spawn worker {name}: {source}")]
    Spawn {
        name: String,
        source: std::io::Error,
    },

    /// Connection negotiation failed.
    #[error("negotiation failed: {0}")]
    NegotiationFailed(String),

    /// The device answered the negotiation with a non-zero status.
    #[error("device refused connection (status {0})")]
    DeviceRefused(i32),

    /// Negotiation I/O error.
    #[error("negotiation I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Negotiation timed out.
    #[error("negotiation timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, NetError>;
