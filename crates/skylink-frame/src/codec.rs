use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{FrameError, Result};

/// Frame header: type (1) + channel (1) + sequence (1) + length (4) = 7 bytes.
pub const HEADER_SIZE: usize = 7;

/// Largest total frame size the 32-bit length field can describe.
pub const MAX_FRAME_SIZE: usize = u32::MAX as usize;

/// Frame type byte, as defined by the device protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Acknowledgement of a reliable frame. Payload is the acked sequence number.
    Ack = 1,
    /// Best-effort data.
    Data = 2,
    /// Best-effort data that should bypass queuing delays (video, emergency).
    LowLatency = 3,
    /// Data the receiver must acknowledge on the paired ack channel.
    DataWithAck = 4,
}

impl FrameType {
    /// Whether frames of this type must be acknowledged by the receiver.
    pub fn requires_ack(self) -> bool {
        self == FrameType::DataWithAck
    }

    /// Lowercase name for logs and tool output.
    pub fn name(self) -> &'static str {
        match self {
            FrameType::Ack => "ack",
            FrameType::Data => "data",
            FrameType::LowLatency => "low_latency",
            FrameType::DataWithAck => "data_with_ack",
        }
    }
}

impl TryFrom<u8> for FrameType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(FrameType::Ack),
            2 => Ok(FrameType::Data),
            3 => Ok(FrameType::LowLatency),
            4 => Ok(FrameType::DataWithAck),
            other => Err(FrameError::UnknownFrameType(other)),
        }
    }
}

impl From<FrameType> for u8 {
    fn from(value: FrameType) -> Self {
        value as u8
    }
}

/// One link-layer frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// How the receiver must treat this frame.
    pub frame_type: FrameType,
    /// The channel this frame belongs to.
    pub channel: u8,
    /// Per-channel sequence number, wrapping at 256.
    pub seq: u8,
    /// The frame payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(frame_type: FrameType, channel: u8, seq: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            frame_type,
            channel,
            seq,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Encode this frame into a standalone datagram.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        encode_frame(self, &mut buf)?;
        Ok(buf.freeze())
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────┬──────────┬──────────┬─────────────┬──────────────────────┐
/// │ Type(1B) │ Chan(1B) │ Seq (1B) │ Length (4B) │ Payload              │
/// │          │          │          │ LE, total   │ (Length - 7 bytes)   │
/// └──────────┴──────────┴──────────┴─────────────┴──────────────────────┘
/// ```
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    let total = HEADER_SIZE
        .checked_add(frame.payload.len())
        .filter(|total| *total <= MAX_FRAME_SIZE)
        .ok_or(FrameError::PayloadTooLarge {
            size: frame.payload.len(),
            max: MAX_FRAME_SIZE - HEADER_SIZE,
        })?;

    dst.reserve(total);
    dst.put_u8(frame.frame_type.into());
    dst.put_u8(frame.channel);
    dst.put_u8(frame.seq);
    dst.put_u32_le(total as u32);
    dst.put_slice(&frame.payload);
    Ok(())
}

/// Encode several frames back-to-back into one datagram.
pub fn encode_datagram<'a>(frames: impl IntoIterator<Item = &'a Frame>) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    for frame in frames {
        encode_frame(frame, &mut buf)?;
    }
    Ok(buf.freeze())
}

/// Decode every frame in a datagram.
///
/// Parsing is all-or-nothing: if any frame is truncated, declares an
/// impossible length, or has an unknown type, the whole datagram is rejected
/// and none of the frames parsed before it are returned.
pub fn decode_datagram(datagram: &[u8]) -> Result<Vec<Frame>> {
    let mut frames = Vec::new();
    let mut offset = 0usize;

    while offset < datagram.len() {
        let rest = &datagram[offset..];
        if rest.len() < HEADER_SIZE {
            return Err(FrameError::TruncatedHeader {
                offset,
                available: rest.len(),
            });
        }

        let frame_type = FrameType::try_from(rest[0])?;
        let channel = rest[1];
        let seq = rest[2];
        let declared = u32::from_le_bytes([rest[3], rest[4], rest[5], rest[6]]) as usize;

        if declared < HEADER_SIZE {
            return Err(FrameError::InvalidLength { channel, declared });
        }
        if declared > rest.len() {
            return Err(FrameError::LengthOverrun {
                channel,
                declared,
                available: rest.len(),
            });
        }

        let payload = Bytes::copy_from_slice(&rest[HEADER_SIZE..declared]);
        trace!(channel, seq, len = payload.len(), ?frame_type, "decoded frame");
        frames.push(Frame {
            frame_type,
            channel,
            seq,
            payload,
        });
        offset += declared;
    }

    Ok(frames)
}
