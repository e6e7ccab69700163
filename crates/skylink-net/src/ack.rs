//! Acknowledgement payload format.
//!
//! An ack carries the acknowledged sequence number as decimal ASCII text.

use bytes::Bytes;

/// Longest ack payload: the text of sequence number 255.
pub const MAX_ACK_PAYLOAD: usize = 3;

/// Build the ack payload for `seq`.
pub fn ack_payload(seq: u8) -> Bytes {
    Bytes::from(seq.to_string())
}

/// Whether `payload` acknowledges `seq`. Anything else is ignored by the sender.
pub fn acknowledges(payload: &[u8], seq: u8) -> bool {
    payload == seq.to_string().as_bytes()
}
