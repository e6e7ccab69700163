//! Well-known channel IDs.
//!
//! Channel IDs 0-127 carry data. Every channel that requires acknowledgement
//! has a paired ack channel at `id + 128` flowing the opposite direction.

/// Offset between a reliable channel and its paired ack channel.
pub const ACK_CHANNEL_OFFSET: u8 = 128;

/// Controller to device: periodic piloting, best effort.
pub const C2D_NON_ACK: u8 = 10;

/// Controller to device: reliable commands.
pub const C2D_ACK: u8 = 11;

/// Controller to device: reliable high-priority commands (emergency, landing).
pub const C2D_EMERGENCY: u8 = 12;

/// Device to controller: periodic navigation data, best effort.
pub const D2C_NAVDATA: u8 = 127;

/// Device to controller: reliable state change events.
pub const D2C_EVENT: u8 = 126;

/// Returns the ack channel paired with a reliable channel, or `None` if `id`
/// is itself in the ack range.
pub fn ack_channel_for(id: u8) -> Option<u8> {
    id.checked_add(ACK_CHANNEL_OFFSET)
}

/// Returns a human-readable name for a channel ID.
pub fn channel_name(id: u8) -> &'static str {
    match id {
        C2D_NON_ACK => "C2D_NON_ACK",
        C2D_ACK => "C2D_ACK",
        C2D_EMERGENCY => "C2D_EMERGENCY",
        D2C_NAVDATA => "D2C_NAVDATA",
        D2C_EVENT => "D2C_EVENT",
        128..=255 => "ACK",
        _ => "USER",
    }
}
