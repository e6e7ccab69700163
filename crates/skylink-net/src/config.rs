use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use skylink_frame::{
    ack_channel_for, FrameType, C2D_ACK, C2D_EMERGENCY, C2D_NON_ACK, D2C_EVENT, D2C_NAVDATA,
};

use crate::ack::MAX_ACK_PAYLOAD;
use crate::error::{NetError, Result};

/// Default maximum payload per frame; keeps a frame inside one Wi-Fi MTU.
pub const DEFAULT_MAX_PAYLOAD: usize = 1400;

/// Retry budget meaning "retry until acknowledged or shut down".
pub const INFINITE_RETRIES: i32 = -1;

/// Which way a channel carries data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Controller to device.
    Outbound,
    /// Device to controller.
    Inbound,
}

impl Direction {
    /// The other direction.
    pub fn opposite(self) -> Self {
        match self {
            Direction::Outbound => Direction::Inbound,
            Direction::Inbound => Direction::Outbound,
        }
    }
}

/// Traffic class of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Best-effort data.
    Data,
    /// Data that must be acknowledged; gets a paired ack channel.
    DataWithAck,
    /// Best-effort, latency sensitive data.
    LowLatency,
    /// Acknowledgements for a reliable channel. Never configured directly.
    Ack,
}

impl ChannelKind {
    /// Frame type byte used on the wire for this class.
    pub fn frame_type(self) -> FrameType {
        match self {
            ChannelKind::Data => FrameType::Data,
            ChannelKind::DataWithAck => FrameType::DataWithAck,
            ChannelKind::LowLatency => FrameType::LowLatency,
            ChannelKind::Ack => FrameType::Ack,
        }
    }

    /// Whether frames on this channel must be acknowledged.
    pub fn requires_ack(self) -> bool {
        self == ChannelKind::DataWithAck
    }
}

/// Static description of one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel ID carried in every frame header.
    pub id: u8,
    /// Direction of travel.
    pub direction: Direction,
    /// Traffic class.
    pub kind: ChannelKind,
    /// Maximum number of queued payloads.
    pub capacity: usize,
    /// Maximum payload size accepted by `send`.
    #[serde(default = "default_max_payload")]
    pub max_payload_size: usize,
    /// Full-queue policy: evict the oldest item instead of dropping the newest.
    #[serde(default)]
    pub overwrite: bool,
    /// How long to wait for an acknowledgement before retrying, in milliseconds.
    #[serde(default)]
    pub ack_timeout_ms: u64,
    /// Retransmissions after the first attempt; -1 retries forever, 0 never retries.
    #[serde(default)]
    pub max_retries: i32,
}

fn default_max_payload() -> usize {
    DEFAULT_MAX_PAYLOAD
}

impl ChannelConfig {
    /// Best-effort outbound channel.
    pub fn outbound(id: u8, capacity: usize) -> Self {
        Self::new(id, Direction::Outbound, ChannelKind::Data, capacity)
    }

    /// Best-effort inbound channel.
    pub fn inbound(id: u8, capacity: usize) -> Self {
        Self::new(id, Direction::Inbound, ChannelKind::Data, capacity)
    }

    /// Generic constructor with no overwrite and no retries.
    pub fn new(id: u8, direction: Direction, kind: ChannelKind, capacity: usize) -> Self {
        Self {
            id,
            direction,
            kind,
            capacity,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            overwrite: false,
            ack_timeout_ms: 0,
            max_retries: 0,
        }
    }

    /// Make this channel acknowledged, with the given timeout and retry budget.
    pub fn with_ack(mut self, ack_timeout: Duration, max_retries: i32) -> Self {
        self.kind = ChannelKind::DataWithAck;
        self.ack_timeout_ms = u64::try_from(ack_timeout.as_millis()).unwrap_or(u64::MAX);
        self.max_retries = max_retries;
        self
    }

    /// Switch the full-queue policy.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Override the payload size limit.
    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    /// Use the low-latency frame type.
    pub fn low_latency(mut self) -> Self {
        self.kind = ChannelKind::LowLatency;
        self
    }

    /// Acknowledgement wait per attempt.
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// Whether another attempt is allowed after `attempts` failed ones.
    pub fn may_retry(&self, attempts: u32) -> bool {
        if self.max_retries == INFINITE_RETRIES {
            return true;
        }
        i64::from(attempts) <= i64::from(self.max_retries)
    }

    /// The implicitly paired ack channel for a reliable channel.
    ///
    /// Returns `None` when this channel does not require acknowledgement.
    pub fn ack_pair(&self) -> Option<ChannelConfig> {
        if !self.kind.requires_ack() {
            return None;
        }
        let id = ack_channel_for(self.id)?;
        Some(Self {
            id,
            direction: self.direction.opposite(),
            kind: ChannelKind::Ack,
            capacity: self.capacity,
            max_payload_size: MAX_ACK_PAYLOAD,
            overwrite: self.direction == Direction::Outbound,
            ack_timeout_ms: 0,
            max_retries: 0,
        })
    }

    fn invalid(&self, reason: impl Into<String>) -> NetError {
        NetError::InvalidConfig {
            channel: self.id,
            reason: reason.into(),
        }
    }

    /// Check a single entry in isolation.
    pub fn validate(&self) -> Result<()> {
        if self.kind == ChannelKind::Ack {
            return Err(self.invalid(
                "ack channels are provisioned automatically and cannot be configured",
            ));
        }
        if self.capacity == 0 {
            return Err(self.invalid("capacity must be positive"));
        }
        if self.max_payload_size == 0 {
            return Err(self.invalid("max payload size must be positive"));
        }
        if self.max_retries < INFINITE_RETRIES {
            return Err(self.invalid(format!(
                "max retries must be -1 or greater, got {}",
                self.max_retries
            )));
        }
        if self.kind.requires_ack() {
            if ack_channel_for(self.id).is_none() {
                return Err(self.invalid("reliable channel ids must be below 128"));
            }
            if self.ack_timeout_ms == 0 {
                return Err(self.invalid("reliable channels need a non-zero ack timeout"));
            }
        }
        Ok(())
    }
}

/// The full set of channels a link is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub channels: Vec<ChannelConfig>,
}

impl LinkConfig {
    /// Create from an explicit channel list.
    pub fn new(channels: Vec<ChannelConfig>) -> Self {
        Self { channels }
    }

    /// Load a channel set from JSON (`{"channels": [...]}`).
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validate every entry and the id space they occupy, including the ack
    /// channels that will be provisioned. Fails on the first invalid entry.
    pub fn validate(&self) -> Result<()> {
        let mut taken: HashSet<(Direction, u8)> = HashSet::new();

        for channel in &self.channels {
            channel.validate()?;
            if !taken.insert((channel.direction, channel.id)) {
                return Err(channel.invalid("duplicate channel id for this direction"));
            }
        }

        for channel in &self.channels {
            if let Some(pair) = channel.ack_pair() {
                if !taken.insert((pair.direction, pair.id)) {
                    return Err(channel.invalid(format!(
                        "paired ack channel {} collides with a configured channel",
                        pair.id
                    )));
                }
            }
        }

        Ok(())
    }

    /// Configured channels for one direction.
    pub fn direction(&self, direction: Direction) -> impl Iterator<Item = &ChannelConfig> {
        self.channels
            .iter()
            .filter(move |channel| channel.direction == direction)
    }
}

impl Default for LinkConfig {
    /// The stock controller channel set.
    fn default() -> Self {
        Self::new(vec![
            ChannelConfig::outbound(C2D_NON_ACK, 2).with_overwrite(true),
            ChannelConfig::outbound(C2D_ACK, 20).with_ack(Duration::from_millis(500), 20),
            ChannelConfig::outbound(C2D_EMERGENCY, 1)
                .with_overwrite(true)
                .with_ack(Duration::from_millis(100), INFINITE_RETRIES),
            ChannelConfig::inbound(D2C_NAVDATA, 20).with_overwrite(true),
            ChannelConfig::inbound(D2C_EVENT, 20).with_ack(Duration::from_millis(500), 20),
        ])
    }
}

/// Channel manager behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Channels to provision.
    pub link: LinkConfig,
    /// Pause after a transport receive error before receiving again.
    pub recv_error_backoff: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            recv_error_backoff: Duration::from_millis(10),
        }
    }
}

impl From<LinkConfig> for ManagerConfig {
    fn from(link: LinkConfig) -> Self {
        Self {
            link,
            ..Self::default()
        }
    }
}
