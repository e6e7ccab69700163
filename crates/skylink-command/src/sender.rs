use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use skylink_frame::{C2D_ACK, C2D_EMERGENCY, C2D_NON_ACK};
use skylink_net::{ChannelManager, Enqueue, OutboundSink};
use tracing::debug;

use crate::arg::ArgValue;
use crate::codec::{encode_command, CommandHeader};
use crate::error::{CommandError, Result};
use crate::registry::CommandRegistry;

/// Traffic class a command is sent with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelClass {
    /// Best effort, newest wins (piloting).
    NonAck,
    /// Acknowledged with retries.
    Ack,
    /// Acknowledged, retried until delivered.
    Emergency,
}

impl ChannelClass {
    /// Outbound channel carrying this class in the stock channel set.
    pub fn default_channel(self) -> u8 {
        match self {
            ChannelClass::NonAck => C2D_NON_ACK,
            ChannelClass::Ack => C2D_ACK,
            ChannelClass::Emergency => C2D_EMERGENCY,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChannelClass::NonAck => "non-ack",
            ChannelClass::Ack => "ack",
            ChannelClass::Emergency => "emergency",
        }
    }

    fn index(self) -> usize {
        match self {
            ChannelClass::NonAck => 0,
            ChannelClass::Ack => 1,
            ChannelClass::Emergency => 2,
        }
    }
}

impl fmt::Display for ChannelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChannelClass {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "non-ack" | "non_ack" | "nonack" => Ok(ChannelClass::NonAck),
            "ack" => Ok(ChannelClass::Ack),
            "emergency" => Ok(ChannelClass::Emergency),
            other => Err(format!(
                "unknown traffic class '{other}' (expected non-ack, ack or emergency)"
            )),
        }
    }
}

const CLASSES: [ChannelClass; 3] = [
    ChannelClass::NonAck,
    ChannelClass::Ack,
    ChannelClass::Emergency,
];

/// Encodes commands and enqueues them on the outbound channel of their
/// traffic class.
#[derive(Debug, Clone, Default)]
pub struct CommandSender {
    sinks: [Option<OutboundSink>; 3],
    registry: Option<Arc<CommandRegistry>>,
}

impl CommandSender {
    /// Bind each traffic class to its stock channel, where configured.
    pub fn new(manager: &ChannelManager) -> Self {
        let mut sender = Self::default();
        for class in CLASSES {
            sender.sinks[class.index()] = manager.outbound_handle(class.default_channel());
        }
        sender
    }

    /// Route `class` through `sink` instead of its stock channel.
    pub fn with_channel(mut self, class: ChannelClass, sink: OutboundSink) -> Self {
        self.sinks[class.index()] = Some(sink);
        self
    }

    /// Check arguments of known commands against their registered shapes.
    pub fn with_registry(mut self, registry: Arc<CommandRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Encode a command and enqueue it on the channel for `class`.
    ///
    /// Returns as soon as the payload is queued; transmission and any retries
    /// happen on the channel's worker.
    pub fn send_command(
        &self,
        feature: u8,
        class: u8,
        command: u16,
        channel: ChannelClass,
        args: &[ArgValue],
    ) -> Result<Enqueue> {
        let header = CommandHeader::new(feature, class, command);
        if let Some(registry) = &self.registry {
            registry.validate(header, args)?;
        }

        let sink = self.sinks[channel.index()]
            .as_ref()
            .ok_or(CommandError::NoChannel(channel.name()))?;
        let payload = encode_command(header, args)?;
        let outcome = sink.send(payload)?;
        debug!(command = %header, channel = sink.id(), ?outcome, "command queued");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use skylink_frame::{decode_datagram, FrameType};
    use skylink_net::{ChannelConfig, LinkConfig};
    use skylink_transport::FakeTransport;

    use super::*;
    use crate::arg::ArgType;
    use crate::registry::{CommandEntry, RegistryBuilder};

    fn manager(fake: &Arc<FakeTransport>) -> ChannelManager {
        let link = LinkConfig::new(vec![
            ChannelConfig::outbound(C2D_NON_ACK, 2).with_overwrite(true),
            ChannelConfig::outbound(C2D_ACK, 4).with_ack(Duration::from_secs(5), 0),
        ]);
        ChannelManager::start(fake.clone(), link).unwrap()
    }

    #[test]
    fn commands_go_to_their_class_channel() {
        let fake = Arc::new(FakeTransport::new());
        let manager = manager(&fake);
        let sender = CommandSender::new(&manager);

        sender
            .send_command(1, 0, 2, ChannelClass::NonAck, &[ArgValue::U8(1)])
            .unwrap();
        assert!(fake.wait_for_sent(1, Duration::from_secs(2)));
        sender
            .send_command(0, 4, 0, ChannelClass::Ack, &[ArgValue::from("hi")])
            .unwrap();
        assert!(fake.wait_for_sent(2, Duration::from_secs(2)));

        let sent = fake.sent();
        let first = decode_datagram(&sent[0]).unwrap().remove(0);
        assert_eq!(first.channel, C2D_NON_ACK);
        assert_eq!(first.frame_type, FrameType::Data);
        assert_eq!(first.payload.as_ref(), &[1, 0, 2, 0, 1]);

        let second = decode_datagram(&sent[1]).unwrap().remove(0);
        assert_eq!(second.channel, C2D_ACK);
        assert_eq!(second.frame_type, FrameType::DataWithAck);
        assert_eq!(second.payload.as_ref(), &[0, 4, 0, 0, b'h', b'i', 0]);
    }

    #[test]
    fn missing_class_channel_is_an_error() {
        let fake = Arc::new(FakeTransport::new());
        let manager = manager(&fake);
        let sender = CommandSender::new(&manager);

        assert!(matches!(
            sender.send_command(0, 0, 0, ChannelClass::Emergency, &[]),
            Err(CommandError::NoChannel("emergency"))
        ));
    }

    #[test]
    fn registered_shape_is_enforced() {
        let fake = Arc::new(FakeTransport::new());
        let manager = manager(&fake);
        let mut builder = RegistryBuilder::new();
        builder
            .register_class(1, 0, [(2, CommandEntry::new([ArgType::U8], |_| Ok(())))])
            .unwrap();
        let sender = CommandSender::new(&manager).with_registry(Arc::new(builder.build()));

        assert!(matches!(
            sender.send_command(1, 0, 2, ChannelClass::NonAck, &[ArgValue::I8(1)]),
            Err(CommandError::ShapeMismatch { .. })
        ));
        assert!(sender
            .send_command(1, 0, 2, ChannelClass::NonAck, &[ArgValue::U8(1)])
            .is_ok());
    }

    #[test]
    fn class_names_parse() {
        assert_eq!("non-ack".parse::<ChannelClass>(), Ok(ChannelClass::NonAck));
        assert_eq!("ACK".parse::<ChannelClass>(), Ok(ChannelClass::Ack));
        assert!("bulk".parse::<ChannelClass>().is_err());
    }
}
