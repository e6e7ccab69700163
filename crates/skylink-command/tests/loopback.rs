//! Commands sent through a channel manager and received back through the
//! same manager, over a transport that echoes every datagram.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use skylink_command::{
    ArgType, ArgValue, ChannelClass, Command, CommandEntry, CommandSender, Dispatcher,
    HandlerResult, RegistryBuilder,
};
use skylink_frame::{decode_datagram, Frame, FrameType, C2D_ACK, C2D_NON_ACK};
use skylink_net::{ChannelConfig, ChannelManager, LinkConfig};
use skylink_transport::FakeTransport;

/// Echo data frames back on the same channel id; ack reliable ones on
/// `id + 128` the way the device does.
fn echo_device(datagram: &[u8]) -> Vec<Bytes> {
    let Ok(frames) = decode_datagram(datagram) else {
        return Vec::new();
    };
    let mut replies = Vec::new();
    for frame in frames {
        match frame.frame_type {
            FrameType::Ack => {}
            FrameType::DataWithAck => {
                replies.push(
                    Frame::new(FrameType::Ack, frame.channel + 128, frame.seq, frame.seq.to_string())
                        .to_bytes()
                        .unwrap(),
                );
                replies.push(
                    Frame::new(FrameType::Data, frame.channel, frame.seq, frame.payload)
                        .to_bytes()
                        .unwrap(),
                );
            }
            _ => replies.push(frame.to_bytes().unwrap()),
        }
    }
    replies
}

fn loopback_link() -> LinkConfig {
    LinkConfig::new(vec![
        ChannelConfig::outbound(C2D_NON_ACK, 8),
        ChannelConfig::outbound(C2D_ACK, 8).with_ack(Duration::from_millis(300), 3),
        ChannelConfig::inbound(C2D_NON_ACK, 8),
        ChannelConfig::inbound(C2D_ACK, 8),
    ])
}

#[test]
fn sent_commands_are_dispatched_to_handlers() {
    let fake = Arc::new(FakeTransport::with_responder(echo_device));
    let manager = ChannelManager::start(fake.clone(), loopback_link()).unwrap();

    let (tx, rx) = mpsc::channel::<Command>();
    let mut builder = RegistryBuilder::new();
    builder
        .register_class(
            1,
            0,
            [(
                2,
                CommandEntry::new([ArgType::U8, ArgType::I8, ArgType::F32], {
                    let tx = tx.clone();
                    move |command: &Command| -> HandlerResult {
                        tx.send(command.clone())?;
                        Ok(())
                    }
                }),
            )],
        )
        .unwrap()
        .register_class(
            0,
            4,
            [(
                0,
                CommandEntry::new([ArgType::String], move |command: &Command| -> HandlerResult {
                    tx.send(command.clone())?;
                    Ok(())
                }),
            )],
        )
        .unwrap();
    let registry = Arc::new(builder.build());

    let dispatcher = Dispatcher::new(Arc::clone(&registry));
    let _piloting = dispatcher
        .clone()
        .spawn(manager.inbound_handle(C2D_NON_ACK).unwrap())
        .unwrap();
    let _reliable = dispatcher
        .spawn(manager.inbound_handle(C2D_ACK).unwrap())
        .unwrap();

    let sender = CommandSender::new(&manager).with_registry(registry);
    sender
        .send_command(
            1,
            0,
            2,
            ChannelClass::NonAck,
            &[ArgValue::U8(1), ArgValue::I8(-20), ArgValue::F32(0.5)],
        )
        .unwrap();
    sender
        .send_command(0, 4, 0, ChannelClass::Ack, &[ArgValue::from("hello")])
        .unwrap();
    // unknown to the registry: dispatched nowhere, nothing breaks
    sender
        .send_command(1, 0, 77, ChannelClass::NonAck, &[])
        .unwrap();

    let mut received = vec![
        rx.recv_timeout(Duration::from_secs(2)).unwrap(),
        rx.recv_timeout(Duration::from_secs(2)).unwrap(),
    ];
    received.sort_by_key(|command| command.header);

    assert_eq!(received[0].header.feature, 0);
    assert_eq!(received[0].args, vec![ArgValue::from("hello")]);
    assert_eq!(received[1].header.command, 2);
    assert_eq!(
        received[1].args,
        vec![ArgValue::U8(1), ArgValue::I8(-20), ArgValue::F32(0.5)]
    );
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    let reliable = manager.outbound_handle(C2D_ACK).unwrap();
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while reliable.counters().acknowledged == 0 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(reliable.counters().acknowledged, 1);
    assert_eq!(reliable.counters().failed, 0);
}
