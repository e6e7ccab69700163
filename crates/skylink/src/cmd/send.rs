use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use skylink_command::{ArgValue, ChannelClass, CommandHeader, CommandSender};
use skylink_net::{connect, Direction, LinkConfig, OutboundCounters};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{command_error, net_error, CliResult, FAILURE, SUCCESS, TIMEOUT};
use crate::output::{print_record, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum Delivery {
    /// Handed to the transport; no acknowledgement expected.
    Transmitted,
    /// Acknowledged by the device.
    Acknowledged,
    /// Retry budget exhausted without an acknowledgement.
    Failed,
    /// Still in flight when the wait ran out.
    Pending,
}

#[derive(Serialize)]
struct SendOutput {
    feature: u8,
    class: u8,
    command: u16,
    traffic: ChannelClass,
    channel: u8,
    args: usize,
    delivery: Delivery,
    transmissions: u64,
}

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let values = args
        .args
        .iter()
        .map(|literal| {
            ArgValue::parse_typed(literal)
                .map_err(|err| command_error(&format!("invalid --arg '{literal}'"), err))
        })
        .collect::<CliResult<Vec<_>>>()?;
    let wait = parse_duration(&args.wait)?;

    let header = CommandHeader::new(args.feature, args.class, args.command);
    let registry = Arc::new(args.shapes.load()?.registry()?);
    registry
        .validate(header, &values)
        .map_err(|err| command_error("arguments rejected", err))?;

    let config = args.device.connect_config(&args.link)?;
    let channel = args.traffic.default_channel();
    let reliable = is_reliable(&config.manager.link, channel);

    let mut connection =
        connect(args.device.host, &config).map_err(|err| net_error("connect failed", err))?;
    let sink = connection
        .manager()
        .require_outbound(channel)
        .map_err(|err| net_error("no channel for traffic class", err))?;

    CommandSender::new(connection.manager())
        .with_registry(registry)
        .send_command(
            args.feature,
            args.class,
            args.command,
            args.traffic,
            &values,
        )
        .map_err(|err| command_error("send failed", err))?;

    let delivery = wait_for_delivery(|| sink.counters(), reliable, wait);
    let transmissions = sink.counters().transmitted;
    connection.shutdown();

    print_record(
        &SendOutput {
            feature: args.feature,
            class: args.class,
            command: args.command,
            traffic: args.traffic,
            channel,
            args: values.len(),
            delivery,
            transmissions,
        },
        format,
    );

    Ok(match delivery {
        Delivery::Transmitted | Delivery::Acknowledged => SUCCESS,
        Delivery::Failed => FAILURE,
        Delivery::Pending => TIMEOUT,
    })
}

fn is_reliable(link: &LinkConfig, channel: u8) -> bool {
    link.direction(Direction::Outbound)
        .find(|config| config.id == channel)
        .is_some_and(|config| config.kind.requires_ack())
}

fn wait_for_delivery(
    counters: impl Fn() -> OutboundCounters,
    reliable: bool,
    timeout: Duration,
) -> Delivery {
    let deadline = Instant::now() + timeout;
    loop {
        let current = counters();
        if reliable {
            if current.acknowledged > 0 {
                return Delivery::Acknowledged;
            }
            if current.failed > 0 {
                return Delivery::Failed;
            }
        } else if current.transmitted > 0 {
            return Delivery::Transmitted;
        }

        if Instant::now() >= deadline {
            return Delivery::Pending;
        }
        thread::sleep(POLL_INTERVAL);
    }
}
