use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use skylink_frame::channel_name;
use skylink_net::connect;
use tracing::{info, warn};

use crate::cmd::ListenArgs;
use crate::exit::{io_error, net_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::{now_unix_seconds, payload_preview, print_frames, FrameOutput, OutputFormat};

const SIGNAL_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let shapes = args.shapes.load()?;
    let config = args.device.connect_config(&args.link)?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut connection =
        connect(args.device.host, &config).map_err(|err| net_error("connect failed", err))?;

    let channels: Vec<u8> = connection
        .manager()
        .inbound_ids()
        .into_iter()
        .filter(|id| {
            args.channels
                .as_ref()
                .is_none_or(|wanted| wanted.contains(id))
        })
        .collect();
    if channels.is_empty() {
        return Err(CliError::new(
            USAGE,
            "none of the requested channels is configured inbound",
        ));
    }

    let (tx, rx) = mpsc::channel::<(u8, Bytes)>();
    let mut readers = Vec::with_capacity(channels.len());
    for &id in &channels {
        let source = connection
            .manager()
            .require_inbound(id)
            .map_err(|err| net_error("listen failed", err))?;
        let tx = tx.clone();
        let reader = thread::Builder::new()
            .name(format!("skylink-print-{id}"))
            .spawn(move || {
                while let Some(payload) = source.recv() {
                    if tx.send((id, payload)).is_err() {
                        break;
                    }
                }
            })
            .map_err(|err| io_error("failed to start reader", err))?;
        readers.push(reader);
    }
    drop(tx);

    info!(?channels, "listening");
    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let (channel, payload) = match rx.recv_timeout(SIGNAL_POLL_INTERVAL) {
            Ok(received) => received,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let frame = FrameOutput {
            channel,
            channel_name: channel_name(channel),
            frame_type: None,
            seq: None,
            payload_size: payload.len(),
            payload: payload_preview(&payload),
            command: shapes.describe(&payload),
            received_at: Some(now_unix_seconds()),
        };
        print_frames(std::slice::from_ref(&frame), format);
        printed = printed.saturating_add(1);

        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    connection.shutdown();
    drop(rx);
    for reader in readers {
        if reader.join().is_err() {
            warn!("payload reader panicked");
        }
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
