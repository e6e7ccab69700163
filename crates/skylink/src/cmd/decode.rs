use skylink_frame::{channel_name, decode_datagram, FrameType};

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{payload_preview, print_frames, FrameOutput, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let datagram = parse_hex(&args.hex)?;
    let shapes = args.shapes.load()?;
    let frames =
        decode_datagram(&datagram).map_err(|err| frame_error("malformed datagram", err))?;

    let out: Vec<FrameOutput> = frames
        .iter()
        .map(|frame| FrameOutput {
            channel: frame.channel,
            channel_name: channel_name(frame.channel),
            frame_type: Some(frame.frame_type.name()),
            seq: Some(frame.seq),
            payload_size: frame.payload.len(),
            payload: payload_preview(&frame.payload),
            command: match frame.frame_type {
                FrameType::Ack => None,
                _ => shapes.describe(&frame.payload),
            },
            received_at: None,
        })
        .collect();

    print_frames(&out, format);
    Ok(SUCCESS)
}

fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input.split_whitespace().collect();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(&digits);

    if digits.is_empty() {
        return Err(CliError::new(USAGE, "datagram hex must not be empty"));
    }
    if digits.len() % 2 != 0 {
        return Err(CliError::new(
            USAGE,
            format!("datagram hex has odd length ({})", digits.len()),
        ));
    }

    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| {
                    CliError::new(
                        USAGE,
                        format!("invalid hex byte '{}'", String::from_utf8_lossy(pair)),
                    )
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_accepts_spacing_and_prefix() {
        assert_eq!(parse_hex("0x02 0a01").unwrap(), vec![0x02, 0x0a, 0x01]);
        assert_eq!(parse_hex("FF\n00").unwrap(), vec![0xff, 0x00]);
    }

    #[test]
    fn parse_hex_rejects_bad_input() {
        assert_eq!(parse_hex("").unwrap_err().code, USAGE);
        assert_eq!(parse_hex("abc").unwrap_err().code, USAGE);
        assert_eq!(parse_hex("zz").unwrap_err().code, USAGE);
    }
}
