//! Command payload encoding: `[feature:1][class:1][command:2 LE][args...]`.
//!
//! Numeric arguments are fixed-width little-endian; strings are raw bytes
//! followed by a NUL terminator.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;
use tracing::debug;

use crate::arg::{ArgType, ArgValue, Shape};
use crate::error::{CommandError, Result};

/// Size of the command header at the front of every payload.
pub const COMMAND_HEADER_SIZE: usize = 4;

/// Command address: feature, class within the feature, command within the class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CommandHeader {
    pub feature: u8,
    pub class: u8,
    pub command: u16,
}

impl CommandHeader {
    pub fn new(feature: u8, class: u8, command: u16) -> Self {
        Self {
            feature,
            class,
            command,
        }
    }

    /// Split `payload` into its header and argument bytes.
    pub fn parse(payload: &[u8]) -> Result<(Self, &[u8])> {
        if payload.len() < COMMAND_HEADER_SIZE {
            return Err(CommandError::ShortHeader(payload.len()));
        }
        let (mut header, body) = payload.split_at(COMMAND_HEADER_SIZE);
        let feature = header.get_u8();
        let class = header.get_u8();
        let command = header.get_u16_le();
        Ok((Self::new(feature, class, command), body))
    }

    fn put(&self, dst: &mut BytesMut) {
        dst.put_u8(self.feature);
        dst.put_u8(self.class);
        dst.put_u16_le(self.command);
    }
}

impl fmt::Display for CommandHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.feature, self.class, self.command)
    }
}

/// A decoded command: its address and a freshly built argument list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
    pub header: CommandHeader,
    pub args: Vec<ArgValue>,
}

/// Encode a command payload.
///
/// Fails only if a string argument contains a NUL byte, which would make the
/// payload undecodable.
pub fn encode_command(header: CommandHeader, args: &[ArgValue]) -> Result<Bytes> {
    let body: usize = args.iter().map(encoded_len).sum();
    let mut dst = BytesMut::with_capacity(COMMAND_HEADER_SIZE + body);
    header.put(&mut dst);

    for (index, arg) in args.iter().enumerate() {
        match arg {
            ArgValue::U8(v) => dst.put_u8(*v),
            ArgValue::I8(v) => dst.put_i8(*v),
            ArgValue::U16(v) => dst.put_u16_le(*v),
            ArgValue::I16(v) => dst.put_i16_le(*v),
            ArgValue::U32(v) => dst.put_u32_le(*v),
            ArgValue::I32(v) => dst.put_i32_le(*v),
            ArgValue::U64(v) => dst.put_u64_le(*v),
            ArgValue::I64(v) => dst.put_i64_le(*v),
            ArgValue::F32(v) => dst.put_f32_le(*v),
            ArgValue::F64(v) => dst.put_f64_le(*v),
            ArgValue::String(v) => {
                if v.as_bytes().contains(&0) {
                    return Err(CommandError::InteriorNul { index });
                }
                dst.put_slice(v.as_bytes());
                dst.put_u8(0);
            }
        }
    }

    Ok(dst.freeze())
}

/// Decode the argument bytes following a command header against `shape`.
///
/// Bytes left over after the last argument are ignored.
pub fn decode_args(body: &[u8], shape: &Shape) -> Result<Vec<ArgValue>> {
    let mut buf = body;
    let mut args = Vec::with_capacity(shape.len());

    for (index, &arg_type) in shape.types().iter().enumerate() {
        if let Some(needed) = arg_type.width() {
            if buf.remaining() < needed {
                return Err(CommandError::Truncated {
                    index,
                    arg_type: arg_type.name(),
                    needed,
                    available: buf.remaining(),
                });
            }
        }

        let value = match arg_type {
            ArgType::U8 => ArgValue::U8(buf.get_u8()),
            ArgType::I8 => ArgValue::I8(buf.get_i8()),
            ArgType::U16 => ArgValue::U16(buf.get_u16_le()),
            ArgType::I16 => ArgValue::I16(buf.get_i16_le()),
            ArgType::U32 => ArgValue::U32(buf.get_u32_le()),
            ArgType::I32 => ArgValue::I32(buf.get_i32_le()),
            ArgType::U64 => ArgValue::U64(buf.get_u64_le()),
            ArgType::I64 => ArgValue::I64(buf.get_i64_le()),
            ArgType::F32 => ArgValue::F32(buf.get_f32_le()),
            ArgType::F64 => ArgValue::F64(buf.get_f64_le()),
            ArgType::String => {
                let end = buf
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or(CommandError::UnterminatedString { index })?;
                let raw = &buf[..end];
                let text = match std::str::from_utf8(raw) {
                    Ok(text) => text.to_owned(),
                    Err(err) => {
                        debug!(index, %err, "string argument is not UTF-8, replacing invalid bytes");
                        String::from_utf8_lossy(raw).into_owned()
                    }
                };
                buf.advance(end + 1);
                ArgValue::String(text)
            }
        };
        args.push(value);
    }

    if buf.has_remaining() {
        debug!(
            trailing = buf.remaining(),
            "ignoring bytes after last command argument"
        );
    }
    Ok(args)
}

/// Decode a full command payload against `shape`.
pub fn decode_command(payload: &[u8], shape: &Shape) -> Result<Command> {
    let (header, body) = CommandHeader::parse(payload)?;
    let args = decode_args(body, shape)?;
    Ok(Command { header, args })
}

fn encoded_len(arg: &ArgValue) -> usize {
    match arg {
        ArgValue::String(v) => v.len() + 1,
        other => other.arg_type().width().unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_little_endian() {
        let payload = encode_command(CommandHeader::new(1, 4, 0x0102), &[]).unwrap();
        assert_eq!(payload.as_ref(), &[1, 4, 0x02, 0x01]);

        let (header, body) = CommandHeader::parse(&payload).unwrap();
        assert_eq!(header, CommandHeader::new(1, 4, 0x0102));
        assert!(body.is_empty());
    }

    #[test]
    fn arguments_are_fixed_width_little_endian() {
        let payload = encode_command(
            CommandHeader::new(1, 0, 2),
            &[
                ArgValue::U8(0xAA),
                ArgValue::I16(-2),
                ArgValue::U32(0x0403_0201),
                ArgValue::String("ok".to_string()),
                ArgValue::F32(1.0),
            ],
        )
        .unwrap();

        assert_eq!(
            &payload[COMMAND_HEADER_SIZE..],
            &[
                0xAA, // u8
                0xFE, 0xFF, // i16 -2
                0x01, 0x02, 0x03, 0x04, // u32
                b'o', b'k', 0, // string
                0x00, 0x00, 0x80, 0x3F, // f32 1.0
            ]
        );
    }

    #[test]
    fn decodes_every_argument_type() {
        let args = vec![
            ArgValue::U8(200),
            ArgValue::I8(-100),
            ArgValue::U16(65_000),
            ArgValue::I16(-30_000),
            ArgValue::U32(4_000_000_000),
            ArgValue::I32(-2_000_000_000),
            ArgValue::U64(u64::MAX),
            ArgValue::I64(i64::MIN),
            ArgValue::F32(-0.25),
            ArgValue::F64(12.5),
            ArgValue::String("flip".to_string()),
            ArgValue::String(String::new()),
        ];
        let shape = Shape::new(args.iter().map(ArgValue::arg_type).collect::<Vec<_>>());
        let payload = encode_command(CommandHeader::new(3, 1, 9), &args).unwrap();

        let command = decode_command(&payload, &shape).unwrap();
        assert_eq!(command.header, CommandHeader::new(3, 1, 9));
        assert_eq!(command.args, args);
    }

    #[test]
    fn decoding_leaves_shape_untouched() {
        let shape = Shape::from([ArgType::U8, ArgType::String]);
        let template = shape.clone();

        let first = decode_args(&[1, b'a', 0], &shape).unwrap();
        let second = decode_args(&[2, b'b', 0], &shape).unwrap();

        assert_eq!(first, vec![ArgValue::U8(1), ArgValue::from("a")]);
        assert_eq!(second, vec![ArgValue::U8(2), ArgValue::from("b")]);
        assert_eq!(shape, template);
    }

    #[test]
    fn truncated_numeric_argument_fails() {
        let shape = Shape::from([ArgType::U8, ArgType::U32]);
        let err = decode_args(&[1, 2, 3], &shape).unwrap_err();
        assert!(matches!(
            err,
            CommandError::Truncated {
                index: 1,
                needed: 4,
                available: 2,
                ..
            }
        ));
    }

    #[test]
    fn unterminated_string_fails() {
        let shape = Shape::from([ArgType::String]);
        assert!(matches!(
            decode_args(b"abc", &shape),
            Err(CommandError::UnterminatedString { index: 0 })
        ));
    }

    #[test]
    fn short_header_fails() {
        assert!(matches!(
            CommandHeader::parse(&[1, 2, 3]),
            Err(CommandError::ShortHeader(3))
        ));
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let shape = Shape::from([ArgType::U8]);
        assert_eq!(
            decode_args(&[7, 0xFF, 0xFF], &shape).unwrap(),
            vec![ArgValue::U8(7)]
        );
    }

    #[test]
    fn invalid_utf8_string_is_replaced() {
        let shape = Shape::from([ArgType::String, ArgType::U8]);
        assert_eq!(
            decode_args(&[b'o', 0xFF, b'k', 0, 9], &shape).unwrap(),
            vec![ArgValue::from("o\u{FFFD}k"), ArgValue::U8(9)]
        );
    }

    #[test]
    fn interior_nul_is_rejected() {
        let err = encode_command(
            CommandHeader::new(0, 0, 0),
            &[ArgValue::U8(1), ArgValue::from("a\0b")],
        )
        .unwrap_err();
        assert!(matches!(err, CommandError::InteriorNul { index: 1 }));
    }
}
