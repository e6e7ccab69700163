//! Argument types and values carried in command payloads.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CommandError, Result};

/// The closed set of argument types a command can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    /// NUL-terminated byte string.
    String,
}

impl ArgType {
    /// Encoded width in bytes, `None` for strings.
    pub fn width(self) -> Option<usize> {
        match self {
            ArgType::U8 | ArgType::I8 => Some(1),
            ArgType::U16 | ArgType::I16 => Some(2),
            ArgType::U32 | ArgType::I32 | ArgType::F32 => Some(4),
            ArgType::U64 | ArgType::I64 | ArgType::F64 => Some(8),
            ArgType::String => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ArgType::U8 => "u8",
            ArgType::I8 => "i8",
            ArgType::U16 => "u16",
            ArgType::I16 => "i16",
            ArgType::U32 => "u32",
            ArgType::I32 => "i32",
            ArgType::U64 => "u64",
            ArgType::I64 => "i64",
            ArgType::F32 => "f32",
            ArgType::F64 => "f64",
            ArgType::String => "string",
        }
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ArgType {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "u8" => ArgType::U8,
            "i8" => ArgType::I8,
            "u16" => ArgType::U16,
            "i16" => ArgType::I16,
            "u32" => ArgType::U32,
            "i32" => ArgType::I32,
            "u64" => ArgType::U64,
            "i64" => ArgType::I64,
            "f32" => ArgType::F32,
            "f64" => ArgType::F64,
            "string" | "str" => ArgType::String,
            other => return Err(CommandError::UnknownArgType(other.to_string())),
        })
    }
}

/// One typed command argument.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ArgValue {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    /// Decoded strings are UTF-8; invalid device bytes become U+FFFD.
    String(String),
}

impl ArgValue {
    pub fn arg_type(&self) -> ArgType {
        match self {
            ArgValue::U8(_) => ArgType::U8,
            ArgValue::I8(_) => ArgType::I8,
            ArgValue::U16(_) => ArgType::U16,
            ArgValue::I16(_) => ArgType::I16,
            ArgValue::U32(_) => ArgType::U32,
            ArgValue::I32(_) => ArgType::I32,
            ArgValue::U64(_) => ArgType::U64,
            ArgValue::I64(_) => ArgType::I64,
            ArgValue::F32(_) => ArgType::F32,
            ArgValue::F64(_) => ArgType::F64,
            ArgValue::String(_) => ArgType::String,
        }
    }

    /// Parse a textual literal as `arg_type`.
    pub fn parse(arg_type: ArgType, text: &str) -> Result<Self> {
        fn num<T: FromStr>(arg_type: ArgType, text: &str) -> Result<T> {
            text.trim()
                .parse()
                .map_err(|_| CommandError::InvalidArgValue {
                    arg_type: arg_type.name(),
                    value: text.to_string(),
                })
        }

        Ok(match arg_type {
            ArgType::U8 => ArgValue::U8(num(arg_type, text)?),
            ArgType::I8 => ArgValue::I8(num(arg_type, text)?),
            ArgType::U16 => ArgValue::U16(num(arg_type, text)?),
            ArgType::I16 => ArgValue::I16(num(arg_type, text)?),
            ArgType::U32 => ArgValue::U32(num(arg_type, text)?),
            ArgType::I32 => ArgValue::I32(num(arg_type, text)?),
            ArgType::U64 => ArgValue::U64(num(arg_type, text)?),
            ArgType::I64 => ArgValue::I64(num(arg_type, text)?),
            ArgType::F32 => ArgValue::F32(num(arg_type, text)?),
            ArgType::F64 => ArgValue::F64(num(arg_type, text)?),
            ArgType::String => ArgValue::String(text.to_string()),
        })
    }

    /// Parse a `type:value` literal, e.g. `u8:3` or `string:hello`.
    pub fn parse_typed(literal: &str) -> Result<Self> {
        let (ty, value) = literal.split_once(':').ok_or_else(|| CommandError::InvalidArgValue {
            arg_type: "type:value",
            value: literal.to_string(),
        })?;
        Self::parse(ty.trim().parse()?, value)
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::U8(v) => write!(f, "{v}"),
            ArgValue::I8(v) => write!(f, "{v}"),
            ArgValue::U16(v) => write!(f, "{v}"),
            ArgValue::I16(v) => write!(f, "{v}"),
            ArgValue::U32(v) => write!(f, "{v}"),
            ArgValue::I32(v) => write!(f, "{v}"),
            ArgValue::U64(v) => write!(f, "{v}"),
            ArgValue::I64(v) => write!(f, "{v}"),
            ArgValue::F32(v) => write!(f, "{v}"),
            ArgValue::F64(v) => write!(f, "{v}"),
            ArgValue::String(v) => write!(f, "{v:?}"),
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for ArgValue {
            fn from(value: $ty) -> Self {
                ArgValue::$variant(value)
            }
        })*
    };
}

impl_from! {
    u8 => U8, i8 => I8, u16 => U16, i16 => I16, u32 => U32, i32 => I32,
    u64 => U64, i64 => I64, f32 => F32, f64 => F64, String => String,
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::String(value.to_string())
    }
}

/// Immutable argument layout of one command.
///
/// Cloning shares the underlying template; decoding always produces a fresh
/// argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape(Arc<[ArgType]>);

impl Shape {
    pub fn new(types: impl Into<Vec<ArgType>>) -> Self {
        let types: Vec<ArgType> = types.into();
        Self(Arc::from(types))
    }

    pub fn types(&self) -> &[ArgType] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Describe the first difference between this shape and `args`.
    pub fn mismatch(&self, args: &[ArgValue]) -> Option<String> {
        if args.len() != self.len() {
            return Some(format!(
                "expected {} arguments, got {}",
                self.len(),
                args.len()
            ));
        }
        self.0
            .iter()
            .zip(args)
            .enumerate()
            .find(|(_, (expected, arg))| **expected != arg.arg_type())
            .map(|(index, (expected, arg))| {
                format!("argument {index} is {}, expected {expected}", arg.arg_type())
            })
    }
}

impl From<Vec<ArgType>> for Shape {
    fn from(types: Vec<ArgType>) -> Self {
        Self::new(types)
    }
}

impl<const N: usize> From<[ArgType; N]> for Shape {
    fn from(types: [ArgType; N]) -> Self {
        Self::new(types.to_vec())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (index, ty) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{ty}")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_round_trip() {
        for ty in [
            ArgType::U8,
            ArgType::I16,
            ArgType::U32,
            ArgType::I64,
            ArgType::F32,
            ArgType::F64,
            ArgType::String,
        ] {
            assert_eq!(ty.name().parse::<ArgType>().unwrap(), ty);
        }
        assert!(matches!(
            "u128".parse::<ArgType>(),
            Err(CommandError::UnknownArgType(_))
        ));
    }

    #[test]
    fn parses_typed_literals() {
        assert_eq!(ArgValue::parse_typed("u8:3").unwrap(), ArgValue::U8(3));
        assert_eq!(ArgValue::parse_typed("i16:-40").unwrap(), ArgValue::I16(-40));
        assert_eq!(ArgValue::parse_typed("f32:1.5").unwrap(), ArgValue::F32(1.5));
        assert_eq!(
            ArgValue::parse_typed("string:a:b").unwrap(),
            ArgValue::String("a:b".to_string())
        );
        assert!(ArgValue::parse_typed("u8:300").is_err());
        assert!(ArgValue::parse_typed("nocolon").is_err());
    }

    #[test]
    fn shape_reports_first_mismatch() {
        let shape = Shape::from([ArgType::U8, ArgType::String]);
        assert_eq!(shape.mismatch(&[1u8.into(), "x".into()]), None);
        assert_eq!(
            shape.mismatch(&[1u8.into()]),
            Some("expected 2 arguments, got 1".to_string())
        );
        assert_eq!(
            shape.mismatch(&[1u16.into(), "x".into()]),
            Some("argument 0 is u16, expected u8".to_string())
        );
        assert_eq!(shape.to_string(), "(u8, string)");
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let ty: ArgType = serde_json::from_str("\"f64\"").unwrap();
        assert_eq!(ty, ArgType::F64);
        let json = serde_json::to_string(&ArgValue::I8(-2)).unwrap();
        assert_eq!(json, r#"{"type":"i8","value":-2}"#);
    }
}
