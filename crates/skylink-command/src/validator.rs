use crate::arg::{ArgValue, Shape};
use crate::codec::CommandHeader;
use crate::error::{CommandError, Result};

/// Check an outgoing argument list against its registered shape.
pub(crate) fn validate_args(header: CommandHeader, shape: &Shape, args: &[ArgValue]) -> Result<()> {
    match shape.mismatch(args) {
        None => Ok(()),
        Some(reason) => Err(CommandError::ShapeMismatch {
            feature: header.feature,
            class: header.class,
            command: header.command,
            reason,
        }),
    }
}
