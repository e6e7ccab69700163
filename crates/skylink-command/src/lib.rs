//! Typed commands on top of skylink channels.
//!
//! A command payload is `[feature:1][class:1][command:2 LE]` followed by its
//! arguments. Outgoing commands are encoded and queued by [`CommandSender`];
//! incoming payloads are decoded against a read-only [`CommandRegistry`] and
//! handed to registered handlers by the [`Dispatcher`].

pub mod arg;
pub mod codec;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod sender;
mod validator;

pub use arg::{ArgType, ArgValue, Shape};
pub use codec::{
    decode_args, decode_command, encode_command, Command, CommandHeader, COMMAND_HEADER_SIZE,
};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use error::{CommandError, Result};
pub use registry::{
    CommandEntry, CommandRegistry, Handler, HandlerError, HandlerResult, RegistryBuilder,
    ShapeTable, MAX_SHAPE_TABLE_SIZE,
};
pub use sender::{ChannelClass, CommandSender};
