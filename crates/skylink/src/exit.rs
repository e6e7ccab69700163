use std::fmt;
use std::io;

use skylink_command::CommandError;
use skylink_frame::FrameError;
use skylink_net::NetError;
use skylink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const DEVICE_REFUSED: i32 = 69;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::AddrInUse => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Io(source) => io_error(context, source),
        TransportError::DatagramTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn net_error(context: &str, err: NetError) -> CliError {
    match err {
        NetError::Transport(err) => transport_error(context, err),
        NetError::Frame(err) => frame_error(context, err),
        NetError::Io(err) => io_error(context, err),
        NetError::InvalidConfig { .. } | NetError::UnknownChannel(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        NetError::PayloadTooLarge { .. } | NetError::Json(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        NetError::DeviceRefused(_) => CliError::new(DEVICE_REFUSED, format!("{context}: {err}")),
        NetError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        NetError::Closed(_) | NetError::NegotiationFailed(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn command_error(context: &str, err: CommandError) -> CliError {
    match err {
        CommandError::Net(err) => net_error(context, err),
        CommandError::Spawn { .. } => CliError::new(INTERNAL, format!("{context}: {err}")),
        CommandError::ShortHeader(_)
        | CommandError::Truncated { .. }
        | CommandError::UnterminatedString { .. }
        | CommandError::InvalidShapeTable(_)
        | CommandError::Json(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        other => CliError::new(USAGE, format!("{context}: {other}")),
    }
}
