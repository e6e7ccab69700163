/// Errors that can occur while encoding, decoding, registering or sending
/// commands.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Payload shorter than the 4-byte command header.
    #[error("command payload too short for header ({0} bytes)")]
    ShortHeader(usize),

    /// Payload ends before the argument at `index` is complete.
    #[error("truncated command: argument {index} ({arg_type}) needs {needed} bytes, {available} available")]
    Truncated {
        index: usize,
        arg_type: &'static str,
        needed: usize,
        available: usize,
    },

    /// A string argument has no NUL terminator.
    #[error("truncated command: string argument {index} is not NUL-terminated")]
    UnterminatedString { index: usize },

    /// A string argument contains a NUL byte and cannot be encoded.
    #[error("string argument {index} contains an interior NUL")]
    InteriorNul { index: usize },

    /// Arguments do not match the registered shape.
    #[error("arguments do not match shape of {feature}/{class}/{command}: {reason}")]
    ShapeMismatch {
        feature: u8,
        class: u8,
        command: u16,
        reason: String,
    },

    /// A feature/class was registered twice.
    #[error("class {feature}/{class} is already registered")]
    DuplicateClass { feature: u8, class: u8 },

    /// An argument type name is not one of the supported types.
    #[error("unknown argument type '{0}'")]
    UnknownArgType(String),

    /// An argument literal could not be parsed as its declared type.
    #[error("invalid {arg_type} value '{value}'")]
    InvalidArgValue {
        arg_type: &'static str,
        value: String,
    },

    /// A shape table document is structurally invalid.
    #[error("invalid shape table: {0}")]
    InvalidShapeTable(String),

    /// No outbound channel is bound to the requested traffic class.
    #[error("no outbound channel for traffic class {0}")]
    NoChannel(&'static str),

    /// A dispatch worker could not be started.
    #[error("failed to spawn worker {name}: {source}")]
    Spawn {
        name: String,
        source: std::io::Error,
    },

    /// Channel layer error.
    #[error("channel error: {0}")]
    Net(#[from] skylink_net::NetError),

    /// JSON error while loading a shape table.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CommandError>;
