use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use skylink_command::{
    decode_args, ChannelClass, Command as DecodedCommand, CommandHeader, CommandRegistry,
    Handler, HandlerResult, RegistryBuilder, Shape, ShapeTable,
};
use skylink_net::{
    ConnectConfig, LinkConfig, ManagerConfig, NegotiationConfig, DEFAULT_LISTEN_PORT,
    DEFAULT_NEGOTIATION_PORT,
};

use crate::exit::{command_error, io_error, net_error, CliError, CliResult, USAGE};
use crate::output::{CommandOutput, OutputFormat};

pub mod decode;
pub mod listen;
pub mod negotiate;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the negotiation exchange and print the device ports.
    Negotiate(NegotiateArgs),
    /// Decode a captured datagram given as hex.
    Decode(DecodeArgs),
    /// Connect and send a single command.
    Send(SendArgs),
    /// Connect and print payloads accepted on inbound channels.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Negotiate(args) => negotiate::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Device address and negotiation parameters shared by connecting commands.
#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    /// Device IP address.
    pub host: IpAddr,
    /// Device TCP port for negotiation.
    #[arg(long, default_value_t = DEFAULT_NEGOTIATION_PORT)]
    pub port: u16,
    /// Local UDP port the device should send to.
    #[arg(long, default_value_t = DEFAULT_LISTEN_PORT)]
    pub listen_port: u16,
    /// Controller name sent during negotiation.
    #[arg(long, default_value = "skylink", env = "SKYLINK_CONTROLLER_NAME")]
    pub controller_name: String,
    /// Negotiation timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

impl DeviceArgs {
    pub fn negotiation_config(&self) -> CliResult<NegotiationConfig> {
        let config = NegotiationConfig {
            controller_name: self.controller_name.clone(),
            listen_port: self.listen_port,
            timeout: parse_duration(&self.timeout)?,
            ..NegotiationConfig::default()
        };
        config
            .validate()
            .map_err(|err| CliError::new(USAGE, err.to_string()))?;
        Ok(config)
    }

    pub fn connect_config(&self, link: &LinkArgs) -> CliResult<ConnectConfig> {
        Ok(ConnectConfig {
            negotiation: self.negotiation_config()?,
            negotiation_port: self.port,
            manager: ManagerConfig::from(link.load()?),
        })
    }
}

/// Channel set selection for connecting commands.
#[derive(Args, Debug, Clone, Default)]
pub struct LinkArgs {
    /// Channel set as JSON (default: the stock controller channel set).
    #[arg(long, value_name = "FILE")]
    pub link: Option<PathBuf>,
}

impl LinkArgs {
    pub fn load(&self) -> CliResult<LinkConfig> {
        let Some(path) = &self.link else {
            return Ok(LinkConfig::default());
        };
        let json = std::fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
        let link = LinkConfig::from_json(&json)
            .map_err(|err| net_error(&format!("invalid channel set {}", path.display()), err))?;
        link.validate()
            .map_err(|err| net_error(&format!("invalid channel set {}", path.display()), err))?;
        Ok(link)
    }
}

/// Command shape tables used to decode and check arguments.
#[derive(Args, Debug, Clone, Default)]
pub struct ShapeArgs {
    /// Shape table JSON file (repeatable).
    #[arg(long = "shapes", value_name = "FILE")]
    pub shapes: Vec<PathBuf>,
}

impl ShapeArgs {
    pub fn load(&self) -> CliResult<Shapes> {
        let tables = self
            .shapes
            .iter()
            .map(|path| {
                ShapeTable::from_file(path).map_err(|err| {
                    command_error(&format!("failed loading {}", path.display()), err)
                })
            })
            .collect::<CliResult<Vec<_>>>()?;
        Ok(Shapes { tables })
    }
}

#[derive(Debug, Default)]
pub struct Shapes {
    tables: Vec<ShapeTable>,
}

impl Shapes {
    pub fn shape(&self, header: &CommandHeader) -> Option<&Shape> {
        self.tables
            .iter()
            .filter(|table| table.feature == header.feature && table.class == header.class)
            .find_map(|table| table.shape(header.command))
    }

    /// Interpret a payload as a command, decoding arguments when the shape is
    /// known.
    pub fn describe(&self, payload: &[u8]) -> Option<CommandOutput> {
        let (header, body) = CommandHeader::parse(payload).ok()?;
        let mut out = CommandOutput::new(header);
        if let Some(shape) = self.shape(&header) {
            match decode_args(body, shape) {
                Ok(args) => out.args = Some(args),
                Err(err) => out.error = Some(err.to_string()),
            }
        }
        Some(out)
    }

    /// A registry carrying the loaded shapes, for argument checking on send.
    pub fn registry(&self) -> CliResult<CommandRegistry> {
        let ignore: Handler = Arc::new(|_: &DecodedCommand| -> HandlerResult { Ok(()) });
        let mut builder = RegistryBuilder::new();
        for table in &self.tables {
            builder
                .register_table(table, ignore.clone())
                .map_err(|err| command_error("invalid shape tables", err))?;
        }
        Ok(builder.build())
    }
}

#[derive(Args, Debug)]
pub struct NegotiateArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Datagram bytes as hex (whitespace and `0x` prefix allowed).
    pub hex: String,
    #[command(flatten)]
    pub shapes: ShapeArgs,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    #[command(flatten)]
    pub link: LinkArgs,
    #[command(flatten)]
    pub shapes: ShapeArgs,
    /// Feature id.
    #[arg(long)]
    pub feature: u8,
    /// Class id within the feature.
    #[arg(long)]
    pub class: u8,
    /// Command id within the class.
    #[arg(long)]
    pub command: u16,
    /// Argument as type:value, e.g. u8:1 or string:hello (repeatable, in order).
    #[arg(long = "arg", value_name = "TYPE:VALUE")]
    pub args: Vec<String>,
    /// Traffic class: non-ack, ack or emergency.
    #[arg(long, default_value = "ack")]
    pub traffic: ChannelClass,
    /// How long to wait for transmission, and acknowledgement on reliable classes.
    #[arg(long, default_value = "5s")]
    pub wait: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    #[command(flatten)]
    pub link: LinkArgs,
    #[command(flatten)]
    pub shapes: ShapeArgs,
    /// Only print these inbound channels (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub channels: Option<Vec<u8>>,
    /// Exit after printing N payloads.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
