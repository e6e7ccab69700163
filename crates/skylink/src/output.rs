use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use skylink_command::{ArgValue, CommandHeader};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Command found at the front of a frame payload.
#[derive(Debug, Serialize)]
pub struct CommandOutput {
    pub feature: u8,
    pub class: u8,
    pub command: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<ArgValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandOutput {
    pub fn new(header: CommandHeader) -> Self {
        Self {
            feature: header.feature,
            class: header.class,
            command: header.command,
            args: None,
            error: None,
        }
    }

    fn summary(&self) -> String {
        let mut text = format!("{}/{}/{}", self.feature, self.class, self.command);
        if let Some(args) = &self.args {
            let args: Vec<String> = args.iter().map(ToString::to_string).collect();
            text.push_str(&format!("({})", args.join(", ")));
        }
        if let Some(error) = &self.error {
            text.push_str(&format!(" [{error}]"));
        }
        text
    }
}

/// One frame, as decoded from a datagram or read from an inbound channel.
#[derive(Debug, Serialize)]
pub struct FrameOutput {
    pub channel: u8,
    pub channel_name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u8>,
    pub payload_size: usize,
    pub payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_at: Option<u64>,
}

pub fn print_frames(frames: &[FrameOutput], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for frame in frames {
                print_json(frame);
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "TYPE", "SEQ", "SIZE", "COMMAND", "PAYLOAD"]);
            for frame in frames {
                table.add_row(vec![
                    format!("{} ({})", frame.channel, frame.channel_name),
                    frame.frame_type.unwrap_or("-").to_string(),
                    frame.seq.map_or_else(|| "-".to_string(), |seq| seq.to_string()),
                    frame.payload_size.to_string(),
                    frame
                        .command
                        .as_ref()
                        .map_or_else(|| "-".to_string(), CommandOutput::summary),
                    frame.payload.clone(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for frame in frames {
                let mut line = format!("channel={} ({})", frame.channel, frame.channel_name);
                if let Some(frame_type) = frame.frame_type {
                    line.push_str(&format!(" type={frame_type}"));
                }
                if let Some(seq) = frame.seq {
                    line.push_str(&format!(" seq={seq}"));
                }
                line.push_str(&format!(" size={}", frame.payload_size));
                if let Some(command) = &frame.command {
                    line.push_str(&format!(" command={}", command.summary()));
                }
                line.push_str(&format!(" payload={}", frame.payload));
                println!("{line}");
            }
        }
    }
}

/// Print a flat record as one JSON line, a two-column table, or `key=value` pairs.
pub fn print_record<T: Serialize>(record: &T, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(record),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (key, value) in record_fields(record) {
                table.add_row(vec![key, value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let pairs: Vec<String> = record_fields(record)
                .into_iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            println!("{}", pairs.join(" "));
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn record_fields<T: Serialize>(record: &T) -> Vec<(String, String)> {
    match serde_json::to_value(record) {
        Ok(serde_json::Value::Object(map)) => map
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(text) => text,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// UTF-8 text as-is, anything else as hex.
pub fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if !text.chars().any(char::is_control) => text.to_string(),
        _ => to_hex(payload),
    }
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn now_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
