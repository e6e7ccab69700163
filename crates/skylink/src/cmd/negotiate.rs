use serde::Serialize;
use skylink_net::negotiate;

use crate::cmd::NegotiateArgs;
use crate::exit::{net_error, CliResult, SUCCESS};
use crate::output::{now_unix_seconds, print_record, OutputFormat};

#[derive(Serialize)]
struct NegotiateOutput {
    device: String,
    c2d_port: u16,
    d2c_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    arstream_fragment_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    arstream_fragment_maximum_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    c2d_update_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    c2d_user_port: Option<u16>,
    negotiated_at: u64,
}

pub fn run(args: NegotiateArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.device.negotiation_config()?;
    let negotiated = negotiate(args.device.host, args.device.port, &config)
        .map_err(|err| net_error("negotiation failed", err))?;

    let response = negotiated.response;
    let out = NegotiateOutput {
        device: negotiated.device.to_string(),
        c2d_port: negotiated.c2d_port,
        d2c_port: negotiated.d2c_port,
        arstream_fragment_size: response.arstream_fragment_size,
        arstream_fragment_maximum_number: response.arstream_fragment_maximum_number,
        c2d_update_port: response.c2d_update_port,
        c2d_user_port: response.c2d_user_port,
        negotiated_at: now_unix_seconds(),
    };
    print_record(&out, format);
    Ok(SUCCESS)
}
