use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("skylink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: skylink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("SKYLINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "defaults: negotiation_port={}, listen_port={}, max_payload={}, sequence_wrap_window={}",
        skylink_net::DEFAULT_NEGOTIATION_PORT,
        skylink_net::DEFAULT_LISTEN_PORT,
        skylink_net::DEFAULT_MAX_PAYLOAD,
        skylink_net::SEQUENCE_WRAP_WINDOW
    );

    Ok(SUCCESS)
}
