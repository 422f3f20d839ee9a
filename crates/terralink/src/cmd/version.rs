use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("terralink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: terralink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("protocol_version: {}", terralink_link::PROTOCOL_VERSION);
    println!("max_payload: {}", terralink_frame::MAX_PAYLOAD);
    println!("max_terrariums: {}", terralink_link::MAX_TERRARIUMS);
    println!(
        "target: {}",
        option_env!("TERRALINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));

    Ok(SUCCESS)
}
