use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("knobs {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: knobs");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("KNOBS_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "defaults: {}:{} knobs={}",
        knobs_transport::DEFAULT_HOST,
        knobs_transport::DEFAULT_PORT,
        knobs_frame::DEFAULT_CAPACITY
    );
    println!("features: channel={}, cli=true", cfg!(feature = "channel"));

    Ok(SUCCESS)
}
