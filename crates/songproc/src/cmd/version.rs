use songproc::exit::{CliResult, SUCCESS};
use songproc_service::{PROTOCOL_SEQUENCE, SERVICE_ID, WORKER_FILE_NAME};

use crate::cmd::VersionArgs;

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("songproc {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: songproc");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("SONGPROC_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("worker: {WORKER_FILE_NAME}");
    println!("binding: {PROTOCOL_SEQUENCE}:[{SERVICE_ID}]");

    Ok(SUCCESS)
}
