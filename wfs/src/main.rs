//! Server binary (C10/C11 wiring C8 to `fuser`): mounts a set of WFS
//! images and answers kernel filesystem calls against a `MountContext`.

mod filesystem;

use std::process::ExitCode;

use fuser::MountOption;
use log::{error, info, warn};

use filesystem::WfsFilesystem;

fn main() -> ExitCode {
    env_logger::init();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let mut disks = Vec::new();
    let mut idx = 0;
    while idx < argv.len() && argv[idx] != "-s" && argv[idx] != "-f" {
        disks.push(argv[idx].clone());
        idx += 1;
    }

    if disks.len() < 2 {
        error!("at least two disk images are required, got {}", disks.len());
        return ExitCode::FAILURE;
    }

    let bridge_suffix = &argv[idx..];
    let Some((mountpoint, bridge_flags)) = bridge_suffix.split_last() else {
        error!("missing mount point");
        return ExitCode::FAILURE;
    };

    let mut options = vec![MountOption::FSName("wfs".to_string())];
    for flag in bridge_flags {
        match flag.as_str() {
            "-s" => info!("running single-threaded (the core is not safe for concurrent calls)"),
            "-f" => info!("running in foreground"),
            other => warn!("ignoring unrecognized bridge flag {other:?}"),
        }
    }

    let ctx = match wfs_core::MountContext::mount(&disks) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("mount failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let fs = WfsFilesystem::new(ctx);
    match fuser::mount2(fs, mountpoint, &options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fuser::mount2 failed: {e}");
            ExitCode::FAILURE
        }
    }
}
