//! Formatter binary (C10 applied to C2/C5): lays a fresh WFS image set
//! across a set of preexisting, preallocated backing files.

use std::process::ExitCode;

use clap::Parser;
use log::error;
use wfs_core::raid::RaidMode;

/// Initializes a set of disk images with an empty WFS filesystem.
#[derive(Parser, Debug)]
#[command(name = "mkfs", about = "Format backing images for a WFS volume")]
struct Args {
    /// RAID mode: 0 (stripe), 1 (mirror), or 1v (mirror, verified reads)
    #[arg(short = 'r', long = "raid", value_name = "MODE")]
    raid_mode: String,

    /// Backing image path; pass at least twice
    #[arg(short = 'd', long = "disk", value_name = "PATH", required = true)]
    disks: Vec<String>,

    /// Number of inodes to provision (rounded up to a multiple of 32)
    #[arg(short = 'i', long = "inodes", value_name = "COUNT")]
    num_inodes: u64,

    /// Number of data blocks to provision (rounded up to a multiple of 32)
    #[arg(short = 'b', long = "blocks", value_name = "COUNT")]
    num_data_blocks: u64,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let Some(raid_mode) = RaidMode::parse(&args.raid_mode) else {
        error!("unrecognized raid mode {:?}; expected 0, 1, or 1v", args.raid_mode);
        return ExitCode::FAILURE;
    };

    if args.disks.len() < 2 {
        error!("at least two -d disks are required, got {}", args.disks.len());
        return ExitCode::FAILURE;
    }

    match wfs_core::format::format_images(&args.disks, raid_mode, args.num_inodes, args.num_data_blocks) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("mkfs failed: {e}");
            ExitCode::FAILURE
        }
    }
}
