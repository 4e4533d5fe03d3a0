//! Formatter (C2 + C5 init): lays out a fresh filesystem across a set of
//! disk images. Shared by the `mkfs` binary and the integration tests.

use std::path::Path;

use log::info;

use crate::bitmap;
use crate::disk::Disk;
use crate::error::{Error, Result};
use crate::inode::{Inode, N_BLOCKS};
use crate::layout::{Layout, BLOCK_SIZE};
use crate::raid::RaidMode;
use crate::superblock::Superblock;

/// Formats every image in `paths` with an identical superblock, zeroed
/// bitmaps (except inode bit 0), a root directory inode, and a zeroed
/// data region. Fails with [`Error::NoSpace`]-adjacent I/O errors if an
/// image is smaller than the computed layout requires.
pub fn format_images(
    paths: &[impl AsRef<Path>],
    raid_mode: RaidMode,
    num_inodes: u64,
    num_data_blocks: u64,
) -> Result<()> {
    if paths.len() < 2 {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "at least two backing images are required",
        )));
    }

    let layout = Layout::compute(num_inodes, num_data_blocks);
    let required = layout.required_image_size();
    info!(
        "formatting {} disks: raid={} inodes={} data_blocks={} (requires {} bytes/image)",
        paths.len(),
        raid_mode.as_str(),
        layout.num_inodes,
        layout.num_data_blocks,
        required
    );

    for (disk_id, path) in paths.iter().enumerate() {
        let mut disk = Disk::open(path)?;
        if (disk.len() as u64) < required {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "{} is too small: has {} bytes, needs {}",
                    path.as_ref().display(),
                    disk.len(),
                    required
                ),
            )));
        }

        let sb = Superblock::new(layout, raid_mode, disk_id as u32);
        let mut sb_block = [0u8; BLOCK_SIZE];
        sb.write_to(&mut sb_block);
        disk.as_mut_slice()[..BLOCK_SIZE].copy_from_slice(&sb_block);

        let i_bitmap_range = layout.i_bitmap_ptr as usize
            ..layout.i_bitmap_ptr as usize + layout.inode_bitmap_bytes();
        disk.as_mut_slice()[i_bitmap_range.clone()].fill(0);
        bitmap::set(&mut disk.as_mut_slice()[i_bitmap_range], 0);

        let d_bitmap_range =
            layout.d_bitmap_ptr as usize..layout.d_bitmap_ptr as usize + layout.data_bitmap_bytes();
        disk.as_mut_slice()[d_bitmap_range].fill(0);

        let data_range =
            layout.d_blocks_ptr as usize..layout.d_blocks_ptr as usize + layout.num_data_blocks as usize * BLOCK_SIZE;
        disk.as_mut_slice()[data_range].fill(0);

        let root = Inode {
            num: 0,
            mode: libc::S_IFDIR | 0o755,
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
            size: 0,
            nlinks: 2,
            atim: crate::context::now_secs(),
            mtim: crate::context::now_secs(),
            ctim: crate::context::now_secs(),
            blocks: [None; N_BLOCKS],
        };
        let root_off = layout.i_blocks_ptr as usize;
        let mut root_block = [0u8; BLOCK_SIZE];
        root.write_to(&mut root_block);
        disk.as_mut_slice()[root_off..root_off + BLOCK_SIZE].copy_from_slice(&root_block);

        disk.flush()?;
    }

    Ok(())
}
