//! Superblock (C2): the fixed-layout first block of every disk image.

use crate::error::{Error, Result};
use crate::layout::{Layout, BLOCK_SIZE};
use crate::raid::RaidMode;

/// Byte length of the serialized superblock. Well under `BLOCK_SIZE`;
/// the rest of block 0 is zero-padded.
pub const SUPERBLOCK_BYTES: usize = 8 * 6 + 4 + 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Superblock {
    pub layout: Layout,
    pub raid_mode: RaidMode,
    pub disk_id: u32,
}

impl Superblock {
    pub fn new(layout: Layout, raid_mode: RaidMode, disk_id: u32) -> Superblock {
        Superblock { layout, raid_mode, disk_id }
    }

    pub fn write_to(&self, block: &mut [u8]) {
        debug_assert!(block.len() >= BLOCK_SIZE);
        block[..BLOCK_SIZE].fill(0);
        let l = &self.layout;
        let mut off = 0;
        for field in [
            l.num_inodes,
            l.num_data_blocks,
            l.i_bitmap_ptr,
            l.d_bitmap_ptr,
            l.i_blocks_ptr,
            l.d_blocks_ptr,
        ] {
            block[off..off + 8].copy_from_slice(&field.to_le_bytes());
            off += 8;
        }
        block[off..off + 4].copy_from_slice(&self.raid_mode.to_disk().to_le_bytes());
        off += 4;
        block[off..off + 4].copy_from_slice(&self.disk_id.to_le_bytes());
    }

    pub fn read_from(block: &[u8]) -> Result<Superblock> {
        if block.len() < SUPERBLOCK_BYTES {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "disk image too small to hold a superblock",
            )));
        }
        let u64_at = |off: usize| u64::from_le_bytes(block[off..off + 8].try_into().unwrap());
        let num_inodes = u64_at(0);
        let num_data_blocks = u64_at(8);
        let i_bitmap_ptr = u64_at(16);
        let d_bitmap_ptr = u64_at(24);
        let i_blocks_ptr = u64_at(32);
        let d_blocks_ptr = u64_at(40);
        let raid_mode_raw = u32::from_le_bytes(block[48..52].try_into().unwrap());
        let disk_id = u32::from_le_bytes(block[52..56].try_into().unwrap());

        let raid_mode = RaidMode::from_disk(raid_mode_raw).ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "unrecognized raid_mode in superblock",
            ))
        })?;

        Ok(Superblock {
            layout: Layout {
                num_inodes,
                num_data_blocks,
                i_bitmap_ptr,
                d_bitmap_ptr,
                i_blocks_ptr,
                d_blocks_ptr,
            },
            raid_mode,
            disk_id,
        })
    }
}
