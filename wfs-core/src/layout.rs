//! On-disk region layout (C2): the fixed geometry shared by `mkfs` and
//! the server, computed once at format time and re-derived from the
//! superblock at mount time.

/// Universal block size: the unit of on-disk alignment and allocation.
pub const BLOCK_SIZE: usize = 512;

/// Bitmap sizes and inode/data-block counts are always rounded to a
/// multiple of this many entries at format time.
pub const COUNT_ALIGNMENT: u64 = 32;

fn round_up(n: u64, to: u64) -> u64 {
    n.div_ceil(to) * to
}

fn bitmap_bytes(count: u64) -> u64 {
    count.div_ceil(8)
}

/// The four region offsets plus the inode/data-block counts they were
/// derived from. Identical on every disk in the set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    pub num_inodes: u64,
    pub num_data_blocks: u64,
    pub i_bitmap_ptr: u64,
    pub d_bitmap_ptr: u64,
    pub i_blocks_ptr: u64,
    pub d_blocks_ptr: u64,
}

impl Layout {
    /// Rounds `num_inodes`/`num_data_blocks` up to a multiple of 32 and
    /// computes the region offsets per the on-disk format.
    pub fn compute(num_inodes: u64, num_data_blocks: u64) -> Layout {
        let num_inodes = round_up(num_inodes.max(1), COUNT_ALIGNMENT);
        let num_data_blocks = round_up(num_data_blocks.max(1), COUNT_ALIGNMENT);

        let i_bitmap_ptr = BLOCK_SIZE as u64;
        let d_bitmap_ptr = i_bitmap_ptr + bitmap_bytes(num_inodes);
        let i_blocks_ptr = round_up(d_bitmap_ptr + bitmap_bytes(num_data_blocks), BLOCK_SIZE as u64);
        let d_blocks_ptr = i_blocks_ptr + num_inodes * BLOCK_SIZE as u64;

        Layout {
            num_inodes,
            num_data_blocks,
            i_bitmap_ptr,
            d_bitmap_ptr,
            i_blocks_ptr,
            d_blocks_ptr,
        }
    }

    /// Minimum image size (bytes) this layout requires.
    pub fn required_image_size(&self) -> u64 {
        self.d_blocks_ptr + self.num_data_blocks * BLOCK_SIZE as u64
    }

    pub fn inode_bitmap_bytes(&self) -> usize {
        bitmap_bytes(self.num_inodes) as usize
    }

    pub fn data_bitmap_bytes(&self) -> usize {
        bitmap_bytes(self.num_data_blocks) as usize
    }
}
