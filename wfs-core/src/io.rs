//! File I/O (C7): read/write with direct plus single-indirect addressing
//! and lazy block allocation.

use crate::context::MountContext;
use crate::error::{Error, Result};
use crate::inode::{bias, unbias, Inode, DIRECT_BLOCKS, INDIRECT_INDEX};
use crate::layout::BLOCK_SIZE;

pub const POINTERS_PER_BLOCK: usize = BLOCK_SIZE / 4;

/// `(N_BLOCKS - 1) * BLOCK_SIZE + (BLOCK_SIZE / sizeof(pointer)) * BLOCK_SIZE`
pub const MAX_FILE_SIZE: u64 =
    DIRECT_BLOCKS as u64 * BLOCK_SIZE as u64 + POINTERS_PER_BLOCK as u64 * BLOCK_SIZE as u64;

fn block_ptr_at(ctx: &MountContext, inode: &Inode, idx: usize) -> Option<u32> {
    if idx < DIRECT_BLOCKS {
        return inode.blocks[idx];
    }
    let indirect_idx = idx - DIRECT_BLOCKS;
    let indirect_block_num = inode.blocks[INDIRECT_INDEX]?;
    let mut block = [0u8; BLOCK_SIZE];
    ctx.read_block(indirect_block_num, &mut block);
    let off = indirect_idx * 4;
    let raw = u32::from_le_bytes(block[off..off + 4].try_into().unwrap());
    unbias(raw)
}

/// Stores `value` at logical block position `idx`, allocating the
/// indirect table on first use of an indirect-range position.
fn set_block_ptr(ctx: &mut MountContext, inode: &mut Inode, idx: usize, value: u32) -> Result<()> {
    if idx < DIRECT_BLOCKS {
        inode.blocks[idx] = Some(value);
        return Ok(());
    }
    let indirect_idx = idx - DIRECT_BLOCKS;
    if indirect_idx >= POINTERS_PER_BLOCK {
        return Err(Error::NoSpace);
    }
    let indirect_block_num = match inode.blocks[INDIRECT_INDEX] {
        Some(n) => n,
        None => {
            let n = ctx.alloc_zeroed_block()?;
            inode.blocks[INDIRECT_INDEX] = Some(n);
            n
        }
    };
    let mut block = [0u8; BLOCK_SIZE];
    ctx.read_block(indirect_block_num, &mut block);
    let off = indirect_idx * 4;
    block[off..off + 4].copy_from_slice(&bias(Some(value)).to_le_bytes());
    ctx.write_block(indirect_block_num, &block);
    Ok(())
}

/// Reads up to `buf.len()` bytes starting at `offset`. A hole
/// (unallocated block) is skipped — the destination bytes are left
/// untouched but the cursor still advances, matching the source's
/// (POSIX-incorrect) behavior rather than zero-filling.
pub fn read(ctx: &MountContext, inode: &Inode, offset: u64, buf: &mut [u8]) -> usize {
    if offset >= inode.size || buf.is_empty() {
        return 0;
    }
    let len = buf.len().min((inode.size - offset) as usize);

    let mut cur_offset = offset;
    let mut out_pos = 0usize;
    while out_pos < len {
        let b = (cur_offset / BLOCK_SIZE as u64) as usize;
        let in_block = (cur_offset % BLOCK_SIZE as u64) as usize;
        let take = (len - out_pos).min(BLOCK_SIZE - in_block);

        if let Some(block_num) = block_ptr_at(ctx, inode, b) {
            let mut block = [0u8; BLOCK_SIZE];
            ctx.read_block(block_num, &mut block);
            buf[out_pos..out_pos + take].copy_from_slice(&block[in_block..in_block + take]);
        }

        cur_offset += take as u64;
        out_pos += take;
    }
    out_pos
}

/// Writes `data` starting at `offset`, allocating blocks (and the
/// indirect table) lazily. Updates `inode.size`/`mtim`/`ctim` on success.
/// On allocation failure mid-write, returns the bytes written so far as
/// a short write (POSIX-style), or `Err(NoSpace)` if nothing was written.
pub fn write(ctx: &mut MountContext, inode: &mut Inode, offset: u64, data: &[u8]) -> Result<usize> {
    if data.is_empty() {
        return Ok(0);
    }
    if offset >= MAX_FILE_SIZE {
        return Err(Error::NoSpace);
    }
    let len = data.len().min((MAX_FILE_SIZE - offset) as usize);

    let mut cur_offset = offset;
    let mut in_pos = 0usize;
    while in_pos < len {
        let b = (cur_offset / BLOCK_SIZE as u64) as usize;
        let in_block = (cur_offset % BLOCK_SIZE as u64) as usize;
        let take = (len - in_pos).min(BLOCK_SIZE - in_block);

        let block_num = match block_ptr_at(ctx, inode, b) {
            Some(n) => n,
            None => {
                let n = match ctx.alloc_data_block() {
                    Ok(n) => n,
                    Err(e) => {
                        return if in_pos > 0 {
                            finish_write(ctx, inode, offset, in_pos)
                        } else {
                            Err(e)
                        }
                    }
                };
                if let Err(e) = set_block_ptr(ctx, inode, b, n) {
                    let _ = ctx.free_data_block(n);
                    return if in_pos > 0 {
                        finish_write(ctx, inode, offset, in_pos)
                    } else {
                        Err(e)
                    };
                }
                n
            }
        };

        let mut block = [0u8; BLOCK_SIZE];
        ctx.read_block(block_num, &mut block);
        block[in_block..in_block + take].copy_from_slice(&data[in_pos..in_pos + take]);
        ctx.write_block(block_num, &block);

        cur_offset += take as u64;
        in_pos += take;
    }

    finish_write(ctx, inode, offset, in_pos)
}

fn finish_write(ctx: &MountContext, inode: &mut Inode, offset: u64, written: usize) -> Result<usize> {
    inode.size = inode.size.max(offset + written as u64);
    ctx.stamp_mtime_ctime(inode);
    Ok(written)
}

/// Frees every data block owned by `inode`: direct blocks, every block
/// referenced from the indirect table, and the indirect block itself.
pub fn free_blocks(ctx: &mut MountContext, inode: &Inode) -> Result<()> {
    for b in &inode.blocks[..DIRECT_BLOCKS] {
        if let Some(b) = b {
            ctx.free_data_block(*b)?;
        }
    }
    if let Some(indirect_num) = inode.blocks[INDIRECT_INDEX] {
        let mut block = [0u8; BLOCK_SIZE];
        ctx.read_block(indirect_num, &mut block);
        for off in (0..BLOCK_SIZE).step_by(4) {
            let raw = u32::from_le_bytes(block[off..off + 4].try_into().unwrap());
            if let Some(b) = unbias(raw) {
                ctx.free_data_block(b)?;
            }
        }
        ctx.free_data_block(indirect_num)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::format_images;
    use crate::raid::RaidMode;
    use tempfile::NamedTempFile;

    fn make_images(n: usize, size: u64) -> Vec<NamedTempFile> {
        (0..n)
            .map(|_| {
                let f = NamedTempFile::new().unwrap();
                f.as_file().set_len(size).unwrap();
                f
            })
            .collect()
    }

    fn mount_fresh(mode: RaidMode, n: usize, inodes: u64, blocks: u64) -> (Vec<NamedTempFile>, MountContext) {
        let files = make_images(n, 1024 * 1024);
        let paths: Vec<_> = files.iter().map(|f| f.path().to_path_buf()).collect();
        format_images(&paths, mode, inodes, blocks).unwrap();
        let ctx = MountContext::mount(&paths).unwrap();
        (files, ctx)
    }

    #[test]
    fn round_trip_within_direct_blocks() {
        let (_files, mut ctx) = mount_fresh(RaidMode::Mirror, 2, 32, 32);
        let mut inode = ctx.alloc_inode(libc::S_IFREG | 0o644, 0, 0).unwrap();
        let data = b"hello, world";
        let n = write(&mut ctx, &mut inode, 0, data).unwrap();
        assert_eq!(n, data.len());
        ctx.write_inode(&inode).unwrap();

        let mut out = [0u8; 32];
        let got = read(&ctx, &inode, 0, &mut out);
        assert_eq!(got, data.len());
        assert_eq!(&out[..data.len()], data);
    }

    #[test]
    fn write_crossing_into_indirect_block() {
        let (_files, mut ctx) = mount_fresh(RaidMode::Mirror, 2, 32, 64);
        let mut inode = ctx.alloc_inode(libc::S_IFREG | 0o644, 0, 0).unwrap();
        let offset = 7 * BLOCK_SIZE as u64;
        let data = [0x42u8; 512];
        let n = write(&mut ctx, &mut inode, offset, &data).unwrap();
        assert_eq!(n, data.len());
        assert!(inode.blocks[INDIRECT_INDEX].is_some());

        let mut out = vec![0u8; 4096];
        let got = read(&ctx, &inode, 0, &mut out);
        assert_eq!(got, (offset as usize + data.len()));
        assert_eq!(&out[offset as usize..offset as usize + data.len()], &data[..]);
    }

    #[test]
    fn free_blocks_clears_indirect_table_entries() {
        let (_files, mut ctx) = mount_fresh(RaidMode::Mirror, 2, 32, 64);
        let mut inode = ctx.alloc_inode(libc::S_IFREG | 0o644, 0, 0).unwrap();
        write(&mut ctx, &mut inode, 7 * BLOCK_SIZE as u64, &[1u8; 512]).unwrap();
        free_blocks(&mut ctx, &inode).unwrap();
        // every bit should be clear again
        let count = ctx.superblock().layout.num_data_blocks as usize;
        for i in 0..count {
            assert!(!crate::bitmap::get(ctx.data_bitmap_for_test(0), i));
        }
    }
}
