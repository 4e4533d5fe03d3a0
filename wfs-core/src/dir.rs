//! Directory machinery (C6): dentry lookup, insert, remove, and path
//! resolution. Directories hold entries only in their direct blocks —
//! a directory never uses its indirect block.

use crate::context::MountContext;
use crate::dentry::{Dentry, DENTRY_SIZE};
use crate::error::{Error, Result};
use crate::inode::{Inode, DIRECT_BLOCKS};
use crate::layout::BLOCK_SIZE;

pub const DENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DENTRY_SIZE;

fn slot_range(slot: usize) -> std::ops::Range<usize> {
    slot * DENTRY_SIZE..(slot + 1) * DENTRY_SIZE
}

/// Looks up `name` among `dir`'s direct-block dentries.
pub fn lookup(ctx: &MountContext, dir: &Inode, name: &str) -> Result<u32> {
    for bi in 0..DIRECT_BLOCKS {
        let Some(block_num) = dir.blocks[bi] else { continue };
        let mut block = [0u8; BLOCK_SIZE];
        ctx.read_block(block_num, &mut block);
        for slot in 0..DENTRIES_PER_BLOCK {
            let d = Dentry::read_from(&block[slot_range(slot)]);
            if d.matches(name) {
                return Ok(d.num);
            }
        }
    }
    Err(Error::NotFound)
}

/// Every non-empty dentry directly stored in `dir`, in on-disk order.
/// Does not synthesize `.`/`..` — that is the caller's job.
pub fn list_entries(ctx: &MountContext, dir: &Inode) -> Vec<(String, u32)> {
    let mut out = Vec::new();
    for bi in 0..DIRECT_BLOCKS {
        let Some(block_num) = dir.blocks[bi] else { continue };
        let mut block = [0u8; BLOCK_SIZE];
        ctx.read_block(block_num, &mut block);
        for slot in 0..DENTRIES_PER_BLOCK {
            let d = Dentry::read_from(&block[slot_range(slot)]);
            if !d.is_empty() {
                out.push((d.name().to_string(), d.num));
            }
        }
    }
    out
}

/// Resolves a `/`-separated path to an inode number, starting at the
/// root (inode 0). Empty segments are ignored; a non-final segment that
/// is not a directory is an error.
pub fn resolve_path(ctx: &MountContext, path: &str) -> Result<u32> {
    if path == "/" {
        return Ok(0);
    }
    let mut current = 0u32;
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let dir = ctx.read_inode(current)?;
        if !dir.is_dir() {
            return Err(Error::NotADirectory);
        }
        current = lookup(ctx, &dir, segment)?;
    }
    Ok(current)
}

/// Splits a path into `(parent_path, leaf_name)` on the last `/`.
pub fn split_parent(path: &str) -> (String, String) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => ("/".to_string(), trimmed[1..].to_string()),
        Some(idx) => (trimmed[..idx].to_string(), trimmed[idx + 1..].to_string()),
        None => ("/".to_string(), trimmed.to_string()),
    }
}

fn find_slot(block: &[u8; BLOCK_SIZE], pred: impl Fn(&Dentry) -> bool) -> Option<usize> {
    (0..DENTRIES_PER_BLOCK).find(|&slot| pred(&Dentry::read_from(&block[slot_range(slot)])))
}

/// Inserts `name -> child_num` into `parent`'s first free slot,
/// allocating a new direct block if every allocated block is full (or
/// none is allocated yet). Bumps `size` and `nlinks` (every child
/// insertion counts as a link, not only subdirectories — preserved from
/// the original, non-POSIX behavior).
pub fn insert_entry(ctx: &mut MountContext, parent: &mut Inode, name: &str, child_num: u32) -> Result<()> {
    let dentry = Dentry::new(name, child_num)?;

    for bi in 0..DIRECT_BLOCKS {
        let Some(block_num) = parent.blocks[bi] else { continue };
        let mut block = [0u8; BLOCK_SIZE];
        ctx.read_block(block_num, &mut block);
        if let Some(slot) = find_slot(&block, Dentry::is_empty) {
            dentry.write_to(&mut block[slot_range(slot)]);
            ctx.write_block(block_num, &block);
            parent.size += DENTRY_SIZE as u64;
            parent.nlinks += 1;
            ctx.stamp_mtime_ctime(parent);
            return Ok(());
        }
    }

    let free_slot = (0..DIRECT_BLOCKS)
        .find(|&i| parent.blocks[i].is_none())
        .ok_or(Error::NoSpace)?;
    let block_num = ctx.alloc_zeroed_block()?;
    let mut block = [0u8; BLOCK_SIZE];
    dentry.write_to(&mut block[slot_range(0)]);
    ctx.write_block(block_num, &block);
    parent.blocks[free_slot] = Some(block_num);
    parent.size += DENTRY_SIZE as u64;
    parent.nlinks += 1;
    ctx.stamp_mtime_ctime(parent);
    Ok(())
}

/// Zeroes the matching dentry. Does not compact or free the now-possibly-
/// empty directory block.
pub fn remove_entry(ctx: &mut MountContext, parent: &mut Inode, name: &str) -> Result<()> {
    for bi in 0..DIRECT_BLOCKS {
        let Some(block_num) = parent.blocks[bi] else { continue };
        let mut block = [0u8; BLOCK_SIZE];
        ctx.read_block(block_num, &mut block);
        if let Some(slot) = find_slot(&block, |d| d.matches(name)) {
            Dentry::EMPTY.write_to(&mut block[slot_range(slot)]);
            ctx.write_block(block_num, &block);
            parent.size -= DENTRY_SIZE as u64;
            parent.nlinks -= 1;
            ctx.stamp_mtime_ctime(parent);
            return Ok(());
        }
    }
    Err(Error::NotFound)
}
