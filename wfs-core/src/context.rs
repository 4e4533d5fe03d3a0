//! Mount context: the single value that replaces the original's
//! process-wide globals (disk mappings, superblock, RAID mode, RAID0
//! cursor), threaded through the allocator, addressing and I/O layers.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};

use crate::bitmap;
use crate::disk::Disk;
use crate::error::{Error, Result};
use crate::inode::{Inode, N_BLOCKS};
use crate::layout::BLOCK_SIZE;
use crate::raid::{self, Placement, RaidMode};
use crate::superblock::Superblock;

pub struct MountContext {
    /// Indexed by `disk_id`, i.e. `disks[i].superblock().disk_id == i`.
    disks: Vec<Disk>,
    superblock: Superblock,
    /// Next disk RAID0 allocation tries first, round-robin.
    next_raid0_disk: usize,
}

pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl MountContext {
    /// Opens every backing image, maps it, and places it into the
    /// `disk_id`-indexed slot. Fatal on fewer than two images,
    /// mismatched/out-of-range `disk_id`s, or a corrupt superblock.
    pub fn mount(paths: &[impl AsRef<Path>]) -> Result<MountContext> {
        if paths.len() < 2 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "at least two backing images are required",
            )));
        }

        let opened: Vec<Disk> = paths
            .iter()
            .map(Disk::open)
            .collect::<Result<_>>()?;
        let n = opened.len();

        let mut superblocks = Vec::with_capacity(n);
        for disk in &opened {
            superblocks.push(Superblock::read_from(disk.as_slice())?);
        }

        let authoritative = superblocks[0];
        let mut slots: Vec<Option<Disk>> = (0..n).map(|_| None).collect();
        for (disk, sb) in opened.into_iter().zip(superblocks.iter()) {
            let id = sb.disk_id as usize;
            if id >= n {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("disk_id {id} out of range for {n} disks"),
                )));
            }
            if sb.layout != authoritative.layout || sb.raid_mode != authoritative.raid_mode {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "disk superblocks disagree on filesystem geometry",
                )));
            }
            if slots[id].is_some() {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("duplicate disk_id {id}"),
                )));
            }
            slots[id] = Some(disk);
        }
        let disks: Vec<Disk> = slots
            .into_iter()
            .enumerate()
            .map(|(id, slot)| {
                slot.ok_or_else(|| {
                    Error::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("missing disk_id {id}"),
                    ))
                })
            })
            .collect::<Result<_>>()?;

        debug!(
            "mounted {} disks, raid={}, {} inodes, {} data blocks",
            n,
            authoritative.raid_mode.as_str(),
            authoritative.layout.num_inodes,
            authoritative.layout.num_data_blocks
        );

        Ok(MountContext {
            disks,
            superblock: authoritative,
            next_raid0_disk: 0,
        })
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    pub fn raid_mode(&self) -> RaidMode {
        self.superblock.raid_mode
    }

    pub fn num_disks(&self) -> usize {
        self.disks.len()
    }

    pub fn flush_all(&self) -> Result<()> {
        for disk in &self.disks {
            disk.flush()?;
        }
        Ok(())
    }

    // ---- inode bitmap ----------------------------------------------

    fn inode_bitmap_range(&self) -> std::ops::Range<usize> {
        let start = self.superblock.layout.i_bitmap_ptr as usize;
        start..start + self.superblock.layout.inode_bitmap_bytes()
    }

    fn inode_bitmap(&self) -> &[u8] {
        let range = self.inode_bitmap_range();
        &self.disks[0].as_slice()[range]
    }

    // ---- data bitmap ------------------------------------------------

    fn data_bitmap_range(&self) -> std::ops::Range<usize> {
        let start = self.superblock.layout.d_bitmap_ptr as usize;
        start..start + self.superblock.layout.data_bitmap_bytes()
    }

    fn data_bitmap(&self, disk_id: usize) -> &[u8] {
        let range = self.data_bitmap_range();
        &self.disks[disk_id].as_slice()[range]
    }

    fn data_bitmap_mut(&mut self, disk_id: usize) -> &mut [u8] {
        let range = self.data_bitmap_range();
        &mut self.disks[disk_id].as_mut_slice()[range]
    }

    // ---- inode store (C5) --------------------------------------------

    fn inode_offset(&self, num: u32) -> usize {
        self.superblock.layout.i_blocks_ptr as usize + num as usize * BLOCK_SIZE
    }

    pub fn read_inode(&self, num: u32) -> Result<Inode> {
        if num as u64 >= self.superblock.layout.num_inodes || !bitmap::get(self.inode_bitmap(), num as usize) {
            return Err(Error::NotFound);
        }
        let off = self.inode_offset(num);
        Ok(Inode::read_from(&self.disks[0].as_slice()[off..off + BLOCK_SIZE]))
    }

    /// Fans the full inode record out to every disk.
    pub fn write_inode(&mut self, inode: &Inode) -> Result<()> {
        let off = self.inode_offset(inode.num);
        let mut block = [0u8; BLOCK_SIZE];
        inode.write_to(&mut block);
        for disk in &mut self.disks {
            disk.as_mut_slice()[off..off + BLOCK_SIZE].copy_from_slice(&block);
        }
        Ok(())
    }

    /// Allocates a fresh inode, writes an initialized record to every
    /// disk, and returns its number.
    pub fn alloc_inode(&mut self, mode: u32, uid: u32, gid: u32) -> Result<Inode> {
        let range = self.inode_bitmap_range();
        let count = self.superblock.layout.num_inodes as usize;
        let num = {
            let bm = &self.disks[0].as_slice()[range.clone()];
            bitmap::find_first_clear(bm, count).ok_or(Error::NoSpace)?
        };
        for disk in &mut self.disks {
            bitmap::set(&mut disk.as_mut_slice()[range.clone()], num);
        }

        let is_dir = mode & libc::S_IFMT == libc::S_IFDIR;
        let now = now_secs();
        let inode = Inode {
            num: num as u32,
            mode,
            uid,
            gid,
            size: 0,
            nlinks: if is_dir { 2 } else { 1 },
            atim: now,
            mtim: now,
            ctim: now,
            blocks: [None; N_BLOCKS],
        };
        self.write_inode(&inode)?;
        Ok(inode)
    }

    /// Clears the inode bitmap bit on every disk. Callers free the
    /// inode's data blocks first via [`crate::io::free_blocks`].
    pub fn free_inode_bitmap(&mut self, num: u32) -> Result<()> {
        let range = self.inode_bitmap_range();
        for disk in &mut self.disks {
            bitmap::clear(&mut disk.as_mut_slice()[range.clone()], num as usize);
        }
        Ok(())
    }

    pub fn stamp_mtime_ctime(&self, inode: &mut Inode) {
        let now = now_secs();
        inode.mtim = now;
        inode.ctim = now;
    }

    // ---- data-block allocation (C3) ----------------------------------

    fn stripe_local_count(&self, disk_id: usize) -> usize {
        let n = self.disks.len() as u64;
        let total = self.superblock.layout.num_data_blocks;
        if disk_id as u64 >= total {
            0
        } else {
            (((total - disk_id as u64 - 1) / n) + 1) as usize
        }
    }

    pub fn alloc_data_block(&mut self) -> Result<u32> {
        match self.superblock.raid_mode {
            RaidMode::Stripe => self.alloc_data_block_stripe(),
            RaidMode::Mirror | RaidMode::MirrorVerified => self.alloc_data_block_mirrored(),
        }
    }

    fn alloc_data_block_stripe(&mut self) -> Result<u32> {
        let n = self.disks.len();
        for attempt in 0..n {
            let disk_id = (self.next_raid0_disk + attempt) % n;
            let local_count = self.stripe_local_count(disk_id);
            let bm = self.data_bitmap(disk_id);
            if let Some(local_index) = bitmap::find_first_clear(bm, local_count) {
                bitmap::set(self.data_bitmap_mut(disk_id), local_index);
                self.next_raid0_disk = (disk_id + 1) % n;
                return Ok((local_index * n + disk_id) as u32);
            }
        }
        Err(Error::NoSpace)
    }

    fn alloc_data_block_mirrored(&mut self) -> Result<u32> {
        let count = self.superblock.layout.num_data_blocks as usize;
        let idx = bitmap::find_first_clear(self.data_bitmap(0), count).ok_or(Error::NoSpace)?;
        for disk_id in 0..self.disks.len() {
            bitmap::set(self.data_bitmap_mut(disk_id), idx);
        }
        Ok(idx as u32)
    }

    pub fn free_data_block(&mut self, b: u32) -> Result<()> {
        match self.superblock.raid_mode {
            RaidMode::Stripe => {
                let disk_id = raid::stripe_owner(self.disks.len(), b);
                let local_index = b as usize / self.disks.len();
                bitmap::clear(self.data_bitmap_mut(disk_id), local_index);
            }
            RaidMode::Mirror | RaidMode::MirrorVerified => {
                for disk_id in 0..self.disks.len() {
                    bitmap::clear(self.data_bitmap_mut(disk_id), b as usize);
                }
            }
        }
        Ok(())
    }

    // ---- data-block I/O (C4 applied) ---------------------------------

    pub fn read_block(&self, b: u32, out: &mut [u8; BLOCK_SIZE]) {
        match raid::locate(self.raid_mode(), self.disks.len(), b, self.superblock.layout.d_blocks_ptr) {
            Placement::Single { disk, offset } => {
                let off = offset as usize;
                out.copy_from_slice(&self.disks[disk].as_slice()[off..off + BLOCK_SIZE]);
            }
            Placement::Mirrored { offset } => {
                let off = offset as usize;
                if self.raid_mode().verified_reads() {
                    let copies: Vec<&[u8]> = self
                        .disks
                        .iter()
                        .map(|d| &d.as_slice()[off..off + BLOCK_SIZE])
                        .collect();
                    out.copy_from_slice(majority_vote(&copies));
                } else {
                    out.copy_from_slice(&self.disks[0].as_slice()[off..off + BLOCK_SIZE]);
                }
            }
        }
    }

    pub fn write_block(&mut self, b: u32, data: &[u8; BLOCK_SIZE]) {
        match raid::locate(self.raid_mode(), self.disks.len(), b, self.superblock.layout.d_blocks_ptr) {
            Placement::Single { disk, offset } => {
                let off = offset as usize;
                self.disks[disk].as_mut_slice()[off..off + BLOCK_SIZE].copy_from_slice(data);
            }
            Placement::Mirrored { offset } => {
                let off = offset as usize;
                for disk in &mut self.disks {
                    disk.as_mut_slice()[off..off + BLOCK_SIZE].copy_from_slice(data);
                }
            }
        }
    }

    /// Allocates a new zeroed data block and writes it through, returning
    /// its logical number.
    pub fn alloc_zeroed_block(&mut self) -> Result<u32> {
        let b = self.alloc_data_block()?;
        self.write_block(b, &[0u8; BLOCK_SIZE]);
        Ok(b)
    }

    #[cfg(test)]
    pub fn data_bitmap_for_test(&self, disk_id: usize) -> &[u8] {
        self.data_bitmap(disk_id)
    }
}

/// Content held by the largest group of disks, ties broken by the
/// lowest `disk_id` (earliest index).
fn majority_vote<'a>(copies: &[&'a [u8]]) -> &'a [u8] {
    let mut best_idx = 0;
    let mut best_count = 0;
    for i in 0..copies.len() {
        let count = copies.iter().filter(|c| **c == copies[i]).count();
        if count > best_count {
            best_count = count;
            best_idx = i;
        }
    }
    if best_count * 2 <= copies.len() {
        warn!("raid1v: no majority among {} copies, using disk 0's content", copies.len());
    }
    copies[best_idx]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn majority_vote_breaks_ties_on_lowest_disk() {
        let a = [1u8, 2, 3];
        let b = [9u8, 9, 9];
        let copies: Vec<&[u8]> = vec![&a, &b];
        assert_eq!(majority_vote(&copies), &a[..]);
    }

    #[test]
    fn majority_vote_picks_the_majority() {
        let a = [1u8, 2, 3];
        let b = [9u8, 9, 9];
        let copies: Vec<&[u8]> = vec![&b, &a, &a];
        assert_eq!(majority_vote(&copies), &a[..]);
    }
}
