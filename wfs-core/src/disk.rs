//! Disk set (C1): owns the memory-mapped backing images.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use crate::error::Result;

/// One backing image, mapped read/write for the lifetime of the mount.
pub struct Disk {
    pub path: PathBuf,
    mmap: MmapMut,
}

impl Disk {
    /// Opens and maps an existing image. Does not create or resize it —
    /// images must preexist at the required size.
    pub fn open(path: impl AsRef<Path>) -> Result<Disk> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Disk { path, mmap })
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    /// Flushes this image's mapping to the underlying file.
    pub fn flush(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }
}
