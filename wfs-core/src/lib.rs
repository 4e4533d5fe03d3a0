//! Core of WFS: the on-disk layout, allocator, directory machinery, and
//! read/write path shared by the `mkfs` formatter and the `wfs` server.
//! This crate has no dependency on the kernel bridge (`fuser`) — it is
//! driven by a plain `MountContext` so it can be exercised directly in
//! tests without mounting anything.

pub mod bitmap;
pub mod context;
pub mod dentry;
pub mod dir;
pub mod disk;
pub mod error;
pub mod format;
pub mod inode;
pub mod io;
pub mod layout;
pub mod raid;
pub mod superblock;

pub use context::MountContext;
pub use error::{Error, Result};
pub use inode::Inode;
pub use raid::RaidMode;
