//! The `fuser::Filesystem` binding (C8): translates kernel calls into
//! path resolution, allocation, and I/O against a `MountContext`.

use std::ffi::OsStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyWrite, Request,
};
use wfs_core::inode::{Inode, DIRECT_BLOCKS};
use wfs_core::layout::BLOCK_SIZE;
use wfs_core::{dir, io, Error, MountContext};

const TTL: Duration = Duration::from_secs(1);

/// FUSE inode numbers start at 1 (`FUSE_ROOT_ID`); on-disk inode numbers
/// start at 0 (the root directory). The two are offset by exactly one.
fn fuse_to_disk(ino: u64) -> u32 {
    (ino - 1) as u32
}

fn disk_to_fuse(num: u32) -> u64 {
    num as u64 + 1
}

fn secs_to_system_time(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs((-secs) as u64)
    }
}

fn to_file_attr(inode: &Inode) -> FileAttr {
    let kind = if inode.is_dir() { FileType::Directory } else { FileType::RegularFile };
    let blocks = inode.blocks[..DIRECT_BLOCKS].iter().filter(|b| b.is_some()).count() as u64;
    FileAttr {
        ino: disk_to_fuse(inode.num),
        size: inode.size,
        blocks,
        atime: secs_to_system_time(inode.atim),
        mtime: secs_to_system_time(inode.mtim),
        ctime: secs_to_system_time(inode.ctim),
        crtime: secs_to_system_time(inode.ctim),
        kind,
        perm: (inode.mode & 0o7777) as u16,
        nlink: inode.nlinks,
        uid: inode.uid,
        gid: inode.gid,
        rdev: 0,
        blksize: BLOCK_SIZE as u32,
        flags: 0,
    }
}

pub struct WfsFilesystem {
    ctx: MountContext,
}

impl WfsFilesystem {
    pub fn new(ctx: MountContext) -> WfsFilesystem {
        WfsFilesystem { ctx }
    }

    fn lookup_child(&self, parent_ino: u64, name: &OsStr) -> wfs_core::Result<Inode> {
        let parent = self.ctx.read_inode(fuse_to_disk(parent_ino))?;
        if !parent.is_dir() {
            return Err(Error::NotADirectory);
        }
        let name = name.to_str().ok_or(Error::NotFound)?;
        let num = dir::lookup(&self.ctx, &parent, name)?;
        self.ctx.read_inode(num)
    }
}

impl Filesystem for WfsFilesystem {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.lookup_child(parent, name) {
            Ok(child) => reply.entry(&TTL, &to_file_attr(&child), 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        match self.ctx.read_inode(fuse_to_disk(ino)) {
            Ok(inode) => reply.attr(&TTL, &to_file_attr(&inode)),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let inode = match self.ctx.read_inode(fuse_to_disk(ino)) {
            Ok(i) => i,
            Err(e) => return reply.error(e.to_errno()),
        };
        if !inode.is_dir() {
            return reply.error(Error::NotADirectory.to_errno());
        }

        let mut entries = vec![(".".to_string(), inode.num), ("..".to_string(), inode.num)];
        entries.extend(dir::list_entries(&self.ctx, &inode));

        for (i, (name, num)) in entries.into_iter().enumerate().skip(offset as usize) {
            let kind = match self.ctx.read_inode(num) {
                Ok(child) if child.is_dir() => FileType::Directory,
                _ => FileType::RegularFile,
            };
            let full = reply.add(disk_to_fuse(num), (i + 1) as i64, kind, &name);
            if full {
                break;
            }
        }
        reply.ok();
    }

    fn mknod(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        self.create_entry(req, parent, name, mode, reply);
    }

    fn mkdir(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, mode: u32, _umask: u32, reply: ReplyEntry) {
        self.create_entry(req, parent, name, libc::S_IFDIR | (mode & 0o7777), reply);
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(name) = name.to_str() else {
            return reply.error(Error::NotFound.to_errno());
        };
        match self.remove_child(parent, name, /* require_dir = */ false) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(name) = name.to_str() else {
            return reply.error(Error::NotFound.to_errno());
        };
        match self.remove_child(parent, name, /* require_dir = */ true) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let inode = match self.ctx.read_inode(fuse_to_disk(ino)) {
            Ok(i) => i,
            Err(e) => return reply.error(e.to_errno()),
        };
        if inode.is_dir() {
            return reply.error(Error::IsADirectory.to_errno());
        }
        let mut buf = vec![0u8; size as usize];
        let n = io::read(&self.ctx, &inode, offset as u64, &mut buf);
        reply.data(&buf[..n]);
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let mut inode = match self.ctx.read_inode(fuse_to_disk(ino)) {
            Ok(i) => i,
            Err(e) => return reply.error(e.to_errno()),
        };
        if inode.is_dir() {
            return reply.error(Error::IsADirectory.to_errno());
        }
        match io::write(&mut self.ctx, &mut inode, offset as u64, data) {
            Ok(n) => {
                if let Err(e) = self.ctx.write_inode(&inode) {
                    return reply.error(e.to_errno());
                }
                reply.written(n as u32);
            }
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
        // no per-open-file state: every call re-resolves the inode by number
        reply.opened(0, 0);
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        reply.ok();
    }
}

/// A create can fail for a core reason or because the name already
/// exists — the latter has no corresponding [`Error`] variant since
/// `dir::insert_entry` has no uniqueness check of its own to surface it.
#[derive(Debug)]
enum CreateError {
    Core(Error),
    AlreadyExists,
}

impl CreateError {
    fn to_errno(&self) -> i32 {
        match self {
            CreateError::Core(e) => e.to_errno(),
            CreateError::AlreadyExists => libc::EEXIST,
        }
    }
}

impl WfsFilesystem {
    fn create_entry(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, mode: u32, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            return reply.error(Error::NotFound.to_errno());
        };
        match self.try_create(fuse_to_disk(parent), name, mode, req.uid(), req.gid()) {
            Ok(child) => reply.entry(&TTL, &to_file_attr(&child), 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    /// Resolves `parent_num`, rejects a duplicate `name` with
    /// [`CreateError::AlreadyExists`], then allocates and links a child
    /// inode. Frees the newly-allocated inode before returning an error
    /// if linking it into the parent fails (e.g. a too-long name).
    fn try_create(
        &mut self,
        parent_num: u32,
        name: &str,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> std::result::Result<Inode, CreateError> {
        let mut parent_inode = self.ctx.read_inode(parent_num).map_err(CreateError::Core)?;
        if !parent_inode.is_dir() {
            return Err(CreateError::Core(Error::NotADirectory));
        }
        if dir::lookup(&self.ctx, &parent_inode, name).is_ok() {
            return Err(CreateError::AlreadyExists);
        }

        let child = self.ctx.alloc_inode(mode, uid, gid).map_err(CreateError::Core)?;
        if let Err(e) = dir::insert_entry(&mut self.ctx, &mut parent_inode, name, child.num) {
            let _ = self.ctx.free_inode_bitmap(child.num);
            return Err(CreateError::Core(e));
        }
        self.ctx.write_inode(&parent_inode).map_err(CreateError::Core)?;
        Ok(child)
    }

    fn remove_child(&mut self, parent: u64, name: &str, require_dir: bool) -> wfs_core::Result<()> {
        let parent_num = fuse_to_disk(parent);
        let mut parent_inode = self.ctx.read_inode(parent_num)?;
        if !parent_inode.is_dir() {
            return Err(Error::NotADirectory);
        }
        let target_num = dir::lookup(&self.ctx, &parent_inode, name)?;
        let target = self.ctx.read_inode(target_num)?;

        if require_dir {
            if !target.is_dir() {
                return Err(Error::NotADirectory);
            }
            if target_num == 0 {
                return Err(Error::Busy);
            }
            if target.size != 0 {
                return Err(Error::NotEmpty);
            }
        } else if target.is_dir() {
            return Err(Error::IsADirectory);
        }

        dir::remove_entry(&mut self.ctx, &mut parent_inode, name)?;
        self.ctx.write_inode(&parent_inode)?;

        io::free_blocks(&mut self.ctx, &target)?;
        self.ctx.free_inode_bitmap(target_num)?;
        Ok(())
    }
}
