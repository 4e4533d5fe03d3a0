//! End-to-end scenarios against the core directly (no real FUSE mount),
//! driving `MountContext`/`dir`/`io` the way the `wfs` binary's
//! `fuser::Filesystem` impl does.

use std::fs;

use tempfile::tempdir;
use wfs_core::dir;
use wfs_core::format::format_images;
use wfs_core::io;
use wfs_core::layout::BLOCK_SIZE;
use wfs_core::raid::RaidMode;
use wfs_core::MountContext;

fn make_image(dir: &std::path::Path, name: &str, size: u64) -> std::path::PathBuf {
    let path = dir.join(name);
    let f = fs::File::create(&path).unwrap();
    f.set_len(size).unwrap();
    path
}

fn mknod(ctx: &mut MountContext, path: &str, mode: u32) -> u32 {
    let (parent_path, leaf) = dir::split_parent(path);
    let parent_num = dir::resolve_path(ctx, &parent_path).unwrap();
    let mut parent = ctx.read_inode(parent_num).unwrap();
    let child = ctx.alloc_inode(mode, 0, 0).unwrap();
    dir::insert_entry(ctx, &mut parent, &leaf, child.num).unwrap();
    ctx.write_inode(&parent).unwrap();
    child.num
}

#[test]
fn scenario_1_format_raid1_create_file() {
    let tmp = tempdir().unwrap();
    let a = make_image(tmp.path(), "a.img", 1024 * 1024);
    let b = make_image(tmp.path(), "b.img", 1024 * 1024);
    format_images(&[&a, &b], RaidMode::Mirror, 32, 32).unwrap();

    let mut ctx = MountContext::mount(&[&a, &b]).unwrap();
    let inum = mknod(&mut ctx, "/a", libc::S_IFREG | 0o644);
    let mut inode = ctx.read_inode(inum).unwrap();

    let n = io::write(&mut ctx, &mut inode, 0, b"hello").unwrap();
    assert_eq!(n, 5);
    ctx.write_inode(&inode).unwrap();

    let mut buf = [0u8; 16];
    let got = io::read(&ctx, &inode, 0, &mut buf);
    assert_eq!(got, 5);
    assert_eq!(&buf[..5], b"hello");

    ctx.flush_all().unwrap();
    let bytes_a = fs::read(&a).unwrap();
    let bytes_b = fs::read(&b).unwrap();
    assert_eq!(bytes_a, bytes_b, "RAID1 disks must be byte-identical after unmount");
}

#[test]
fn scenario_2_format_raid0_striping_is_observable() {
    let tmp = tempdir().unwrap();
    let disks: Vec<_> = ["d0.img", "d1.img", "d2.img"]
        .iter()
        .map(|n| make_image(tmp.path(), n, 1024 * 1024))
        .collect();
    format_images(&disks, RaidMode::Stripe, 32, 96).unwrap();

    let mut ctx = MountContext::mount(&disks).unwrap();
    let inum = mknod(&mut ctx, "/f", libc::S_IFREG | 0o644);
    let mut inode = ctx.read_inode(inum).unwrap();

    let pattern: Vec<u8> = (0..1536u32).map(|i| (i % 251) as u8).collect();
    let n = io::write(&mut ctx, &mut inode, 0, &pattern).unwrap();
    assert_eq!(n, 1536);
    ctx.write_inode(&inode).unwrap();
    ctx.flush_all().unwrap();

    // three direct blocks, one per disk in round-robin order
    let b0 = inode.blocks[0].unwrap();
    let b1 = inode.blocks[1].unwrap();
    let b2 = inode.blocks[2].unwrap();
    assert_eq!(b0 % 3, 0);
    assert_eq!(b1 % 3, 1);
    assert_eq!(b2 % 3, 2);
}

#[test]
fn scenario_3_directory_size_law() {
    let tmp = tempdir().unwrap();
    let a = make_image(tmp.path(), "a.img", 1024 * 1024);
    let b = make_image(tmp.path(), "b.img", 1024 * 1024);
    format_images(&[&a, &b], RaidMode::Mirror, 64, 64).unwrap();

    let mut ctx = MountContext::mount(&[&a, &b]).unwrap();
    mknod(&mut ctx, "/d", libc::S_IFDIR | 0o755);

    for i in 0..10 {
        let name = format!("/d/f{i}");
        mknod(&mut ctx, &name, libc::S_IFREG | 0o644);
        let d_num = dir::resolve_path(&ctx, "/d").unwrap();
        let d_inode = ctx.read_inode(d_num).unwrap();
        assert_eq!(d_inode.size, (i as u64 + 1) * 32);
    }
}

#[test]
fn scenario_4_unlink_frees_blocks() {
    let tmp = tempdir().unwrap();
    let a = make_image(tmp.path(), "a.img", 1024 * 1024);
    let b = make_image(tmp.path(), "b.img", 1024 * 1024);
    format_images(&[&a, &b], RaidMode::Mirror, 32, 32).unwrap();

    let mut ctx = MountContext::mount(&[&a, &b]).unwrap();

    let inum = mknod(&mut ctx, "/file", libc::S_IFREG | 0o644);
    let mut inode = ctx.read_inode(inum).unwrap();
    let data = vec![7u8; 2048];
    io::write(&mut ctx, &mut inode, 0, &data).unwrap();
    ctx.write_inode(&inode).unwrap();
    let reused_block = inode.blocks[0].unwrap();

    io::free_blocks(&mut ctx, &inode).unwrap();
    ctx.free_inode_bitmap(inode.num).unwrap();

    let (parent_path, leaf) = dir::split_parent("/file");
    let parent_num = dir::resolve_path(&ctx, &parent_path).unwrap();
    let mut parent = ctx.read_inode(parent_num).unwrap();
    dir::remove_entry(&mut ctx, &mut parent, &leaf).unwrap();
    ctx.write_inode(&parent).unwrap();

    // the freed inode slot and its first data block must be reusable
    let new_file = ctx.alloc_inode(libc::S_IFREG | 0o644, 0, 0).unwrap();
    assert_eq!(new_file.num, inum, "freed inode slot should be reused first-fit");
    let new_block = ctx.alloc_data_block().unwrap();
    assert_eq!(new_block, reused_block, "freed data block should be reused first-fit");
}

#[test]
fn scenario_5_raid1v_recovers_from_corruption() {
    let tmp = tempdir().unwrap();
    let a = make_image(tmp.path(), "a.img", 1024 * 1024);
    let b = make_image(tmp.path(), "b.img", 1024 * 1024);
    format_images(&[&a, &b], RaidMode::MirrorVerified, 32, 32).unwrap();

    {
        let mut ctx = MountContext::mount(&[&a, &b]).unwrap();
        let inum = mknod(&mut ctx, "/f", libc::S_IFREG | 0o644);
        let mut inode = ctx.read_inode(inum).unwrap();
        io::write(&mut ctx, &mut inode, 0, b"trustworthy").unwrap();
        ctx.write_inode(&inode).unwrap();
        ctx.flush_all().unwrap();
    }

    // corrupt disk 1's copy of the data block directly on disk
    {
        let sb = wfs_core::superblock::Superblock::read_from(&fs::read(&a).unwrap()).unwrap();
        let off = sb.layout.d_blocks_ptr as usize;
        let mut bytes = fs::read(&b).unwrap();
        for byte in bytes[off..off + BLOCK_SIZE].iter_mut() {
            *byte = 0xFF;
        }
        fs::write(&b, &bytes).unwrap();
    }

    let ctx = MountContext::mount(&[&a, &b]).unwrap();
    let inum = dir::resolve_path(&ctx, "/f").unwrap();
    let inode = ctx.read_inode(inum).unwrap();
    let mut buf = [0u8; 32];
    let n = io::read(&ctx, &inode, 0, &mut buf);
    assert_eq!(&buf[..n], b"trustworthy");
}

#[test]
fn scenario_6_indirect_block_activation() {
    let tmp = tempdir().unwrap();
    let a = make_image(tmp.path(), "a.img", 1024 * 1024);
    let b = make_image(tmp.path(), "b.img", 1024 * 1024);
    format_images(&[&a, &b], RaidMode::Mirror, 32, 64).unwrap();

    let mut ctx = MountContext::mount(&[&a, &b]).unwrap();
    let inum = mknod(&mut ctx, "/f", libc::S_IFREG | 0o644);
    let mut inode = ctx.read_inode(inum).unwrap();

    let offset = 7 * BLOCK_SIZE as u64;
    let n = io::write(&mut ctx, &mut inode, offset, &[0xAB; 512]).unwrap();
    assert_eq!(n, 512);
    ctx.write_inode(&inode).unwrap();

    let mut buf = vec![0u8; 4 * 1024];
    let got = io::read(&ctx, &inode, 0, &mut buf);
    assert_eq!(got, offset as usize + 512);
    assert_eq!(&buf[offset as usize..offset as usize + 512], &[0xAB; 512][..]);
}

#[test]
fn lookup_of_missing_name_is_not_found() {
    let tmp = tempdir().unwrap();
    let a = make_image(tmp.path(), "a.img", 1024 * 1024);
    let b = make_image(tmp.path(), "b.img", 1024 * 1024);
    format_images(&[&a, &b], RaidMode::Mirror, 32, 32).unwrap();

    let mut ctx = MountContext::mount(&[&a, &b]).unwrap();
    mknod(&mut ctx, "/d", libc::S_IFDIR | 0o755);

    let root = ctx.read_inode(0).unwrap();
    assert!(dir::lookup(&ctx, &root, "d").is_ok());
    assert!(matches!(dir::lookup(&ctx, &root, "missing"), Err(wfs_core::Error::NotFound)));
}
