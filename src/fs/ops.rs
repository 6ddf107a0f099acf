/*
 * Copyright 2025 Luc Lenôtre
 *
 * This file is part of Maestro.
 *
 * Maestro is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Maestro is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Maestro. If not, see <https://www.gnu.org/licenses/>.
 */

//! The operations the mount driver and the tools consume, composed from the
//! lower layers.
//!
//! Within one operation, image writes are ordered so that a crash never
//! leaves a reachable pointer to an unallocated block: bitmap bits first,
//! then indirect and leaf blocks, then inode records, then the main block.

use crate::alloc;
use crate::device;
use crate::dirent;
use crate::dirent::DirEntry;
use crate::error::Error;
use crate::error::Result;
use crate::inode::Inode;
use crate::inode::MODE_PERM_MASK;
use crate::inode::MODE_TYPE_DIRECTORY;
use crate::inode::MODE_TYPE_REGULAR;
use crate::inode::ROOT_INODE;
use crate::path;
use crate::superblock::FsInfo;
use std::fs::File;

/// `rename` flag: fail if the destination exists.
pub const RENAME_NOREPLACE: u32 = 1;
/// `rename` flag: exchange source and destination in place.
pub const RENAME_EXCHANGE: u32 = 2;

/// File attributes as reported to the mount driver.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Stat {
    /// The file's inode number.
    pub inode: u32,
    /// Permissions and file type.
    pub mode: u16,
    /// Number of links to the file.
    pub nlinks: u16,
    /// User ID.
    pub uid: u32,
    /// Group ID.
    pub gid: u32,
    /// Size of the file in bytes.
    pub size: u64,
    /// Occupied 512-byte sectors, indirect bookkeeping included.
    pub sectors: u64,
    /// Timestamp of creation.
    pub ctime: u64,
    /// Timestamp of the last modification of the content.
    pub mtime: u64,
}

/// Creates a blank filesystem on the image.
///
/// Arguments:
/// - `size` is the usable size of the image in bytes.
/// - `now` is the creation timestamp for the root directory.
///
/// Both bitmaps are zeroed, the root directory is created as inode 0 and the
/// main block is written last.
pub fn format_image(dev: &mut File, size: u64, now: u64) -> Result<FsInfo> {
    let mut fs = FsInfo::new(size);
    if fs.main.data_block_count == 0 {
        return Err(Error::OutOfSpace);
    }
    let bs = fs.block_size();
    let zero = vec![0u8; bs as usize];
    for i in 0..fs.inode_bitmap_blocks as u64 {
        device::write_at(dev, fs.inode_bitmap_pos + i * bs, &zero)?;
    }
    for i in 0..fs.data_bitmap_blocks as u64 {
        device::write_at(dev, fs.data_bitmap_pos + i * bs, &zero)?;
    }
    // Root directory
    device::set_bit(dev, fs.inode_bitmap_pos, ROOT_INODE as u64, true)?;
    fs.main.inode_count = 1;
    let mut root = Inode::new(0, 0, 0o755 | MODE_TYPE_DIRECTORY, now);
    root.nlinks = 1;
    root.write(dev, &fs, ROOT_INODE)?;
    fs.write(dev)?;
    log::debug!(
        "formatted image: {} blocks of {} bytes, {} data blocks, {} inode slots",
        fs.main.block_count,
        fs.main.block_size,
        fs.main.data_block_count,
        fs.main.inode_count_limit
    );
    Ok(fs)
}

/// Allocates an inode slot and writes `template` into it.
///
/// Returns the new inode's number.
pub fn create_inode(dev: &mut File, fs: &mut FsInfo, template: &Inode) -> Result<u32> {
    let inode_num = alloc::alloc_inode_slot(dev, fs)?;
    template.write(dev, fs, inode_num)?;
    fs.main.inode_count += 1;
    Ok(inode_num)
}

/// Releases a file's content and inode slot.
///
/// Callable only once every link to the inode has been dropped.
pub fn destroy_file(dev: &mut File, fs: &mut FsInfo, inode_num: u32, inode: &mut Inode) -> Result<()> {
    inode.destroy(dev, fs, inode_num)?;
    inode.write(dev, fs, inode_num)?;
    fs.write(dev)
}

/// Returns the attributes of the file at `path`.
pub fn getattr(dev: &mut File, fs: &FsInfo, path: &[u8]) -> Result<Stat> {
    let r = path::resolve(dev, fs, path)?;
    Ok(Stat {
        inode: r.inode_num,
        mode: r.inode.mode,
        nlinks: r.inode.nlinks,
        uid: r.inode.uid,
        gid: r.inode.gid,
        size: r.inode.size,
        sectors: r.inode.sector_count(fs),
        ctime: r.inode.ctime,
        mtime: r.inode.mtime,
    })
}

/// Updates the permission bits of the file at `path`.
pub fn chmod(dev: &mut File, fs: &FsInfo, path: &[u8], mode: u16) -> Result<()> {
    let r = path::resolve(dev, fs, path)?;
    let mut inode = r.inode;
    inode.mode = (inode.mode & !MODE_PERM_MASK) | (mode & MODE_PERM_MASK);
    inode.write(dev, fs, r.inode_num)
}

/// Updates the owner of the file at `path`.
pub fn chown(dev: &mut File, fs: &FsInfo, path: &[u8], uid: u32, gid: u32) -> Result<()> {
    let r = path::resolve(dev, fs, path)?;
    let mut inode = r.inode;
    inode.uid = uid;
    inode.gid = gid;
    inode.write(dev, fs, r.inode_num)
}

/// Reads file content. Refused on directories.
pub fn read_file(dev: &mut File, fs: &FsInfo, inode: &Inode, buf: &mut [u8], pos: u64) -> Result<u64> {
    if inode.is_directory() {
        return Err(Error::IsDirectory);
    }
    inode.read_data(dev, fs, buf, pos)
}

/// Writes file content, then writes back the inode record and the main
/// block. Refused on directories.
pub fn write_file(
    dev: &mut File,
    fs: &mut FsInfo,
    inode_num: u32,
    inode: &mut Inode,
    buf: &[u8],
    pos: u64,
) -> Result<u64> {
    if inode.is_directory() {
        return Err(Error::IsDirectory);
    }
    let written = inode.write_data(dev, fs, buf, pos)?;
    inode.write(dev, fs, inode_num)?;
    fs.write(dev)?;
    Ok(written)
}

/// Creates a file at `path` from the caller-supplied `template`, which
/// carries the identity, permissions and file type bit.
///
/// Returns the new inode's number.
pub fn create(dev: &mut File, fs: &mut FsInfo, path: &[u8], template: &Inode) -> Result<u32> {
    let (parent_path, name) = path::split(path)?;
    if name.len() > dirent::NAME_MAX {
        return Err(Error::NameTooLong);
    }
    let parent = path::resolve(dev, fs, parent_path)?;
    if !parent.inode.is_directory() {
        return Err(Error::NotADirectory);
    }
    if dirent::lookup(dev, fs, &parent.inode, name)?.is_some() {
        return Err(Error::Exists);
    }
    let inode_num = create_inode(dev, fs, template)?;
    let mut child = template.clone();
    let mut dir = parent.inode;
    dirent::insert(dev, fs, parent.inode_num, &mut dir, inode_num, &mut child, name)?;
    fs.write(dev)?;
    Ok(inode_num)
}

/// Creates a regular file at `path`.
pub fn mknod(
    dev: &mut File,
    fs: &mut FsInfo,
    path: &[u8],
    uid: u32,
    gid: u32,
    mode: u16,
    now: u64,
) -> Result<u32> {
    let mode = (mode & MODE_PERM_MASK) | MODE_TYPE_REGULAR;
    create(dev, fs, path, &Inode::new(uid, gid, mode, now))
}

/// Creates a directory at `path`.
pub fn mkdir(
    dev: &mut File,
    fs: &mut FsInfo,
    path: &[u8],
    uid: u32,
    gid: u32,
    mode: u16,
    now: u64,
) -> Result<u32> {
    let mode = (mode & MODE_PERM_MASK) | MODE_TYPE_DIRECTORY;
    create(dev, fs, path, &Inode::new(uid, gid, mode, now))
}

/// Truncates the file at `path` to `size` bytes. Refused on directories.
pub fn truncate(dev: &mut File, fs: &mut FsInfo, path: &[u8], size: u64) -> Result<()> {
    let r = path::resolve(dev, fs, path)?;
    if r.inode.is_directory() {
        return Err(Error::IsDirectory);
    }
    let mut inode = r.inode;
    inode.resize(dev, fs, size)?;
    inode.write(dev, fs, r.inode_num)?;
    fs.write(dev)
}

/// Removes the regular file at `path`.
pub fn unlink(dev: &mut File, fs: &mut FsInfo, path: &[u8]) -> Result<()> {
    remove_entry(dev, fs, path, false)
}

/// Removes the directory at `path`.
pub fn rmdir(dev: &mut File, fs: &mut FsInfo, path: &[u8]) -> Result<()> {
    remove_entry(dev, fs, path, true)
}

fn remove_entry(dev: &mut File, fs: &mut FsInfo, path: &[u8], expect_dir: bool) -> Result<()> {
    let r = path::resolve(dev, fs, path)?;
    let Some((parent_num, mut parent)) = r.parent else {
        // The root cannot be removed
        return Err(Error::IsDirectory);
    };
    match (expect_dir, r.inode.is_directory()) {
        (false, true) => return Err(Error::IsDirectory),
        (true, false) => return Err(Error::NotADirectory),
        _ => {}
    }
    let mut child = r.inode;
    if !dirent::remove(dev, fs, parent_num, &mut parent, r.inode_num, &mut child)? {
        return Err(Error::NoEntry);
    }
    fs.write(dev)
}

/// Lists the entries of the directory at `path`.
pub fn readdir(dev: &mut File, fs: &FsInfo, path: &[u8]) -> Result<Vec<DirEntry>> {
    let r = path::resolve(dev, fs, path)?;
    if !r.inode.is_directory() {
        return Err(Error::NotADirectory);
    }
    dirent::list(dev, fs, &r.inode)
}

/// Moves the entry at `old_path` to `new_path`.
///
/// `flags` accepts [`RENAME_NOREPLACE`] (the destination must not exist) and
/// [`RENAME_EXCHANGE`] (both entries must exist; their inode fields are
/// swapped in place).
pub fn rename(
    dev: &mut File,
    fs: &mut FsInfo,
    old_path: &[u8],
    new_path: &[u8],
    flags: u32,
) -> Result<()> {
    let old = path::resolve(dev, fs, old_path)?;
    let (old_parent_num, old_parent) = old.parent.ok_or(Error::NoEntry)?;
    let old_off = old.entry_off.ok_or(Error::NoEntry)?;
    let (new_parent_path, new_name) = path::split(new_path)?;
    if new_name.len() > dirent::NAME_MAX {
        return Err(Error::NameTooLong);
    }
    if flags & RENAME_EXCHANGE != 0 {
        // Swap the two entries' inode fields in place
        let new = path::resolve(dev, fs, new_path)?;
        let (_, new_parent) = new.parent.ok_or(Error::NoEntry)?;
        let new_off = new.entry_off.ok_or(Error::NoEntry)?;
        let mut old_parent = old_parent;
        dirent::set_entry_inode(dev, fs, &mut old_parent, old_off, new.inode_num)?;
        let mut new_parent = new_parent;
        dirent::set_entry_inode(dev, fs, &mut new_parent, new_off, old.inode_num)?;
        return Ok(());
    }
    let new_parent_r = path::resolve(dev, fs, new_parent_path)?;
    if !new_parent_r.inode.is_directory() {
        return Err(Error::NotADirectory);
    }
    if let Some((dst_num, dst_off)) = dirent::lookup(dev, fs, &new_parent_r.inode, new_name)? {
        if flags & RENAME_NOREPLACE != 0 {
            return Err(Error::Exists);
        }
        // Source and destination are the same entry: nothing to do
        if new_parent_r.inode_num == old_parent_num && dst_off == old_off {
            return Ok(());
        }
        let mut dst_parent = new_parent_r.inode.clone();
        let mut dst_child = Inode::read(dev, fs, dst_num)?;
        dirent::remove(
            dev,
            fs,
            new_parent_r.inode_num,
            &mut dst_parent,
            dst_num,
            &mut dst_child,
        )?;
    }
    // Entry offsets may have shifted: resolve again
    let old = path::resolve(dev, fs, old_path)?;
    let (old_parent_num, old_parent) = old.parent.ok_or(Error::NoEntry)?;
    let new_parent_r = path::resolve(dev, fs, new_parent_path)?;
    let mut new_parent = new_parent_r.inode;
    let mut child = old.inode;
    dirent::insert(
        dev,
        fs,
        new_parent_r.inode_num,
        &mut new_parent,
        old.inode_num,
        &mut child,
        new_name,
    )?;
    // Remove the source entry. With a single directory involved, the source
    // entry precedes the freshly appended one, so the scan drops the right
    // copy.
    let mut old_parent = if old_parent_num == new_parent_r.inode_num {
        new_parent
    } else {
        old_parent
    };
    dirent::remove(dev, fs, old_parent_num, &mut old_parent, old.inode_num, &mut child)?;
    fs.write(dev)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::inode::MODE_TYPE_REGULAR;
    use crate::inode::indirect_block_count;

    fn test_image(size: u64) -> (File, FsInfo) {
        let mut dev = tempfile::tempfile().unwrap();
        dev.set_len(size).unwrap();
        let fs = format_image(&mut dev, size, 42).unwrap();
        (dev, fs)
    }

    fn file_template() -> Inode {
        Inode::new(0, 0, 0o644 | MODE_TYPE_REGULAR, 0)
    }

    fn dir_template() -> Inode {
        Inode::new(0, 0, 0o755 | MODE_TYPE_DIRECTORY, 0)
    }

    fn sorted_names(dev: &mut File, fs: &FsInfo, path: &[u8]) -> Vec<Vec<u8>> {
        let mut names: Vec<_> = readdir(dev, fs, path)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        names.sort();
        names
    }

    #[test]
    fn format_and_stat_root() {
        let (mut dev, fs) = test_image(16 * 1024 * 1024);
        let stat = getattr(&mut dev, &fs, b"/").unwrap();
        assert_eq!(stat.inode, ROOT_INODE);
        assert_eq!(stat.mode, 0o755 | MODE_TYPE_DIRECTORY);
        assert_eq!(stat.size, 0);
        assert_eq!(stat.sectors, 0);
        assert_eq!(stat.ctime, 42);
        assert_eq!(fs.main.inode_count, 1);
        assert_eq!(fs.main.free_data_block_count, fs.main.data_block_count);
        // The main block read back matches what was written
        let reread = FsInfo::read(&mut dev).unwrap();
        assert_eq!(reread.main, fs.main);
        assert_eq!(reread.blocks_pos, fs.blocks_pos);
    }

    #[test]
    fn hello_round_trip() {
        let (mut dev, mut fs) = test_image(16 * 1024 * 1024);
        let num = create(&mut dev, &mut fs, b"/hello.txt", &file_template()).unwrap();
        let mut inode = Inode::read(&mut dev, &fs, num).unwrap();
        let written = write_file(&mut dev, &mut fs, num, &mut inode, b"Hello, world!", 0).unwrap();
        assert_eq!(written, 13);
        assert_eq!(inode.size, 13);
        assert_eq!(inode.blocks, 1);
        let mut buf = [0u8; 13];
        let read = read_file(&mut dev, &fs, &inode, &mut buf, 0).unwrap();
        assert_eq!(read, 13);
        assert_eq!(&buf, b"Hello, world!");
        // The inode reached the table
        let stat = getattr(&mut dev, &fs, b"/hello.txt").unwrap();
        assert_eq!(stat.size, 13);
        assert_eq!(stat.sectors, 8);
        assert_eq!(stat.nlinks, 1);
    }

    #[test]
    fn create_errors() {
        let (mut dev, mut fs) = test_image(16 * 1024 * 1024);
        create(&mut dev, &mut fs, b"/a", &file_template()).unwrap();
        assert!(matches!(
            create(&mut dev, &mut fs, b"/a", &file_template()),
            Err(Error::Exists)
        ));
        assert!(matches!(
            create(&mut dev, &mut fs, b"/missing/x", &file_template()),
            Err(Error::NoEntry)
        ));
        assert!(matches!(
            create(&mut dev, &mut fs, b"/a/x", &file_template()),
            Err(Error::NotADirectory)
        ));
        let long = [b'x'; 513];
        let path: Vec<u8> = b"/".iter().chain(long.iter()).copied().collect();
        assert!(matches!(
            create(&mut dev, &mut fs, &path, &file_template()),
            Err(Error::NameTooLong)
        ));
    }

    #[test]
    fn directory_listing_after_removal() {
        let (mut dev, mut fs) = test_image(16 * 1024 * 1024);
        create(&mut dev, &mut fs, b"/a", &file_template()).unwrap();
        create(&mut dev, &mut fs, b"/b", &file_template()).unwrap();
        create(&mut dev, &mut fs, b"/c", &file_template()).unwrap();
        unlink(&mut dev, &mut fs, b"/b").unwrap();
        assert_eq!(
            sorted_names(&mut dev, &fs, b"/"),
            [b"a".to_vec(), b"c".to_vec()]
        );
        create(&mut dev, &mut fs, b"/d", &file_template()).unwrap();
        assert_eq!(
            sorted_names(&mut dev, &fs, b"/"),
            [b"a".to_vec(), b"c".to_vec(), b"d".to_vec()]
        );
        // The body is exactly the header plus the entries
        let root = Inode::read(&mut dev, &fs, ROOT_INODE).unwrap();
        let total: u64 = {
            let header = dirent::read_header(&mut dev, &fs, &root).unwrap();
            assert_eq!(header.entry_count, 3);
            header.starting_pos as u64
        };
        assert_eq!(root.size, 6 + total + 3 * (1 + 10 + 32));
    }

    #[test]
    fn unlink_type_checks() {
        let (mut dev, mut fs) = test_image(16 * 1024 * 1024);
        create(&mut dev, &mut fs, b"/f", &file_template()).unwrap();
        create(&mut dev, &mut fs, b"/d", &dir_template()).unwrap();
        assert!(matches!(
            unlink(&mut dev, &mut fs, b"/d"),
            Err(Error::IsDirectory)
        ));
        assert!(matches!(
            rmdir(&mut dev, &mut fs, b"/f"),
            Err(Error::NotADirectory)
        ));
        rmdir(&mut dev, &mut fs, b"/d").unwrap();
        unlink(&mut dev, &mut fs, b"/f").unwrap();
        assert!(matches!(
            getattr(&mut dev, &fs, b"/f"),
            Err(Error::NoEntry)
        ));
        assert_eq!(fs.main.inode_count, 1);
    }

    #[test]
    fn unlink_releases_blocks() {
        let (mut dev, mut fs) = test_image(16 * 1024 * 1024);
        let num = create(&mut dev, &mut fs, b"/big", &file_template()).unwrap();
        let mut inode = Inode::read(&mut dev, &fs, num).unwrap();
        let data = vec![0xabu8; 1024 * 1024];
        write_file(&mut dev, &mut fs, num, &mut inode, &data, 0).unwrap();
        let used = inode.blocks as u64
            + indirect_block_count(fs.pointers_per_block(), inode.blocks as u64).total();
        assert_eq!(used, 256 + 1);
        let free_before = fs.main.free_data_block_count as u64;
        unlink(&mut dev, &mut fs, b"/big").unwrap();
        assert_eq!(fs.main.free_data_block_count as u64, free_before + used);
        // The inode slot is free again
        assert!(
            !device::get_bit(&mut dev, fs.inode_bitmap_pos, num as u64).unwrap()
        );
    }

    #[test]
    fn truncate_file() {
        let (mut dev, mut fs) = test_image(16 * 1024 * 1024);
        let num = create(&mut dev, &mut fs, b"/t", &file_template()).unwrap();
        let mut inode = Inode::read(&mut dev, &fs, num).unwrap();
        write_file(&mut dev, &mut fs, num, &mut inode, &[7u8; 10000], 0).unwrap();
        truncate(&mut dev, &mut fs, b"/t", 100).unwrap();
        let stat = getattr(&mut dev, &fs, b"/t").unwrap();
        assert_eq!(stat.size, 100);
        assert_eq!(stat.sectors, 8);
        assert!(matches!(
            truncate(&mut dev, &mut fs, b"/", 0),
            Err(Error::IsDirectory)
        ));
    }

    #[test]
    fn chmod_chown() {
        let (mut dev, mut fs) = test_image(16 * 1024 * 1024);
        create(&mut dev, &mut fs, b"/f", &file_template()).unwrap();
        chmod(&mut dev, &fs, b"/f", 0o600).unwrap();
        chown(&mut dev, &fs, b"/f", 1000, 1000).unwrap();
        let stat = getattr(&mut dev, &fs, b"/f").unwrap();
        // The type bit is preserved
        assert_eq!(stat.mode, 0o600 | MODE_TYPE_REGULAR);
        assert_eq!(stat.uid, 1000);
        assert_eq!(stat.gid, 1000);
    }

    #[test]
    fn rename_within_directory() {
        let (mut dev, mut fs) = test_image(16 * 1024 * 1024);
        let num = create(&mut dev, &mut fs, b"/old", &file_template()).unwrap();
        rename(&mut dev, &mut fs, b"/old", b"/new", 0).unwrap();
        assert!(matches!(getattr(&mut dev, &fs, b"/old"), Err(Error::NoEntry)));
        let stat = getattr(&mut dev, &fs, b"/new").unwrap();
        assert_eq!(stat.inode, num);
        assert_eq!(stat.nlinks, 1);
    }

    #[test]
    fn rename_across_directories() {
        let (mut dev, mut fs) = test_image(16 * 1024 * 1024);
        create(&mut dev, &mut fs, b"/sub", &dir_template()).unwrap();
        let num = create(&mut dev, &mut fs, b"/f", &file_template()).unwrap();
        let mut inode = Inode::read(&mut dev, &fs, num).unwrap();
        write_file(&mut dev, &mut fs, num, &mut inode, b"payload", 0).unwrap();
        rename(&mut dev, &mut fs, b"/f", b"/sub/g", 0).unwrap();
        let stat = getattr(&mut dev, &fs, b"/sub/g").unwrap();
        assert_eq!(stat.inode, num);
        assert_eq!(stat.size, 7);
        assert_eq!(sorted_names(&mut dev, &fs, b"/"), [b"sub".to_vec()]);
    }

    #[test]
    fn rename_replaces_destination() {
        let (mut dev, mut fs) = test_image(16 * 1024 * 1024);
        let a = create(&mut dev, &mut fs, b"/a", &file_template()).unwrap();
        let b = create(&mut dev, &mut fs, b"/b", &file_template()).unwrap();
        let inode_count = fs.main.inode_count;
        rename(&mut dev, &mut fs, b"/a", b"/b", 0).unwrap();
        let stat = getattr(&mut dev, &fs, b"/b").unwrap();
        assert_eq!(stat.inode, a);
        // The replaced file lost its last link and was destroyed
        assert_eq!(fs.main.inode_count, inode_count - 1);
        assert!(
            !device::get_bit(&mut dev, fs.inode_bitmap_pos, b as u64).unwrap()
        );
        assert_eq!(sorted_names(&mut dev, &fs, b"/"), [b"b".to_vec()]);
    }

    #[test]
    fn rename_noreplace() {
        let (mut dev, mut fs) = test_image(16 * 1024 * 1024);
        create(&mut dev, &mut fs, b"/a", &file_template()).unwrap();
        create(&mut dev, &mut fs, b"/b", &file_template()).unwrap();
        let res = rename(&mut dev, &mut fs, b"/a", b"/b", RENAME_NOREPLACE);
        assert!(matches!(res, Err(Error::Exists)));
        // Both files are untouched
        getattr(&mut dev, &fs, b"/a").unwrap();
        getattr(&mut dev, &fs, b"/b").unwrap();
    }

    #[test]
    fn rename_exchange() {
        let (mut dev, mut fs) = test_image(16 * 1024 * 1024);
        let x = create(&mut dev, &mut fs, b"/x", &file_template()).unwrap();
        let y = create(&mut dev, &mut fs, b"/y", &file_template()).unwrap();
        let root_before = Inode::read(&mut dev, &fs, ROOT_INODE).unwrap();
        rename(&mut dev, &mut fs, b"/x", b"/y", RENAME_EXCHANGE).unwrap();
        assert_eq!(getattr(&mut dev, &fs, b"/x").unwrap().inode, y);
        assert_eq!(getattr(&mut dev, &fs, b"/y").unwrap().inode, x);
        // The directory body was patched in place
        let root = Inode::read(&mut dev, &fs, ROOT_INODE).unwrap();
        assert_eq!(root.size, root_before.size);
        let header = dirent::read_header(&mut dev, &fs, &root).unwrap();
        assert_eq!(header.entry_count, 2);
    }

    #[test]
    fn rename_exchange_requires_destination() {
        let (mut dev, mut fs) = test_image(16 * 1024 * 1024);
        create(&mut dev, &mut fs, b"/x", &file_template()).unwrap();
        let res = rename(&mut dev, &mut fs, b"/x", b"/y", RENAME_EXCHANGE);
        assert!(matches!(res, Err(Error::NoEntry)));
    }

    #[test]
    fn nested_tree() {
        let (mut dev, mut fs) = test_image(16 * 1024 * 1024);
        mkdir(&mut dev, &mut fs, b"/a", 0, 0, 0o755, 1).unwrap();
        mkdir(&mut dev, &mut fs, b"/a/b", 0, 0, 0o755, 2).unwrap();
        let num = mknod(&mut dev, &mut fs, b"/a/b/c", 0, 0, 0o644, 3).unwrap();
        let stat = getattr(&mut dev, &fs, b"/a/b/c").unwrap();
        assert_eq!(stat.inode, num);
        assert_eq!(stat.mode, 0o644 | MODE_TYPE_REGULAR);
        assert_eq!(stat.ctime, 3);
        assert_eq!(sorted_names(&mut dev, &fs, b"/a/b"), [b"c".to_vec()]);
        assert_eq!(fs.main.inode_count, 4);
    }
}
