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

//! Directory entries are stored in the directory's own data stream.
//!
//! The stream starts with a header: the entry count (`u32`) and
//! `starting_pos` (`u16`), the length of the dead space between the header
//! and the first entry. Entries follow, back to back:
//!
//! `inode_num: u32`, `entry_len: u16`, `name_len: u16`, the name, padding,
//! and `entry_len` again in the last two bytes of the entry.
//!
//! The trailing copy of `entry_len` acts as a back-pointer: removal can find
//! the previous entry without rescanning the directory. Removal never
//! rewrites more than two entries; dead space is absorbed into a
//! neighbour's padding, tracked via `starting_pos`, or reclaimed by moving
//! the last entry into the hole.

use crate::error::Error;
use crate::error::Result;
use crate::inode::Inode;
use crate::superblock::FsInfo;
use byteorder::ByteOrder;
use byteorder::LittleEndian;
use std::fs::File;

/// Maximum length of an entry name in bytes.
pub const NAME_MAX: usize = 512;
/// Size of the directory header in bytes.
pub const HEADER_SIZE: u64 = 6;
/// Bytes of an entry not occupied by the name or the padding.
const ENTRY_OVERHEAD: u64 = 10;
/// Padding granted to freshly written entries.
const NEW_ENTRY_PADDING: u64 = 32;

/// The header of a directory body.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DirHeader {
    /// The number of entries.
    pub entry_count: u32,
    /// Length of the dead space between the header and the first entry.
    pub starting_pos: u16,
}

/// A directory entry as returned to the mount driver.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DirEntry {
    /// The inode the entry points at.
    pub inode_num: u32,
    /// The entry's name.
    pub name: Vec<u8>,
}

/// The fixed-size head of an on-disk entry.
#[derive(Clone, Copy, Debug)]
struct EntryHead {
    inode_num: u32,
    entry_len: u16,
    name_len: u16,
}

/// Reads exactly `buf.len()` bytes of the directory's body at `off`.
fn read_exact_at(dev: &mut File, fs: &FsInfo, dir: &Inode, off: u64, buf: &mut [u8]) -> Result<()> {
    if dir.read_data(dev, fs, buf, off)? != buf.len() as u64 {
        return Err(Error::CorruptImage);
    }
    Ok(())
}

fn read_u16_at(dev: &mut File, fs: &FsInfo, dir: &Inode, off: u64) -> Result<u16> {
    let mut buf = [0u8; 2];
    read_exact_at(dev, fs, dir, off, &mut buf)?;
    Ok(LittleEndian::read_u16(&buf))
}

fn write_u16_at(
    dev: &mut File,
    fs: &mut FsInfo,
    dir: &mut Inode,
    off: u64,
    value: u16,
) -> Result<()> {
    let mut buf = [0u8; 2];
    LittleEndian::write_u16(&mut buf, value);
    dir.write_data(dev, fs, &buf, off)?;
    Ok(())
}

/// Reads and validates the entry head at `off`.
fn read_entry_head(dev: &mut File, fs: &FsInfo, dir: &Inode, off: u64) -> Result<EntryHead> {
    let mut buf = [0u8; 8];
    read_exact_at(dev, fs, dir, off, &mut buf)?;
    let head = EntryHead {
        inode_num: LittleEndian::read_u32(&buf[0..4]),
        entry_len: LittleEndian::read_u16(&buf[4..6]),
        name_len: LittleEndian::read_u16(&buf[6..8]),
    };
    if (head.entry_len as u64) < head.name_len as u64 + ENTRY_OVERHEAD
        || off + head.entry_len as u64 > dir.size
    {
        return Err(Error::CorruptImage);
    }
    Ok(head)
}

/// Reads the directory header.
///
/// An empty directory yields the default header.
pub fn read_header(dev: &mut File, fs: &FsInfo, dir: &Inode) -> Result<DirHeader> {
    if dir.size == 0 {
        return Ok(DirHeader::default());
    }
    let mut buf = [0u8; HEADER_SIZE as usize];
    read_exact_at(dev, fs, dir, 0, &mut buf)?;
    let header = DirHeader {
        entry_count: LittleEndian::read_u32(&buf[0..4]),
        starting_pos: LittleEndian::read_u16(&buf[4..6]),
    };
    if HEADER_SIZE + header.starting_pos as u64 > dir.size {
        return Err(Error::CorruptImage);
    }
    Ok(header)
}

fn write_header(dev: &mut File, fs: &mut FsInfo, dir: &mut Inode, header: DirHeader) -> Result<()> {
    let mut buf = [0u8; HEADER_SIZE as usize];
    LittleEndian::write_u32(&mut buf[0..4], header.entry_count);
    LittleEndian::write_u16(&mut buf[4..6], header.starting_pos);
    dir.write_data(dev, fs, &buf, 0)?;
    Ok(())
}

/// An in-order scan over a directory's entries.
struct Scanner {
    off: u64,
    remaining: u32,
}

impl Scanner {
    fn new(header: &DirHeader) -> Self {
        Self {
            off: HEADER_SIZE + header.starting_pos as u64,
            remaining: header.entry_count,
        }
    }

    /// Returns the offset and head of the next entry.
    fn next(&mut self, dev: &mut File, fs: &FsInfo, dir: &Inode) -> Result<Option<(u64, EntryHead)>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        let pos = self.off;
        let head = read_entry_head(dev, fs, dir, pos)?;
        self.off += head.entry_len as u64;
        Ok(Some((pos, head)))
    }
}

/// Looks up the entry called `name` in the directory.
///
/// Returns the target inode number and the entry's byte offset.
pub fn lookup(
    dev: &mut File,
    fs: &FsInfo,
    dir: &Inode,
    name: &[u8],
) -> Result<Option<(u32, u64)>> {
    if dir.size == 0 {
        return Ok(None);
    }
    let header = read_header(dev, fs, dir)?;
    let mut scan = Scanner::new(&header);
    while let Some((pos, head)) = scan.next(dev, fs, dir)? {
        if head.name_len as usize != name.len() {
            continue;
        }
        let mut buf = vec![0u8; name.len()];
        read_exact_at(dev, fs, dir, pos + 8, &mut buf)?;
        if buf == name {
            return Ok(Some((head.inode_num, pos)));
        }
    }
    Ok(None)
}

/// Returns every entry of the directory, in storage order.
pub fn list(dev: &mut File, fs: &FsInfo, dir: &Inode) -> Result<Vec<DirEntry>> {
    if dir.size == 0 {
        return Ok(Vec::new());
    }
    let header = read_header(dev, fs, dir)?;
    let mut entries = Vec::with_capacity(header.entry_count as usize);
    let mut scan = Scanner::new(&header);
    while let Some((pos, head)) = scan.next(dev, fs, dir)? {
        let mut name = vec![0u8; head.name_len as usize];
        read_exact_at(dev, fs, dir, pos + 8, &mut name)?;
        entries.push(DirEntry {
            inode_num: head.inode_num,
            name,
        });
    }
    Ok(entries)
}

/// Overwrites the inode field of the entry at `off`.
///
/// Only the pointed-at inode changes; the entry keeps its name and lengths.
pub fn set_entry_inode(
    dev: &mut File,
    fs: &mut FsInfo,
    dir: &mut Inode,
    off: u64,
    inode_num: u32,
) -> Result<()> {
    if off + 4 > dir.size {
        return Err(Error::CorruptImage);
    }
    let mut buf = [0u8; 4];
    LittleEndian::write_u32(&mut buf, inode_num);
    dir.write_data(dev, fs, &buf, off)?;
    Ok(())
}

/// Inserts the entry `(child_num, name)` at the tail of the directory.
///
/// Both the directory inode and the child inode (with its link count
/// incremented) are written back.
pub fn insert(
    dev: &mut File,
    fs: &mut FsInfo,
    dir_num: u32,
    dir: &mut Inode,
    child_num: u32,
    child: &mut Inode,
    name: &[u8],
) -> Result<()> {
    if name.len() > NAME_MAX {
        return Err(Error::NameTooLong);
    }
    let header = read_header(dev, fs, dir)?;
    let entry_len = ENTRY_OVERHEAD + NEW_ENTRY_PADDING + name.len() as u64;
    let mut buf = vec![0u8; entry_len as usize];
    LittleEndian::write_u32(&mut buf[0..4], child_num);
    LittleEndian::write_u16(&mut buf[4..6], entry_len as u16);
    LittleEndian::write_u16(&mut buf[6..8], name.len() as u16);
    buf[8..8 + name.len()].copy_from_slice(name);
    LittleEndian::write_u16(&mut buf[entry_len as usize - 2..], entry_len as u16);
    let off = dir.size.max(HEADER_SIZE);
    dir.write_data(dev, fs, &buf, off)?;
    write_header(
        dev,
        fs,
        dir,
        DirHeader {
            entry_count: header.entry_count + 1,
            starting_pos: header.starting_pos,
        },
    )?;
    dir.write(dev, fs, dir_num)?;
    child.nlinks += 1;
    child.write(dev, fs, child_num)
}

/// Removes the entry pointing at `child_num` from the directory.
///
/// Returns whether an entry was found. The child's link count is
/// decremented; at zero its content and inode slot are released. Both
/// inodes are written back.
pub fn remove(
    dev: &mut File,
    fs: &mut FsInfo,
    dir_num: u32,
    dir: &mut Inode,
    child_num: u32,
    child: &mut Inode,
) -> Result<bool> {
    if dir.size == 0 {
        return Ok(false);
    }
    let header = read_header(dev, fs, dir)?;
    let mut scan = Scanner::new(&header);
    let mut found = None;
    while let Some((pos, head)) = scan.next(dev, fs, dir)? {
        if head.inode_num == child_num {
            found = Some((pos, head));
            break;
        }
    }
    let Some((pos, head)) = found else {
        return Ok(false);
    };
    let cur_len = head.entry_len as u64;
    let size = dir.size;
    let first_off = HEADER_SIZE + header.starting_pos as u64;
    if header.entry_count == 1 {
        // Sole entry: drop the whole body
        dir.resize(dev, fs, 0)?;
    } else if pos + cur_len == size {
        // Last entry: drop the tail
        dir.resize(dev, fs, pos)?;
        write_header(
            dev,
            fs,
            dir,
            DirHeader {
                entry_count: header.entry_count - 1,
                ..header
            },
        )?;
    } else if pos == first_off {
        let last_len = read_last_len(dev, fs, dir, size)?;
        let new_len = header.starting_pos as u64 + cur_len;
        if new_len >= last_len && new_len <= u16::MAX as u64 {
            // Move the last entry to the front, stretched over the dead
            // space and the removed entry
            let mut buf = vec![0u8; last_len as usize];
            read_exact_at(dev, fs, dir, size - last_len, &mut buf)?;
            LittleEndian::write_u16(&mut buf[4..6], new_len as u16);
            dir.write_data(dev, fs, &buf, HEADER_SIZE)?;
            write_u16_at(dev, fs, dir, HEADER_SIZE + new_len - 2, new_len as u16)?;
            dir.resize(dev, fs, size - last_len)?;
            write_header(
                dev,
                fs,
                dir,
                DirHeader {
                    entry_count: header.entry_count - 1,
                    starting_pos: 0,
                },
            )?;
        } else {
            // Cheap path: point past the dead space
            if new_len > u16::MAX as u64 {
                return Err(Error::CorruptImage);
            }
            write_header(
                dev,
                fs,
                dir,
                DirHeader {
                    entry_count: header.entry_count - 1,
                    starting_pos: new_len as u16,
                },
            )?;
        }
    } else {
        // Removal from the middle: the previous entry is found through the
        // back-pointer
        let prev_len = read_u16_at(dev, fs, dir, pos - 2)? as u64;
        let prev_start = pos
            .checked_sub(prev_len)
            .filter(|s| *s >= first_off)
            .ok_or(Error::CorruptImage)?;
        let prev_name_len = read_u16_at(dev, fs, dir, prev_start + 6)? as u64;
        if prev_len < prev_name_len + ENTRY_OVERHEAD {
            return Err(Error::CorruptImage);
        }
        let prev_padding = prev_len - prev_name_len - 8;
        let last_len = read_last_len(dev, fs, dir, size)?;
        if prev_padding + cur_len >= last_len + NEW_ENTRY_PADDING
            && prev_len + cur_len - last_len <= u16::MAX as u64
        {
            // Move the last entry into the hole; the previous entry's length
            // is adjusted to end exactly where the moved entry begins
            let new_prev_len = prev_len + cur_len - last_len;
            let target = pos + cur_len - last_len;
            let mut buf = vec![0u8; last_len as usize];
            read_exact_at(dev, fs, dir, size - last_len, &mut buf)?;
            dir.write_data(dev, fs, &buf, target)?;
            write_u16_at(dev, fs, dir, prev_start + 4, new_prev_len as u16)?;
            write_u16_at(dev, fs, dir, target - 2, new_prev_len as u16)?;
            dir.resize(dev, fs, size - last_len)?;
        } else {
            // Absorb the removed entry into the previous entry's padding
            let new_prev_len = prev_len + cur_len;
            if new_prev_len > u16::MAX as u64 {
                return Err(Error::CorruptImage);
            }
            write_u16_at(dev, fs, dir, prev_start + 4, new_prev_len as u16)?;
            write_u16_at(dev, fs, dir, pos + cur_len - 2, new_prev_len as u16)?;
        }
        write_header(
            dev,
            fs,
            dir,
            DirHeader {
                entry_count: header.entry_count - 1,
                ..header
            },
        )?;
    }
    // Drop the link
    child.nlinks = child.nlinks.saturating_sub(1);
    if child.nlinks == 0 {
        child.destroy(dev, fs, child_num)?;
    }
    child.write(dev, fs, child_num)?;
    dir.write(dev, fs, dir_num)?;
    Ok(true)
}

/// Reads and validates the length of the last entry from the directory's
/// trailing back-pointer.
fn read_last_len(dev: &mut File, fs: &FsInfo, dir: &Inode, size: u64) -> Result<u64> {
    let last_len = read_u16_at(dev, fs, dir, size - 2)? as u64;
    if last_len < ENTRY_OVERHEAD || HEADER_SIZE + last_len > size {
        return Err(Error::CorruptImage);
    }
    Ok(last_len)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::inode::MODE_TYPE_REGULAR;
    use crate::inode::ROOT_INODE;
    use crate::ops;

    fn test_image() -> (File, FsInfo, Inode) {
        let size = 16 * 1024 * 1024;
        let mut dev = tempfile::tempfile().unwrap();
        dev.set_len(size).unwrap();
        let fs = ops::format_image(&mut dev, size, 0).unwrap();
        let root = Inode::read(&mut dev, &fs, ROOT_INODE).unwrap();
        (dev, fs, root)
    }

    fn add_child(dev: &mut File, fs: &mut FsInfo, dir: &mut Inode, name: &[u8]) -> u32 {
        let template = Inode::new(0, 0, 0o644 | MODE_TYPE_REGULAR, 0);
        let num = ops::create_inode(dev, fs, &template).unwrap();
        let mut child = template;
        insert(dev, fs, ROOT_INODE, dir, num, &mut child, name).unwrap();
        num
    }

    /// Checks the directory's structural invariants: the entry lengths plus
    /// the header and dead space cover the body exactly, and every entry's
    /// back-pointer matches its length field.
    fn check_consistency(dev: &mut File, fs: &FsInfo, dir: &Inode) {
        if dir.size == 0 {
            return;
        }
        let header = read_header(dev, fs, dir).unwrap();
        let mut off = HEADER_SIZE + header.starting_pos as u64;
        for _ in 0..header.entry_count {
            let head = read_entry_head(dev, fs, dir, off).unwrap();
            let tail = read_u16_at(dev, fs, dir, off + head.entry_len as u64 - 2).unwrap();
            assert_eq!(tail, head.entry_len);
            off += head.entry_len as u64;
        }
        assert_eq!(off, dir.size);
    }

    fn names(dev: &mut File, fs: &FsInfo, dir: &Inode) -> Vec<Vec<u8>> {
        list(dev, fs, dir).unwrap().into_iter().map(|e| e.name).collect()
    }

    #[test]
    fn insert_lookup() {
        let (mut dev, mut fs, mut root) = test_image();
        let a = add_child(&mut dev, &mut fs, &mut root, b"a");
        let b = add_child(&mut dev, &mut fs, &mut root, b"b");
        check_consistency(&mut dev, &fs, &root);
        assert_eq!(lookup(&mut dev, &fs, &root, b"a").unwrap().unwrap().0, a);
        assert_eq!(lookup(&mut dev, &fs, &root, b"b").unwrap().unwrap().0, b);
        assert!(lookup(&mut dev, &fs, &root, b"c").unwrap().is_none());
        let header = read_header(&mut dev, &fs, &root).unwrap();
        assert_eq!(header.entry_count, 2);
        // name + overhead + padding, twice, plus the header
        assert_eq!(root.size, HEADER_SIZE + 2 * (1 + 10 + 32));
    }

    #[test]
    fn name_too_long() {
        let (mut dev, mut fs, mut root) = test_image();
        let mut child = Inode::new(0, 0, MODE_TYPE_REGULAR, 0);
        let name = vec![b'x'; NAME_MAX + 1];
        let res = insert(&mut dev, &mut fs, ROOT_INODE, &mut root, 1, &mut child, &name);
        assert!(matches!(res, Err(Error::NameTooLong)));
    }

    #[test]
    fn insert_remove_round_trip() {
        let (mut dev, mut fs, mut root) = test_image();
        add_child(&mut dev, &mut fs, &mut root, b"a");
        add_child(&mut dev, &mut fs, &mut root, b"b");
        let size = root.size;
        let count = read_header(&mut dev, &fs, &root).unwrap().entry_count;
        let d = add_child(&mut dev, &mut fs, &mut root, b"d");
        let mut child = Inode::read(&mut dev, &fs, d).unwrap();
        assert!(remove(&mut dev, &mut fs, ROOT_INODE, &mut root, d, &mut child).unwrap());
        assert_eq!(root.size, size);
        assert_eq!(read_header(&mut dev, &fs, &root).unwrap().entry_count, count);
        check_consistency(&mut dev, &fs, &root);
    }

    #[test]
    fn remove_missing() {
        let (mut dev, mut fs, mut root) = test_image();
        add_child(&mut dev, &mut fs, &mut root, b"a");
        let mut child = Inode::new(0, 0, MODE_TYPE_REGULAR, 0);
        assert!(!remove(&mut dev, &mut fs, ROOT_INODE, &mut root, 999, &mut child).unwrap());
    }

    #[test]
    fn remove_sole_entry() {
        let (mut dev, mut fs, mut root) = test_image();
        let a = add_child(&mut dev, &mut fs, &mut root, b"a");
        let mut child = Inode::read(&mut dev, &fs, a).unwrap();
        assert!(remove(&mut dev, &mut fs, ROOT_INODE, &mut root, a, &mut child).unwrap());
        assert_eq!(root.size, 0);
        assert_eq!(root.blocks, 0);
        // The child inode was destroyed with its last link
        assert_eq!(child.nlinks, 0);
    }

    #[test]
    fn remove_last_entry() {
        let (mut dev, mut fs, mut root) = test_image();
        add_child(&mut dev, &mut fs, &mut root, b"a");
        let b = add_child(&mut dev, &mut fs, &mut root, b"b");
        let size = root.size;
        let mut child = Inode::read(&mut dev, &fs, b).unwrap();
        assert!(remove(&mut dev, &mut fs, ROOT_INODE, &mut root, b, &mut child).unwrap());
        assert_eq!(root.size, size - (1 + 10 + 32));
        assert_eq!(names(&mut dev, &fs, &root), [b"a".to_vec()]);
        check_consistency(&mut dev, &fs, &root);
    }

    #[test]
    fn remove_middle_then_insert() {
        let (mut dev, mut fs, mut root) = test_image();
        add_child(&mut dev, &mut fs, &mut root, b"a");
        let b = add_child(&mut dev, &mut fs, &mut root, b"b");
        add_child(&mut dev, &mut fs, &mut root, b"c");
        let mut child = Inode::read(&mut dev, &fs, b).unwrap();
        assert!(remove(&mut dev, &mut fs, ROOT_INODE, &mut root, b, &mut child).unwrap());
        check_consistency(&mut dev, &fs, &root);
        let mut got = names(&mut dev, &fs, &root);
        got.sort();
        assert_eq!(got, [b"a".to_vec(), b"c".to_vec()]);
        add_child(&mut dev, &mut fs, &mut root, b"d");
        check_consistency(&mut dev, &fs, &root);
        let mut got = names(&mut dev, &fs, &root);
        got.sort();
        assert_eq!(got, [b"a".to_vec(), b"c".to_vec(), b"d".to_vec()]);
    }

    #[test]
    fn remove_middle_absorbs_into_prev() {
        let (mut dev, mut fs, mut root) = test_image();
        add_child(&mut dev, &mut fs, &mut root, b"a");
        let b = add_child(&mut dev, &mut fs, &mut root, b"b");
        // A long last entry prevents relocation into the hole
        let long = vec![b'z'; 100];
        add_child(&mut dev, &mut fs, &mut root, &long);
        let size = root.size;
        let mut child = Inode::read(&mut dev, &fs, b).unwrap();
        assert!(remove(&mut dev, &mut fs, ROOT_INODE, &mut root, b, &mut child).unwrap());
        // Nothing was truncated: the hole went into the first entry's padding
        assert_eq!(root.size, size);
        check_consistency(&mut dev, &fs, &root);
        let mut got = names(&mut dev, &fs, &root);
        got.sort();
        assert_eq!(got, [b"a".to_vec(), long]);
    }

    #[test]
    fn remove_middle_relocates_last() {
        let (mut dev, mut fs, mut root) = test_image();
        add_child(&mut dev, &mut fs, &mut root, b"a");
        let b = add_child(&mut dev, &mut fs, &mut root, b"b");
        add_child(&mut dev, &mut fs, &mut root, b"c");
        add_child(&mut dev, &mut fs, &mut root, b"d");
        let size = root.size;
        let mut child = Inode::read(&mut dev, &fs, b).unwrap();
        assert!(remove(&mut dev, &mut fs, ROOT_INODE, &mut root, b, &mut child).unwrap());
        // The last entry moved into the hole and the body shrank
        assert_eq!(root.size, size - (1 + 10 + 32));
        check_consistency(&mut dev, &fs, &root);
        let mut got = names(&mut dev, &fs, &root);
        got.sort();
        assert_eq!(got, [b"a".to_vec(), b"c".to_vec(), b"d".to_vec()]);
    }

    #[test]
    fn remove_first_advances_start() {
        let (mut dev, mut fs, mut root) = test_image();
        let a = add_child(&mut dev, &mut fs, &mut root, b"a");
        add_child(&mut dev, &mut fs, &mut root, b"b");
        // A long last entry cannot be stretched over the small hole
        let long = vec![b'z'; 100];
        add_child(&mut dev, &mut fs, &mut root, &long);
        let size = root.size;
        let mut child = Inode::read(&mut dev, &fs, a).unwrap();
        assert!(remove(&mut dev, &mut fs, ROOT_INODE, &mut root, a, &mut child).unwrap());
        assert_eq!(root.size, size);
        let header = read_header(&mut dev, &fs, &root).unwrap();
        assert_eq!(header.starting_pos as u64, 1 + 10 + 32);
        assert_eq!(header.entry_count, 2);
        check_consistency(&mut dev, &fs, &root);
        let mut got = names(&mut dev, &fs, &root);
        got.sort();
        assert_eq!(got, [b"b".to_vec(), long]);
    }

    #[test]
    fn remove_first_relocates_last() {
        let (mut dev, mut fs, mut root) = test_image();
        let a = add_child(&mut dev, &mut fs, &mut root, b"a");
        add_child(&mut dev, &mut fs, &mut root, b"b");
        add_child(&mut dev, &mut fs, &mut root, b"c");
        let size = root.size;
        let mut child = Inode::read(&mut dev, &fs, a).unwrap();
        assert!(remove(&mut dev, &mut fs, ROOT_INODE, &mut root, a, &mut child).unwrap());
        // "c" was copied to the front and the body shrank by its length
        assert_eq!(root.size, size - (1 + 10 + 32));
        let header = read_header(&mut dev, &fs, &root).unwrap();
        assert_eq!(header.starting_pos, 0);
        check_consistency(&mut dev, &fs, &root);
        let mut got = names(&mut dev, &fs, &root);
        got.sort();
        assert_eq!(got, [b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn start_resets_after_advance() {
        let (mut dev, mut fs, mut root) = test_image();
        let a = add_child(&mut dev, &mut fs, &mut root, b"a");
        let b = add_child(&mut dev, &mut fs, &mut root, b"b");
        // Long enough to force the first removal onto the cheap path, short
        // enough to be stretched over the combined dead space afterwards
        let long = vec![b'z'; 40];
        add_child(&mut dev, &mut fs, &mut root, &long);
        let mut child = Inode::read(&mut dev, &fs, a).unwrap();
        remove(&mut dev, &mut fs, ROOT_INODE, &mut root, a, &mut child).unwrap();
        // Removing the new first entry leaves enough dead space to stretch
        // the long entry over it
        let mut child = Inode::read(&mut dev, &fs, b).unwrap();
        remove(&mut dev, &mut fs, ROOT_INODE, &mut root, b, &mut child).unwrap();
        let header = read_header(&mut dev, &fs, &root).unwrap();
        assert_eq!(header.starting_pos, 0);
        assert_eq!(header.entry_count, 1);
        check_consistency(&mut dev, &fs, &root);
        assert_eq!(names(&mut dev, &fs, &root), [long]);
    }
}
