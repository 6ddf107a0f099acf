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

//! Structural verification of a filesystem image.
//!
//! The checks mirror the invariants the write paths maintain: bitmap
//! counters match the bitmaps, every allocated block is reachable from
//! exactly one live inode, directory bodies are covered exactly by their
//! entries, and link counts match the directory entries. Problems are
//! reported, never repaired.

use crate::device;
use crate::dirent::NAME_MAX;
use crate::error::Result;
use crate::inode::DIRECT_BLOCK_COUNT;
use crate::inode::Inode;
use crate::inode::ROOT_INODE;
use crate::superblock::FsInfo;
use byteorder::ByteOrder;
use byteorder::LittleEndian;
use std::fs::File;

/// Reads `bits` bits of a bitmap starting at the offset `base`.
fn read_bitmap(dev: &mut File, base: u64, bits: u64) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; bits.div_ceil(8) as usize];
    device::read_at(dev, base, &mut buf)?;
    Ok(buf)
}

fn bit(bitmap: &[u8], index: u64) -> bool {
    bitmap[(index / 8) as usize] >> (index % 8) & 1 != 0
}

/// Collects every block reachable from the inode: the data blocks and the
/// indirect bookkeeping blocks, each listed once.
fn collect_blocks(dev: &mut File, fs: &FsInfo, inode: &Inode) -> Result<Vec<u32>> {
    let c = fs.pointers_per_block();
    let mut out = Vec::with_capacity(inode.blocks as usize);
    for i in 0..inode.blocks as u64 {
        out.push(inode.translate_block(dev, fs, i)?);
        if i < DIRECT_BLOCK_COUNT as u64 {
            continue;
        }
        // Account each indirect node at the first index it covers
        let j = i - DIRECT_BLOCK_COUNT as u64;
        if j < c {
            if j == 0 {
                out.push(inode.blockpos[DIRECT_BLOCK_COUNT]);
            }
            continue;
        }
        let j = j - c;
        if j < c * c {
            let d = inode.blockpos[DIRECT_BLOCK_COUNT + 1];
            if j % c == 0 {
                out.push(fs.read_block_u32(dev, d, j / c)?);
            }
            if j == 0 {
                out.push(d);
            }
            continue;
        }
        let j = j - c * c;
        let t = inode.blockpos[DIRECT_BLOCK_COUNT + 2];
        let d = fs.read_block_u32(dev, t, j / (c * c))?;
        if j % c == 0 {
            out.push(fs.read_block_u32(dev, d, j % (c * c) / c)?);
        }
        if j % (c * c) == 0 {
            out.push(d);
        }
        if j == 0 {
            out.push(t);
        }
    }
    Ok(out)
}

/// Checks a directory's body and accumulates the links its entries hold.
fn check_directory(
    dev: &mut File,
    fs: &FsInfo,
    inode_num: u32,
    inode: &Inode,
    inode_bitmap: &[u8],
    link_counts: &mut [u32],
    problems: &mut Vec<String>,
) -> Result<()> {
    if inode.size == 0 {
        return Ok(());
    }
    let mut body = vec![0u8; inode.size as usize];
    if inode.read_data(dev, fs, &mut body, 0)? != inode.size {
        problems.push(format!("directory {inode_num}: body shorter than its size"));
        return Ok(());
    }
    if body.len() < 6 {
        problems.push(format!("directory {inode_num}: truncated header"));
        return Ok(());
    }
    let entry_count = LittleEndian::read_u32(&body[0..4]);
    let starting_pos = LittleEndian::read_u16(&body[4..6]);
    let mut off = 6 + starting_pos as usize;
    for _ in 0..entry_count {
        if off + 8 > body.len() {
            problems.push(format!("directory {inode_num}: entry past the end of the body"));
            return Ok(());
        }
        let entry_inode = LittleEndian::read_u32(&body[off..off + 4]);
        let entry_len = LittleEndian::read_u16(&body[off + 4..off + 6]) as usize;
        let name_len = LittleEndian::read_u16(&body[off + 6..off + 8]) as usize;
        if entry_len < name_len + 10 || off + entry_len > body.len() {
            problems.push(format!("directory {inode_num}: invalid entry length at offset {off}"));
            return Ok(());
        }
        let trailing = LittleEndian::read_u16(&body[off + entry_len - 2..off + entry_len]);
        if trailing as usize != entry_len {
            problems.push(format!("directory {inode_num}: back-pointer mismatch at offset {off}"));
        }
        if name_len > NAME_MAX {
            problems.push(format!("directory {inode_num}: entry name too long at offset {off}"));
        }
        if entry_inode as u64 >= fs.main.inode_count_limit as u64 {
            problems.push(format!("directory {inode_num}: entry points at inode {entry_inode} out of range"));
        } else {
            if !bit(inode_bitmap, entry_inode as u64) {
                problems.push(format!("directory {inode_num}: entry points at free inode {entry_inode}"));
            }
            link_counts[entry_inode as usize] += 1;
        }
        off += entry_len;
    }
    if off as u64 != inode.size {
        problems.push(format!(
            "directory {inode_num}: entries cover {off} bytes of a {} byte body",
            inode.size
        ));
    }
    Ok(())
}

/// Verifies the structure of the filesystem image.
///
/// Returns a description of every problem found; an empty list means the
/// image is clean.
pub fn check_image(dev: &mut File, fs: &FsInfo) -> Result<Vec<String>> {
    let mut problems = Vec::new();
    let bs = fs.block_size();
    let limit = fs.main.inode_count_limit as u64;
    let data_blocks = fs.main.data_block_count as u64;
    let inode_bitmap = read_bitmap(dev, fs.inode_bitmap_pos, limit)?;
    let data_bitmap = read_bitmap(dev, fs.data_bitmap_pos, data_blocks)?;
    if !bit(&inode_bitmap, ROOT_INODE as u64) {
        problems.push("root inode is not allocated".into());
    }
    let mut referenced = vec![false; data_blocks as usize];
    let mut link_counts = vec![0u32; limit as usize];
    let mut stored_links = vec![0u16; limit as usize];
    let mut live = 0u32;
    for n in 0..limit {
        if !bit(&inode_bitmap, n) {
            continue;
        }
        live += 1;
        let inode = Inode::read(dev, fs, n as u32)?;
        stored_links[n as usize] = inode.nlinks;
        if inode.blocks as u64 != inode.size.div_ceil(bs) {
            problems.push(format!(
                "inode {n}: {} blocks for {} bytes",
                inode.blocks, inode.size
            ));
        }
        match collect_blocks(dev, fs, &inode) {
            Ok(blocks) => {
                for blk in blocks {
                    if blk as u64 >= data_blocks {
                        problems.push(format!("inode {n}: block {blk} out of range"));
                    } else if referenced[blk as usize] {
                        problems.push(format!("block {blk} is referenced twice"));
                    } else {
                        referenced[blk as usize] = true;
                        if !bit(&data_bitmap, blk as u64) {
                            problems.push(format!("inode {n}: block {blk} is free in the bitmap"));
                        }
                    }
                }
            }
            Err(_) => problems.push(format!("inode {n}: unreadable block tree")),
        }
        if inode.is_directory() {
            check_directory(dev, fs, n as u32, &inode, &inode_bitmap, &mut link_counts, &mut problems)?;
        }
    }
    if live != fs.main.inode_count {
        problems.push(format!(
            "{live} inodes allocated, main block says {}",
            fs.main.inode_count
        ));
    }
    let mut used = 0u64;
    for blk in 0..data_blocks {
        if bit(&data_bitmap, blk) {
            used += 1;
            if !referenced[blk as usize] {
                problems.push(format!("block {blk} is allocated but unreachable"));
            }
        }
    }
    if data_blocks - used != fs.main.free_data_block_count as u64 {
        problems.push(format!(
            "{} free data blocks, main block says {}",
            data_blocks - used,
            fs.main.free_data_block_count
        ));
    }
    // The root carries no entry of its own, its link count is left to the
    // driver
    for n in 1..limit as usize {
        if bit(&inode_bitmap, n as u64) && link_counts[n] != stored_links[n] as u32 {
            problems.push(format!(
                "inode {n}: {} links stored, {} entries found",
                stored_links[n], link_counts[n]
            ));
        }
    }
    Ok(problems)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ops;

    fn test_image() -> (File, FsInfo) {
        let size = 16 * 1024 * 1024;
        let mut dev = tempfile::tempfile().unwrap();
        dev.set_len(size).unwrap();
        let fs = ops::format_image(&mut dev, size, 0).unwrap();
        (dev, fs)
    }

    #[test]
    fn fresh_image_is_clean() {
        let (mut dev, fs) = test_image();
        assert!(check_image(&mut dev, &fs).unwrap().is_empty());
    }

    #[test]
    fn populated_image_is_clean() {
        let (mut dev, mut fs) = test_image();
        ops::mkdir(&mut dev, &mut fs, b"/d", 0, 0, 0o755, 0).unwrap();
        let num = ops::mknod(&mut dev, &mut fs, b"/d/f", 0, 0, 0o644, 0).unwrap();
        let mut inode = Inode::read(&mut dev, &fs, num).unwrap();
        let data = vec![0x55u8; 200 * 1024];
        ops::write_file(&mut dev, &mut fs, num, &mut inode, &data, 0).unwrap();
        ops::mknod(&mut dev, &mut fs, b"/g", 0, 0, 0o644, 0).unwrap();
        ops::unlink(&mut dev, &mut fs, b"/g").unwrap();
        assert!(check_image(&mut dev, &fs).unwrap().is_empty());
    }

    #[test]
    fn detects_leaked_block() {
        let (mut dev, mut fs) = test_image();
        // Mark a block used without referencing it anywhere
        crate::alloc::alloc_data_blocks(&mut dev, &mut fs, 1).unwrap();
        fs.write(&mut dev).unwrap();
        let problems = check_image(&mut dev, &fs).unwrap();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("unreachable"));
    }

    #[test]
    fn detects_stale_free_count() {
        let (mut dev, mut fs) = test_image();
        fs.main.free_data_block_count -= 1;
        fs.write(&mut dev).unwrap();
        assert!(!check_image(&mut dev, &fs).unwrap().is_empty());
    }

    #[test]
    fn detects_broken_back_pointer() {
        let (mut dev, mut fs) = test_image();
        let num = ops::mknod(&mut dev, &mut fs, b"/f", 0, 0, 0o644, 0).unwrap();
        let root = Inode::read(&mut dev, &fs, crate::inode::ROOT_INODE).unwrap();
        // Clobber the trailing length field of the sole entry
        let blk = root.translate_block(&mut dev, &fs, 0).unwrap();
        device::write_at(&mut dev, fs.block_pos(blk) + root.size - 2, &[0xff, 0xff]).unwrap();
        let problems = check_image(&mut dev, &fs).unwrap();
        assert!(problems.iter().any(|p| p.contains("back-pointer")));
        // The entry itself is still readable
        assert_eq!(ops::getattr(&mut dev, &fs, b"/f").unwrap().inode, num);
    }

    #[test]
    fn detects_bad_link_count() {
        let (mut dev, mut fs) = test_image();
        let num = ops::mknod(&mut dev, &mut fs, b"/f", 0, 0, 0o644, 0).unwrap();
        let mut inode = Inode::read(&mut dev, &fs, num).unwrap();
        inode.nlinks = 5;
        inode.write(&mut dev, &fs, num).unwrap();
        let problems = check_image(&mut dev, &fs).unwrap();
        assert!(problems.iter().any(|p| p.contains("links")));
    }
}
