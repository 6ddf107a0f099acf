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

//! An inode represents a file in the filesystem.
//!
//! The name of the file is not included in the inode but in the directory
//! entry associated with it.
//!
//! Access to an inode's data is divided into several parts, each overflowing
//! on the next when full:
//! - Direct block pointers: each inode has 12 of them
//! - Singly indirect block pointer: points to a block holding a list of more
//!   block ids
//! - Doubly indirect block pointer: points to a block of pointers to singly
//!   indirect blocks
//! - Triply indirect block pointer: one more level on top
//!
//! Files are densely allocated: every block below `blocks` exists, so the
//! tree never holds a zero id inside its addressed range.

use crate::alloc;
use crate::device;
use crate::error::Error;
use crate::error::Result;
use crate::superblock::FsInfo;
use crate::superblock::INODE_SIZE;
use byteorder::LittleEndian;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;
use std::cmp::min;
use std::fs::File;
use std::io::Cursor;

/// The number of direct block slots in an inode.
pub const DIRECT_BLOCK_COUNT: usize = 12;
/// Total number of block slots: direct, then one per indirection tier.
pub const BLOCK_SLOT_COUNT: usize = DIRECT_BLOCK_COUNT + 3;

/// Mask of the permission bits in an inode's mode.
pub const MODE_PERM_MASK: u16 = 0o777;
/// Mask of the file type bit in an inode's mode.
pub const MODE_TYPE_MASK: u16 = 1 << 9;
/// File type: directory.
pub const MODE_TYPE_DIRECTORY: u16 = 0 << 9;
/// File type: regular file.
pub const MODE_TYPE_REGULAR: u16 = 1 << 9;

/// The inode of the root directory.
pub const ROOT_INODE: u32 = 0;

/// The size of a sector in bytes.
const SECTOR_SIZE: u64 = 512;

/// Numbers of indirect bookkeeping blocks required to address a file.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct IndirectBlockCount {
    /// Singly indirect blocks, including those inside doubly indirect trees.
    pub singly: u64,
    /// Doubly indirect blocks, including those inside the triply indirect
    /// tree.
    pub doubly: u64,
    /// Triply indirect blocks.
    pub triply: u64,
}

impl IndirectBlockCount {
    /// The total number of indirect blocks.
    pub fn total(&self) -> u64 {
        self.singly + self.doubly + self.triply
    }
}

/// Computes the indirect block requirement of a file of `blocks` data blocks.
///
/// `c` is the number of `u32` entries held by one indirect block.
pub fn indirect_block_count(c: u64, blocks: u64) -> IndirectBlockCount {
    let mut cnt = IndirectBlockCount::default();
    if blocks > DIRECT_BLOCK_COUNT as u64 {
        // A singly indirect block for every `c` blocks
        cnt.singly = (blocks - DIRECT_BLOCK_COUNT as u64).div_ceil(c);
        if cnt.singly > 1 {
            // A doubly indirect block for every `c` singly indirect blocks
            cnt.doubly = (cnt.singly - 1).div_ceil(c);
            if cnt.doubly > 1 {
                // A triply indirect block for every `c` doubly indirect blocks
                cnt.triply = (cnt.doubly - 1).div_ceil(c);
            }
        }
    }
    cnt
}

/// The maximum number of data blocks a file can address.
fn max_blocks(c: u64) -> u64 {
    DIRECT_BLOCK_COUNT as u64 + c + c * c + c * c * c
}

/// Checks a block id read from the tree against the data region bounds.
fn check_block_id(fs: &FsInfo, blk: u32) -> Result<u32> {
    if blk >= fs.main.data_block_count {
        return Err(Error::CorruptImage);
    }
    Ok(blk)
}

/// A pool of preallocated block ids consumed while growing the tree.
struct BlockPool(std::vec::IntoIter<u32>);

impl BlockPool {
    fn take(&mut self) -> Result<u32> {
        // The pool is sized exactly by the indirect block arithmetic
        self.0.next().ok_or(Error::CorruptImage)
    }
}

/// An inode describes a single file or directory of the filesystem.
///
/// All fields are stored little-endian, in declaration order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Inode {
    /// Timestamp of creation.
    pub ctime: u64,
    /// Timestamp of the last modification of the content.
    pub mtime: u64,
    /// The size of the file in bytes.
    pub size: u64,
    /// Number of data blocks held, excluding indirect bookkeeping blocks.
    pub blocks: u32,
    /// Direct block ids, then the singly, doubly and triply indirect block
    /// ids.
    pub blockpos: [u32; BLOCK_SLOT_COUNT],
    /// User ID.
    pub uid: u32,
    /// Group ID.
    pub gid: u32,
    /// Permissions in the lower 9 bits, file type in bit 9.
    pub mode: u16,
    /// The number of directory entries pointing at this inode.
    pub nlinks: u16,
}

impl Inode {
    /// Creates a zero-sized inode from the caller's identity and mode.
    pub fn new(uid: u32, gid: u32, mode: u16, ts: u64) -> Self {
        Self {
            ctime: ts,
            mtime: ts,
            uid,
            gid,
            mode,
            ..Default::default()
        }
    }

    /// Tells whether the inode is a directory.
    pub fn is_directory(&self) -> bool {
        self.mode & MODE_TYPE_MASK == MODE_TYPE_DIRECTORY
    }

    /// Reads the inode record `inode_num` from the inode table.
    pub fn read(dev: &mut File, fs: &FsInfo, inode_num: u32) -> Result<Self> {
        if inode_num >= fs.main.inode_count_limit {
            return Err(Error::CorruptImage);
        }
        let mut buf = [0u8; INODE_SIZE as usize];
        device::read_at(dev, fs.inodes_pos + inode_num as u64 * INODE_SIZE, &mut buf)?;
        let mut cur = Cursor::new(&buf[..]);
        let mut inode = Self {
            ctime: cur.read_u64::<LittleEndian>()?,
            mtime: cur.read_u64::<LittleEndian>()?,
            size: cur.read_u64::<LittleEndian>()?,
            blocks: cur.read_u32::<LittleEndian>()?,
            ..Default::default()
        };
        for slot in &mut inode.blockpos {
            *slot = cur.read_u32::<LittleEndian>()?;
        }
        inode.uid = cur.read_u32::<LittleEndian>()?;
        inode.gid = cur.read_u32::<LittleEndian>()?;
        inode.mode = cur.read_u16::<LittleEndian>()?;
        inode.nlinks = cur.read_u16::<LittleEndian>()?;
        Ok(inode)
    }

    /// Writes the inode record `inode_num` to the inode table.
    pub fn write(&self, dev: &mut File, fs: &FsInfo, inode_num: u32) -> Result<()> {
        if inode_num >= fs.main.inode_count_limit {
            return Err(Error::CorruptImage);
        }
        let mut buf = [0u8; INODE_SIZE as usize];
        let mut cur = Cursor::new(&mut buf[..]);
        cur.write_u64::<LittleEndian>(self.ctime)?;
        cur.write_u64::<LittleEndian>(self.mtime)?;
        cur.write_u64::<LittleEndian>(self.size)?;
        cur.write_u32::<LittleEndian>(self.blocks)?;
        for slot in &self.blockpos {
            cur.write_u32::<LittleEndian>(*slot)?;
        }
        cur.write_u32::<LittleEndian>(self.uid)?;
        cur.write_u32::<LittleEndian>(self.gid)?;
        cur.write_u16::<LittleEndian>(self.mode)?;
        cur.write_u16::<LittleEndian>(self.nlinks)?;
        device::write_at(dev, fs.inodes_pos + inode_num as u64 * INODE_SIZE, &buf)
    }

    /// Translates the file block index `off` into a data block id.
    pub fn translate_block(&self, dev: &mut File, fs: &FsInfo, off: u64) -> Result<u32> {
        let c = fs.pointers_per_block();
        if off < DIRECT_BLOCK_COUNT as u64 {
            return check_block_id(fs, self.blockpos[off as usize]);
        }
        let mut off = off - DIRECT_BLOCK_COUNT as u64;
        if off < c {
            let s = check_block_id(fs, self.blockpos[DIRECT_BLOCK_COUNT])?;
            return check_block_id(fs, fs.read_block_u32(dev, s, off)?);
        }
        off -= c;
        if off < c * c {
            let d = check_block_id(fs, self.blockpos[DIRECT_BLOCK_COUNT + 1])?;
            let s = check_block_id(fs, fs.read_block_u32(dev, d, off / c)?)?;
            return check_block_id(fs, fs.read_block_u32(dev, s, off % c)?);
        }
        off -= c * c;
        if off < c * c * c {
            let t = check_block_id(fs, self.blockpos[DIRECT_BLOCK_COUNT + 2])?;
            let d = check_block_id(fs, fs.read_block_u32(dev, t, off / (c * c))?)?;
            let s = check_block_id(fs, fs.read_block_u32(dev, d, off % (c * c) / c)?)?;
            return check_block_id(fs, fs.read_block_u32(dev, s, off % c)?);
        }
        Err(Error::FileTooLarge)
    }

    /// Installs the next data block at the file block index `i`, consuming
    /// indirect blocks from `pool` when `i` crosses into a fresh indirect
    /// node.
    ///
    /// Indirect blocks are installed top tier first, then the data block at
    /// the leaf slot.
    fn install_block(&mut self, dev: &mut File, fs: &FsInfo, i: u64, pool: &mut BlockPool) -> Result<()> {
        let c = fs.pointers_per_block();
        if i < DIRECT_BLOCK_COUNT as u64 {
            self.blockpos[i as usize] = pool.take()?;
            return Ok(());
        }
        let j = i - DIRECT_BLOCK_COUNT as u64;
        if j < c {
            if j == 0 {
                self.blockpos[DIRECT_BLOCK_COUNT] = pool.take()?;
            }
            let s = self.blockpos[DIRECT_BLOCK_COUNT];
            return fs.write_block_u32(dev, s, j, pool.take()?);
        }
        let j = j - c;
        if j < c * c {
            if j == 0 {
                self.blockpos[DIRECT_BLOCK_COUNT + 1] = pool.take()?;
            }
            let d = self.blockpos[DIRECT_BLOCK_COUNT + 1];
            let s = if j % c == 0 {
                let s = pool.take()?;
                fs.write_block_u32(dev, d, j / c, s)?;
                s
            } else {
                fs.read_block_u32(dev, d, j / c)?
            };
            return fs.write_block_u32(dev, s, j % c, pool.take()?);
        }
        let j = j - c * c;
        if j == 0 {
            self.blockpos[DIRECT_BLOCK_COUNT + 2] = pool.take()?;
        }
        let t = self.blockpos[DIRECT_BLOCK_COUNT + 2];
        let d = if j % (c * c) == 0 {
            let d = pool.take()?;
            fs.write_block_u32(dev, t, j / (c * c), d)?;
            d
        } else {
            fs.read_block_u32(dev, t, j / (c * c))?
        };
        let s = if j % c == 0 {
            let s = pool.take()?;
            fs.write_block_u32(dev, d, j % (c * c) / c, s)?;
            s
        } else {
            fs.read_block_u32(dev, d, j % (c * c) / c)?
        };
        fs.write_block_u32(dev, s, j % c, pool.take()?)
    }

    /// Collects into `out` the data block at the file block index `i`, along
    /// with every indirect node whose first covered index is `i` and which
    /// therefore dies with it.
    ///
    /// Indirect block ids are read before anything is released; vacated
    /// inode slots are zeroed.
    fn collect_block(&mut self, dev: &mut File, fs: &FsInfo, i: u64, out: &mut Vec<u32>) -> Result<()> {
        out.push(self.translate_block(dev, fs, i)?);
        let c = fs.pointers_per_block();
        if i < DIRECT_BLOCK_COUNT as u64 {
            self.blockpos[i as usize] = 0;
            return Ok(());
        }
        let j = i - DIRECT_BLOCK_COUNT as u64;
        if j < c {
            if j == 0 {
                out.push(check_block_id(fs, self.blockpos[DIRECT_BLOCK_COUNT])?);
                self.blockpos[DIRECT_BLOCK_COUNT] = 0;
            }
            return Ok(());
        }
        let j = j - c;
        if j < c * c {
            let d = check_block_id(fs, self.blockpos[DIRECT_BLOCK_COUNT + 1])?;
            if j % c == 0 {
                out.push(check_block_id(fs, fs.read_block_u32(dev, d, j / c)?)?);
            }
            if j == 0 {
                out.push(d);
                self.blockpos[DIRECT_BLOCK_COUNT + 1] = 0;
            }
            return Ok(());
        }
        let j = j - c * c;
        let t = check_block_id(fs, self.blockpos[DIRECT_BLOCK_COUNT + 2])?;
        let d = check_block_id(fs, fs.read_block_u32(dev, t, j / (c * c))?)?;
        if j % c == 0 {
            out.push(check_block_id(fs, fs.read_block_u32(dev, d, j % (c * c) / c)?)?);
        }
        if j % (c * c) == 0 {
            out.push(d);
        }
        if j == 0 {
            out.push(t);
            self.blockpos[DIRECT_BLOCK_COUNT + 2] = 0;
        }
        Ok(())
    }

    /// Resizes the file to `new_size` bytes.
    ///
    /// Growth is all-or-nothing: on allocation shortfall, everything obtained
    /// is released and [`Error::OutOfSpace`] is returned, leaving the tree
    /// untouched. Freshly allocated blocks are not zeroed.
    ///
    /// The inode record is updated in memory only; the caller writes it back.
    pub fn resize(&mut self, dev: &mut File, fs: &mut FsInfo, new_size: u64) -> Result<()> {
        let bs = fs.block_size();
        let c = fs.pointers_per_block();
        let old_blocks = self.blocks as u64;
        let new_blocks = new_size.div_ceil(bs);
        if new_blocks > max_blocks(c) {
            return Err(Error::FileTooLarge);
        }
        if new_blocks > old_blocks {
            let old_indirect = indirect_block_count(c, old_blocks).total();
            let new_indirect = indirect_block_count(c, new_blocks).total();
            let need = new_blocks - old_blocks + new_indirect - old_indirect;
            let ids = alloc::alloc_data_blocks(dev, fs, need)?;
            if (ids.len() as u64) < need {
                log::debug!("grow rollback: {need} blocks needed, {} free", ids.len());
                alloc::release_data_blocks(dev, fs, &ids)?;
                return Err(Error::OutOfSpace);
            }
            let mut pool = BlockPool(ids.into_iter());
            for i in old_blocks..new_blocks {
                self.install_block(dev, fs, i, &mut pool)?;
            }
        } else if new_blocks < old_blocks {
            let mut released = Vec::with_capacity((old_blocks - new_blocks) as usize);
            for i in (new_blocks..old_blocks).rev() {
                self.collect_block(dev, fs, i, &mut released)?;
            }
            alloc::release_data_blocks(dev, fs, &released)?;
        }
        self.size = new_size;
        self.blocks = new_blocks as u32;
        Ok(())
    }

    /// Reads up to `buf.len()` bytes of content at the offset `pos`.
    ///
    /// Returns the number of bytes read; zero when `pos` is at or past the
    /// end of the file.
    pub fn read_data(&self, dev: &mut File, fs: &FsInfo, buf: &mut [u8], pos: u64) -> Result<u64> {
        if pos >= self.size {
            return Ok(0);
        }
        let len = min(buf.len() as u64, self.size - pos);
        let bs = fs.block_size();
        let mut cur = pos;
        while cur < pos + len {
            let chunk = min(pos + len - cur, bs - cur % bs);
            let blk = self.translate_block(dev, fs, cur / bs)?;
            let out = &mut buf[(cur - pos) as usize..(cur - pos + chunk) as usize];
            device::read_at(dev, fs.block_pos(blk) + cur % bs, out)?;
            cur += chunk;
        }
        Ok(len)
    }

    /// Writes `buf` at the offset `pos`, growing the file first when writing
    /// past its end.
    ///
    /// Returns the number of bytes written. The inode record is updated in
    /// memory only; the caller writes it back.
    pub fn write_data(&mut self, dev: &mut File, fs: &mut FsInfo, buf: &[u8], pos: u64) -> Result<u64> {
        if buf.is_empty() {
            return Ok(0);
        }
        let end = pos + buf.len() as u64;
        if end > self.size {
            self.resize(dev, fs, end)?;
        }
        let bs = fs.block_size();
        let mut cur = pos;
        while cur < end {
            let chunk = min(end - cur, bs - cur % bs);
            let blk = self.translate_block(dev, fs, cur / bs)?;
            let src = &buf[(cur - pos) as usize..(cur - pos + chunk) as usize];
            device::write_at(dev, fs.block_pos(blk) + cur % bs, src)?;
            cur += chunk;
        }
        Ok(buf.len() as u64)
    }

    /// Releases the file's content and its inode slot.
    ///
    /// Callable only once every link to the inode has been dropped.
    pub fn destroy(&mut self, dev: &mut File, fs: &mut FsInfo, inode_num: u32) -> Result<()> {
        self.resize(dev, fs, 0)?;
        alloc::release_inode_slot(dev, fs, inode_num)?;
        fs.main.inode_count = fs.main.inode_count.saturating_sub(1);
        Ok(())
    }

    /// The number of 512-byte sectors occupied by the file, indirect
    /// bookkeeping blocks included.
    pub fn sector_count(&self, fs: &FsInfo) -> u64 {
        let c = fs.pointers_per_block();
        let total = self.blocks as u64 + indirect_block_count(c, self.blocks as u64).total();
        total * (fs.block_size() / SECTOR_SIZE)
    }
}
