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

//! The main block is the filesystem's header, stored at the very beginning of
//! the image. The offsets of every other region are derived from it.

use crate::device;
use crate::error::Error;
use crate::error::Result;
use byteorder::LittleEndian;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;
use std::fs::File;
use std::io::Cursor;

/// Size in bytes reserved for the main block at the start of the image.
pub const MAIN_BLOCK_SIZE: u64 = 32;
/// Size in bytes reserved for each record of the inode table.
pub const INODE_SIZE: u64 = 128;
/// The block size chosen when creating a filesystem.
pub const DEFAULT_BLOCK_SIZE: u16 = 4096;

/// The filesystem's header.
///
/// All fields are stored little-endian, in declaration order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MainBlock {
    /// Maximum number of inodes the filesystem can hold.
    pub inode_count_limit: u32,
    /// Number of live inodes.
    pub inode_count: u32,
    /// Total number of blocks in the image.
    pub block_count: u32,
    /// Number of blocks in the data block region.
    pub data_block_count: u32,
    /// Number of unallocated data blocks.
    pub free_data_block_count: u32,
    /// The size of a block in bytes.
    pub block_size: u16,
}

impl MainBlock {
    /// Chooses filesystem parameters for an image of `size` bytes.
    pub fn new(size: u64) -> Self {
        let block_size = DEFAULT_BLOCK_SIZE;
        let bs = block_size as u64;
        let block_count = size / bs;
        // One inode slot per block of the image
        let inode_count_limit = block_count;
        let inode_bitmap_blocks = inode_count_limit.div_ceil(8 * bs);
        let inode_table_blocks = (inode_count_limit * INODE_SIZE).div_ceil(bs);
        let remaining = block_count.saturating_sub(2 + inode_bitmap_blocks + inode_table_blocks);
        // The 32/33 ratio reserves room for the data block bitmap
        let data_block_count = remaining * 32 / 33;
        Self {
            inode_count_limit: inode_count_limit as _,
            inode_count: 0,
            block_count: block_count as _,
            data_block_count: data_block_count as _,
            free_data_block_count: data_block_count as _,
            block_size,
        }
    }

    /// Deserializes the main block from `buf`.
    fn deserialize(buf: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(buf);
        Ok(Self {
            inode_count_limit: cur.read_u32::<LittleEndian>()?,
            inode_count: cur.read_u32::<LittleEndian>()?,
            block_count: cur.read_u32::<LittleEndian>()?,
            data_block_count: cur.read_u32::<LittleEndian>()?,
            free_data_block_count: cur.read_u32::<LittleEndian>()?,
            block_size: cur.read_u16::<LittleEndian>()?,
        })
    }

    /// Serializes the main block into `buf`.
    fn serialize(&self, buf: &mut [u8]) -> Result<()> {
        let mut cur = Cursor::new(buf);
        cur.write_u32::<LittleEndian>(self.inode_count_limit)?;
        cur.write_u32::<LittleEndian>(self.inode_count)?;
        cur.write_u32::<LittleEndian>(self.block_count)?;
        cur.write_u32::<LittleEndian>(self.data_block_count)?;
        cur.write_u32::<LittleEndian>(self.free_data_block_count)?;
        cur.write_u16::<LittleEndian>(self.block_size)?;
        Ok(())
    }

    /// Tells whether the header is plausible.
    fn is_valid(&self) -> bool {
        self.block_size >= 512
            && self.block_size.is_power_of_two()
            && self.data_block_count <= self.block_count
            && self.free_data_block_count <= self.data_block_count
            && self.inode_count <= self.inode_count_limit
            && self.inode_count_limit > 0
    }
}

/// Cached geometry of a filesystem image, derived from its main block.
#[derive(Clone, Debug)]
pub struct FsInfo {
    /// The filesystem's header.
    pub main: MainBlock,
    /// Number of blocks occupied by the inode bitmap.
    pub inode_bitmap_blocks: u32,
    /// Number of blocks occupied by the data block bitmap.
    pub data_bitmap_blocks: u32,
    /// Offset of the inode bitmap.
    pub inode_bitmap_pos: u64,
    /// Offset of the data block bitmap.
    pub data_bitmap_pos: u64,
    /// Offset of the inode table.
    pub inodes_pos: u64,
    /// Offset of the data block region.
    pub blocks_pos: u64,
}

impl FsInfo {
    /// Derives the geometry of the filesystem described by `main`.
    pub fn from_main_block(main: MainBlock) -> Self {
        let bs = main.block_size as u64;
        let inode_bitmap_blocks = (main.inode_count_limit as u64).div_ceil(8 * bs);
        let data_bitmap_blocks = (main.data_block_count as u64).div_ceil(8 * bs);
        let inode_bitmap_pos = MAIN_BLOCK_SIZE;
        let data_bitmap_pos = inode_bitmap_pos + inode_bitmap_blocks * bs;
        let inodes_pos = data_bitmap_pos + data_bitmap_blocks * bs;
        let blocks_pos = inodes_pos + main.inode_count_limit as u64 * INODE_SIZE;
        Self {
            main,
            inode_bitmap_blocks: inode_bitmap_blocks as _,
            data_bitmap_blocks: data_bitmap_blocks as _,
            inode_bitmap_pos,
            data_bitmap_pos,
            inodes_pos,
            blocks_pos,
        }
    }

    /// Chooses the geometry for a new filesystem on an image of `size` bytes.
    pub fn new(size: u64) -> Self {
        Self::from_main_block(MainBlock::new(size))
    }

    /// Reads the main block from the image and derives the geometry.
    pub fn read(dev: &mut File) -> Result<Self> {
        let mut buf = [0u8; MAIN_BLOCK_SIZE as usize];
        device::read_at(dev, 0, &mut buf)?;
        let main = MainBlock::deserialize(&buf)?;
        if !main.is_valid() {
            return Err(Error::CorruptImage);
        }
        let fs = Self::from_main_block(main);
        // The declared regions must fit in the declared block count
        let end = fs.block_pos(fs.main.data_block_count);
        if end > fs.main.block_count as u64 * fs.block_size() {
            return Err(Error::CorruptImage);
        }
        Ok(fs)
    }

    /// Writes the main block back to the image.
    pub fn write(&self, dev: &mut File) -> Result<()> {
        let mut buf = [0u8; MAIN_BLOCK_SIZE as usize];
        self.main.serialize(&mut buf)?;
        device::write_at(dev, 0, &buf)
    }

    /// The size of a block in bytes.
    pub fn block_size(&self) -> u64 {
        self.main.block_size as u64
    }

    /// The number of `u32` entries held by one indirect block.
    pub fn pointers_per_block(&self) -> u64 {
        self.block_size() / 4
    }

    /// Returns the absolute offset of the data block `blk`.
    pub fn block_pos(&self, blk: u32) -> u64 {
        self.blocks_pos + blk as u64 * self.block_size()
    }

    /// Reads the `slot`-th `u32` of the data block `blk`.
    pub fn read_block_u32(&self, dev: &mut File, blk: u32, slot: u64) -> Result<u32> {
        device::read_block_u32(dev, self.blocks_pos, self.block_size(), blk, slot)
    }

    /// Writes `value` as the `slot`-th `u32` of the data block `blk`.
    pub fn write_block_u32(&self, dev: &mut File, blk: u32, slot: u64, value: u32) -> Result<()> {
        device::write_block_u32(dev, self.blocks_pos, self.block_size(), blk, slot, value)
    }
}
