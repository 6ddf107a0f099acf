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

//! Bitmap allocators for inode slots and data blocks.
//!
//! Both bitmaps are streamed one bitmap block at a time; write-back is
//! narrowed to the byte range that actually changed.

use crate::device;
use crate::error::Error;
use crate::error::Result;
use crate::superblock::FsInfo;
use std::fs::File;

/// Allocates up to `count` data blocks and returns their ids.
///
/// The result may hold fewer ids than requested when the bitmap is
/// exhausted; the caller is responsible for rolling back in that case.
/// `free_data_block_count` is decremented by the number of ids returned.
pub fn alloc_data_blocks(dev: &mut File, fs: &mut FsInfo, count: u64) -> Result<Vec<u32>> {
    let mut ids = Vec::with_capacity(count as usize);
    if count == 0 {
        return Ok(ids);
    }
    let bs = fs.block_size();
    let total_bits = fs.main.data_block_count as u64;
    let mut buf = vec![0u8; bs as usize];
    for page in 0..fs.data_bitmap_blocks as u64 {
        let page_pos = fs.data_bitmap_pos + page * bs;
        device::read_at(dev, page_pos, &mut buf)?;
        // Byte range of the page that has been modified
        let mut first_updated = None;
        let mut last_updated = 0usize;
        for (i, byte) in buf.iter_mut().enumerate() {
            if *byte == 0xff {
                continue;
            }
            let base = (page * bs + i as u64) * 8;
            if base >= total_bits {
                break;
            }
            for bit in 0..8 {
                let index = base + bit;
                if index >= total_bits || ids.len() as u64 == count {
                    break;
                }
                if *byte & (1 << bit) == 0 {
                    *byte |= 1 << bit;
                    ids.push(index as u32);
                    first_updated.get_or_insert(i);
                    last_updated = i;
                }
            }
            if ids.len() as u64 == count {
                break;
            }
        }
        if let Some(first) = first_updated {
            device::write_at(dev, page_pos + first as u64, &buf[first..=last_updated])?;
        }
        if ids.len() as u64 == count {
            break;
        }
    }
    fs.main.free_data_block_count -= ids.len() as u32;
    Ok(ids)
}

/// Releases the given data blocks.
///
/// Bitmap writes are coalesced per bitmap page. `free_data_block_count` is
/// incremented by the number of blocks released.
pub fn release_data_blocks(dev: &mut File, fs: &mut FsInfo, blocks: &[u32]) -> Result<()> {
    if blocks.is_empty() {
        return Ok(());
    }
    let bs = fs.block_size();
    let bits_per_page = bs * 8;
    let mut sorted = blocks.to_vec();
    sorted.sort_unstable();
    let mut i = 0;
    while i < sorted.len() {
        let page = sorted[i] as u64 / bits_per_page;
        let mut j = i;
        while j < sorted.len() && sorted[j] as u64 / bits_per_page == page {
            j += 1;
        }
        let first_byte = sorted[i] as u64 % bits_per_page / 8;
        let last_byte = sorted[j - 1] as u64 % bits_per_page / 8;
        let pos = fs.data_bitmap_pos + page * bs + first_byte;
        let mut buf = vec![0u8; (last_byte - first_byte + 1) as usize];
        device::read_at(dev, pos, &mut buf)?;
        for b in &sorted[i..j] {
            let byte = (*b as u64 % bits_per_page / 8 - first_byte) as usize;
            buf[byte] &= !(1 << (b % 8));
        }
        device::write_at(dev, pos, &buf)?;
        i = j;
    }
    fs.main.free_data_block_count += blocks.len() as u32;
    Ok(())
}

/// Allocates the first free inode slot and returns its number.
///
/// If the inode bitmap is full, the function returns [`Error::OutOfInodes`].
pub fn alloc_inode_slot(dev: &mut File, fs: &mut FsInfo) -> Result<u32> {
    let bs = fs.block_size();
    let total_bits = fs.main.inode_count_limit as u64;
    let mut buf = vec![0u8; bs as usize];
    for page in 0..fs.inode_bitmap_blocks as u64 {
        let page_pos = fs.inode_bitmap_pos + page * bs;
        device::read_at(dev, page_pos, &mut buf)?;
        for (i, byte) in buf.iter_mut().enumerate() {
            if *byte == 0xff {
                continue;
            }
            let base = (page * bs + i as u64) * 8;
            if base >= total_bits {
                return Err(Error::OutOfInodes);
            }
            let bit = byte.trailing_ones() as u64;
            let index = base + bit;
            if index >= total_bits {
                return Err(Error::OutOfInodes);
            }
            *byte |= 1 << bit;
            device::write_at(dev, page_pos + i as u64, &buf[i..=i])?;
            return Ok(index as u32);
        }
    }
    Err(Error::OutOfInodes)
}

/// Clears the bitmap bit of the inode slot `inode`.
pub fn release_inode_slot(dev: &mut File, fs: &FsInfo, inode: u32) -> Result<()> {
    device::set_bit(dev, fs.inode_bitmap_pos, inode as u64, false)
}
