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

//! mfs is a simple Unix-style filesystem stored inside a single backing image,
//! either a regular file or a block device.
//!
//! The image is divided into the following regions, in on-disk order:
//! - Main block: the filesystem's header
//! - Inode bitmap: one bit per inode slot
//! - Data block bitmap: one bit per data block
//! - Inode table: fixed-size inode records
//! - Data blocks
//!
//! A file's content is addressed through 12 direct block pointers, then one
//! singly, one doubly and one triply indirect block pointer, each indirect
//! block holding `block_size / 4` child block ids. With a block size of `n`,
//! the maximum file size is:
//! `(12 * n) + ((n/4) * n) + ((n/4)^2 * n) + ((n/4)^3 * n)`
//!
//! The crate is a pure library over the image handle: every operation takes
//! the open image and the cached geometry as parameters and keeps no state of
//! its own. The mount driver is responsible for caching decoded inodes,
//! sourcing timestamps and enforcing permissions.

pub mod alloc;
pub mod check;
pub mod device;
pub mod dirent;
pub mod error;
pub mod inode;
pub mod ops;
pub mod path;
pub mod superblock;
pub mod util;

pub use error::{Error, Result};
