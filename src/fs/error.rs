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

//! Error kinds surfaced to the mount driver and the command line tools.
//!
//! Errors are returned, never retried inside the core. Operations that
//! allocate roll back what they obtained before returning an error, so the
//! image never holds a reachable pointer to an unallocated block.

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// An error occurring while operating on a filesystem image.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O failure on the backing image.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A path component does not exist.
    #[error("no such file or directory")]
    NoEntry,
    /// Attempted to traverse through a file that is not a directory.
    #[error("not a directory")]
    NotADirectory,
    /// The operation does not apply to a directory.
    #[error("is a directory")]
    IsDirectory,
    /// The destination already exists.
    #[error("file exists")]
    Exists,
    /// The inode bitmap is full.
    #[error("no free inode left")]
    OutOfInodes,
    /// The data block allocator could not satisfy a grow.
    #[error("no space left on image")]
    OutOfSpace,
    /// The file would exceed the addressing capacity of the block tree.
    #[error("file too large")]
    FileTooLarge,
    /// The name exceeds the maximum length.
    #[error("file name too long")]
    NameTooLong,
    /// An internal structural assertion does not hold on the image.
    #[error("corrupted filesystem image")]
    CorruptImage,
}

impl Error {
    /// Returns the errno the mount driver reports for this error.
    pub fn errno(&self) -> i32 {
        match self {
            Self::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            Self::NoEntry => libc::ENOENT,
            Self::NotADirectory => libc::ENOTDIR,
            Self::IsDirectory => libc::EISDIR,
            Self::Exists => libc::EEXIST,
            Self::OutOfInodes | Self::OutOfSpace => libc::ENOSPC,
            Self::FileTooLarge => libc::EFBIG,
            Self::NameTooLong => libc::ENAMETOOLONG,
            Self::CorruptImage => libc::EUCLEAN,
        }
    }
}
