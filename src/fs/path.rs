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

//! Resolution of absolute paths to inodes.

use crate::dirent;
use crate::error::Error;
use crate::error::Result;
use crate::inode::Inode;
use crate::inode::ROOT_INODE;
use crate::superblock::FsInfo;
use std::fs::File;

/// The result of a path resolution.
#[derive(Clone, Debug)]
pub struct Resolved {
    /// The resolved inode's number.
    pub inode_num: u32,
    /// The resolved inode.
    pub inode: Inode,
    /// The parent directory's number and inode. Absent for the root.
    pub parent: Option<(u32, Inode)>,
    /// Byte offset of the matched entry in the parent's body. Absent for the
    /// root.
    pub entry_off: Option<u64>,
}

/// Resolves the absolute path `path`, descending from the root directory.
///
/// Paths not starting with `/` are rejected with [`Error::NoEntry`]. Missing
/// components yield [`Error::NoEntry`]; traversing through a non-directory
/// yields [`Error::NotADirectory`].
pub fn resolve(dev: &mut File, fs: &FsInfo, path: &[u8]) -> Result<Resolved> {
    if path.first() != Some(&b'/') {
        return Err(Error::NoEntry);
    }
    let mut inode_num = ROOT_INODE;
    let mut inode = Inode::read(dev, fs, inode_num)?;
    let mut parent = None;
    let mut entry_off = None;
    for component in path.split(|b| *b == b'/').filter(|c| !c.is_empty()) {
        if !inode.is_directory() {
            return Err(Error::NotADirectory);
        }
        let (num, off) = dirent::lookup(dev, fs, &inode, component)?.ok_or(Error::NoEntry)?;
        parent = Some((inode_num, inode));
        entry_off = Some(off);
        inode_num = num;
        inode = Inode::read(dev, fs, num)?;
    }
    Ok(Resolved {
        inode_num,
        inode,
        parent,
        entry_off,
    })
}

/// Splits an absolute path into its parent directory and its final
/// component.
///
/// Trailing slashes are ignored. Fails with [`Error::NoEntry`] when the path
/// has no final component (that is, it designates the root).
pub fn split(path: &[u8]) -> Result<(&[u8], &[u8])> {
    if path.first() != Some(&b'/') {
        return Err(Error::NoEntry);
    }
    let end = path
        .iter()
        .rposition(|b| *b != b'/')
        .ok_or(Error::NoEntry)?
        + 1;
    let start = path[..end]
        .iter()
        .rposition(|b| *b == b'/')
        .map(|i| i + 1)
        .unwrap_or(0);
    let parent = if start <= 1 { &path[..1] } else { &path[..start - 1] };
    Ok((parent, &path[start..end]))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::inode::MODE_TYPE_DIRECTORY;
    use crate::inode::MODE_TYPE_REGULAR;
    use crate::ops;

    fn test_image() -> (File, FsInfo) {
        let size = 16 * 1024 * 1024;
        let mut dev = tempfile::tempfile().unwrap();
        dev.set_len(size).unwrap();
        let fs = ops::format_image(&mut dev, size, 0).unwrap();
        (dev, fs)
    }

    #[test]
    fn split_paths() {
        assert_eq!(split(b"/a").unwrap(), (&b"/"[..], &b"a"[..]));
        assert_eq!(split(b"/a/b").unwrap(), (&b"/a"[..], &b"b"[..]));
        assert_eq!(split(b"/a/b/").unwrap(), (&b"/a"[..], &b"b"[..]));
        assert_eq!(split(b"/a/b/c").unwrap(), (&b"/a/b"[..], &b"c"[..]));
        assert!(split(b"/").is_err());
        assert!(split(b"a/b").is_err());
    }

    #[test]
    fn resolve_root() {
        let (mut dev, fs) = test_image();
        let r = resolve(&mut dev, &fs, b"/").unwrap();
        assert_eq!(r.inode_num, ROOT_INODE);
        assert!(r.inode.is_directory());
        assert!(r.parent.is_none());
        assert!(r.entry_off.is_none());
    }

    #[test]
    fn resolve_nested() {
        let (mut dev, mut fs) = test_image();
        let dir = ops::create(
            &mut dev,
            &mut fs,
            b"/sub",
            &Inode::new(0, 0, 0o755 | MODE_TYPE_DIRECTORY, 0),
        )
        .unwrap();
        let file = ops::create(
            &mut dev,
            &mut fs,
            b"/sub/file",
            &Inode::new(0, 0, 0o644 | MODE_TYPE_REGULAR, 0),
        )
        .unwrap();
        let r = resolve(&mut dev, &fs, b"/sub/file").unwrap();
        assert_eq!(r.inode_num, file);
        let (parent_num, parent) = r.parent.unwrap();
        assert_eq!(parent_num, dir);
        assert!(parent.is_directory());
        assert!(r.entry_off.is_some());
    }

    #[test]
    fn resolve_missing() {
        let (mut dev, fs) = test_image();
        assert!(matches!(
            resolve(&mut dev, &fs, b"/nope"),
            Err(Error::NoEntry)
        ));
        assert!(matches!(resolve(&mut dev, &fs, b"relative"), Err(Error::NoEntry)));
    }

    #[test]
    fn resolve_through_file() {
        let (mut dev, mut fs) = test_image();
        ops::create(
            &mut dev,
            &mut fs,
            b"/f",
            &Inode::new(0, 0, 0o644 | MODE_TYPE_REGULAR, 0),
        )
        .unwrap();
        assert!(matches!(
            resolve(&mut dev, &fs, b"/f/x"),
            Err(Error::NotADirectory)
        ));
    }
}
