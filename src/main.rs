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

//! Main of the mfs filesystem tools, dispatching on the binary's name.

mod disk;
mod fsck;
mod fsinfo;
mod mkfs;
mod prompt;

use std::env;
use std::fmt;
use std::process::exit;

/// Prints an error to stderr, then exits with a failure status.
pub fn error(bin: &str, msg: impl fmt::Display) -> ! {
    eprintln!("{bin}: {msg}");
    exit(1);
}

fn main() {
    let mut args = env::args_os();
    let bin = args
        .next()
        .and_then(|s| s.into_string().ok())
        .unwrap_or_else(|| {
            error("mfs", "missing binary name");
        });
    // The tools may be invoked through a full path
    let bin = bin.rsplit('/').next().unwrap_or(&bin);
    match bin {
        "mkfs" | "mkfs.mfs" => mkfs::main(args),
        "fsck" | "fsck.mfs" => fsck::main(args),
        "fsinfo" | "fsinfo.mfs" => fsinfo::main(args),
        _ => error("mfs", "invalid binary name"),
    }
}
