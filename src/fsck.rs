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

//! The `fsck` tool verifies the structure of an mfs filesystem image.

use crate::error;
use fs::check;
use fs::superblock::FsInfo;
use std::env::ArgsOs;
use std::fs::File;
use std::path::PathBuf;
use std::process::exit;

/// Structure storing command line arguments.
#[derive(Default)]
struct Args {
    /// If true, print command line help.
    help: bool,
    /// The path to the device file holding the filesystem.
    device_path: Option<PathBuf>,
}

fn parse_args(args: ArgsOs) -> Args {
    let mut res: Args = Default::default();
    for arg in args {
        match arg.to_str() {
            Some("-h" | "--help") => res.help = true,
            _ => {
                res.device_path = Some(PathBuf::from(arg));
            }
        }
    }
    res
}

/// Prints command help.
fn print_help() {
    println!();
    println!("Usage:");
    println!(" fsck.mfs [options] device");
    println!();
    println!("Checks the filesystem on the given device. Problems are reported, not repaired.");
    println!();
    println!("Options:");
    println!(" -h, --help\tPrints help.");
}

pub fn main(args: ArgsOs) {
    let args = parse_args(args);
    if args.help {
        print_help();
        exit(0);
    }
    let device_path = args.device_path.unwrap_or_else(|| {
        error("fsck", "specify path to a device");
    });
    let mut file = File::open(&device_path).unwrap_or_else(|e| {
        error("fsck", format_args!("{}: {e}", device_path.display()));
    });
    let fsinfo = FsInfo::read(&mut file).unwrap_or_else(|e| {
        error("fsck", format_args!("{}: {e}", device_path.display()));
    });
    let problems = check::check_image(&mut file, &fsinfo).unwrap_or_else(|e| {
        error("fsck", format_args!("{}: {e}", device_path.display()));
    });
    if problems.is_empty() {
        println!("{}: clean", device_path.display());
    } else {
        for problem in &problems {
            eprintln!("{}: {problem}", device_path.display());
        }
        exit(1);
    }
}
