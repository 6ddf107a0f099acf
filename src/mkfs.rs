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

//! The `mkfs` tool allows to create a filesystem on a device.

use crate::disk;
use crate::error;
use crate::prompt::prompt;
use fs::ops;
use fs::superblock::FsInfo;
use fs::util::ByteSize;
use fs::util::get_timestamp;
use std::env::ArgsOs;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::exit;

/// Structure storing command line arguments.
#[derive(Default)]
struct Args {
    /// If true, print command line help.
    help: bool,
    /// The path to the device file on which the filesystem will be created.
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
    println!(" mkfs.mfs [options] device");
    println!();
    println!("Creates an mfs filesystem on the given device.");
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
        error("mkfs", "specify path to a device");
    });
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&device_path)
        .unwrap_or_else(|e| {
            error("mkfs", format_args!("{}: {e}", device_path.display()));
        });
    let size = disk::get_device_size(&file).unwrap_or_else(|e| {
        error("mkfs", format_args!("{}: {e}", device_path.display()));
    });
    // Warn before overwriting an existing filesystem
    if FsInfo::read(&mut file).is_ok() {
        println!(
            "{} already contains a filesystem",
            device_path.display()
        );
        let confirm = prompt("Proceed anyway? (y/N) ")
            .map(|s| s.to_lowercase() == "y")
            .unwrap_or(false);
        if !confirm {
            eprintln!("Abort.");
            exit(1);
        }
    }
    let now = get_timestamp().as_secs();
    let fsinfo = ops::format_image(&mut file, size, now).unwrap_or_else(|e| {
        error("mkfs", format_args!("failed to create filesystem: {e}"));
    });
    let mb = &fsinfo.main;
    println!(
        "Created a filesystem of {} ({} blocks of {} bytes)",
        ByteSize(size),
        mb.block_count,
        mb.block_size
    );
    println!(
        "{} data blocks, {} inode slots",
        mb.data_block_count, mb.inode_count_limit
    );
}
