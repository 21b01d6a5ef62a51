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

//! `sfsutil` — format or inspect a SimpleFS disk image.
//!
//! This is not the interactive shell built on top of the library: each
//! invocation performs exactly one operation and exits. Usage:
//!
//! ```text
//! sfsutil format <path> <blocks>
//! sfsutil debug <path>
//! ```

use simplefs::disk::Disk;
use simplefs::fs;
use std::env;
use std::fmt;
use std::process::exit;

fn error<M: fmt::Display>(bin: &str, msg: M) -> ! {
    eprintln!("{bin}: error: {msg}");
    exit(1);
}

fn main() {
    env_logger::init();

    let mut args = env::args();
    let bin = args.next().unwrap_or_else(|| "sfsutil".to_owned());
    let command = args.next().unwrap_or_else(|| {
        error(&bin, "expected a command: `format` or `debug`");
    });

    match command.as_str() {
        "format" => {
            let path = args.next().unwrap_or_else(|| {
                error(&bin, "format: expected a disk path");
            });
            let blocks: usize = args
                .next()
                .unwrap_or_else(|| {
                    error(&bin, "format: expected a block count");
                })
                .parse()
                .unwrap_or_else(|e| {
                    error(&bin, format!("format: invalid block count: {e}"));
                });
            let mut disk = Disk::open(&path, blocks).unwrap_or_else(|e| {
                error(&bin, format!("{path}: {e}"));
            });
            fs::format(&mut disk).unwrap_or_else(|e| {
                error(&bin, format!("{path}: {e}"));
            });
        }
        "debug" => {
            let path = args.next().unwrap_or_else(|| {
                error(&bin, "debug: expected a disk path");
            });
            let mut disk = Disk::open_existing(&path).unwrap_or_else(|e| {
                error(&bin, format!("{path}: {e}"));
            });
            fs::debug(&mut disk).unwrap_or_else(|e| {
                error(&bin, format!("{path}: {e}"));
            });
        }
        other => error(&bin, format!("unknown command `{other}`")),
    }
}
