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

//! A single-user block filesystem over a fixed-size disk.
//!
//! A disk is a sequence of fixed-size [`block`] blocks: a [`superblock`]
//! describing the layout, an inode table, and data blocks addressed through
//! an [`inode`]'s direct and single-indirect pointers. Free space is tracked
//! by an in-memory [`bitmap`], rebuilt at mount time by scanning every valid
//! inode — nothing about free space is ever stored on disk.
//!
//! [`fs::FileSystem`] ties it together behind a mount state machine and the
//! six primitives: `create`, `remove`, `stat`, `read`, `write`, and the
//! free-standing [`fs::debug`] inspector.

pub mod bitmap;
pub mod block;
pub mod disk;
pub mod error;
pub mod fs;
pub mod inode;
pub mod superblock;

pub use disk::{BlockDevice, Disk, MemDisk};
pub use error::{Error, Result};
pub use fs::FileSystem;
