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

//! The error taxonomy of the filesystem core.
//!
//! The C original and the spec it was distilled from both report failure
//! through a single sentinel (`-1`/`false`); here each failure mode gets its
//! own variant so callers can `match` on it instead of re-deriving the cause
//! from a bare boolean.

use std::io;

/// A failure returned by a filesystem operation.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The given inode number is out of range, or the inode is not valid.
    #[error("invalid inode")]
    InvalidInode,
    /// The underlying block device refused a read or write.
    #[error("disk I/O error: {0}")]
    Io(#[from] io::Error),
    /// No free inode remains in the inode table.
    #[error("no free inode")]
    NoFreeInode,
    /// No free data block remains on the disk.
    #[error("no space left on device")]
    NoSpace,
    /// `format` was called on a disk that's currently mounted.
    #[error("disk is mounted")]
    AlreadyMounted,
    /// An operation that requires a mounted filesystem was called on an
    /// unmounted one.
    #[error("filesystem is not mounted")]
    NotMounted,
    /// The superblock's magic number didn't match [`crate::block::MAGIC_NUMBER`].
    #[error("bad magic number")]
    BadMagic,
    /// The disk handle's block count exceeds what the format can address.
    #[error("disk too large ({0} blocks)")]
    DiskTooLarge(usize),
}

/// Shorthand for a [`Result`] whose error is [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
