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

//! The mount state machine and the six file primitives (§4.D-§4.G).
//!
//! `Unmounted -> Mounted -> Unmounted` is the only state machine here: a
//! [`FileSystem`] owns its [`BlockDevice`] the whole time, but only carries a
//! [`Superblock`] copy and a live [`Bitmap`] while `mount`ed. `format` and
//! `mount` both fail loudly (rather than silently clobbering state) when
//! called out of turn.

use crate::bitmap::Bitmap;
use crate::block::{Block, INODES_PER_BLOCK, POINTERS_PER_INODE};
use crate::disk::BlockDevice;
use crate::error::{Error, Result};
use crate::inode::{BlockSlot, Inode};
use crate::superblock::Superblock;
use std::cmp::min;

/// Writes a fresh, empty SimpleFS image across the whole of `disk`: the
/// superblock (§3), a zeroed inode table, and zeroed data blocks (§4.G).
///
/// This is the free function the on-disk layout actually needs; use
/// [`FileSystem::format`] when going through a mount handle, which also
/// enforces that the disk isn't currently mounted.
pub fn format<D: BlockDevice>(disk: &mut D) -> Result<()> {
    let blocks = disk.block_count() as u32;
    let superblock = Superblock::new(blocks);

    let mut block = Block::zeroed();
    *block.as_superblock_mut() = superblock;
    disk.write(0, &block)?;

    let empty = Block::zeroed();
    for b in 1..=superblock.inode_blocks as usize {
        disk.write(b, &empty)?;
    }
    for b in superblock.data_start() as usize..blocks as usize {
        disk.write(b, &empty)?;
    }
    log::debug!(
        "formatted disk: {blocks} blocks, {} inode blocks, {} inodes",
        superblock.inode_blocks,
        superblock.inodes
    );
    Ok(())
}

/// Prints a disk's superblock and every valid inode to stdout, in the exact
/// layout of §6. Does not require a mount, and never fails on malformed
/// on-disk structures — it best-effort prints what it can (§7).
pub fn debug<D: BlockDevice>(disk: &mut D) -> Result<()> {
    let mut block = Block::zeroed();
    disk.read(0, &mut block)?;
    let superblock = *block.as_superblock();

    println!("SuperBlock:");
    println!(
        "    magic number is {}",
        if superblock.is_valid() {
            "valid"
        } else {
            "not valid"
        }
    );
    println!("    {} blocks", superblock.blocks);
    println!("    {} inode blocks", superblock.inode_blocks);
    println!("    {} inodes", superblock.inodes);

    for inode_block in 1..=superblock.inode_blocks as usize {
        if disk.read(inode_block, &mut block).is_err() {
            continue;
        }
        for (pos, inode) in block.as_inodes().iter().enumerate() {
            if !inode.is_valid() {
                continue;
            }
            let n = (inode_block - 1) * INODES_PER_BLOCK + pos;
            println!("Inode {n}:");
            println!("    size: {} bytes", inode.size);
            println!("    direct blocks:{}", space_separated(&inode.direct));
            if inode.indirect != 0 {
                println!("    indirect block: {}", inode.indirect);
                let mut indirect_block = Block::zeroed();
                let pointers = if disk.read(inode.indirect as usize, &mut indirect_block).is_ok()
                {
                    indirect_block.as_pointers().as_slice()
                } else {
                    &[][..]
                };
                println!("    indirect data blocks:{}", space_separated(pointers));
            }
        }
    }
    Ok(())
}

fn space_separated(pointers: &[u32]) -> String {
    pointers
        .iter()
        .filter(|&&p| p != 0)
        .map(|p| format!(" {p}"))
        .collect()
}

struct Mount {
    superblock: Superblock,
    bitmap: Bitmap,
}

/// A SimpleFS filesystem mounted on top of some [`BlockDevice`].
pub struct FileSystem<D> {
    disk: D,
    mount: Option<Mount>,
}

impl<D: BlockDevice> FileSystem<D> {
    /// Wraps a disk handle, unmounted.
    pub fn new(disk: D) -> Self {
        Self { disk, mount: None }
    }

    /// Gives back the underlying disk handle.
    pub fn into_disk(self) -> D {
        self.disk
    }

    /// Whether a filesystem is currently mounted.
    pub fn is_mounted(&self) -> bool {
        self.mount.is_some()
    }

    /// Formats the underlying disk. Fails with [`Error::AlreadyMounted`] if
    /// this handle is currently mounted (§4.G).
    pub fn format(&mut self) -> Result<()> {
        if self.mount.is_some() {
            return Err(Error::AlreadyMounted);
        }
        format(&mut self.disk)
    }

    /// Reads the superblock and rebuilds the free-block bitmap (§4.C,
    /// §4.G). Fails with [`Error::AlreadyMounted`] if already mounted, and
    /// [`Error::BadMagic`] if the magic number doesn't check out; no partial
    /// state is installed on failure.
    pub fn mount(&mut self) -> Result<()> {
        if self.mount.is_some() {
            return Err(Error::AlreadyMounted);
        }
        let mut block = Block::zeroed();
        self.disk.read(0, &mut block)?;
        let superblock = *block.as_superblock();
        if !superblock.is_valid() {
            return Err(Error::BadMagic);
        }
        let bitmap = Bitmap::build(&superblock, &mut self.disk)?;
        log::info!("mounted filesystem: {} free data blocks", bitmap.free_count());
        self.mount = Some(Mount { superblock, bitmap });
        Ok(())
    }

    /// Drops the in-memory bitmap and returns to the unmounted state. Fails
    /// with [`Error::NotMounted`] if not currently mounted.
    pub fn unmount(&mut self) -> Result<()> {
        if self.mount.take().is_none() {
            return Err(Error::NotMounted);
        }
        log::info!("unmounted filesystem");
        Ok(())
    }

    /// The number of currently-free data blocks, for tests and diagnostics.
    /// Fails if not mounted.
    pub fn free_blocks(&self) -> Result<usize> {
        Ok(self.mount.as_ref().ok_or(Error::NotMounted)?.bitmap.free_count())
    }

    fn state(&self) -> Result<&Mount> {
        self.mount.as_ref().ok_or(Error::NotMounted)
    }

    /// Loads inode `n`: bounds-checks it, reads its containing block, and
    /// returns the block index, the block buffer (so the caller can mutate
    /// and write it back), and a copy of the inode record (§4.D).
    fn load_inode(&mut self, n: u32) -> Result<(usize, Block, Inode)> {
        let superblock = self.state()?.superblock;
        if n >= superblock.inodes {
            return Err(Error::InvalidInode);
        }
        let inode_block = 1 + (n as usize) / INODES_PER_BLOCK;
        let pos = (n as usize) % INODES_PER_BLOCK;
        let mut block = Block::zeroed();
        self.disk.read(inode_block, &mut block)?;
        let inode = block.as_inodes()[pos];
        Ok((inode_block, block, inode))
    }

    /// Writes `block` back to `inode_block` (§4.D).
    fn save_inode(&mut self, inode_block: usize, block: &Block) -> Result<()> {
        self.disk.write(inode_block, block)?;
        Ok(())
    }

    /// Allocates an inode: the first `valid == 0` slot, scanning inode
    /// blocks in ascending order and positions within each block in
    /// ascending order (§4.E). This ordering is load-bearing, not
    /// incidental — callers predict exact inode numbers from it.
    pub fn create(&mut self) -> Result<u32> {
        let inode_blocks = self.state()?.superblock.inode_blocks as usize;
        let mut block = Block::zeroed();
        for b in 1..=inode_blocks {
            self.disk.read(b, &mut block)?;
            let inodes = block.as_inodes_mut();
            if let Some(pos) = inodes.iter().position(|i| !i.is_valid()) {
                inodes[pos] = Inode {
                    valid: 1,
                    ..Default::default()
                };
                self.save_inode(b, &block)?;
                let n = (b - 1) * INODES_PER_BLOCK + pos;
                log::debug!("created inode {n}");
                return Ok(n as u32);
            }
        }
        Err(Error::NoFreeInode)
    }

    /// Releases every block reachable from `inode` back to the bitmap
    /// (§4.E): its direct pointers, the pointers inside its indirect block,
    /// then the indirect block itself.
    fn free_inode_blocks(&mut self, inode: &Inode) -> Result<()> {
        let bitmap = &mut self.mount.as_mut().ok_or(Error::NotMounted)?.bitmap;
        for &ptr in inode.direct.iter().filter(|&&p| p != 0) {
            bitmap.release(ptr);
        }
        if inode.indirect != 0 {
            let mut indirect_block = Block::zeroed();
            self.disk.read(inode.indirect as usize, &mut indirect_block)?;
            let bitmap = &mut self.mount.as_mut().ok_or(Error::NotMounted)?.bitmap;
            for &ptr in indirect_block.as_pointers().iter().filter(|&&p| p != 0) {
                bitmap.release(ptr);
            }
            bitmap.release(inode.indirect);
        }
        Ok(())
    }

    /// Frees an inode's data and marks the slot free again (§4.F.6). Fails
    /// with [`Error::InvalidInode`] if it's not currently valid.
    pub fn remove(&mut self, inode_number: u32) -> Result<()> {
        let (inode_block, mut block, inode) = self.load_inode(inode_number)?;
        if !inode.is_valid() {
            return Err(Error::InvalidInode);
        }
        self.free_inode_blocks(&inode)?;
        let pos = inode_number as usize % INODES_PER_BLOCK;
        block.as_inodes_mut()[pos].clear();
        self.save_inode(inode_block, &block)?;
        log::debug!("removed inode {inode_number}");
        Ok(())
    }

    /// Returns an inode's file size in bytes (§4.F.4).
    pub fn stat(&mut self, inode_number: u32) -> Result<u32> {
        let (_, _, inode) = self.load_inode(inode_number)?;
        if !inode.is_valid() {
            return Err(Error::InvalidInode);
        }
        Ok(inode.size)
    }

    /// Resolves logical block `logical` of `inode` to a physical block
    /// number, reading the indirect block on demand and caching it in
    /// `indirect_cache` across calls within the same read.
    fn physical_block(
        &mut self,
        inode: &Inode,
        logical: usize,
        indirect_cache: &mut Option<Block>,
    ) -> Result<u32> {
        match Inode::resolve(logical) {
            Some(BlockSlot::Direct(idx)) => Ok(inode.direct[idx]),
            Some(BlockSlot::Indirect(idx)) => {
                if inode.indirect == 0 {
                    return Ok(0);
                }
                let block = match indirect_cache.take() {
                    Some(block) => block,
                    None => {
                        let mut block = Block::zeroed();
                        self.disk.read(inode.indirect as usize, &mut block)?;
                        block
                    }
                };
                let ptr = block.as_pointers()[idx];
                *indirect_cache = Some(block);
                Ok(ptr)
            }
            None => Ok(0),
        }
    }

    /// Reads up to `buf.len()` bytes of inode `inode_number`'s content
    /// starting at byte `offset`, returning how many bytes were delivered
    /// (§4.F.2). Returns `0` once `offset >= size`, never an error, per the
    /// spec's resolution of the read/size-vs-length ambiguity in the
    /// original source.
    pub fn read(&mut self, inode_number: u32, buf: &mut [u8], offset: u64) -> Result<usize> {
        let (_, _, inode) = self.load_inode(inode_number)?;
        if !inode.is_valid() {
            return Err(Error::InvalidInode);
        }
        let size = inode.size as u64;
        if offset >= size {
            return Ok(0);
        }
        let to_read = min(buf.len() as u64, size - offset) as usize;

        let mut delivered = 0usize;
        let mut logical = (offset / crate::block::BLOCK_SIZE as u64) as usize;
        let mut intra = (offset % crate::block::BLOCK_SIZE as u64) as usize;
        let mut indirect_cache = None;
        let mut data_block = Block::zeroed();
        while delivered < to_read {
            let physical = self.physical_block(&inode, logical, &mut indirect_cache)?;
            self.disk.read(physical as usize, &mut data_block)?;
            let chunk = min(crate::block::BLOCK_SIZE - intra, to_read - delivered);
            buf[delivered..delivered + chunk]
                .copy_from_slice(&data_block.as_bytes()[intra..intra + chunk]);
            delivered += chunk;
            logical += 1;
            intra = 0;
        }
        Ok(delivered)
    }

    /// Writes `buf` into inode `inode_number` starting at byte `offset`,
    /// allocating blocks lazily, and returns the number of bytes actually
    /// persisted (§4.F.3). Running out of free space is a short write, not
    /// an error: the achieved prefix is returned and `size` reflects it.
    pub fn write(&mut self, inode_number: u32, buf: &[u8], offset: u64) -> Result<usize> {
        let (inode_block, _, mut inode) = self.load_inode(inode_number)?;
        if !inode.is_valid() {
            return Err(Error::InvalidInode);
        }

        let mut delivered = 0usize;
        let mut logical = (offset / crate::block::BLOCK_SIZE as u64) as usize;
        let mut intra = (offset % crate::block::BLOCK_SIZE as u64) as usize;
        let mut indirect_block: Option<(u32, Block)> = None;

        'write: {
            while delivered < buf.len() {
                let Some(slot) = Inode::resolve(logical) else {
                    break 'write;
                };
                let physical = match slot {
                    BlockSlot::Direct(idx) => {
                        if inode.direct[idx] == 0 {
                            match self.claim_block() {
                                Ok(b) => inode.direct[idx] = b,
                                Err(Error::NoSpace) => break 'write,
                                Err(e) => return Err(e),
                            }
                        }
                        inode.direct[idx]
                    }
                    BlockSlot::Indirect(idx) => {
                        if inode.indirect == 0 {
                            match self.claim_block() {
                                Ok(b) => {
                                    self.disk.write(b as usize, &Block::zeroed())?;
                                    inode.indirect = b;
                                }
                                Err(Error::NoSpace) => break 'write,
                                Err(e) => return Err(e),
                            }
                        }
                        let mut block = match indirect_block.take() {
                            Some((addr, block)) if addr == inode.indirect => block,
                            _ => {
                                let mut block = Block::zeroed();
                                self.disk.read(inode.indirect as usize, &mut block)?;
                                block
                            }
                        };
                        if block.as_pointers()[idx] == 0 {
                            match self.claim_block() {
                                Ok(b) => block.as_pointers_mut()[idx] = b,
                                Err(Error::NoSpace) => {
                                    indirect_block = Some((inode.indirect, block));
                                    break 'write;
                                }
                                Err(e) => return Err(e),
                            }
                        }
                        let physical = block.as_pointers()[idx];
                        indirect_block = Some((inode.indirect, block));
                        physical
                    }
                };

                let chunk = min(crate::block::BLOCK_SIZE - intra, buf.len() - delivered);
                let whole_block = intra == 0 && chunk == crate::block::BLOCK_SIZE;
                let mut block = if whole_block {
                    Block::zeroed()
                } else {
                    let mut b = Block::zeroed();
                    self.disk.read(physical as usize, &mut b)?;
                    b
                };
                block.as_bytes_mut()[intra..intra + chunk]
                    .copy_from_slice(&buf[delivered..delivered + chunk]);
                self.disk.write(physical as usize, &block)?;

                delivered += chunk;
                logical += 1;
                intra = 0;
            }
        }

        if let Some((addr, block)) = &indirect_block {
            self.disk.write(*addr as usize, block)?;
        }
        inode.size = inode.size.max((offset + delivered as u64) as u32);
        let mut block = Block::zeroed();
        self.disk.read(inode_block, &mut block)?;
        let pos = inode_number as usize % INODES_PER_BLOCK;
        block.as_inodes_mut()[pos] = inode;
        self.save_inode(inode_block, &block)?;
        log::debug!("wrote {delivered} bytes to inode {inode_number} at offset {offset}");
        Ok(delivered)
    }

    fn claim_block(&mut self) -> Result<u32> {
        self.mount.as_mut().ok_or(Error::NotMounted)?.bitmap.claim()
    }
}

const _: () = assert!(POINTERS_PER_INODE == 5);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BLOCK_SIZE;
    use crate::disk::MemDisk;

    fn mounted(blocks: usize) -> FileSystem<MemDisk> {
        let mut fs = FileSystem::new(MemDisk::new(blocks));
        fs.format().unwrap();
        fs.mount().unwrap();
        fs
    }

    #[test]
    fn empty_format_reports_expected_superblock() {
        let mut disk = MemDisk::new(10);
        format(&mut disk).unwrap();
        let mut block = Block::zeroed();
        disk.read(0, &mut block).unwrap();
        let sb = block.as_superblock();
        assert_eq!(sb.blocks, 10);
        assert_eq!(sb.inode_blocks, 1);
        assert_eq!(sb.inodes, 128);
    }

    #[test]
    fn create_and_stat() {
        let mut fs = mounted(10);
        assert_eq!(fs.create().unwrap(), 0);
        assert_eq!(fs.stat(0).unwrap(), 0);
        assert_eq!(fs.create().unwrap(), 1);
    }

    #[test]
    fn stat_on_invalid_inode_fails() {
        let mut fs = mounted(10);
        assert!(matches!(fs.stat(0), Err(Error::InvalidInode)));
        assert!(matches!(fs.stat(99_999), Err(Error::InvalidInode)));
    }

    #[test]
    fn small_round_trip() {
        let mut fs = mounted(20);
        let n = fs.create().unwrap();
        let written = fs.write(n, b"hello", 0).unwrap();
        assert_eq!(written, 5);
        assert_eq!(fs.stat(n).unwrap(), 5);
        let mut buf = [0u8; 5];
        assert_eq!(fs.read(n, &mut buf, 0).unwrap(), 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn crossing_a_block_boundary() {
        let mut fs = mounted(40);
        let n = fs.create().unwrap();
        let len = BLOCK_SIZE + 100;
        let pattern: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();
        assert_eq!(fs.write(n, &pattern, 0).unwrap(), len);

        let mut out = vec![0u8; len];
        assert_eq!(fs.read(n, &mut out, 0).unwrap(), len);
        assert_eq!(out, pattern);

        let mut out = vec![0u8; 50];
        let off = (BLOCK_SIZE - 25) as u64;
        assert_eq!(fs.read(n, &mut out, off).unwrap(), 50);
        assert_eq!(out, pattern[off as usize..off as usize + 50]);
    }

    #[test]
    fn indirect_block_activates() {
        let mut fs = mounted(2000);
        let n = fs.create().unwrap();
        let len = (POINTERS_PER_INODE + 1) * BLOCK_SIZE;
        let data = vec![7u8; len];
        assert_eq!(fs.write(n, &data, 0).unwrap(), len);

        let (_, _, inode) = fs.load_inode(n).unwrap();
        assert_ne!(inode.indirect, 0);
        let mut indirect = Block::zeroed();
        fs.disk.read(inode.indirect as usize, &mut indirect).unwrap();
        assert_ne!(indirect.as_pointers()[0], 0);
    }

    #[test]
    fn remove_restores_free_block_count() {
        let mut fs = mounted(30);
        let before = fs.free_blocks().unwrap();
        let n = fs.create().unwrap();
        fs.write(n, &vec![1u8; 3 * BLOCK_SIZE], 0).unwrap();
        assert!(fs.free_blocks().unwrap() < before);
        fs.remove(n).unwrap();
        assert_eq!(fs.free_blocks().unwrap(), before);

        // The space must be reusable.
        let n2 = fs.create().unwrap();
        assert_eq!(fs.write(n2, &vec![2u8; 3 * BLOCK_SIZE], 0).unwrap(), 3 * BLOCK_SIZE);
    }

    #[test]
    fn write_exhaustion_is_a_short_write_not_an_error() {
        // 10 blocks: superblock + 1 inode block leaves 8 data blocks.
        let mut fs = mounted(10);
        let n = fs.create().unwrap();
        let requested = 20 * BLOCK_SIZE;
        let data = vec![9u8; requested];
        let written = fs.write(n, &data, 0).unwrap();
        assert!(written < requested);
        assert_eq!(fs.stat(n).unwrap() as usize, written);
        assert_eq!(fs.free_blocks().unwrap(), 0);
    }

    #[test]
    fn read_past_end_of_file_returns_zero() {
        let mut fs = mounted(10);
        let n = fs.create().unwrap();
        fs.write(n, b"hi", 0).unwrap();
        let mut buf = [0u8; 10];
        assert_eq!(fs.read(n, &mut buf, 2).unwrap(), 0);
        assert_eq!(fs.read(n, &mut buf, 1000).unwrap(), 0);
    }

    #[test]
    fn mount_state_machine_rejects_double_mount_and_format() {
        let mut fs = mounted(10);
        assert!(matches!(fs.mount(), Err(Error::AlreadyMounted)));
        assert!(matches!(fs.format(), Err(Error::AlreadyMounted)));
        fs.unmount().unwrap();
        assert!(matches!(fs.unmount(), Err(Error::NotMounted)));
        assert!(matches!(fs.create(), Err(Error::NotMounted)));
    }

    #[test]
    fn mount_rejects_bad_magic() {
        // Never formatted: block 0 is all zeroes, magic is 0.
        let mut fs = FileSystem::new(MemDisk::new(10));
        assert!(matches!(fs.mount(), Err(Error::BadMagic)));
        assert!(!fs.is_mounted());
    }

    #[test]
    fn mount_unmount_cycle_preserves_contents() {
        let mut fs = mounted(20);
        let n = fs.create().unwrap();
        fs.write(n, b"persisted", 0).unwrap();
        fs.unmount().unwrap();
        fs.mount().unwrap();
        let mut buf = [0u8; 9];
        assert_eq!(fs.read(n, &mut buf, 0).unwrap(), 9);
        assert_eq!(&buf, b"persisted");
    }

    #[test]
    fn format_is_idempotent() {
        let mut disk = MemDisk::new(10);
        format(&mut disk).unwrap();
        let mut first = Vec::new();
        for b in 0..10 {
            let mut block = Block::zeroed();
            disk.read(b, &mut block).unwrap();
            first.extend_from_slice(block.as_bytes());
        }
        format(&mut disk).unwrap();
        let mut second = Vec::new();
        for b in 0..10 {
            let mut block = Block::zeroed();
            disk.read(b, &mut block).unwrap();
            second.extend_from_slice(block.as_bytes());
        }
        assert_eq!(first, second);
    }
}
