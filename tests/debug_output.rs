//! `sfsutil debug`'s stdout is part of the observable contract (§6), and §8
//! names two end-to-end scenarios about its literal text: an empty disk
//! prints the SuperBlock stanza with no inode lines (scenario 1), and a file
//! big enough to activate the indirect block gets exactly one indirect data
//! block listed (scenario 5). This drives the real binary rather than the
//! library, since the format is a CLI-observable guarantee.

use assert_cmd::Command;
use simplefs::FileSystem;
use simplefs::block::{BLOCK_SIZE, POINTERS_PER_INODE};
use simplefs::disk::Disk;

#[test]
fn debug_on_empty_disk_prints_superblock_stanza_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disk.img");
    let path = path.to_str().unwrap();

    Command::cargo_bin("sfsutil")
        .unwrap()
        .args(["format", path, "10"])
        .assert()
        .success();

    let assert = Command::cargo_bin("sfsutil")
        .unwrap()
        .args(["debug", path])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();

    let expected = concat!(
        "SuperBlock:\n",
        "    magic number is valid\n",
        "    10 blocks\n",
        "    1 inode blocks\n",
        "    128 inodes\n",
    );
    assert_eq!(stdout, expected);
}

#[test]
fn debug_lists_one_indirect_data_block_once_activated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disk.img");

    {
        let mut fs = FileSystem::new(Disk::open(&path, 2000).unwrap());
        fs.format().unwrap();
        fs.mount().unwrap();
        let n = fs.create().unwrap();
        let len = (POINTERS_PER_INODE + 1) * BLOCK_SIZE;
        assert_eq!(fs.write(n, &vec![7u8; len], 0).unwrap(), len);
        fs.unmount().unwrap();
    }

    let assert = Command::cargo_bin("sfsutil")
        .unwrap()
        .args(["debug", path.to_str().unwrap()])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();

    // 2000 blocks => 200 inode blocks => data starts at block 201; the
    // fresh inode claims 201..=205 as direct blocks, 206 as its indirect
    // block, and 207 as that indirect block's lone pointer.
    let expected = concat!(
        "SuperBlock:\n",
        "    magic number is valid\n",
        "    2000 blocks\n",
        "    200 inode blocks\n",
        "    25600 inodes\n",
        "Inode 0:\n",
        "    size: 24576 bytes\n",
        "    direct blocks: 201 202 203 204 205\n",
        "    indirect block: 206\n",
        "    indirect data blocks: 207\n",
    );
    assert_eq!(stdout, expected);
}
