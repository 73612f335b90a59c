use journalfs::{FileSystem, FsError, Geometry, InodeKind, MemDisk, WriteMode};

fn small_geometry() -> Geometry {
    Geometry {
        block_size: 4096,
        total_blocks: 16,
        total_inodes: 16,
        journal_blocks: 8,
    }
}

fn fresh_fs() -> (MemDisk, FileSystem<MemDisk>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let geometry = small_geometry();
    let disk = MemDisk::new(geometry.device_blocks(), geometry.block_size);
    let fs = FileSystem::format(disk.clone(), geometry).unwrap();
    (disk, fs)
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn round_trip_various_sizes() {
    let (_disk, mut fs) = fresh_fs();
    fs.create_file("/f").unwrap();

    for len in [0usize, 1, 100, 4096, 4097, 9000] {
        let data = pattern(len);
        assert_eq!(fs.write("/f", &data, WriteMode::Overwrite).unwrap(), len);
        assert_eq!(fs.read("/f").unwrap(), data);
        fs.check_consistency().unwrap();
    }
}

#[test]
fn worked_scenario_sixteen_blocks() {
    let (_disk, mut fs) = fresh_fs();
    assert_eq!(fs.free_blocks(), 16);

    fs.mkdir("/docs").unwrap();
    let ino = fs.create_file("/docs/a.txt").unwrap();
    let free_before_write = fs.free_blocks();

    let data = pattern(9000);
    fs.write("/docs/a.txt", &data, WriteMode::Overwrite).unwrap();

    // 9000 bytes round up to 3 blocks of 4096
    let inode = fs.inode_table.get(ino).unwrap();
    assert_eq!(inode.size, 9000);
    assert_eq!(inode.blocks.len(), 3);
    assert_eq!(fs.free_blocks(), free_before_write - 3);
    assert_eq!(fs.read("/docs/a.txt").unwrap(), data);

    // the directory is not empty yet
    assert!(matches!(fs.delete("/docs"), Err(FsError::NotEmpty(_))));

    fs.delete("/docs/a.txt").unwrap();
    assert_eq!(fs.free_blocks(), free_before_write + 1); // file blocks and the entry payload gone

    fs.delete("/docs").unwrap();
    assert_eq!(fs.free_blocks(), 16); // every data block reclaimed
    fs.check_consistency().unwrap();
}

#[test]
fn allocation_exclusivity_invariant_holds() {
    let (_disk, mut fs) = fresh_fs();
    fs.mkdir("/a").unwrap();
    fs.create_file("/a/x").unwrap();
    fs.create_file("/y").unwrap();
    fs.write("/a/x", &pattern(5000), WriteMode::Overwrite).unwrap();
    fs.write("/y", &pattern(4096), WriteMode::Overwrite).unwrap();
    fs.delete("/y").unwrap();
    fs.write("/a/x", &pattern(200), WriteMode::Overwrite).unwrap();

    // used bits == union of live block lists, no duplicates
    fs.check_consistency().unwrap();
    let mut referenced: Vec<u64> = fs
        .inode_table
        .live_inodes()
        .flat_map(|i| i.blocks.iter().copied())
        .collect();
    referenced.sort_unstable();
    let mut deduped = referenced.clone();
    deduped.dedup();
    assert_eq!(referenced, deduped);
    assert_eq!(fs.free_blocks(), 16 - referenced.len() as u64);
}

#[test]
fn crash_between_intent_and_commit_is_rolled_back() {
    let (_disk, mut fs) = fresh_fs();
    fs.mkdir("/docs").unwrap();
    fs.create_file("/docs/a.txt").unwrap();
    let original = pattern(5000);
    fs.write("/docs/a.txt", &original, WriteMode::Overwrite).unwrap();

    let bitmap_before = fs.bitmap.clone();
    let table_before = fs.inode_table.clone();

    fs.arm_crash();
    assert!(matches!(
        fs.write("/docs/a.txt", &pattern(9000), WriteMode::Overwrite),
        Err(FsError::Crashed)
    ));
    // the intent made it to the journal before the crash
    assert!(fs.journal.records().len() > 2);
    // nothing is accepted until recovery
    assert!(matches!(fs.read("/docs/a.txt"), Err(FsError::Crashed)));
    assert!(matches!(fs.mkdir("/other"), Err(FsError::Crashed)));

    fs.recover().unwrap();
    assert_eq!(fs.bitmap, bitmap_before);
    assert_eq!(fs.inode_table, table_before);
    assert_eq!(fs.read("/docs/a.txt").unwrap(), original);
    fs.check_consistency().unwrap();
}

#[test]
fn recovery_is_idempotent() {
    let (_disk, mut fs) = fresh_fs();
    fs.mkdir("/d").unwrap();
    fs.create_file("/d/f").unwrap();
    fs.write("/d/f", &pattern(6000), WriteMode::Overwrite).unwrap();

    fs.crash();
    fs.recover().unwrap();
    let bitmap_once = fs.bitmap.clone();
    let table_once = fs.inode_table.clone();
    let content_once = fs.read("/d/f").unwrap();

    fs.recover().unwrap();
    assert_eq!(fs.bitmap, bitmap_once);
    assert_eq!(fs.inode_table, table_once);
    assert_eq!(fs.read("/d/f").unwrap(), content_once);
}

#[test]
fn deletion_reclaims_exactly_its_blocks() {
    let (_disk, mut fs) = fresh_fs();
    fs.create_file("/keep").unwrap();
    fs.create_file("/victim").unwrap();
    fs.write("/keep", &pattern(100), WriteMode::Overwrite).unwrap();
    let victim_ino = fs.resolve("/victim").unwrap();
    fs.write("/victim", &pattern(9000), WriteMode::Overwrite).unwrap();

    let victim_blocks = fs.inode_table.get(victim_ino).unwrap().blocks.clone();
    assert_eq!(victim_blocks.len(), 3);
    let free_before = fs.free_blocks();

    // the root keeps an entry, so its payload block stays: delta is exactly 3
    fs.delete("/victim").unwrap();
    assert_eq!(fs.free_blocks(), free_before + 3);

    // first-fit hands the reclaimed indices out again
    fs.create_file("/next").unwrap();
    fs.write("/next", &pattern(9000), WriteMode::Overwrite).unwrap();
    let next_ino = fs.resolve("/next").unwrap();
    let next_blocks = fs.inode_table.get(next_ino).unwrap().blocks.clone();
    let mut expected = victim_blocks;
    expected.sort_unstable();
    let mut got = next_blocks;
    got.sort_unstable();
    assert_eq!(got, expected);
}

#[test]
fn non_empty_directory_is_left_untouched_by_failed_delete() {
    let (_disk, mut fs) = fresh_fs();
    fs.mkdir("/d").unwrap();
    fs.create_file("/d/f").unwrap();
    fs.write("/d/f", b"payload", WriteMode::Overwrite).unwrap();

    assert!(matches!(fs.delete("/d"), Err(FsError::NotEmpty(_))));
    assert_eq!(
        fs.list("/d").unwrap(),
        vec![("f".to_string(), InodeKind::File)]
    );
    assert_eq!(fs.read("/d/f").unwrap(), b"payload");
    fs.check_consistency().unwrap();
}

#[test]
fn append_mode_extends_content() {
    let (_disk, mut fs) = fresh_fs();
    fs.create_file("/log").unwrap();
    fs.write("/log", b"abc", WriteMode::Overwrite).unwrap();
    fs.write("/log", b"def", WriteMode::Append).unwrap();
    assert_eq!(fs.read("/log").unwrap(), b"abcdef");

    // append across a block boundary
    let head = pattern(4090);
    let tail = pattern(20);
    fs.write("/log", &head, WriteMode::Overwrite).unwrap();
    fs.write("/log", &tail, WriteMode::Append).unwrap();

    let ino = fs.resolve("/log").unwrap();
    let inode = fs.inode_table.get(ino).unwrap();
    assert_eq!(inode.size, 4110);
    assert_eq!(inode.blocks.len(), 2);

    let mut expected = head;
    expected.extend_from_slice(&tail);
    assert_eq!(fs.read("/log").unwrap(), expected);
}

#[test]
fn path_errors_match_the_taxonomy() {
    let (_disk, mut fs) = fresh_fs();
    fs.mkdir("/d").unwrap();
    fs.create_file("/d/f").unwrap();

    assert!(matches!(fs.mkdir("/d"), Err(FsError::AlreadyExists(_))));
    assert!(matches!(fs.create_file("/d/f"), Err(FsError::AlreadyExists(_))));
    assert!(matches!(fs.create_file("/nope/f"), Err(FsError::NotFound(_))));
    assert!(matches!(
        fs.write("/missing", b"x", WriteMode::Overwrite),
        Err(FsError::NotFound(_))
    ));
    assert!(matches!(fs.read("/d"), Err(FsError::IsADirectory(_))));
    assert!(matches!(
        fs.write("/d", b"x", WriteMode::Overwrite),
        Err(FsError::IsADirectory(_))
    ));
    assert!(matches!(fs.list("/d/f"), Err(FsError::NotADirectory(_))));
    assert!(matches!(fs.mkdir("/d/f/sub"), Err(FsError::NotADirectory(_))));
    assert!(matches!(fs.delete("/"), Err(FsError::InvalidPath(_))));
    assert!(matches!(fs.mkdir("relative"), Err(FsError::InvalidPath(_))));
}

#[test]
fn out_of_space_fails_atomically() {
    let (_disk, mut fs) = fresh_fs();
    fs.create_file("/big").unwrap();
    let free_before = fs.free_blocks();

    // 20 blocks of content on a 16-block device
    assert!(matches!(
        fs.write("/big", &pattern(20 * 4096), WriteMode::Overwrite),
        Err(FsError::OutOfSpace)
    ));
    assert_eq!(fs.free_blocks(), free_before);
    assert_eq!(fs.read("/big").unwrap(), Vec::<u8>::new());
    fs.check_consistency().unwrap();
}

#[test]
fn inode_table_exhaustion_reports_table_full() {
    let _ = env_logger::builder().is_test(true).try_init();
    let geometry = Geometry {
        total_inodes: 2, // root plus one
        ..small_geometry()
    };
    let disk = MemDisk::new(geometry.device_blocks(), geometry.block_size);
    let mut fs = FileSystem::format(disk, geometry).unwrap();

    fs.create_file("/a").unwrap();
    assert!(matches!(fs.create_file("/b"), Err(FsError::TableFull)));
    // numbers are recycled after delete
    fs.delete("/a").unwrap();
    fs.create_file("/b").unwrap();
}

#[test]
fn state_survives_unmount_and_mount() {
    let (disk, mut fs) = fresh_fs();
    fs.mkdir("/docs").unwrap();
    fs.create_file("/docs/a.txt").unwrap();
    let data = pattern(9000);
    fs.write("/docs/a.txt", &data, WriteMode::Overwrite).unwrap();
    fs.unmount().unwrap();

    let fs = FileSystem::mount(disk).unwrap();
    assert_eq!(fs.read("/docs/a.txt").unwrap(), data);
    assert_eq!(
        fs.list("/").unwrap(),
        vec![("docs".to_string(), InodeKind::Directory)]
    );
    fs.check_consistency().unwrap();
}

#[test]
fn mount_replays_journal_when_never_checkpointed() {
    let (disk, mut fs) = fresh_fs();
    fs.mkdir("/d").unwrap();
    fs.create_file("/d/f").unwrap();
    let data = pattern(5000);
    fs.write("/d/f", &data, WriteMode::Overwrite).unwrap();
    // no unmount, no checkpoint: the snapshot on the image is still the
    // freshly formatted one, everything else lives in the journal
    drop(fs);

    let fs = FileSystem::mount(disk).unwrap();
    assert_eq!(fs.read("/d/f").unwrap(), data);
    assert_eq!(fs.free_blocks(), 16 - 2 - 2); // root + /d payloads, 2 file blocks
    fs.check_consistency().unwrap();
}

#[test]
fn checkpoint_does_not_change_recovery_outcome() {
    let (disk, mut fs) = fresh_fs();
    fs.mkdir("/d").unwrap();
    fs.checkpoint().unwrap();
    fs.create_file("/d/f").unwrap();
    let data = pattern(3000);
    fs.write("/d/f", &data, WriteMode::Overwrite).unwrap();
    fs.crash();
    fs.recover().unwrap();

    assert_eq!(fs.read("/d/f").unwrap(), data);
    drop(fs);
    let fs = FileSystem::mount(disk).unwrap();
    assert_eq!(fs.read("/d/f").unwrap(), data);
}

#[test]
fn tiny_journal_region_triggers_automatic_checkpoints() {
    let _ = env_logger::builder().is_test(true).try_init();
    let geometry = Geometry {
        journal_blocks: 2,
        ..small_geometry()
    };
    let disk = MemDisk::new(geometry.device_blocks(), geometry.block_size);
    let mut fs = FileSystem::format(disk, geometry).unwrap();

    fs.create_file("/f").unwrap();
    for round in 0..6 {
        let data = pattern(2000 + round * 100);
        fs.write("/f", &data, WriteMode::Overwrite).unwrap();
        assert_eq!(fs.read("/f").unwrap(), data);
    }
    fs.check_consistency().unwrap();
}

#[test]
fn scribbled_journal_region_fails_mount_with_corrupt_journal() {
    use journalfs::BlockDevice;

    let (disk, fs) = fresh_fs();
    let journal_start = fs.super_block.journal_start;
    drop(fs);

    let mut block = vec![0u8; 4096];
    block[..8].copy_from_slice(&100u64.to_le_bytes());
    block[8..108].fill(0xFF);
    disk.write_block(journal_start, &block).unwrap();

    assert!(matches!(
        FileSystem::mount(disk),
        Err(FsError::CorruptJournal(_))
    ));
}

#[test]
fn read_data_offset_semantics() {
    let (_disk, mut fs) = fresh_fs();
    fs.create_file("/f").unwrap();
    let data = pattern(5000);
    fs.write("/f", &data, WriteMode::Overwrite).unwrap();
    let ino = fs.resolve("/f").unwrap();

    // short read at end of file, even for an absurdly large length
    assert_eq!(fs.read_data(ino, 4000, 9999).unwrap(), &data[4000..]);
    assert_eq!(fs.read_data(ino, 4000, u64::MAX).unwrap(), &data[4000..]);
    assert_eq!(fs.read_data(ino, 0, u64::MAX).unwrap(), data);
    // reading exactly at the end returns nothing
    assert_eq!(fs.read_data(ino, 5000, 10).unwrap(), Vec::<u8>::new());
    // past the end is an error
    assert!(matches!(
        fs.read_data(ino, 5001, 1),
        Err(FsError::OutOfRange(5001))
    ));
}
