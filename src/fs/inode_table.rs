use serde::{Deserialize, Serialize};

use crate::disk::{read_region, write_region, BlockDevice};
use crate::fs::error::{FsError, Result};
use crate::utils::current_timestamp;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    File,
    Directory,
}

/// Metadata record for one file or directory. The block list is the ordered
/// sequence of data-block indices; sequence order is byte order within the
/// file. A partial last block is tracked by `size`, not per block.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Inode {
    pub ino: u64,
    pub kind: InodeKind,
    pub size: u64,
    pub blocks: Vec<u64>,
    pub ctime: i64,
    pub mtime: i64,
}

impl Inode {
    pub fn new(ino: u64, kind: InodeKind) -> Self {
        let now = current_timestamp();
        Self {
            ino,
            kind,
            size: 0,
            blocks: Vec::new(),
            ctime: now,
            mtime: now,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == InodeKind::Directory
    }

    pub fn touch(&mut self) {
        self.mtime = current_timestamp();
    }
}

/// Fixed-capacity inode table. Slot index is the inode number; a `None` slot
/// is free and its number is recyclable.
#[derive(Debug, Clone, PartialEq)]
pub struct InodeTable {
    pub slots: Vec<Option<Inode>>,
    pub start_block: u64,
}

impl InodeTable {
    pub fn new(total_inodes: u64, start_block: u64) -> Self {
        Self {
            slots: vec![None; total_inodes as usize],
            start_block,
        }
    }

    pub fn capacity(&self) -> u64 {
        self.slots.len() as u64
    }

    pub fn get(&self, ino: u64) -> Result<&Inode> {
        self.slots
            .get(ino as usize)
            .and_then(|s| s.as_ref())
            .ok_or(FsError::InvalidInode(ino))
    }

    pub fn is_allocated(&self, ino: u64) -> bool {
        matches!(self.slots.get(ino as usize), Some(Some(_)))
    }

    /// Lowest free slot index, or `TableFull`.
    pub fn first_free(&self) -> Result<u64> {
        self.slots
            .iter()
            .position(|s| s.is_none())
            .map(|i| i as u64)
            .ok_or(FsError::TableFull)
    }

    /// Idempotent target-state setter used by journal replay: installs or
    /// clears a whole slot regardless of its current content.
    pub fn set_slot(&mut self, ino: u64, slot: Option<Inode>) -> Result<()> {
        if ino as usize >= self.slots.len() {
            return Err(FsError::InvalidInode(ino));
        }
        self.slots[ino as usize] = slot;
        Ok(())
    }

    pub fn count_free(&self) -> u64 {
        self.slots.iter().filter(|s| s.is_none()).count() as u64
    }

    pub fn live_inodes(&self) -> impl Iterator<Item = &Inode> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    pub fn sync<D: BlockDevice>(&self, disk: &D) -> Result<()> {
        let bytes = bincode::serialize(&self.slots)
            .map_err(|e| FsError::Corrupted(format!("inode table encode: {}", e)))?;
        write_region(disk, self.start_block, &bytes)?;
        Ok(())
    }

    pub fn load<D: BlockDevice>(disk: &D, start_block: u64, total_inodes: u64) -> Result<Self> {
        let bytes = read_region(disk, start_block)?;
        let slots: Vec<Option<Inode>> = bincode::deserialize(&bytes)
            .map_err(|e| FsError::Corrupted(format!("inode table decode: {}", e)))?;

        if slots.len() as u64 != total_inodes {
            return Err(FsError::Corrupted(format!(
                "inode table holds {} slots, geometry expects {}",
                slots.len(),
                total_inodes
            )));
        }
        Ok(Self { slots, start_block })
    }
}
