use serde::{Deserialize, Serialize};

use crate::disk::region_blocks;
use crate::fs::error::{FsError, Result};

/// The superblock always lives in block 0 of the device image.
pub const SUPER_BLOCK_ID: u64 = 0;

/// Reserved inode number of the root directory. Created at format time,
/// never deleted.
pub const ROOT_INO: u64 = 0;

pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Worst-case serialized bytes per inode slot, block list excluded. The
/// block lists are bounded separately: across all inodes they can reference
/// at most every data block once.
const INODE_SLOT_SIZE: u64 = 64;

/// Device shape, fixed at format time and persisted in the superblock.
/// `total_blocks` counts *data* blocks; metadata regions come on top.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Geometry {
    pub block_size: usize,
    pub total_blocks: u64,
    pub total_inodes: u64,
    pub journal_blocks: u64,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            total_blocks: 4096,
            total_inodes: 512,
            journal_blocks: 16,
        }
    }
}

impl Geometry {
    pub fn validate(&self) -> Result<()> {
        if self.block_size < 64 {
            return Err(FsError::Corrupted(format!(
                "block size {} too small for region framing",
                self.block_size
            )));
        }
        if self.total_blocks == 0 || self.total_inodes == 0 || self.journal_blocks < 2 {
            return Err(FsError::Corrupted("degenerate geometry".to_string()));
        }
        Ok(())
    }

    /// Blocks occupied by the free-space bitmap region.
    pub fn bitmap_blocks(&self) -> u64 {
        let bitmap_bytes = ((self.total_blocks + 7) / 8) as usize;
        region_blocks(bitmap_bytes, self.block_size)
    }

    /// Blocks reserved for the serialized inode table, sized for the worst
    /// case so a full table always fits its region.
    pub fn inode_table_blocks(&self) -> u64 {
        let worst = 16 + self.total_inodes * INODE_SLOT_SIZE + self.total_blocks * 8;
        region_blocks(worst as usize, self.block_size)
    }

    pub fn bitmap_start(&self) -> u64 {
        SUPER_BLOCK_ID + 1
    }

    pub fn inode_table_start(&self) -> u64 {
        self.bitmap_start() + self.bitmap_blocks()
    }

    pub fn journal_start(&self) -> u64 {
        self.inode_table_start() + self.inode_table_blocks()
    }

    pub fn data_start(&self) -> u64 {
        self.journal_start() + self.journal_blocks
    }

    /// Total device image size in blocks: superblock, bitmap, inode table,
    /// journal and data regions, in that fixed order.
    pub fn device_blocks(&self) -> u64 {
        self.data_start() + self.total_blocks
    }
}
