use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::disk::{read_region, write_region, BlockDevice};
use crate::fs::config::{Geometry, SUPER_BLOCK_ID};
use crate::fs::error::{FsError, Result};
use crate::utils::{current_timestamp, generate_uuid};

const MAGIC: u64 = 0x4A4F_5552_4E46_5331; // "JOURNFS1"

bitflags! {
    /// Superblock state flags, persisted as raw bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FsFlags: u32 {
        const MOUNTED = 1 << 0;
        const DIRTY = 1 << 1;
    }
}

/// Image header: identifies the filesystem, pins the geometry and locates
/// every region. Written at format and on each checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuperBlock {
    pub magic: u64,
    pub fs_type: String,
    pub volume_id: String,
    pub geometry: Geometry,
    // region start blocks, derived once from the geometry
    pub bitmap_start: u64,
    pub inode_table_start: u64,
    pub journal_start: u64,
    pub data_start: u64,
    // counters mirrored from the live state at checkpoint time
    pub free_blocks: u64,
    pub free_inodes: u64,
    pub flags: u32,
    pub created_at: i64,
}

impl SuperBlock {
    pub fn new(geometry: Geometry) -> Self {
        let free_blocks = geometry.total_blocks;
        let free_inodes = geometry.total_inodes;
        Self {
            magic: MAGIC,
            fs_type: "journalfs".to_string(),
            volume_id: generate_uuid(),
            bitmap_start: geometry.bitmap_start(),
            inode_table_start: geometry.inode_table_start(),
            journal_start: geometry.journal_start(),
            data_start: geometry.data_start(),
            geometry,
            free_blocks,
            free_inodes,
            flags: FsFlags::empty().bits(),
            created_at: current_timestamp(),
        }
    }

    pub fn flags(&self) -> FsFlags {
        FsFlags::from_bits_truncate(self.flags)
    }

    pub fn set_flag(&mut self, flag: FsFlags, on: bool) {
        let mut flags = self.flags();
        flags.set(flag, on);
        self.flags = flags.bits();
    }

    pub fn sync<D: BlockDevice>(&self, disk: &D) -> Result<()> {
        let bytes = bincode::serialize(self)
            .map_err(|e| FsError::Corrupted(format!("superblock encode: {}", e)))?;
        if bytes.len() + 8 > disk.block_size() {
            return Err(FsError::Corrupted("superblock exceeds one block".to_string()));
        }
        write_region(disk, SUPER_BLOCK_ID, &bytes)?;
        Ok(())
    }

    pub fn load<D: BlockDevice>(disk: &D) -> Result<Self> {
        let bytes = read_region(disk, SUPER_BLOCK_ID)
            .map_err(|e| FsError::Corrupted(format!("superblock region: {}", e)))?;
        let sb: SuperBlock = bincode::deserialize(&bytes)
            .map_err(|e| FsError::Corrupted(format!("superblock decode: {}", e)))?;

        if sb.magic != MAGIC {
            return Err(FsError::Corrupted(format!("bad magic {:#x}", sb.magic)));
        }
        if sb.geometry.block_size != disk.block_size() {
            return Err(FsError::Corrupted(format!(
                "image block size {} does not match device block size {}",
                sb.geometry.block_size,
                disk.block_size()
            )));
        }
        sb.geometry.validate()?;
        Ok(sb)
    }
}
