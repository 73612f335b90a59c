use crate::disk::{read_region, write_region, BlockDevice};
use crate::fs::error::{FsError, Result};

/// Free-space tracker for the data region: one bit per data block, set while
/// the block is owned by exactly one inode's block list.
///
/// Allocation is first-fit from index 0 so allocation order is reproducible.
/// The free count is a maintained counter, never a rescan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockBitmap {
    bits: Vec<u8>,
    total_blocks: u64,
    free_blocks: u64,
    start_block: u64,
}

impl BlockBitmap {
    pub fn new(total_blocks: u64, start_block: u64) -> Self {
        let byte_len = ((total_blocks + 7) / 8) as usize;
        Self {
            bits: vec![0; byte_len],
            total_blocks,
            free_blocks: total_blocks,
            start_block,
        }
    }

    /// First-fit scan: marks the lowest free bit used and returns its index.
    pub fn allocate(&mut self) -> Result<u64> {
        for (byte_index, byte) in self.bits.iter_mut().enumerate() {
            if *byte != 0xFF {
                for bit in 0..8 {
                    let index = (byte_index * 8 + bit) as u64;
                    if index >= self.total_blocks {
                        break;
                    }
                    if *byte & (1 << bit) == 0 {
                        *byte |= 1 << bit;
                        self.free_blocks -= 1;
                        return Ok(index);
                    }
                }
            }
        }
        Err(FsError::OutOfSpace)
    }

    /// Releases one block. Freeing an already-free bit means the allocator
    /// and some inode's block list have desynchronized.
    pub fn free(&mut self, block_index: u64) -> Result<()> {
        if block_index >= self.total_blocks {
            return Err(FsError::OutOfRange(block_index));
        }
        let byte_index = (block_index / 8) as usize;
        let bit_index = (block_index % 8) as u8;

        if self.bits[byte_index] & (1 << bit_index) == 0 {
            return Err(FsError::DoubleFree(block_index));
        }
        self.bits[byte_index] &= !(1 << bit_index);
        self.free_blocks += 1;
        Ok(())
    }

    /// Idempotent target-state setter used by journal replay: a no-op when
    /// the bit already holds the target value.
    pub fn set_bit(&mut self, block_index: u64, used: bool) -> Result<()> {
        if block_index >= self.total_blocks {
            return Err(FsError::OutOfRange(block_index));
        }
        let byte_index = (block_index / 8) as usize;
        let bit_index = (block_index % 8) as u8;
        let is_used = self.bits[byte_index] & (1 << bit_index) != 0;

        if used && !is_used {
            self.bits[byte_index] |= 1 << bit_index;
            self.free_blocks -= 1;
        } else if !used && is_used {
            self.bits[byte_index] &= !(1 << bit_index);
            self.free_blocks += 1;
        }
        Ok(())
    }

    pub fn is_used(&self, block_index: u64) -> bool {
        let byte_index = (block_index / 8) as usize;
        let bit_index = (block_index % 8) as u8;
        self.bits[byte_index] & (1 << bit_index) != 0
    }

    pub fn count_free(&self) -> u64 {
        self.free_blocks
    }

    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    pub fn sync<D: BlockDevice>(&self, disk: &D) -> Result<()> {
        write_region(disk, self.start_block, &self.bits)?;
        Ok(())
    }

    pub fn load<D: BlockDevice>(disk: &D, start_block: u64, total_blocks: u64) -> Result<Self> {
        let bits = read_region(disk, start_block)?;
        let byte_len = ((total_blocks + 7) / 8) as usize;
        if bits.len() != byte_len {
            return Err(FsError::Corrupted(format!(
                "bitmap region holds {} bytes, geometry expects {}",
                bits.len(),
                byte_len
            )));
        }

        let used: u64 = bits.iter().map(|b| b.count_ones() as u64).sum();
        Ok(Self {
            bits,
            total_blocks,
            free_blocks: total_blocks - used,
            start_block,
        })
    }
}
