use crate::disk::BlockDevice;
use crate::fs::error::{FsError, Result};

/// The data-block array: a dumb fixed store of equal-size byte blocks,
/// addressed by data-block index. It knows nothing about allocation;
/// ownership is tracked by the bitmap and the inode block lists.
///
/// Blocks live in memory between checkpoints; `dirty` marks which ones still
/// have to reach the device image.
#[derive(Debug, Clone)]
pub struct BlockStore {
    blocks: Vec<u8>,
    block_size: usize,
    total_blocks: u64,
    start_block: u64,
    dirty: Vec<bool>,
}

impl BlockStore {
    pub fn new(total_blocks: u64, block_size: usize, start_block: u64) -> Self {
        Self {
            blocks: vec![0u8; total_blocks as usize * block_size],
            block_size,
            total_blocks,
            start_block,
            dirty: vec![false; total_blocks as usize],
        }
    }

    pub fn read_block(&self, index: u64) -> Result<&[u8]> {
        if index >= self.total_blocks {
            return Err(FsError::OutOfRange(index));
        }
        let start = index as usize * self.block_size;
        Ok(&self.blocks[start..start + self.block_size])
    }

    /// Writes exactly one block. Callers pad short payloads themselves; a
    /// wrong-sized buffer is a contract violation, not something to patch up.
    pub fn write_block(&mut self, index: u64, buf: &[u8]) -> Result<()> {
        if index >= self.total_blocks {
            return Err(FsError::OutOfRange(index));
        }
        if buf.len() != self.block_size {
            return Err(FsError::SizeMismatch {
                expected: self.block_size,
                got: buf.len(),
            });
        }
        let start = index as usize * self.block_size;
        self.blocks[start..start + self.block_size].copy_from_slice(buf);
        self.dirty[index as usize] = true;
        Ok(())
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Flushes dirty blocks to the device's data region.
    pub fn sync<D: BlockDevice>(&mut self, disk: &D) -> Result<()> {
        for i in 0..self.total_blocks as usize {
            if self.dirty[i] {
                let start = i * self.block_size;
                disk.write_block(
                    self.start_block + i as u64,
                    &self.blocks[start..start + self.block_size],
                )?;
                self.dirty[i] = false;
            }
        }
        Ok(())
    }

    /// Reloads every block from the device, discarding in-memory content.
    pub fn load<D: BlockDevice>(&mut self, disk: &D) -> Result<()> {
        let mut buf = vec![0u8; self.block_size];
        for i in 0..self.total_blocks {
            disk.read_block(self.start_block + i, &mut buf)?;
            let start = i as usize * self.block_size;
            self.blocks[start..start + self.block_size].copy_from_slice(&buf);
            self.dirty[i as usize] = false;
        }
        Ok(())
    }
}
