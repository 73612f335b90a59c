use std::{
    io::{Error, ErrorKind, Result},
    sync::{Arc, Mutex},
};

use crate::disk::block_device::BlockDevice;

/// In-memory device image, zero-filled at creation. Cloning shares the
/// underlying storage, which lets tests drop an engine and re-mount the same
/// image to exercise recovery.
#[derive(Debug, Clone)]
pub struct MemDisk {
    blocks: Arc<Mutex<Vec<u8>>>,
    block_size: usize,
    num_blocks: u64,
}

impl MemDisk {
    pub fn new(num_blocks: u64, block_size: usize) -> Self {
        Self {
            blocks: Arc::new(Mutex::new(vec![0u8; num_blocks as usize * block_size])),
            block_size,
            num_blocks,
        }
    }
}

impl BlockDevice for MemDisk {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn num_blocks(&self) -> u64 {
        self.num_blocks
    }

    fn read_block(&self, block_id: u64, buf: &mut [u8]) -> Result<()> {
        if block_id >= self.num_blocks {
            return Err(Error::new(ErrorKind::InvalidInput, "block id out of range"));
        }
        let blocks = self.blocks.lock().unwrap();
        let start = block_id as usize * self.block_size;
        buf.copy_from_slice(&blocks[start..start + self.block_size]);
        Ok(())
    }

    fn write_block(&self, block_id: u64, buf: &[u8]) -> Result<()> {
        if block_id >= self.num_blocks {
            return Err(Error::new(ErrorKind::InvalidInput, "block id out of range"));
        }
        let mut blocks = self.blocks.lock().unwrap();
        let start = block_id as usize * self.block_size;
        blocks[start..start + self.block_size].copy_from_slice(buf);
        Ok(())
    }
}
