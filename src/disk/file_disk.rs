use std::{
    fs::{File, OpenOptions},
    io::{Read, Result, Seek, SeekFrom, Write},
    path::Path,
    sync::Mutex,
};

use crate::disk::block_device::BlockDevice;

/// File-backed device image. The file is pre-sized to the full device
/// capacity so every block offset is always readable.
#[derive(Debug)]
pub struct FileDisk {
    file: Mutex<File>,
    block_size: usize,
    num_blocks: u64,
}

impl FileDisk {
    /// Creates a fresh image of exactly `num_blocks * block_size` bytes.
    pub fn create<P: AsRef<Path>>(path: P, num_blocks: u64, block_size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(num_blocks * block_size as u64)?;

        Ok(Self {
            file: Mutex::new(file),
            block_size,
            num_blocks,
        })
    }

    /// Opens an existing image; capacity is derived from the file length.
    pub fn open<P: AsRef<Path>>(path: P, block_size: usize) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let num_blocks = file.metadata()?.len() / block_size as u64;

        Ok(Self {
            file: Mutex::new(file),
            block_size,
            num_blocks,
        })
    }
}

impl BlockDevice for FileDisk {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn num_blocks(&self) -> u64 {
        self.num_blocks
    }

    fn read_block(&self, block_id: u64, buf: &mut [u8]) -> Result<()> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(block_id * self.block_size as u64))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_block(&self, block_id: u64, buf: &[u8]) -> Result<()> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(block_id * self.block_size as u64))?;
        file.write_all(buf)?;
        Ok(())
    }
}
