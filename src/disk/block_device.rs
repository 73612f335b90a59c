use std::io::Result;

/// Abstraction over the persisted device image. Everything the engine keeps
/// durable (superblock, bitmap, inode table, journal, data blocks) goes
/// through this trait; nothing else touches the image.
///
/// `buf` must be exactly `block_size()` bytes long in both directions.
pub trait BlockDevice: Send + Sync {
    fn block_size(&self) -> usize;
    fn num_blocks(&self) -> u64;
    fn read_block(&self, block_id: u64, buf: &mut [u8]) -> Result<()>;
    fn write_block(&self, block_id: u64, buf: &[u8]) -> Result<()>;
}
