use std::io::{Error, ErrorKind, Result};

pub mod block_device;
pub mod file_disk;
pub mod mem_disk;

pub use block_device::BlockDevice;
pub use file_disk::FileDisk;
pub use mem_disk::MemDisk;

/// Writes a serialized region starting at `start_block`: a u64 length prefix
/// in the first block, then the payload packed into whole, zero-padded
/// blocks. Every variable-length region on the image (inode table, journal)
/// uses this framing.
pub fn write_region<D: BlockDevice>(disk: &D, start_block: u64, bytes: &[u8]) -> Result<()> {
    let bs = disk.block_size();
    let mut block_buf = vec![0u8; bs];
    block_buf[..8].copy_from_slice(&(bytes.len() as u64).to_le_bytes());

    let first_chunk = std::cmp::min(bs - 8, bytes.len());
    block_buf[8..8 + first_chunk].copy_from_slice(&bytes[..first_chunk]);
    disk.write_block(start_block, &block_buf)?;

    let total_blocks = region_blocks(bytes.len(), bs);
    let mut offset = first_chunk;
    for i in 1..total_blocks {
        let mut block_buf = vec![0u8; bs];
        let chunk = std::cmp::min(bs, bytes.len() - offset);
        block_buf[..chunk].copy_from_slice(&bytes[offset..offset + chunk]);
        disk.write_block(start_block + i, &block_buf)?;
        offset += chunk;
    }
    Ok(())
}

/// Reads a region written by [`write_region`], returning exactly the payload.
pub fn read_region<D: BlockDevice>(disk: &D, start_block: u64) -> Result<Vec<u8>> {
    let bs = disk.block_size();
    let mut block_buf = vec![0u8; bs];
    disk.read_block(start_block, &mut block_buf)?;

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&block_buf[..8]);
    let len = u64::from_le_bytes(len_bytes) as usize;

    if len > (disk.num_blocks() as usize).saturating_mul(bs) {
        return Err(Error::new(ErrorKind::InvalidData, "region length prefix exceeds device"));
    }

    let mut bytes = Vec::with_capacity(len);
    let first_chunk = std::cmp::min(bs - 8, len);
    bytes.extend_from_slice(&block_buf[8..8 + first_chunk]);

    let total_blocks = region_blocks(len, bs);
    let mut read = first_chunk;
    for i in 1..total_blocks {
        disk.read_block(start_block + i, &mut block_buf)?;
        let chunk = std::cmp::min(bs, len - read);
        bytes.extend_from_slice(&block_buf[..chunk]);
        read += chunk;
    }
    Ok(bytes)
}

/// Number of blocks a region payload occupies, prefix included.
pub fn region_blocks(payload_len: usize, block_size: usize) -> u64 {
    ((payload_len + 8 + block_size - 1) / block_size) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_round_trip_spanning_blocks() {
        let disk = MemDisk::new(8, 256);
        let payload: Vec<u8> = (0..700u32).map(|i| (i % 251) as u8).collect();

        write_region(&disk, 2, &payload).unwrap();
        assert_eq!(read_region(&disk, 2).unwrap(), payload);
        assert_eq!(region_blocks(payload.len(), 256), 3);
    }

    #[test]
    fn empty_region_round_trip() {
        let disk = MemDisk::new(2, 256);
        write_region(&disk, 0, &[]).unwrap();
        assert_eq!(read_region(&disk, 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn garbage_length_prefix_is_an_error() {
        let disk = MemDisk::new(2, 256);
        let mut block = vec![0xFFu8; 256];
        block[..8].copy_from_slice(&u64::MAX.to_le_bytes());
        disk.write_block(0, &block).unwrap();
        assert!(read_region(&disk, 0).is_err());
    }
}
