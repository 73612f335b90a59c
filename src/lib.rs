//! A teaching-oriented simulation of filesystem internals: a fixed-size
//! virtual block device, a bitmap free-space tracker, an inode/directory
//! metadata layer, and a write-ahead journal providing crash-consistency
//! guarantees.
//!
//! The engine lives behind [`FileSystem`], a path-level façade over the
//! storage layers. Every mutating operation journals an intent before any
//! state changes and a commit after; a simulated crash in between is rolled
//! back by recovery at the next mount.
//!
//! ```
//! use journalfs::{FileSystem, Geometry, MemDisk, WriteMode};
//!
//! let geometry = Geometry { total_blocks: 16, total_inodes: 16, journal_blocks: 8, ..Geometry::default() };
//! let disk = MemDisk::new(geometry.device_blocks(), geometry.block_size);
//! let mut fs = FileSystem::format(disk, geometry).unwrap();
//!
//! fs.mkdir("/docs").unwrap();
//! fs.create_file("/docs/a.txt").unwrap();
//! fs.write("/docs/a.txt", b"hello", WriteMode::Overwrite).unwrap();
//! assert_eq!(fs.read("/docs/a.txt").unwrap(), b"hello");
//! ```

pub mod disk;
pub mod fs;
pub mod utils;

pub use disk::{BlockDevice, FileDisk, MemDisk};
pub use fs::config::{Geometry, DEFAULT_BLOCK_SIZE, ROOT_INO};
pub use fs::error::{FsError, Result};
pub use fs::inode_table::{Inode, InodeKind};
pub use fs::{FileSystem, WriteMode};
