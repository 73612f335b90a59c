use std::fmt;

/// Engine error taxonomy.
///
/// Three classes: resource exhaustion (`OutOfSpace`, `TableFull`), path/name
/// errors (`NotFound` through `InvalidPath`), and consistency violations
/// (`DoubleFree`, `CorruptJournal`, `Corrupted`) which signal an internal
/// bookkeeping bug and are fatal to the current mount.
#[derive(Debug)]
pub enum FsError {
    Io(std::io::Error),           // underlying device I/O failure
    OutOfSpace,                   // no free data block (or journal region exhausted)
    TableFull,                    // no free inode slot
    OutOfRange(u64),              // block index or byte offset past the end
    SizeMismatch { expected: usize, got: usize }, // payload is not exactly one block
    NotFound(String),             // missing path component or directory entry
    AlreadyExists(String),        // name already present in the directory
    NotADirectory(String),        // expected a directory, found a file
    IsADirectory(String),         // expected a file, found a directory
    NotEmpty(String),             // directory still has entries
    InvalidPath(String),          // not absolute, empty component, or the root where it is not allowed
    InvalidInode(u64),            // inode number does not name a live inode
    DoubleFree(u64),              // freeing an already-free block: allocator desync
    CorruptJournal(String),       // journal region undecodable or internally inconsistent
    Corrupted(String),            // bitmap/inode invariant breach (orphans, double references)
    Crashed,                      // simulated crash pending recovery
}

impl FsError {
    /// True for the fatal class: an internal invariant breach rather than a
    /// caller mistake. The mount is unusable until recovery succeeds.
    pub fn is_consistency_violation(&self) -> bool {
        matches!(
            self,
            Self::DoubleFree(_) | Self::CorruptJournal(_) | Self::Corrupted(_)
        )
    }
}

impl From<std::io::Error> for FsError {
    fn from(e: std::io::Error) -> Self {
        FsError::Io(e)
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "Device I/O error: {}", e),
            Self::OutOfSpace => write!(f, "No free blocks left on the device"),
            Self::TableFull => write!(f, "No free inode slot available"),
            Self::OutOfRange(n) => write!(f, "Index or offset out of range: {}", n),
            Self::SizeMismatch { expected, got } => {
                write!(f, "Payload must be exactly {} bytes, got {}", expected, got)
            }
            Self::NotFound(path) => write!(f, "File or directory not found: {}", path),
            Self::AlreadyExists(path) => write!(f, "File or directory already exists: {}", path),
            Self::NotADirectory(path) => write!(f, "Expected a directory, found a file: {}", path),
            Self::IsADirectory(path) => write!(f, "Expected a file, found a directory: {}", path),
            Self::NotEmpty(path) => write!(f, "Directory is not empty: {}", path),
            Self::InvalidPath(path) => write!(f, "Invalid path: {}", path),
            Self::InvalidInode(ino) => write!(f, "Invalid inode: {}", ino),
            Self::DoubleFree(b) => write!(f, "Double free of block {}", b),
            Self::CorruptJournal(desc) => write!(f, "Corrupt journal: {}", desc),
            Self::Corrupted(desc) => write!(f, "File system corrupted: {}", desc),
            Self::Crashed => write!(f, "Simulated crash: recovery required before further operations"),
        }
    }
}

impl std::error::Error for FsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Engine-wide result type.
pub type Result<T> = std::result::Result<T, FsError>;
