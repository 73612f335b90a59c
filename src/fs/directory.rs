use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::fs::error::{FsError, Result};
use crate::fs::inode_table::InodeKind;

/// One name → inode binding inside a directory.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DirEntry {
    pub name: String,
    pub ino: u64,
    pub kind: InodeKind,
}

/// The entry set of a directory inode. Serialized with bincode and stored as
/// ordinary inode data through the block machinery; there is no separate
/// metadata path for directories. An empty set serializes to zero bytes so
/// an empty directory owns no blocks.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Directory {
    pub entries: Vec<DirEntry>,
    #[serde(skip)]
    index_map: HashMap<String, usize>, // name -> entries index
}

impl Directory {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index_map: HashMap::new(),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(Self::new());
        }
        let mut dir: Directory = bincode::deserialize(bytes)
            .map_err(|e| FsError::Corrupted(format!("directory payload decode: {}", e)))?;
        dir.rebuild_index_map();
        Ok(dir)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }
        bincode::serialize(self)
            .map_err(|e| FsError::Corrupted(format!("directory payload encode: {}", e)))
    }

    fn rebuild_index_map(&mut self) {
        self.index_map.clear();
        for (i, entry) in self.entries.iter().enumerate() {
            self.index_map.insert(entry.name.clone(), i);
        }
    }

    /// Adds a binding; names are unique within one directory.
    pub fn add(&mut self, name: &str, ino: u64, kind: InodeKind) -> Result<()> {
        if self.index_map.contains_key(name) {
            return Err(FsError::AlreadyExists(name.to_string()));
        }
        self.entries.push(DirEntry {
            name: name.to_string(),
            ino,
            kind,
        });
        self.index_map.insert(name.to_string(), self.entries.len() - 1);
        Ok(())
    }

    /// Removes a binding, returning the inode number it pointed at.
    pub fn remove(&mut self, name: &str) -> Result<u64> {
        match self.index_map.get(name) {
            Some(&idx) => {
                let entry = self.entries.remove(idx);
                self.rebuild_index_map();
                Ok(entry.ino)
            }
            None => Err(FsError::NotFound(name.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&DirEntry> {
        self.index_map.get(name).map(|&idx| &self.entries[idx])
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Listing order: directories first, then lexicographic by name.
    pub fn list_sorted(&self) -> Vec<(String, InodeKind)> {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| match (a.kind, b.kind) {
            (InodeKind::Directory, InodeKind::File) => std::cmp::Ordering::Less,
            (InodeKind::File, InodeKind::Directory) => std::cmp::Ordering::Greater,
            _ => a.name.cmp(&b.name),
        });
        entries.into_iter().map(|e| (e.name, e.kind)).collect()
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}
