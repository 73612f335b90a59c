use std::collections::HashSet;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::disk::{read_region, write_region, BlockDevice};
use crate::fs::error::{FsError, Result};
use crate::fs::inode_table::Inode;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Mkdir,
    CreateFile,
    Write,
    Delete,
}

/// Intent record: the complete *target state* of one operation's mutations.
/// Target states rather than deltas make redo naturally idempotent — a
/// replay onto data that already reflects the operation changes nothing.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct IntentRecord {
    pub seq: u64,
    pub op: OpKind,
    pub path: String,
    /// target bitmap bit values: (data block index, used)
    pub bits: Vec<(u64, bool)>,
    /// target inode slots: `None` frees the slot
    pub inodes: Vec<(u64, Option<Inode>)>,
    /// target block images, zero-padded to a full block
    pub blocks: Vec<(u64, Vec<u8>)>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum JournalRecord {
    Intent(IntentRecord),
    Commit { seq: u64 },
    Checkpoint { seq: u64 },
}

/// Write-ahead journal. Records are kept in order and rewritten to the
/// journal region on every append, so the image always carries the log ahead
/// of any snapshot mutation. Bounded by the region size; the façade
/// checkpoints to truncate it.
#[derive(Debug)]
pub struct Journal {
    records: Vec<JournalRecord>,
    start_block: u64,
    capacity_blocks: u64,
    block_size: usize,
    next_seq: u64,
    checkpoint_seq: u64,
}

impl Journal {
    /// Placeholder with no records, not written to the device. Mount uses
    /// this before recovery loads the real journal from the region.
    pub fn empty(start_block: u64, capacity_blocks: u64, block_size: usize) -> Self {
        Self {
            records: Vec::new(),
            start_block,
            capacity_blocks,
            block_size,
            next_seq: 1,
            checkpoint_seq: 0,
        }
    }

    pub fn format<D: BlockDevice>(disk: &D, start_block: u64, capacity_blocks: u64) -> Result<Self> {
        let journal = Self {
            records: Vec::new(),
            start_block,
            capacity_blocks,
            block_size: disk.block_size(),
            next_seq: 1,
            checkpoint_seq: 0,
        };
        journal.sync(disk)?;
        Ok(journal)
    }

    /// Loads and validates the journal region. A commit must follow its
    /// intent within the region; sequence numbers must not repeat.
    pub fn load<D: BlockDevice>(disk: &D, start_block: u64, capacity_blocks: u64) -> Result<Self> {
        let bytes = read_region(disk, start_block)
            .map_err(|e| FsError::CorruptJournal(format!("region read: {}", e)))?;
        let records: Vec<JournalRecord> = bincode::deserialize(&bytes)
            .map_err(|e| FsError::CorruptJournal(format!("record decode: {}", e)))?;

        let mut seen = HashSet::new();
        let mut max_seq = 0;
        let mut checkpoint_seq = 0;
        for record in &records {
            match record {
                JournalRecord::Intent(intent) => {
                    if !seen.insert(intent.seq) {
                        return Err(FsError::CorruptJournal(format!(
                            "duplicate intent seq {}",
                            intent.seq
                        )));
                    }
                    max_seq = max_seq.max(intent.seq);
                }
                JournalRecord::Commit { seq } => {
                    if !seen.contains(seq) {
                        return Err(FsError::CorruptJournal(format!(
                            "commit {} without a preceding intent",
                            seq
                        )));
                    }
                    max_seq = max_seq.max(*seq);
                }
                JournalRecord::Checkpoint { seq } => {
                    checkpoint_seq = checkpoint_seq.max(*seq);
                    max_seq = max_seq.max(*seq);
                }
            }
        }

        debug!(
            "journal loaded: {} records, next seq {}",
            records.len(),
            max_seq + 1
        );
        Ok(Self {
            records,
            start_block,
            capacity_blocks,
            block_size: disk.block_size(),
            next_seq: max_seq + 1,
            checkpoint_seq,
        })
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Whether appending this intent plus its eventual commit record still
    /// fits the journal region.
    pub fn fits(&self, intent: &IntentRecord) -> Result<bool> {
        let current = bincode::serialized_size(&self.records)
            .map_err(|e| FsError::CorruptJournal(format!("size probe: {}", e)))?;
        let intent_size = bincode::serialized_size(intent)
            .map_err(|e| FsError::CorruptJournal(format!("size probe: {}", e)))?;
        // enum tags for the intent and commit records, plus the commit seq
        let needed = current + intent_size + 4 + 12;
        let capacity = self.capacity_blocks * self.block_size as u64 - 8;
        Ok(needed <= capacity)
    }

    /// Appends the intent and syncs the region: the write-ahead step. The
    /// returned handle (sequence number) is what `commit` closes.
    pub fn begin<D: BlockDevice>(&mut self, disk: &D, mut intent: IntentRecord) -> Result<u64> {
        if !self.fits(&intent)? {
            return Err(FsError::OutOfSpace);
        }
        intent.seq = self.next_seq;
        self.next_seq += 1;
        let seq = intent.seq;

        debug!("journal intent {}: {:?} {}", seq, intent.op, intent.path);
        self.records.push(JournalRecord::Intent(intent));
        self.sync(disk)?;
        Ok(seq)
    }

    pub fn commit<D: BlockDevice>(&mut self, disk: &D, seq: u64) -> Result<()> {
        debug!("journal commit {}", seq);
        self.records.push(JournalRecord::Commit { seq });
        self.sync(disk)
    }

    /// Discards everything up to `seq`, leaving a checkpoint marker. Only
    /// legal once the base snapshot reflects every commit at or below `seq`.
    pub fn truncate<D: BlockDevice>(&mut self, disk: &D, seq: u64) -> Result<()> {
        info!("journal truncated at seq {}", seq);
        self.records = vec![JournalRecord::Checkpoint { seq }];
        self.checkpoint_seq = seq;
        self.sync(disk)
    }

    /// Intents with a matching commit, in append order: the redo set.
    pub fn committed_intents(&self) -> Vec<&IntentRecord> {
        let committed: HashSet<u64> = self
            .records
            .iter()
            .filter_map(|r| match r {
                JournalRecord::Commit { seq } => Some(*seq),
                _ => None,
            })
            .collect();

        self.records
            .iter()
            .filter_map(|r| match r {
                JournalRecord::Intent(intent) if committed.contains(&intent.seq) => Some(intent),
                _ => None,
            })
            .collect()
    }

    /// Highest committed sequence number, or the checkpoint floor.
    pub fn last_committed_seq(&self) -> u64 {
        self.records
            .iter()
            .filter_map(|r| match r {
                JournalRecord::Commit { seq } => Some(*seq),
                _ => None,
            })
            .max()
            .unwrap_or(self.checkpoint_seq)
    }

    pub fn records(&self) -> &[JournalRecord] {
        &self.records
    }

    fn sync<D: BlockDevice>(&self, disk: &D) -> Result<()> {
        let bytes = bincode::serialize(&self.records)
            .map_err(|e| FsError::CorruptJournal(format!("record encode: {}", e)))?;
        if bytes.len() as u64 + 8 > self.capacity_blocks * self.block_size as u64 {
            return Err(FsError::OutOfSpace);
        }
        write_region(disk, self.start_block, &bytes)?;
        Ok(())
    }
}
