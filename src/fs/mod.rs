use std::collections::{BTreeMap, HashSet};

use log::{info, warn};

use crate::disk::BlockDevice;
use crate::fs::{
    block_bitmap::BlockBitmap,
    block_store::BlockStore,
    config::{Geometry, ROOT_INO},
    directory::Directory,
    error::{FsError, Result},
    inode_table::{Inode, InodeKind, InodeTable},
    journal::{IntentRecord, Journal, OpKind},
    super_block::{FsFlags, SuperBlock},
};

pub mod block_bitmap;
pub mod block_store;
pub mod config;
pub mod directory;
pub mod error;
pub mod inode_table;
pub mod journal;
pub mod super_block;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Append,
    Overwrite,
}

/// The filesystem engine: block store, bitmap, inode/directory layer and
/// journal behind a path-level façade.
///
/// Every mutating operation follows the write-ahead protocol: validate and
/// plan the mutation against a scratch bitmap, journal the intent (target
/// states only), apply it to the live state, then journal the commit. A
/// failure during validation leaves no trace; a crash between intent and
/// commit is rolled back by [`FileSystem::recover`].
#[derive(Debug)]
pub struct FileSystem<D: BlockDevice> {
    disk: D,
    pub super_block: SuperBlock,
    pub bitmap: BlockBitmap,
    pub inode_table: InodeTable,
    pub block_store: BlockStore,
    pub journal: Journal,
    crash_armed: bool,
    crashed: bool,
}

/// Staged mutation of one operation. Allocation decisions are made against a
/// scratch copy of the bitmap so nothing touches live state before the
/// intent is journaled; the maps hold the target states the intent will
/// carry. Last write wins per index, which is exactly the target-state
/// semantics replay needs.
struct OpPlan {
    op: OpKind,
    path: String,
    scratch: BlockBitmap,
    bits: BTreeMap<u64, bool>,
    inodes: BTreeMap<u64, Option<Inode>>,
    blocks: BTreeMap<u64, Vec<u8>>,
}

impl OpPlan {
    fn alloc_block(&mut self) -> Result<u64> {
        let b = self.scratch.allocate()?;
        self.bits.insert(b, true);
        Ok(b)
    }

    fn free_block(&mut self, b: u64) -> Result<()> {
        self.scratch.free(b)?;
        self.bits.insert(b, false);
        Ok(())
    }

    fn put_block(&mut self, b: u64, buf: Vec<u8>) {
        self.blocks.insert(b, buf);
    }

    fn set_inode(&mut self, ino: u64, slot: Option<Inode>) {
        self.inodes.insert(ino, slot);
    }

    fn into_intent(self) -> IntentRecord {
        IntentRecord {
            seq: 0, // assigned by the journal at begin
            op: self.op,
            path: self.path,
            bits: self.bits.into_iter().collect(),
            inodes: self.inodes.into_iter().collect(),
            blocks: self.blocks.into_iter().collect(),
        }
    }
}

impl<D: BlockDevice> FileSystem<D> {
    /// Formats a fresh image: writes the superblock, empty bitmap, inode
    /// table with the root directory installed, and an empty journal, then
    /// returns the mounted engine.
    pub fn format(disk: D, geometry: Geometry) -> Result<Self> {
        geometry.validate()?;
        if disk.block_size() != geometry.block_size {
            return Err(FsError::Corrupted(format!(
                "device block size {} does not match geometry block size {}",
                disk.block_size(),
                geometry.block_size
            )));
        }
        if disk.num_blocks() < geometry.device_blocks() {
            return Err(FsError::Corrupted(format!(
                "device holds {} blocks, geometry needs {}",
                disk.num_blocks(),
                geometry.device_blocks()
            )));
        }

        let mut super_block = SuperBlock::new(geometry.clone());
        super_block.set_flag(FsFlags::MOUNTED, true);

        let bitmap = BlockBitmap::new(geometry.total_blocks, super_block.bitmap_start);
        let mut inode_table =
            InodeTable::new(geometry.total_inodes, super_block.inode_table_start);
        inode_table.set_slot(ROOT_INO, Some(Inode::new(ROOT_INO, InodeKind::Directory)))?;
        let block_store =
            BlockStore::new(geometry.total_blocks, geometry.block_size, super_block.data_start);
        let journal = Journal::format(&disk, super_block.journal_start, geometry.journal_blocks)?;

        let mut fs = Self {
            disk,
            super_block,
            bitmap,
            inode_table,
            block_store,
            journal,
            crash_armed: false,
            crashed: false,
        };
        fs.bitmap.sync(&fs.disk)?;
        fs.inode_table.sync(&fs.disk)?;
        fs.block_store.sync(&fs.disk)?;
        fs.super_block.sync(&fs.disk)?;

        info!(
            "formatted volume {}: {} data blocks of {} bytes, {} inodes",
            fs.super_block.volume_id,
            geometry.total_blocks,
            geometry.block_size,
            geometry.total_inodes
        );
        Ok(fs)
    }

    /// Mounts an existing image. Recovery runs exactly once here, before any
    /// operation is accepted.
    pub fn mount(disk: D) -> Result<Self> {
        let super_block = SuperBlock::load(&disk)?;
        let geometry = super_block.geometry.clone();

        let mut fs = Self {
            bitmap: BlockBitmap::new(geometry.total_blocks, super_block.bitmap_start),
            inode_table: InodeTable::new(geometry.total_inodes, super_block.inode_table_start),
            block_store: BlockStore::new(
                geometry.total_blocks,
                geometry.block_size,
                super_block.data_start,
            ),
            journal: Journal::empty(
                super_block.journal_start,
                geometry.journal_blocks,
                geometry.block_size,
            ),
            super_block,
            disk,
            crash_armed: false,
            crashed: false,
        };
        fs.recover()?;
        fs.super_block.set_flag(FsFlags::MOUNTED, true);
        info!("mounted volume {}", fs.super_block.volume_id);
        Ok(fs)
    }

    /// Reconciles journal and data state: reloads the last checkpoint
    /// snapshot from the device, replays every committed intent in order and
    /// discards the rest, then verifies the bitmap/inode invariant. Running
    /// it again with nothing new to redo yields the same state.
    pub fn recover(&mut self) -> Result<()> {
        self.super_block = SuperBlock::load(&self.disk)?;
        let geometry = self.super_block.geometry.clone();

        self.bitmap =
            BlockBitmap::load(&self.disk, self.super_block.bitmap_start, geometry.total_blocks)?;
        self.inode_table = InodeTable::load(
            &self.disk,
            self.super_block.inode_table_start,
            geometry.total_inodes,
        )?;
        self.block_store = BlockStore::new(
            geometry.total_blocks,
            geometry.block_size,
            self.super_block.data_start,
        );
        self.block_store.load(&self.disk)?;
        self.journal =
            Journal::load(&self.disk, self.super_block.journal_start, geometry.journal_blocks)?;

        let redo: Vec<IntentRecord> = self
            .journal
            .committed_intents()
            .into_iter()
            .cloned()
            .collect();
        let total = self.journal.records().len();
        for intent in &redo {
            self.apply_intent(intent)?;
        }

        self.crashed = false;
        self.crash_armed = false;
        self.check_consistency()?;
        info!(
            "recovery complete: {} committed intents replayed, {} journal records scanned",
            redo.len(),
            total
        );
        Ok(())
    }

    /// Syncs the full live state to the device and truncates the journal
    /// behind a checkpoint marker. Pure optimization to bound log growth;
    /// recovery behavior is unchanged by when this runs.
    pub fn checkpoint(&mut self) -> Result<()> {
        self.ensure_ready()?;
        self.super_block.free_blocks = self.bitmap.count_free();
        self.super_block.free_inodes = self.inode_table.count_free();

        self.bitmap.sync(&self.disk)?;
        self.inode_table.sync(&self.disk)?;
        self.block_store.sync(&self.disk)?;
        self.super_block.sync(&self.disk)?;
        self.journal.truncate(&self.disk, self.journal.last_committed_seq())?;
        Ok(())
    }

    /// Orderly shutdown: checkpoint, clear the mounted flag and hand the
    /// device image back.
    pub fn unmount(mut self) -> Result<D> {
        self.checkpoint()?;
        self.super_block.set_flag(FsFlags::MOUNTED, false);
        self.super_block.sync(&self.disk)?;
        info!("unmounted volume {}", self.super_block.volume_id);
        Ok(self.disk)
    }

    /// Makes the next mutating operation stop after its intent is journaled
    /// and before commit, simulating a crash at the vulnerable point.
    pub fn arm_crash(&mut self) {
        self.crash_armed = true;
    }

    /// Simulates a power loss between operations. The engine rejects
    /// everything until `recover` completes.
    pub fn crash(&mut self) {
        warn!("simulated crash");
        self.crashed = true;
    }

    pub fn free_blocks(&self) -> u64 {
        self.bitmap.count_free()
    }

    // ---------------- façade operations ----------------

    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        self.ensure_ready()?;
        let (parent, name) = self.resolve_parent(path)?;
        let mut dir = self.load_directory(parent)?;
        if dir.get(&name).is_some() {
            return Err(FsError::AlreadyExists(path.to_string()));
        }

        let mut plan = self.new_plan(OpKind::Mkdir, path);
        let ino = self.plan_alloc_inode(&mut plan, InodeKind::Directory)?;
        dir.add(&name, ino, InodeKind::Directory)?;
        self.plan_store_directory(&mut plan, parent, &dir)?;
        self.run_op(plan)
    }

    /// Creates an empty file, returning its inode number.
    pub fn create_file(&mut self, path: &str) -> Result<u64> {
        self.ensure_ready()?;
        let (parent, name) = self.resolve_parent(path)?;
        let mut dir = self.load_directory(parent)?;
        if dir.get(&name).is_some() {
            return Err(FsError::AlreadyExists(path.to_string()));
        }

        let mut plan = self.new_plan(OpKind::CreateFile, path);
        let ino = self.plan_alloc_inode(&mut plan, InodeKind::File)?;
        dir.add(&name, ino, InodeKind::File)?;
        self.plan_store_directory(&mut plan, parent, &dir)?;
        self.run_op(plan)?;
        Ok(ino)
    }

    /// Writes file content, returning the number of bytes written.
    pub fn write(&mut self, path: &str, data: &[u8], mode: WriteMode) -> Result<usize> {
        self.ensure_ready()?;
        let ino = self.resolve(path)?;
        if self.inode_table.get(ino)?.is_dir() {
            return Err(FsError::IsADirectory(path.to_string()));
        }

        let mut plan = self.new_plan(OpKind::Write, path);
        match mode {
            WriteMode::Overwrite => self.plan_set_data(&mut plan, ino, data)?,
            WriteMode::Append => self.plan_append_data(&mut plan, ino, data)?,
        }
        self.run_op(plan)?;
        Ok(data.len())
    }

    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.ensure_ready()?;
        let ino = self.resolve(path)?;
        let inode = self.inode_table.get(ino)?;
        if inode.is_dir() {
            return Err(FsError::IsADirectory(path.to_string()));
        }
        self.read_data(ino, 0, inode.size)
    }

    pub fn delete(&mut self, path: &str) -> Result<()> {
        self.ensure_ready()?;
        let (parent, name) = self.resolve_parent(path)?;
        let mut dir = self.load_directory(parent)?;
        let ino = match dir.get(&name) {
            Some(entry) => entry.ino,
            None => return Err(FsError::NotFound(path.to_string())),
        };

        if self.inode_table.get(ino)?.is_dir() {
            let victim = self.load_directory(ino)?;
            if !victim.is_empty() {
                return Err(FsError::NotEmpty(path.to_string()));
            }
        }

        let mut plan = self.new_plan(OpKind::Delete, path);
        self.plan_free_inode(&mut plan, ino)?;
        dir.remove(&name)?;
        self.plan_store_directory(&mut plan, parent, &dir)?;
        self.run_op(plan)
    }

    pub fn list(&self, path: &str) -> Result<Vec<(String, InodeKind)>> {
        self.ensure_ready()?;
        let ino = self.resolve(path)?;
        if !self.inode_table.get(ino)?.is_dir() {
            return Err(FsError::NotADirectory(path.to_string()));
        }
        Ok(self.load_directory(ino)?.list_sorted())
    }

    // ---------------- path and data layer ----------------

    /// Walks an absolute path from the root, following directory entries.
    pub fn resolve(&self, path: &str) -> Result<u64> {
        let comps = split_path(path)?;
        let mut cur = ROOT_INO;
        for comp in comps {
            if !self.inode_table.get(cur)?.is_dir() {
                return Err(FsError::NotADirectory(path.to_string()));
            }
            let dir = self.load_directory(cur)?;
            cur = match dir.get(comp) {
                Some(entry) => entry.ino,
                None => return Err(FsError::NotFound(path.to_string())),
            };
        }
        Ok(cur)
    }

    /// Resolves the parent directory of `path` and splits off the final
    /// component. The root itself has no parent.
    fn resolve_parent(&self, path: &str) -> Result<(u64, String)> {
        let comps = split_path(path)?;
        let name = match comps.last() {
            Some(n) => n.to_string(),
            None => return Err(FsError::InvalidPath(path.to_string())),
        };

        let mut cur = ROOT_INO;
        for &comp in &comps[..comps.len() - 1] {
            if !self.inode_table.get(cur)?.is_dir() {
                return Err(FsError::NotADirectory(path.to_string()));
            }
            let dir = self.load_directory(cur)?;
            cur = match dir.get(comp) {
                Some(entry) => entry.ino,
                None => return Err(FsError::NotFound(path.to_string())),
            };
        }
        if !self.inode_table.get(cur)?.is_dir() {
            return Err(FsError::NotADirectory(path.to_string()));
        }
        Ok((cur, name))
    }

    /// Reads up to `length` bytes of an inode's content starting at
    /// `offset`. Short read at end of file, never an error; an offset past
    /// the end is.
    pub fn read_data(&self, ino: u64, offset: u64, length: u64) -> Result<Vec<u8>> {
        let inode = self.inode_table.get(ino)?;
        if offset > inode.size {
            return Err(FsError::OutOfRange(offset));
        }
        let bs = self.block_store.block_size() as u64;
        let end = inode.size.min(offset.saturating_add(length));

        let mut out = Vec::with_capacity((end - offset) as usize);
        let mut pos = offset;
        while pos < end {
            let list_index = (pos / bs) as usize;
            let within = (pos % bs) as usize;
            let block_index = *inode
                .blocks
                .get(list_index)
                .ok_or_else(|| FsError::Corrupted(format!("inode {} block list too short", ino)))?;
            let block = self.block_store.read_block(block_index)?;
            let take = ((bs - within as u64).min(end - pos)) as usize;
            out.extend_from_slice(&block[within..within + take]);
            pos += take as u64;
        }
        Ok(out)
    }

    /// Materializes a directory inode's entry set from its data blocks.
    fn load_directory(&self, ino: u64) -> Result<Directory> {
        let inode = self.inode_table.get(ino)?;
        if !inode.is_dir() {
            return Err(FsError::NotADirectory(format!("inode {}", ino)));
        }
        let bytes = self.read_data(ino, 0, inode.size)?;
        Directory::from_bytes(&bytes)
    }

    /// Verifies the allocation-exclusivity invariant: the used-bit set must
    /// equal the union of live block lists, with no duplicates.
    pub fn check_consistency(&self) -> Result<()> {
        let mut referenced = HashSet::new();
        for inode in self.inode_table.live_inodes() {
            for &b in &inode.blocks {
                if !referenced.insert(b) {
                    return Err(FsError::Corrupted(format!(
                        "block {} referenced by more than one inode",
                        b
                    )));
                }
            }
        }
        for b in 0..self.bitmap.total_blocks() {
            match (self.bitmap.is_used(b), referenced.contains(&b)) {
                (true, false) => {
                    return Err(FsError::Corrupted(format!("orphan block {}", b)));
                }
                (false, true) => {
                    return Err(FsError::Corrupted(format!(
                        "block {} referenced but marked free",
                        b
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    // ---------------- planning ----------------

    fn new_plan(&self, op: OpKind, path: &str) -> OpPlan {
        OpPlan {
            op,
            path: path.to_string(),
            scratch: self.bitmap.clone(),
            bits: BTreeMap::new(),
            inodes: BTreeMap::new(),
            blocks: BTreeMap::new(),
        }
    }

    /// The inode as this plan will leave it, falling back to the live table.
    fn current_inode(&self, plan: &OpPlan, ino: u64) -> Result<Inode> {
        match plan.inodes.get(&ino) {
            Some(Some(inode)) => Ok(inode.clone()),
            Some(None) => Err(FsError::InvalidInode(ino)),
            None => self.inode_table.get(ino).cloned(),
        }
    }

    /// Picks the lowest inode slot that is free once this plan's slot
    /// mutations are taken into account, same scratch idea as the bitmap.
    fn plan_alloc_inode(&self, plan: &mut OpPlan, kind: InodeKind) -> Result<u64> {
        let mut scratch = self.inode_table.clone();
        for (&ino, slot) in &plan.inodes {
            scratch.set_slot(ino, slot.clone())?;
        }
        let ino = scratch.first_free()?;
        plan.set_inode(ino, Some(Inode::new(ino, kind)));
        Ok(ino)
    }

    /// Releases every block the inode owns and clears its slot. Directories
    /// must already be empty; the caller checks.
    fn plan_free_inode(&self, plan: &mut OpPlan, ino: u64) -> Result<()> {
        let inode = self.current_inode(plan, ino)?;
        for &b in &inode.blocks {
            plan.free_block(b)?;
        }
        plan.set_inode(ino, None);
        Ok(())
    }

    /// Overwrite semantics: the old block list is released and the content
    /// is laid out afresh, each chunk zero-padded to a full block.
    fn plan_set_data(&self, plan: &mut OpPlan, ino: u64, data: &[u8]) -> Result<()> {
        let mut inode = self.current_inode(plan, ino)?;
        for &b in &inode.blocks {
            plan.free_block(b)?;
        }

        let bs = self.block_store.block_size();
        let mut blocks = Vec::with_capacity((data.len() + bs - 1) / bs);
        for chunk in data.chunks(bs) {
            let b = plan.alloc_block()?;
            let mut buf = vec![0u8; bs];
            buf[..chunk.len()].copy_from_slice(chunk);
            plan.put_block(b, buf);
            blocks.push(b);
        }

        inode.blocks = blocks;
        inode.size = data.len() as u64;
        inode.touch();
        plan.set_inode(ino, Some(inode));
        Ok(())
    }

    /// Append semantics: the partial tail block is rewritten with the new
    /// bytes folded in, the rest goes into freshly allocated blocks.
    fn plan_append_data(&self, plan: &mut OpPlan, ino: u64, data: &[u8]) -> Result<()> {
        let mut inode = self.current_inode(plan, ino)?;
        let bs = self.block_store.block_size();
        let mut remaining = data;

        let tail = (inode.size % bs as u64) as usize;
        if tail != 0 && !remaining.is_empty() {
            let last = *inode
                .blocks
                .last()
                .ok_or_else(|| FsError::Corrupted(format!("inode {} size without blocks", ino)))?;
            let mut buf = self.block_store.read_block(last)?.to_vec();
            let take = (bs - tail).min(remaining.len());
            buf[tail..tail + take].copy_from_slice(&remaining[..take]);
            plan.put_block(last, buf);
            remaining = &remaining[take..];
        }

        for chunk in remaining.chunks(bs) {
            let b = plan.alloc_block()?;
            let mut buf = vec![0u8; bs];
            buf[..chunk.len()].copy_from_slice(chunk);
            plan.put_block(b, buf);
            inode.blocks.push(b);
        }

        inode.size += data.len() as u64;
        inode.touch();
        plan.set_inode(ino, Some(inode));
        Ok(())
    }

    /// Stores a directory's entry set as ordinary inode data.
    fn plan_store_directory(&self, plan: &mut OpPlan, ino: u64, dir: &Directory) -> Result<()> {
        let bytes = dir.to_bytes()?;
        self.plan_set_data(plan, ino, &bytes)
    }

    // ---------------- write-ahead execution ----------------

    /// Intent → apply → commit. The journal append happens before any live
    /// mutation; an armed crash fires between intent and commit.
    fn run_op(&mut self, plan: OpPlan) -> Result<()> {
        let intent = plan.into_intent();
        if !self.journal.fits(&intent)? {
            self.checkpoint()?;
            if !self.journal.fits(&intent)? {
                return Err(FsError::OutOfSpace);
            }
        }

        let staged = intent.clone();
        let seq = self.journal.begin(&self.disk, intent)?;

        if self.crash_armed {
            self.crash_armed = false;
            self.crashed = true;
            warn!("simulated crash after intent {}, before commit", seq);
            return Err(FsError::Crashed);
        }

        self.apply_intent(&staged)?;
        self.journal.commit(&self.disk, seq)
    }

    /// Applies an intent's target states. Shared by live execution and
    /// recovery replay, so replaying onto state that already reflects the
    /// intent is a no-op.
    fn apply_intent(&mut self, intent: &IntentRecord) -> Result<()> {
        for &(b, used) in &intent.bits {
            self.bitmap.set_bit(b, used)?;
        }
        for (ino, slot) in &intent.inodes {
            self.inode_table.set_slot(*ino, slot.clone())?;
        }
        for (b, buf) in &intent.blocks {
            self.block_store.write_block(*b, buf)?;
        }
        Ok(())
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.crashed {
            return Err(FsError::Crashed);
        }
        Ok(())
    }
}

/// Splits an absolute path into components. Repeated slashes collapse; the
/// root is the empty component list.
fn split_path(path: &str) -> Result<Vec<&str>> {
    if !path.starts_with('/') {
        return Err(FsError::InvalidPath(path.to_string()));
    }
    Ok(path.split('/').filter(|c| !c.is_empty()).collect())
}
