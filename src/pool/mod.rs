//! # Synchronous-Access-Handle Pool
//!
//! `SahPool` presents a bounded set of persistent backing files as a
//! path-addressable virtual filesystem. Backing files are blank capacity
//! until associated with a logical path via the header in
//! [`header`]; the pool is the sole mutator of associations.
//!
//! ## Resource Arena
//!
//! Slots are indices into a fixed arena of live handles. "Deleting" a file
//! reclaims its index (clears the header, drops the payload) and pushes it
//! back on the available stack; the underlying storage is never freed, so
//! forced reclamation during startup is safe and bounded.
//!
//! Invariant maintained everywhere: the available set and the image of the
//! path map are disjoint, and together they cover every slot.
//!
//! ## Open File Table
//!
//! `open` hands out process-lifetime file ids mapping to {path, slot,
//! flags, lock state}. Ids are never reused; closing removes only the table
//! entry, and the pool handle stays associated so the next open of the same
//! path is a map lookup. Concurrent opens of one path share the slot but
//! have independent lock state.
//!
//! ## Startup Reconciliation
//!
//! `SahPool::open_with` enumerates the store and opens every backing file.
//! A file still locked by a stale session is retried with exponential
//! backoff up to a bounded attempt count, then forcibly reclaimed
//! (delete and recreate), an accepted trade-off favoring recoverability of
//! the pool over preserving an unreachable file. Only files of persistent
//! types with a valid digest stay associated; stale digests, foreign flag
//! combinations and delete-on-close leftovers are disassociated on the
//! spot, never surfaced as errors.
//!
//! ## Failure Semantics
//!
//! Pool exhaustion on a create-style open is a hard error
//! ([`VfsError::PoolExhausted`]) surfaced to the caller. Partial writes are
//! I/O errors, never silently accepted. Short reads zero-fill and report
//! the valid byte count, preserving the engine's beyond-EOF-is-zeros
//! expectation.

use std::thread;

use eyre::{Result, WrapErr};
use hashbrown::HashMap;
use log::{debug, info, warn};

use crate::config::PoolConfig;
use crate::store::{AccessHandle, BackingStore};
use crate::vfs::{FileId, LockLevel, OpenFlags, VfsError};

pub mod header;

pub use header::{HEADER_DATA_OFFSET, HEADER_MAX_PATH, HEADER_SIZE};

use header::{clear_association, read_associated_path, set_associated_path};

#[derive(Debug)]
struct Slot<H> {
    name: String,
    handle: H,
}

#[derive(Debug)]
struct OpenFile {
    path: String,
    slot: usize,
    flags: OpenFlags,
    lock: LockLevel,
}

/// Pool of backing-file handles behind a logical-path namespace.
pub struct SahPool<S: BackingStore> {
    store: S,
    cfg: PoolConfig,
    slots: Vec<Slot<S::Handle>>,
    path_map: HashMap<String, usize>,
    available: Vec<usize>,
    open_files: HashMap<u64, OpenFile>,
    next_file_id: u64,
}

impl<S: BackingStore> SahPool<S> {
    /// Opens the pool over `store`, reconciling existing backing files and
    /// provisioning up to `cfg.capacity` slots.
    pub fn open_with(store: S, cfg: PoolConfig) -> Result<Self> {
        let mut pool = Self {
            store,
            cfg,
            slots: Vec::new(),
            path_map: HashMap::new(),
            available: Vec::new(),
            open_files: HashMap::new(),
            next_file_id: 1,
        };
        pool.acquire_access_handles()?;
        Ok(pool)
    }

    /// Opens the pool with default configuration.
    pub fn open(store: S) -> Result<Self> {
        Self::open_with(store, PoolConfig::default())
    }

    fn acquire_access_handles(&mut self) -> Result<()> {
        let names = self
            .store
            .list()
            .wrap_err("failed to enumerate backing store")?;

        for name in names {
            let mut handle = self.open_handle_with_retry(&name)?;

            let slot = self.slots.len();
            match read_associated_path(&mut handle)? {
                Some((path, flags))
                    if flags.is_persistent_type()
                        && !flags.is_delete_on_close()
                        && !self.path_map.contains_key(&path) =>
                {
                    debug!("slot {} carries '{}'", slot, path);
                    self.path_map.insert(path, slot);
                }
                Some((path, _)) => {
                    // Duplicate association or a non-persistent leftover.
                    warn!("reclaiming backing file '{}' (stale '{}')", name, path);
                    clear_association(&mut handle)?;
                    self.available.push(slot);
                }
                None => {
                    self.available.push(slot);
                }
            }
            self.slots.push(Slot { name, handle });
        }

        while self.slots.len() < self.cfg.capacity {
            self.provision_slot()?;
        }

        info!(
            "pool ready: {} slots, {} associated, {} free",
            self.slots.len(),
            self.path_map.len(),
            self.available.len()
        );
        Ok(())
    }

    /// Opens one backing file, retrying lock contention with exponential
    /// backoff; forcibly reclaims the file after the attempt budget.
    fn open_handle_with_retry(&mut self, name: &str) -> Result<S::Handle> {
        let mut backoff = self.cfg.acquire_backoff;
        let attempts = self.cfg.max_acquire_attempts.max(1);

        for attempt in 1..=attempts {
            match self.store.open(name) {
                Ok(handle) => return Ok(handle),
                Err(err) => {
                    let locked = matches!(
                        err.downcast_ref::<VfsError>(),
                        Some(VfsError::Locked { .. })
                    );
                    if !locked {
                        return Err(err);
                    }
                    if attempt == attempts {
                        break;
                    }
                    debug!(
                        "backing file '{}' locked (attempt {}/{}), backing off {:?}",
                        name, attempt, attempts, backoff
                    );
                    thread::sleep(backoff);
                    backoff = backoff.saturating_mul(2);
                }
            }
        }

        // Last resort: destroy the unreachable file so the slot survives.
        // This can lose another live session's in-flight writes.
        warn!(
            "backing file '{}' still locked after {} attempts, reclaiming it",
            name, attempts
        );
        self.store
            .remove(name)
            .wrap_err_with(|| format!("pool initialization failed reclaiming '{}'", name))?;
        self.store
            .create(name)
            .wrap_err_with(|| format!("pool initialization failed recreating '{}'", name))
    }

    fn provision_slot(&mut self) -> Result<usize> {
        let name = self.fresh_name();
        let handle = self
            .store
            .create(&name)
            .wrap_err_with(|| format!("failed to provision backing file '{}'", name))?;
        let slot = self.slots.len();
        self.slots.push(Slot { name, handle });
        self.available.push(slot);
        Ok(slot)
    }

    fn fresh_name(&self) -> String {
        let mut n = self.slots.len();
        loop {
            let name = format!("sah-{:06}", n);
            if !self.slots.iter().any(|s| s.name == name) {
                return name;
            }
            n += 1;
        }
    }

    fn open_entry(&self, id: FileId) -> Result<&OpenFile> {
        self.open_files
            .get(&id.0)
            .ok_or_else(|| VfsError::BadFileId(id.0).into())
    }

    fn slot_handle(&mut self, slot: usize) -> &mut S::Handle {
        &mut self.slots[slot].handle
    }

    /// Takes a free slot and associates it with `path`.
    fn associate_free_slot(&mut self, path: &str, flags: OpenFlags) -> Result<usize> {
        let slot = self.available.pop().ok_or(VfsError::PoolExhausted {
            capacity: self.slots.len(),
        })?;
        set_associated_path(&mut self.slots[slot].handle, path, flags)?;
        self.path_map.insert(path.to_string(), slot);
        Ok(slot)
    }

    // ---- virtual filesystem operations -------------------------------

    /// Opens `path`, reusing an existing association or, with create
    /// semantics, claiming a free slot. Fails with a capacity error when
    /// the pool is exhausted.
    pub fn open_file(&mut self, path: &str, flags: OpenFlags) -> Result<FileId> {
        let slot = match self.path_map.get(path) {
            Some(&slot) => slot,
            None if flags.contains(OpenFlags::CREATE) => self.associate_free_slot(path, flags)?,
            None => return Err(VfsError::NotFound(path.to_string()).into()),
        };

        let id = self.next_file_id;
        self.next_file_id += 1;
        self.open_files.insert(
            id,
            OpenFile {
                path: path.to_string(),
                slot,
                flags,
                lock: LockLevel::None,
            },
        );
        Ok(FileId(id))
    }

    /// Reads from the payload region; the buffer beyond the valid bytes is
    /// zero-filled and the short count is reported, never an error.
    pub fn read(&mut self, id: FileId, buf: &mut [u8], offset: u64) -> Result<usize> {
        let slot = self.open_entry(id)?.slot;
        let n = self
            .slot_handle(slot)
            .read_at(buf, HEADER_DATA_OFFSET + offset)?;
        buf[n..].fill(0);
        Ok(n)
    }

    /// Writes into the payload region. A partial write is an I/O error.
    pub fn write(&mut self, id: FileId, data: &[u8], offset: u64) -> Result<()> {
        let slot = self.open_entry(id)?.slot;
        let written = self
            .slot_handle(slot)
            .write_at(data, HEADER_DATA_OFFSET + offset)?;
        if written != data.len() {
            return Err(VfsError::ShortWrite {
                requested: data.len(),
                written,
            }
            .into());
        }
        Ok(())
    }

    /// Synchronously flushes the backing file. Writes are only durable
    /// once this returns.
    pub fn sync(&mut self, id: FileId) -> Result<()> {
        let slot = self.open_entry(id)?.slot;
        self.slot_handle(slot).flush()
    }

    /// Adjusts payload size; the header region is untouched.
    pub fn truncate(&mut self, id: FileId, size: u64) -> Result<()> {
        let slot = self.open_entry(id)?.slot;
        self.slot_handle(slot).truncate(HEADER_DATA_OFFSET + size)
    }

    /// Payload size only; the header never counts.
    pub fn file_size(&mut self, id: FileId) -> Result<u64> {
        let slot = self.open_entry(id)?.slot;
        let raw = self.slot_handle(slot).size()?;
        Ok(raw.saturating_sub(HEADER_DATA_OFFSET))
    }

    /// Drops the open-file entry. The slot stays associated and pooled, so
    /// the next open of the same path is cheap. Delete-on-close files are
    /// deleted when their last open goes away.
    pub fn close(&mut self, id: FileId) -> Result<()> {
        let entry = self
            .open_files
            .remove(&id.0)
            .ok_or(VfsError::BadFileId(id.0))?;

        let still_open = self.open_files.values().any(|e| e.path == entry.path);
        if entry.flags.is_delete_on_close() && !still_open {
            self.delete_path(&entry.path)?;
        }
        Ok(())
    }

    /// O(1) membership test against the association map.
    pub fn access(&self, path: &str) -> bool {
        self.path_map.contains_key(path)
    }

    /// Disassociates `path`: clears the header, drops the payload, returns
    /// the slot to the available set. Unknown paths are a no-op.
    pub fn delete_path(&mut self, path: &str) -> Result<()> {
        let Some(slot) = self.path_map.remove(path) else {
            return Ok(());
        };
        clear_association(&mut self.slots[slot].handle)?;
        self.available.push(slot);

        let stale: Vec<u64> = self
            .open_files
            .iter()
            .filter(|(_, e)| e.path == path)
            .map(|(&id, _)| id)
            .collect();
        for id in stale {
            self.open_files.remove(&id);
        }
        Ok(())
    }

    /// Records the lock level for one open file. Bookkeeping only.
    pub fn lock(&mut self, id: FileId, level: LockLevel) -> Result<()> {
        let entry = self
            .open_files
            .get_mut(&id.0)
            .ok_or(VfsError::BadFileId(id.0))?;
        entry.lock = level;
        Ok(())
    }

    pub fn unlock(&mut self, id: FileId) -> Result<()> {
        self.lock(id, LockLevel::None)
    }

    pub fn lock_level(&self, id: FileId) -> Result<LockLevel> {
        Ok(self.open_entry(id)?.lock)
    }

    // ---- bulk operations ---------------------------------------------

    /// Logical paths currently persisted, unordered.
    pub fn list_paths(&self) -> Vec<String> {
        self.path_map.keys().cloned().collect()
    }

    /// Full payload bytes of `path`. Fails if the path is not associated.
    pub fn export(&mut self, path: &str) -> Result<Vec<u8>> {
        self.load(path)?
            .ok_or_else(|| VfsError::NotFound(path.to_string()).into())
    }

    /// Full payload bytes of `path`, or `None` when nothing is persisted
    /// under that name.
    pub fn load(&mut self, path: &str) -> Result<Option<Vec<u8>>> {
        let Some(&slot) = self.path_map.get(path) else {
            return Ok(None);
        };
        let handle = &mut self.slots[slot].handle;
        let size = handle.size()?.saturating_sub(HEADER_DATA_OFFSET) as usize;
        let mut data = vec![0u8; size];
        let n = handle.read_at(&mut data, HEADER_DATA_OFFSET)?;
        if n != size {
            return Err(VfsError::ShortRead {
                requested: size,
                read: n,
            }
            .into());
        }
        Ok(Some(data))
    }

    /// Imports `data` as the full content of `path`, associating a free
    /// slot when the path is new. The previous payload is replaced.
    pub fn import(&mut self, path: &str, data: &[u8]) -> Result<()> {
        let slot = match self.path_map.get(path) {
            Some(&slot) => slot,
            None => self.associate_free_slot(path, OpenFlags::MAIN_DB)?,
        };
        let handle = &mut self.slots[slot].handle;
        handle.truncate(HEADER_DATA_OFFSET + data.len() as u64)?;
        let written = handle.write_at(data, HEADER_DATA_OFFSET)?;
        if written != data.len() {
            return Err(VfsError::ShortWrite {
                requested: data.len(),
                written,
            }
            .into());
        }
        handle.flush()?;
        Ok(())
    }

    /// Applies sparse writes (payload offset, bytes) to `path`, truncates
    /// the payload to `size`, and flushes. This is the incremental-sync
    /// entry point: only the dirty byte ranges cross into the store.
    pub fn persist(&mut self, path: &str, writes: &[(u64, Vec<u8>)], size: u64) -> Result<()> {
        let slot = match self.path_map.get(path) {
            Some(&slot) => slot,
            None => self.associate_free_slot(path, OpenFlags::MAIN_DB)?,
        };
        let handle = &mut self.slots[slot].handle;
        for (offset, data) in writes {
            let written = handle.write_at(data, HEADER_DATA_OFFSET + offset)?;
            if written != data.len() {
                return Err(VfsError::ShortWrite {
                    requested: data.len(),
                    written,
                }
                .into());
            }
        }
        handle.truncate(HEADER_DATA_OFFSET + size)?;
        handle.flush()?;
        debug!(
            "persisted '{}': {} ranges, payload {} bytes",
            path,
            writes.len(),
            size
        );
        Ok(())
    }

    // ---- capacity ----------------------------------------------------

    /// Total slot count. Grows only.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn available_count(&self) -> usize {
        self.available.len()
    }

    pub fn associated_count(&self) -> usize {
        self.path_map.len()
    }

    /// Provisions `n` more backing files. Returns the new capacity.
    pub fn add_capacity(&mut self, n: usize) -> Result<usize> {
        for _ in 0..n {
            self.provision_slot()?;
        }
        Ok(self.slots.len())
    }
}

impl<S: BackingStore> std::fmt::Debug for SahPool<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SahPool")
            .field("capacity", &self.slots.len())
            .field("associated", &self.path_map.len())
            .field("available", &self.available.len())
            .field("open_files", &self.open_files.len())
            .finish()
    }
}
