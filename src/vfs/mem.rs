//! # In-Memory Working Copy
//!
//! `MemVfs` is the non-persistent filesystem the storage engine actually
//! runs against. Nothing here survives the process; durability comes from
//! the synchronization scheduler copying bytes out to the handle pool.
//!
//! All state sits behind one `parking_lot::Mutex`, because two actors touch
//! it: the engine (single-threaded, between awaited steps) and the flush
//! worker reading dirty pages. Operations are short byte copies, so one lock
//! is enough.
//!
//! Delete-on-close is honored: when the last open of a path carried the
//! flag, closing it removes the file.

use eyre::Result;
use hashbrown::HashMap;
use parking_lot::Mutex;

use super::{FileId, LockLevel, OpenFlags, Vfs, VfsError};

#[derive(Debug)]
struct OpenEntry {
    path: String,
    flags: OpenFlags,
    #[allow(dead_code)]
    lock: LockLevel,
}

#[derive(Debug, Default)]
struct MemState {
    files: HashMap<String, Vec<u8>>,
    open: HashMap<u64, OpenEntry>,
    next_id: u64,
}

/// In-memory filesystem implementing the full [`Vfs`] contract.
#[derive(Debug, Default)]
pub struct MemVfs {
    state: Mutex<MemState>,
}

impl MemVfs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files currently present.
    pub fn file_count(&self) -> usize {
        self.state.lock().files.len()
    }

    /// Full contents of `path`, for callers that need whole-file access
    /// without an open/read/close dance (export, tests).
    pub fn snapshot(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().files.get(path).cloned()
    }
}

impl Vfs for MemVfs {
    fn open(&self, path: &str, flags: OpenFlags) -> Result<FileId> {
        let mut st = self.state.lock();

        if !st.files.contains_key(path) {
            if !flags.contains(OpenFlags::CREATE) {
                return Err(VfsError::NotFound(path.to_string()).into());
            }
            st.files.insert(path.to_string(), Vec::new());
        }

        let id = st.next_id;
        st.next_id += 1;
        st.open.insert(
            id,
            OpenEntry {
                path: path.to_string(),
                flags,
                lock: LockLevel::None,
            },
        );
        Ok(FileId(id))
    }

    fn read(&self, id: FileId, buf: &mut [u8], offset: u64) -> Result<usize> {
        let st = self.state.lock();
        let entry = st.open.get(&id.0).ok_or(VfsError::BadFileId(id.0))?;
        let data = st
            .files
            .get(&entry.path)
            .ok_or_else(|| VfsError::NotFound(entry.path.clone()))?;

        let offset = offset as usize;
        let available = data.len().saturating_sub(offset);
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        buf[n..].fill(0);
        Ok(n)
    }

    fn write(&self, id: FileId, data: &[u8], offset: u64) -> Result<()> {
        let mut st = self.state.lock();
        let path = st
            .open
            .get(&id.0)
            .ok_or(VfsError::BadFileId(id.0))?
            .path
            .clone();
        let file = st
            .files
            .get_mut(&path)
            .ok_or_else(|| VfsError::NotFound(path.clone()))?;

        let end = offset as usize + data.len();
        if file.len() < end {
            file.resize(end, 0);
        }
        file[offset as usize..end].copy_from_slice(data);
        Ok(())
    }

    fn truncate(&self, id: FileId, size: u64) -> Result<()> {
        let mut st = self.state.lock();
        let path = st
            .open
            .get(&id.0)
            .ok_or(VfsError::BadFileId(id.0))?
            .path
            .clone();
        let file = st
            .files
            .get_mut(&path)
            .ok_or_else(|| VfsError::NotFound(path.clone()))?;
        file.resize(size as usize, 0);
        Ok(())
    }

    fn sync(&self, id: FileId) -> Result<()> {
        let st = self.state.lock();
        if !st.open.contains_key(&id.0) {
            return Err(VfsError::BadFileId(id.0).into());
        }
        Ok(())
    }

    fn file_size(&self, id: FileId) -> Result<u64> {
        let st = self.state.lock();
        let entry = st.open.get(&id.0).ok_or(VfsError::BadFileId(id.0))?;
        let data = st
            .files
            .get(&entry.path)
            .ok_or_else(|| VfsError::NotFound(entry.path.clone()))?;
        Ok(data.len() as u64)
    }

    fn close(&self, id: FileId) -> Result<()> {
        let mut st = self.state.lock();
        let entry = st.open.remove(&id.0).ok_or(VfsError::BadFileId(id.0))?;

        let still_open = st.open.values().any(|e| e.path == entry.path);
        if entry.flags.is_delete_on_close() && !still_open {
            st.files.remove(&entry.path);
        }
        Ok(())
    }

    fn access(&self, path: &str) -> Result<bool> {
        Ok(self.state.lock().files.contains_key(path))
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.state.lock().files.remove(path);
        Ok(())
    }
}
