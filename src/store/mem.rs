//! # In-Memory Backing Store
//!
//! `MemStore` keeps blobs in shared memory behind an `Arc`, so cloning the
//! store yields another view of the same persistent area. That is exactly
//! what pool tests need: drop a pool, build a new one over a clone, and the
//! "durable" bytes are still there.
//!
//! Lock contention is injectable: `hold_lock(name, n)` makes the next `n`
//! opens of `name` fail as if a stale session still held the handle, which
//! is how the bounded-retry and forced-reclamation paths get exercised.

use std::sync::Arc;

use eyre::Result;
use hashbrown::HashMap;
use parking_lot::Mutex;

use super::{AccessHandle, BackingStore};
use crate::vfs::VfsError;

type Blob = Arc<Mutex<Vec<u8>>>;

#[derive(Debug, Default)]
struct MemStoreInner {
    blobs: Mutex<HashMap<String, Blob>>,
    // name -> remaining opens that must fail with a lock error
    held: Mutex<HashMap<String, u32>>,
}

/// Shared in-memory implementation of [`BackingStore`].
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    inner: Arc<MemStoreInner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `attempts` opens of `name` fail with a lock error.
    pub fn hold_lock(&self, name: &str, attempts: u32) {
        self.inner.held.lock().insert(name.to_string(), attempts);
    }

    pub fn blob_count(&self) -> usize {
        self.inner.blobs.lock().len()
    }
}

/// Handle to one in-memory blob. The blob outlives the handle; a re-open
/// sees every flushed (and, here, every written) byte.
#[derive(Debug)]
pub struct MemHandle {
    data: Blob,
}

impl AccessHandle for MemHandle {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let data = self.data.lock();
        let offset = offset as usize;
        let available = data.len().saturating_sub(offset);
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    fn write_at(&mut self, data: &[u8], offset: u64) -> Result<usize> {
        let mut blob = self.data.lock();
        let end = offset as usize + data.len();
        if blob.len() < end {
            blob.resize(end, 0);
        }
        blob[offset as usize..end].copy_from_slice(data);
        Ok(data.len())
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        self.data.lock().resize(size as usize, 0);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn size(&mut self) -> Result<u64> {
        Ok(self.data.lock().len() as u64)
    }
}

impl BackingStore for MemStore {
    type Handle = MemHandle;

    fn create(&mut self, name: &str) -> Result<Self::Handle> {
        let mut blobs = self.inner.blobs.lock();
        eyre::ensure!(
            !blobs.contains_key(name),
            "backing blob '{}' already exists",
            name
        );
        let blob: Blob = Arc::new(Mutex::new(Vec::new()));
        blobs.insert(name.to_string(), Arc::clone(&blob));
        Ok(MemHandle { data: blob })
    }

    fn open(&mut self, name: &str) -> Result<Self::Handle> {
        {
            let mut held = self.inner.held.lock();
            if let Some(remaining) = held.get_mut(name) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(VfsError::Locked {
                        name: name.to_string(),
                        attempts: 1,
                    }
                    .into());
                }
                held.remove(name);
            }
        }

        let blobs = self.inner.blobs.lock();
        let blob = blobs
            .get(name)
            .ok_or_else(|| VfsError::NotFound(name.to_string()))?;
        Ok(MemHandle {
            data: Arc::clone(blob),
        })
    }

    fn list(&mut self) -> Result<Vec<String>> {
        Ok(self.inner.blobs.lock().keys().cloned().collect())
    }

    fn remove(&mut self, name: &str) -> Result<()> {
        self.inner.blobs.lock().remove(name);
        self.inner.held.lock().remove(name);
        Ok(())
    }
}
