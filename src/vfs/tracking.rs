//! # Write-Intercepting VFS Decorator
//!
//! `TrackingVfs` wraps the engine's primary (non-persistent) filesystem and
//! instruments its write path: every operation is delegated to the inner
//! [`Vfs`] first, and on success the affected page range is recorded in the
//! shared [`DirtyTracker`]. Reads, syncs and size queries pass straight
//! through.
//!
//! Truncation marks the page at the truncation point: a shrink changes what
//! the file looks like beyond the new EOF, and the flush path uses the mark
//! to know the file needs attention.
//!
//! Bookkeeping happens only after the delegated call succeeded; a failed
//! write must not leave phantom dirty bits for bytes that never landed.

use std::sync::Arc;

use eyre::Result;
use hashbrown::HashMap;
use parking_lot::Mutex;

use super::{DirtyTracker, FileId, OpenFlags, Vfs};

/// Dirty-page tracking wrapper around any [`Vfs`].
pub struct TrackingVfs<V: Vfs> {
    inner: V,
    tracker: Arc<DirtyTracker>,
    // file id -> logical path, for attributing writes to a bitmap
    names: Mutex<HashMap<u64, String>>,
}

impl<V: Vfs> TrackingVfs<V> {
    /// Wraps `inner`, recording dirty pages of `page_size` bytes. The page
    /// size must match the storage engine's.
    pub fn new(inner: V, page_size: usize) -> Self {
        Self {
            inner,
            tracker: Arc::new(DirtyTracker::new(page_size)),
            names: Mutex::new(HashMap::new()),
        }
    }

    /// Shared handle to the tracker, for the synchronization scheduler.
    pub fn tracker(&self) -> Arc<DirtyTracker> {
        Arc::clone(&self.tracker)
    }

    pub fn inner(&self) -> &V {
        &self.inner
    }

    fn path_of(&self, id: FileId) -> Option<String> {
        self.names.lock().get(&id.0).cloned()
    }
}

impl<V: Vfs> Vfs for TrackingVfs<V> {
    fn open(&self, path: &str, flags: OpenFlags) -> Result<FileId> {
        let id = self.inner.open(path, flags)?;
        self.names.lock().insert(id.0, path.to_string());
        Ok(id)
    }

    fn read(&self, id: FileId, buf: &mut [u8], offset: u64) -> Result<usize> {
        self.inner.read(id, buf, offset)
    }

    fn write(&self, id: FileId, data: &[u8], offset: u64) -> Result<()> {
        self.inner.write(id, data, offset)?;
        if let Some(path) = self.path_of(id) {
            self.tracker.mark_range(&path, offset, data.len());
        }
        Ok(())
    }

    fn truncate(&self, id: FileId, size: u64) -> Result<()> {
        self.inner.truncate(id, size)?;
        if let Some(path) = self.path_of(id) {
            self.tracker.mark_range(&path, size, 1);
        }
        Ok(())
    }

    fn sync(&self, id: FileId) -> Result<()> {
        self.inner.sync(id)
    }

    fn file_size(&self, id: FileId) -> Result<u64> {
        self.inner.file_size(id)
    }

    fn close(&self, id: FileId) -> Result<()> {
        self.inner.close(id)?;
        self.names.lock().remove(&id.0);
        Ok(())
    }

    fn access(&self, path: &str) -> Result<bool> {
        self.inner.access(path)
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.inner.delete(path)?;
        self.tracker.drop_file(path);
        Ok(())
    }
}
