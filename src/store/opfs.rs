//! # OPFS Backing Store (wasm32)
//!
//! Backing store over the Origin Private File System using synchronous
//! `FileSystemSyncAccessHandle`s. OPFS files are private to the origin,
//! survive browser restarts, and with sync handles offer the blocking
//! read/write/truncate/flush contract the pool needs.
//!
//! ## Worker Requirement
//!
//! CRITICAL: sync access handles exist only in dedicated Web Worker
//! contexts. The pool (and therefore this store) must live in a worker; the
//! engine context reaches it through the message bridge.
//!
//! ## Handle Lifecycle
//!
//! Acquiring a sync handle takes an exclusive browser-level lock on the
//! file. A handle left open by a previous, not-yet-released session makes
//! `open` fail; the pool's reconciliation retries with backoff and reclaims
//! the slot as a last resort.
//!
//! ## Status
//!
//! The wasm bindings are not wired yet; every operation fails explicitly.
//! The trait surface is fixed so pool logic is identical across platforms
//! and fully tested through the native stores.

#![cfg(target_arch = "wasm32")]

use eyre::{bail, Result};

use super::{AccessHandle, BackingStore};

/// Backing store over an OPFS directory. Worker context only.
#[derive(Debug)]
pub struct OpfsStore {
    dir_name: String,
}

impl OpfsStore {
    /// Opens (creating if needed) the OPFS directory `dir_name`.
    pub fn open(dir_name: impl Into<String>) -> Result<Self> {
        let _ = dir_name.into();
        bail!("OpfsStore::open is not yet implemented - OPFS support requires web-sys bindings")
    }

    /// Name of the OPFS directory this store was opened over.
    pub fn dir_name(&self) -> &str {
        &self.dir_name
    }
}

/// A live `FileSystemSyncAccessHandle`.
#[derive(Debug)]
pub struct OpfsHandle {
    _name: String,
}

impl AccessHandle for OpfsHandle {
    fn read_at(&mut self, _buf: &mut [u8], _offset: u64) -> Result<usize> {
        bail!("OpfsHandle::read_at is not yet implemented")
    }

    fn write_at(&mut self, _data: &[u8], _offset: u64) -> Result<usize> {
        bail!("OpfsHandle::write_at is not yet implemented")
    }

    fn truncate(&mut self, _size: u64) -> Result<()> {
        bail!("OpfsHandle::truncate is not yet implemented")
    }

    fn flush(&mut self) -> Result<()> {
        bail!("OpfsHandle::flush is not yet implemented")
    }

    fn size(&mut self) -> Result<u64> {
        bail!("OpfsHandle::size is not yet implemented")
    }
}

impl BackingStore for OpfsStore {
    type Handle = OpfsHandle;

    fn create(&mut self, _name: &str) -> Result<Self::Handle> {
        bail!("OpfsStore::create is not yet implemented")
    }

    fn open(&mut self, _name: &str) -> Result<Self::Handle> {
        bail!("OpfsStore::open is not yet implemented")
    }

    fn list(&mut self) -> Result<Vec<String>> {
        bail!("OpfsStore::list is not yet implemented")
    }

    fn remove(&mut self, _name: &str) -> Result<()> {
        bail!("OpfsStore::remove is not yet implemented")
    }
}
