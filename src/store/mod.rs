//! # Backing Store Abstraction
//!
//! The persistent area behind the handle pool is a directory-like store of
//! opaque blob files with synchronous per-file I/O. Two traits model it:
//!
//! - [`BackingStore`]: create/open/list/remove of named blobs
//! - [`AccessHandle`]: blocking read/write/truncate/flush/size on one blob
//!
//! ## Backends
//!
//! | Backend    | Platform      | Use                                  |
//! |------------|---------------|--------------------------------------|
//! | `DirStore` | Native        | A plain directory of files           |
//! | `MemStore` | Any           | Tests; injectable lock contention    |
//! | OPFS       | wasm32 worker | Origin Private File System handles   |
//!
//! The pool is generic over the store, so pool logic (headers, digests,
//! association, capacity) is identical on every platform and fully
//! exercisable natively.
//!
//! ## Synchronous by Design
//!
//! Handles are deliberately synchronous: within one backing file there must
//! be no interleaving between a read-modify-write and another operation.
//! The asynchrony in the system lives one level up, in the message bridge
//! between the engine context and the pool context.
//!
//! ## Lock Contention
//!
//! `open` fails with [`VfsError::Locked`] when another session still holds
//! the blob. Startup reconciliation retries with exponential backoff and, as
//! a last resort, reclaims the slot.
//!
//! [`VfsError::Locked`]: crate::vfs::VfsError::Locked

use eyre::Result;

pub mod dir;
pub mod mem;
#[cfg(target_arch = "wasm32")]
pub mod opfs;

pub use dir::DirStore;
pub use mem::MemStore;

/// A live synchronous handle to one backing blob.
pub trait AccessHandle: Send {
    /// Reads up to `buf.len()` bytes at `offset`, returning the number of
    /// bytes actually read. Bytes past EOF are not touched.
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Writes `data` at `offset`, returning the number of bytes written.
    /// Callers treat anything short of `data.len()` as an I/O error.
    fn write_at(&mut self, data: &[u8], offset: u64) -> Result<usize>;

    /// Sets the blob length to exactly `size` bytes.
    fn truncate(&mut self, size: u64) -> Result<()>;

    /// Synchronously flushes buffered writes to durable storage.
    fn flush(&mut self) -> Result<()>;

    fn size(&mut self) -> Result<u64>;
}

/// A directory-like persistent area of named opaque blobs.
pub trait BackingStore: Send {
    type Handle: AccessHandle;

    /// Creates a new empty blob. Fails if `name` already exists.
    fn create(&mut self, name: &str) -> Result<Self::Handle>;

    /// Opens an existing blob. Fails with `VfsError::Locked` while another
    /// session holds it, and `VfsError::NotFound` if it does not exist.
    fn open(&mut self, name: &str) -> Result<Self::Handle>;

    /// Names of all blobs currently in the store, in no particular order.
    fn list(&mut self) -> Result<Vec<String>>;

    /// Removes a blob outright. Used for delete-and-recreate reclamation.
    fn remove(&mut self, name: &str) -> Result<()>;
}
