//! # Virtual Filesystem Contract
//!
//! This module defines the `Vfs` trait, the I/O contract a storage engine
//! expects from its filesystem layer: open/read/write/sync/truncate/size/
//! close plus path-level access/delete. Every filesystem in this crate
//! speaks it:
//!
//! - [`MemVfs`]: the in-memory working copy the engine actually runs against
//! - [`TrackingVfs`]: a decorator that records dirty page ranges on writes
//! - `PoolClient`: the bridge to the pool context, so an engine can also run
//!   directly against durable storage
//!
//! ## Read Semantics
//!
//! `read` returns the number of valid bytes and zero-fills the remainder of
//! the buffer. A short count is a *condition*, not an error: storage engines
//! expect reads past EOF within a page to come back as zeros. Writes are
//! all-or-nothing; a partial write surfaces as [`VfsError::ShortWrite`].
//!
//! ## File Identifiers
//!
//! `open` hands out an opaque [`FileId`] that is never reused while the
//! filesystem lives. Concurrent opens of the same path are independent: each
//! gets its own id and its own lock state.
//!
//! ## Error Taxonomy
//!
//! Classified failures are carried as [`VfsError`] inside `eyre::Report`, so
//! callers can `downcast_ref::<VfsError>()` to tell a capacity failure from
//! an I/O failure from a stale-session lock. Consistency problems (corrupt
//! headers) are recovered inside the pool and never reach this surface.

use std::fmt;

use eyre::Result;

pub mod dirty;
pub mod mem;
pub mod tracking;

pub use dirty::DirtyTracker;
pub use mem::MemVfs;
pub use tracking::TrackingVfs;

/// Opaque identifier for one open file. Assigned on `open`, invalid after
/// `close`, never reused while the issuing filesystem is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub(crate) u64);

impl FileId {
    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> Self {
        FileId(raw)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd:{}", self.0)
    }
}

/// Open flags: access mode, create semantics, and the file-type
/// classification that decides whether a backing file survives restarts.
///
/// The bit layout is stored verbatim in the backing-file header flags word,
/// so the values are part of the persisted format and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct OpenFlags(u32);

impl OpenFlags {
    pub const READ_ONLY: OpenFlags = OpenFlags(0x0000_0001);
    pub const READ_WRITE: OpenFlags = OpenFlags(0x0000_0002);
    pub const CREATE: OpenFlags = OpenFlags(0x0000_0004);
    pub const DELETE_ON_CLOSE: OpenFlags = OpenFlags(0x0000_0008);
    pub const MAIN_DB: OpenFlags = OpenFlags(0x0000_0100);
    pub const MAIN_JOURNAL: OpenFlags = OpenFlags(0x0000_0800);
    pub const SUPER_JOURNAL: OpenFlags = OpenFlags(0x0000_4000);
    pub const WAL: OpenFlags = OpenFlags(0x0008_0000);
    /// Header digest is present and must validate for the association to
    /// count. Set by the pool whenever it writes an association.
    pub const DIGEST: OpenFlags = OpenFlags(0x8000_0000);

    /// File types whose backing files are kept across restarts.
    const PERSISTENT_MASK: u32 =
        Self::MAIN_DB.0 | Self::MAIN_JOURNAL.0 | Self::SUPER_JOURNAL.0 | Self::WAL.0;

    pub const fn empty() -> Self {
        OpenFlags(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        OpenFlags(bits)
    }

    pub const fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// True for file types that the pool keeps associated across restarts.
    pub const fn is_persistent_type(self) -> bool {
        self.0 & Self::PERSISTENT_MASK != 0
    }

    pub const fn is_delete_on_close(self) -> bool {
        self.contains(Self::DELETE_ON_CLOSE)
    }

    pub const fn has_digest(self) -> bool {
        self.contains(Self::DIGEST)
    }
}

impl std::ops::BitOr for OpenFlags {
    type Output = OpenFlags;

    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for OpenFlags {
    fn bitor_assign(&mut self, rhs: OpenFlags) {
        self.0 |= rhs.0;
    }
}

/// Lock state recorded per open file. Bookkeeping for the engine's own
/// locking discipline; cross-process enforcement is out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LockLevel {
    #[default]
    None,
    Shared,
    Reserved,
    Exclusive,
}

/// Classified failure kinds that cross the context boundary verbatim.
///
/// Everything else travels as an `eyre::Report` string; these keep enough
/// structure for callers to react (retry a flush, surface a capacity error,
/// refuse work before initialization).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VfsError {
    /// Pool exhausted on a create-style open. Never retried internally.
    PoolExhausted { capacity: usize },
    /// An exact-length read came back short.
    ShortRead { requested: usize, read: usize },
    /// A write persisted fewer bytes than requested.
    ShortWrite { requested: usize, written: usize },
    /// A backing file is held by another session.
    Locked { name: String, attempts: u32 },
    /// The pool context is not reachable (never started, or shut down).
    NotInitialized,
    /// Operation against a file id that is not open.
    BadFileId(u64),
    /// Open without create semantics on a path with no association, or an
    /// operation on a path that does not exist.
    NotFound(String),
    /// Transport wrapper for unclassified failures crossing the bridge.
    Io(String),
}

impl fmt::Display for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VfsError::PoolExhausted { capacity } => {
                write!(f, "handle pool exhausted (capacity {})", capacity)
            }
            VfsError::ShortRead { requested, read } => {
                write!(f, "short read: {} of {} bytes", read, requested)
            }
            VfsError::ShortWrite { requested, written } => {
                write!(f, "short write: {} of {} bytes", written, requested)
            }
            VfsError::Locked { name, attempts } => {
                write!(f, "backing file '{}' locked after {} attempts", name, attempts)
            }
            VfsError::NotInitialized => write!(f, "pool context not initialized"),
            VfsError::BadFileId(id) => write!(f, "no open file with id {}", id),
            VfsError::NotFound(path) => write!(f, "no file at '{}'", path),
            VfsError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for VfsError {}

/// The filesystem contract a storage engine programs against.
///
/// Methods take `&self`; implementations synchronize internally because the
/// synchronization scheduler reads the working copy while the engine owns it.
pub trait Vfs: Send + Sync {
    /// Opens `path`, creating it when `flags` contain [`OpenFlags::CREATE`]
    /// and no file exists. Each call returns a distinct [`FileId`].
    fn open(&self, path: &str, flags: OpenFlags) -> Result<FileId>;

    /// Reads up to `buf.len()` bytes at `offset`. Returns the count of valid
    /// bytes; the rest of `buf` is zero-filled.
    fn read(&self, id: FileId, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Writes all of `data` at `offset`, extending the file as needed.
    fn write(&self, id: FileId, data: &[u8], offset: u64) -> Result<()>;

    /// Sets the file length to exactly `size` bytes.
    fn truncate(&self, id: FileId, size: u64) -> Result<()>;

    /// Flushes the file to its backing medium. Durability is only promised
    /// for writes that happened before a successful `sync`.
    fn sync(&self, id: FileId) -> Result<()>;

    fn file_size(&self, id: FileId) -> Result<u64>;

    /// Invalidates `id`. The underlying file stays addressable by path
    /// unless it was opened delete-on-close and this was the last open.
    fn close(&self, id: FileId) -> Result<()>;

    /// O(1) membership test: does `path` currently exist?
    fn access(&self, path: &str) -> Result<bool>;

    /// Removes `path`. Removing a path that does not exist is a no-op.
    fn delete(&self, path: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_flags_bitor_combines_bits() {
        let flags = OpenFlags::READ_WRITE | OpenFlags::CREATE | OpenFlags::MAIN_DB;

        assert!(flags.contains(OpenFlags::READ_WRITE));
        assert!(flags.contains(OpenFlags::CREATE));
        assert!(flags.contains(OpenFlags::MAIN_DB));
        assert!(!flags.contains(OpenFlags::WAL));
    }

    #[test]
    fn persistent_type_detection() {
        assert!(OpenFlags::MAIN_DB.is_persistent_type());
        assert!(OpenFlags::MAIN_JOURNAL.is_persistent_type());
        assert!(OpenFlags::SUPER_JOURNAL.is_persistent_type());
        assert!(OpenFlags::WAL.is_persistent_type());
        assert!(!OpenFlags::DELETE_ON_CLOSE.is_persistent_type());
        assert!(!(OpenFlags::READ_WRITE | OpenFlags::CREATE).is_persistent_type());
    }

    #[test]
    fn flags_round_trip_through_raw_bits() {
        let flags = OpenFlags::MAIN_DB | OpenFlags::DIGEST;
        let bits = flags.bits();

        assert_eq!(OpenFlags::from_bits(bits), flags);
        assert!(OpenFlags::from_bits(bits).has_digest());
    }

    #[test]
    fn vfs_error_downcasts_from_eyre_report() {
        let report = eyre::Report::new(VfsError::PoolExhausted { capacity: 4 });

        match report.downcast_ref::<VfsError>() {
            Some(VfsError::PoolExhausted { capacity }) => assert_eq!(*capacity, 4),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn lock_levels_are_ordered() {
        assert!(LockLevel::None < LockLevel::Shared);
        assert!(LockLevel::Shared < LockLevel::Reserved);
        assert!(LockLevel::Reserved < LockLevel::Exclusive);
    }
}
