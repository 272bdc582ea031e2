//! # sahvfs
//!
//! A pool-based virtual filesystem over synchronous access handles, with
//! dirty-page tracking and debounced synchronization. It gives a storage
//! engine a fast in-memory working filesystem whose contents are copied,
//! incrementally and in the background, into a fixed pool of persistent
//! backing files.
//!
//! ## Architecture
//!
//! ```text
//!  engine context                      pool context
//!  ┌───────────────────────┐          ┌──────────────────────────┐
//!  │ storage engine        │          │ PoolServer (owns pool)   │
//!  │   │                   │          │   │                      │
//!  │   ▼                   │ requests │   ▼                      │
//!  │ TrackingVfs ──────────┼──────────┼─ SahPool                 │
//!  │   │        PoolClient │ replies  │   │                      │
//!  │   ▼                   │◀─────────┤   ▼                      │
//!  │ MemVfs   DirtyTracker │          │ BackingStore             │
//!  │              ▲        │          │  (headers + payloads)    │
//!  │              │        │          └──────────────────────────┘
//!  │        SyncScheduler  │
//!  └───────────────────────┘
//! ```
//!
//! The engine reads and writes through [`TrackingVfs`], which records the
//! touched pages per file in a [`DirtyTracker`]. A [`SyncScheduler`]
//! debounces flush requests and ships only the dirty pages (with the final
//! file size) across the [`bridge`] into the [`SahPool`], which maps each
//! logical path onto one backing file from a fixed, pre-provisioned set.
//! Each backing file carries a digest-protected header naming the logical
//! path it holds, so associations survive restarts and corrupt headers
//! self-heal into free capacity.
//!
//! ## Modules
//!
//! - [`vfs`]: the filesystem trait, the in-memory implementation, the
//!   write-intercepting decorator and the dirty-page tracker
//! - [`pool`]: the handle pool, backing-file headers and startup
//!   reconciliation
//! - [`store`]: backing storage abstraction (directory, in-memory, and an
//!   OPFS stub on wasm)
//! - [`bridge`]: message-passing client/server pair between the engine and
//!   pool contexts
//! - [`sync`]: the debounced synchronization scheduler and the statement
//!   classifier
//! - [`config`] / [`logging`]: tunables and verbosity control

pub mod bridge;
pub mod config;
pub mod logging;
pub mod pool;
pub mod store;
pub mod sync;
pub mod vfs;

pub use bridge::{PoolClient, PoolServer, VfsReply, VfsRequest};
pub use config::PoolConfig;
pub use logging::Verbosity;
pub use pool::SahPool;
pub use store::{AccessHandle, BackingStore, DirStore, MemStore};
pub use sync::{is_mutation, SyncScheduler, SyncStats};
pub use vfs::{
    DirtyTracker, FileId, LockLevel, MemVfs, OpenFlags, TrackingVfs, Vfs, VfsError,
};
