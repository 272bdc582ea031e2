//! # Pool and Sync Configuration
//!
//! `PoolConfig` carries every tunable in one place: pool capacity, the
//! engine's page size, the debounce quiet interval, the startup-acquisition
//! retry budget, the force-full-sync diagnostic toggle, and the log level.
//! It is passed in when the pool is opened and when the synchronization
//! scheduler is built.

use std::time::Duration;

use log::LevelFilter;

/// Default number of backing files provisioned on first open.
pub const DEFAULT_CAPACITY: usize = 6;
/// Default fixed page size; must match the storage engine's.
pub const DEFAULT_PAGE_SIZE: usize = 4096;
/// Default quiet interval before a scheduled flush fires.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);
/// Default bound on handle-acquisition attempts at startup.
pub const DEFAULT_ACQUIRE_ATTEMPTS: u32 = 5;
/// Default base delay between acquisition attempts; doubles each retry.
pub const DEFAULT_ACQUIRE_BACKOFF: Duration = Duration::from_millis(10);

/// Configuration for the handle pool and synchronization scheduler.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of backing files the pool provisions. Capacity only grows;
    /// extra files found in the store raise it, they are never shrunk away.
    pub capacity: usize,
    /// Fixed page size for dirty tracking and incremental sync.
    pub page_size: usize,
    /// Quiet interval a file must stay write-free before its flush runs.
    pub debounce: Duration,
    /// Bounded attempt count when a backing file is locked at startup.
    pub max_acquire_attempts: u32,
    /// Base backoff between acquisition attempts; doubles per attempt.
    pub acquire_backoff: Duration,
    /// Disables incremental sync, copying whole files instead. Diagnostic.
    pub force_full_sync: bool,
    /// Verbosity of the crate's logging.
    pub log_level: LevelFilter,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            page_size: DEFAULT_PAGE_SIZE,
            debounce: DEFAULT_DEBOUNCE,
            max_acquire_attempts: DEFAULT_ACQUIRE_ATTEMPTS,
            acquire_backoff: DEFAULT_ACQUIRE_BACKOFF,
            force_full_sync: false,
            log_level: LevelFilter::Warn,
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_max_acquire_attempts(mut self, attempts: u32) -> Self {
        self.max_acquire_attempts = attempts;
        self
    }

    pub fn with_acquire_backoff(mut self, backoff: Duration) -> Self {
        self.acquire_backoff = backoff;
        self
    }

    pub fn with_force_full_sync(mut self, force: bool) -> Self {
        self.force_full_sync = force;
        self
    }

    pub fn with_log_level(mut self, level: LevelFilter) -> Self {
        self.log_level = level;
        self
    }
}
