//! # Debounced Synchronization Scheduler
//!
//! Copies changed bytes from the engine's working filesystem into the
//! persistent pool, on a worker thread, without stalling the write path.
//!
//! ## Debounce
//!
//! Each [`schedule`](SyncScheduler::schedule) call arms (or re-arms) a
//! per-file deadline `debounce` into the future. A burst of writes keeps
//! pushing the deadline out, so the flush runs once per quiet interval
//! instead of once per write. Scheduling is cancellation plus re-arm; an
//! armed flush never fires early.
//!
//! ## Incremental vs Full
//!
//! With a [`DirtyTracker`] attached, a flush reads only the dirty pages
//! from the working file and ships them as sparse writes plus the final
//! size. Without one (or with `force_full_sync` set), the whole file is
//! copied. Either way the dirty set is cleared only after the pool
//! confirmed the write, so a failed flush is retried rather than lost.
//!
//! ## Idempotence
//!
//! A flush that finds the dirty set empty is a no-op. Running the
//! scheduler twice over the same state transfers zero bytes the second
//! time; [`SyncStats`] makes that observable.
//!
//! ## Pause / Resume
//!
//! [`pause`](SyncScheduler::pause) holds all deadlines (writes keep
//! accumulating dirty bits); [`resume`](SyncScheduler::resume) makes every
//! held deadline due immediately, producing one consolidated flush per
//! file regardless of how many writes happened while paused.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use eyre::Result;
use hashbrown::HashMap;
use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};

use crate::bridge::PoolClient;
use crate::config::PoolConfig;
use crate::vfs::{DirtyTracker, OpenFlags, Vfs};

pub mod classify;

pub use classify::is_mutation;

/// Counters exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncStats {
    /// Completed flushes (incremental and full).
    pub flushes: u64,
    /// Flushes that copied the whole file.
    pub full_syncs: u64,
    /// Payload bytes shipped to the pool.
    pub bytes_written: u64,
}

#[derive(Debug)]
struct SchedState {
    // logical path -> deadline at which its flush becomes due
    pending: HashMap<String, Instant>,
    paused: bool,
    shutdown: bool,
}

struct Inner {
    vfs: Arc<dyn Vfs>,
    tracker: Option<Arc<DirtyTracker>>,
    client: PoolClient,
    page_size: u64,
    debounce: Duration,
    force_full: AtomicBool,
    flushes: AtomicU64,
    full_syncs: AtomicU64,
    bytes_written: AtomicU64,
    state: Mutex<SchedState>,
    cv: Condvar,
}

/// Debounced flusher from a working [`Vfs`] into the pool.
pub struct SyncScheduler {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SyncScheduler {
    /// Starts the worker thread. `tracker` is the shared tracker of the
    /// working filesystem's write interceptor, or `None` to always copy
    /// whole files.
    pub fn spawn(
        vfs: Arc<dyn Vfs>,
        tracker: Option<Arc<DirtyTracker>>,
        client: PoolClient,
        cfg: &PoolConfig,
    ) -> Self {
        let inner = Arc::new(Inner {
            vfs,
            tracker,
            client,
            page_size: cfg.page_size as u64,
            debounce: cfg.debounce,
            force_full: AtomicBool::new(cfg.force_full_sync),
            flushes: AtomicU64::new(0),
            full_syncs: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            state: Mutex::new(SchedState {
                pending: HashMap::new(),
                paused: false,
                shutdown: false,
            }),
            cv: Condvar::new(),
        });

        let worker_inner = Arc::clone(&inner);
        let worker = thread::spawn(move || worker_inner.run());

        Self {
            inner,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Arms (or re-arms) the debounced flush for `path`. Call after every
    /// mutating operation; bursts coalesce into a single flush.
    pub fn schedule(&self, path: &str) {
        let mut state = self.inner.state.lock();
        if state.shutdown {
            return;
        }
        state
            .pending
            .insert(path.to_string(), Instant::now() + self.inner.debounce);
        self.inner.cv.notify_all();
    }

    /// Disarms a pending flush for `path`. Dirty bits are kept; a later
    /// `schedule` picks them up.
    pub fn cancel(&self, path: &str) {
        self.inner.state.lock().pending.remove(path);
    }

    /// Holds all pending flushes. Writes keep accumulating dirty pages.
    pub fn pause(&self) {
        self.inner.state.lock().paused = true;
        debug!("synchronization paused");
    }

    /// Releases a pause; every held flush becomes due immediately, one
    /// consolidated flush per file.
    pub fn resume(&self) {
        let mut state = self.inner.state.lock();
        state.paused = false;
        let now = Instant::now();
        for deadline in state.pending.values_mut() {
            *deadline = now;
        }
        self.inner.cv.notify_all();
        debug!("synchronization resumed");
    }

    /// Toggles whole-file copying at runtime.
    pub fn set_force_full(&self, force: bool) {
        self.inner.force_full.store(force, Ordering::Relaxed);
    }

    /// Flushes `path` synchronously, bypassing the debounce. No-op when
    /// nothing is dirty.
    pub fn flush_now(&self, path: &str) -> Result<()> {
        self.inner.state.lock().pending.remove(path);
        self.inner.flush_file(path)
    }

    /// Flushes every file with pending or dirty state, synchronously.
    pub fn flush_all(&self) -> Result<()> {
        let mut paths: Vec<String> = {
            let mut state = self.inner.state.lock();
            state.pending.drain().map(|(path, _)| path).collect()
        };
        if let Some(tracker) = &self.inner.tracker {
            paths.extend(tracker.dirty_files());
        }
        paths.sort();
        paths.dedup();
        for path in paths {
            self.inner.flush_file(&path)?;
        }
        Ok(())
    }

    /// Copies the persisted content of `path` into the working filesystem.
    /// Returns false when nothing is persisted under that name.
    pub fn hydrate(&self, path: &str) -> Result<bool> {
        let Some(data) = self.inner.client.load(path)? else {
            return Ok(false);
        };

        let id = self
            .inner
            .vfs
            .open(path, OpenFlags::READ_WRITE | OpenFlags::CREATE)?;
        let result: Result<()> = (|| {
            self.inner.vfs.write(id, &data, 0)?;
            self.inner.vfs.truncate(id, data.len() as u64)?;
            Ok(())
        })();
        let close = self.inner.vfs.close(id);
        result?;
        close?;

        // Hydration writes are already persistent; nothing to flush back.
        if let Some(tracker) = &self.inner.tracker {
            tracker.reset(path);
        }
        debug!("hydrated {} ({} bytes)", path, data.len());
        Ok(true)
    }

    /// Hydrates every file the pool has persisted. Returns the paths that
    /// were brought in.
    pub fn hydrate_all(&self) -> Result<Vec<String>> {
        let paths = self.inner.client.list_files()?;
        for path in &paths {
            self.hydrate(path)?;
        }
        info!("hydrated {} file(s) from the pool", paths.len());
        Ok(paths)
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            flushes: self.inner.flushes.load(Ordering::Relaxed),
            full_syncs: self.inner.full_syncs.load(Ordering::Relaxed),
            bytes_written: self.inner.bytes_written.load(Ordering::Relaxed),
        }
    }

    /// Drains every pending flush and stops the worker thread.
    pub fn shutdown(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if state.shutdown {
                return Ok(());
            }
            state.shutdown = true;
            self.inner.cv.notify_all();
        }
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
        self.flush_all()
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!("final flush on shutdown failed: {:#}", err);
        }
    }
}

impl Inner {
    fn run(self: Arc<Self>) {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                break;
            }
            if state.paused {
                self.cv.wait(&mut state);
                continue;
            }

            let now = Instant::now();
            let due: Vec<String> = state
                .pending
                .iter()
                .filter(|(_, deadline)| **deadline <= now)
                .map(|(path, _)| path.clone())
                .collect();

            if due.is_empty() {
                match state.pending.values().min().copied() {
                    Some(deadline) => {
                        self.cv.wait_until(&mut state, deadline);
                    }
                    None => self.cv.wait(&mut state),
                }
                continue;
            }

            for path in &due {
                state.pending.remove(path);
            }
            drop(state);

            for path in due {
                if let Err(err) = self.flush_file(&path) {
                    warn!("flush of {} failed, rescheduling: {:#}", path, err);
                    let mut state = self.state.lock();
                    if !state.shutdown {
                        state.pending.insert(path, Instant::now() + self.debounce);
                    }
                }
            }
            state = self.state.lock();
        }
    }

    fn flush_file(&self, path: &str) -> Result<()> {
        // The file may have been deleted after its flush was armed.
        if !self.vfs.access(path)? {
            if let Some(tracker) = &self.tracker {
                tracker.drop_file(path);
            }
            return Ok(());
        }

        let bytes = match &self.tracker {
            Some(tracker) => {
                let pages = tracker.dirty_pages(path);
                if pages.is_empty() {
                    return Ok(());
                }
                let bytes = if self.force_full.load(Ordering::Relaxed) {
                    self.full_syncs.fetch_add(1, Ordering::Relaxed);
                    self.copy_whole(path)?
                } else {
                    self.copy_pages(path, &pages)?
                };
                // Clear only the captured set; a write landing on another
                // page while we were copying keeps its dirty bit.
                tracker.confirm(path, &pages);
                bytes
            }
            None => {
                self.full_syncs.fetch_add(1, Ordering::Relaxed);
                self.copy_whole(path)?
            }
        };

        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
        debug!("flushed {} ({} bytes)", path, bytes);
        Ok(())
    }

    /// Ships only the dirty pages, clamped to the current file size.
    fn copy_pages(&self, path: &str, pages: &[u32]) -> Result<u64> {
        let id = self.vfs.open(path, OpenFlags::READ_ONLY)?;
        let result: Result<u64> = (|| {
            let size = self.vfs.file_size(id)?;
            let mut writes = Vec::with_capacity(pages.len());
            let mut total = 0u64;
            for &page in pages {
                let offset = page as u64 * self.page_size;
                if offset >= size {
                    // Dirty bit beyond EOF: the truncation itself is
                    // conveyed by `size`.
                    continue;
                }
                let len = (size - offset).min(self.page_size) as usize;
                let mut buf = vec![0u8; len];
                let n = self.vfs.read(id, &mut buf, offset)?;
                buf.truncate(n);
                total += buf.len() as u64;
                writes.push((offset, buf));
            }
            self.client.persist(path, writes, size)?;
            Ok(total)
        })();
        let close = self.vfs.close(id);
        let total = result?;
        close?;
        Ok(total)
    }

    fn copy_whole(&self, path: &str) -> Result<u64> {
        let id = self.vfs.open(path, OpenFlags::READ_ONLY)?;
        let result: Result<u64> = (|| {
            let size = self.vfs.file_size(id)?;
            let mut data = vec![0u8; size as usize];
            self.vfs.read(id, &mut data, 0)?;
            self.client.import(path, data)?;
            Ok(size)
        })();
        let close = self.vfs.close(id);
        let size = result?;
        close?;
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::PoolServer;
    use crate::pool::SahPool;
    use crate::store::MemStore;
    use crate::vfs::{FileId, MemVfs, TrackingVfs};

    const PAGE: usize = 4096;

    struct Rig {
        vfs: Arc<dyn Vfs>,
        tracker: Arc<DirtyTracker>,
        client: PoolClient,
        scheduler: SyncScheduler,
        server: Option<PoolServer>,
    }

    fn rig(cfg: PoolConfig) -> Rig {
        let tracking = TrackingVfs::new(MemVfs::new(), cfg.page_size);
        let tracker = tracking.tracker();
        let vfs: Arc<dyn Vfs> = Arc::new(tracking);

        let pool = SahPool::open_with(MemStore::new(), cfg.clone()).unwrap();
        let (client, server) = PoolServer::spawn(pool);

        let scheduler = SyncScheduler::spawn(
            Arc::clone(&vfs),
            Some(Arc::clone(&tracker)),
            client.clone(),
            &cfg,
        );
        Rig {
            vfs,
            tracker,
            client,
            scheduler,
            server: Some(server),
        }
    }

    impl Drop for Rig {
        fn drop(&mut self) {
            let _ = self.scheduler.shutdown();
            let _ = self.client.shutdown();
            if let Some(server) = self.server.take() {
                server.join();
            }
        }
    }

    fn quick_cfg() -> PoolConfig {
        PoolConfig::new()
            .with_capacity(3)
            .with_debounce(Duration::from_millis(20))
    }

    fn open_rw(vfs: &Arc<dyn Vfs>, path: &str) -> FileId {
        vfs.open(path, OpenFlags::READ_WRITE | OpenFlags::CREATE)
            .unwrap()
    }

    fn wait_for_flushes(scheduler: &SyncScheduler, at_least: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while scheduler.stats().flushes < at_least {
            assert!(Instant::now() < deadline, "flush never arrived");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn incremental_flush_round_trips_non_contiguous_pages() {
        let r = rig(quick_cfg());
        let id = open_rw(&r.vfs, "a.db");

        // Pages 0 and 5, with an untouched gap between them.
        let mut expected = vec![0u8; PAGE * 6];
        expected[..PAGE].fill(0x11);
        expected[PAGE * 5..].fill(0x55);
        r.vfs.write(id, &expected[..PAGE], 0).unwrap();
        r.vfs
            .write(id, &expected[PAGE * 5..], (PAGE * 5) as u64)
            .unwrap();
        r.vfs.close(id).unwrap();

        r.scheduler.schedule("a.db");
        wait_for_flushes(&r.scheduler, 1);

        assert_eq!(r.client.export("a.db").unwrap(), expected);
        assert!(!r.tracker.has_dirty("a.db"));
        assert_eq!(r.scheduler.stats().full_syncs, 0);
    }

    #[test]
    fn write_bursts_coalesce_into_one_flush() {
        let r = rig(quick_cfg());
        let id = open_rw(&r.vfs, "a.db");

        for i in 0..20u8 {
            r.vfs.write(id, &[i; 64], i as u64 * 64).unwrap();
            r.scheduler.schedule("a.db");
        }
        r.vfs.close(id).unwrap();

        wait_for_flushes(&r.scheduler, 1);
        thread::sleep(Duration::from_millis(100));

        assert_eq!(r.scheduler.stats().flushes, 1);
        assert_eq!(r.client.export("a.db").unwrap().len(), 20 * 64);
    }

    #[test]
    fn writes_separated_by_a_quiet_interval_flush_twice() {
        let r = rig(quick_cfg());
        let id = open_rw(&r.vfs, "a.db");

        r.vfs.write(id, &[1; 16], 0).unwrap();
        r.scheduler.schedule("a.db");
        wait_for_flushes(&r.scheduler, 1);

        r.vfs.write(id, &[2; 16], 16).unwrap();
        r.scheduler.schedule("a.db");
        wait_for_flushes(&r.scheduler, 2);
        r.vfs.close(id).unwrap();

        assert_eq!(r.scheduler.stats().flushes, 2);
        let exported = r.client.export("a.db").unwrap();
        assert_eq!(&exported[..16], &[1; 16]);
        assert_eq!(&exported[16..], &[2; 16]);
    }

    #[test]
    fn pause_holds_and_resume_consolidates() {
        let r = rig(quick_cfg());
        let id = open_rw(&r.vfs, "a.db");

        r.scheduler.pause();
        for i in 0..100u64 {
            r.vfs.write(id, &[0xCC; 8], i * 8).unwrap();
            r.scheduler.schedule("a.db");
        }
        r.vfs.close(id).unwrap();

        thread::sleep(Duration::from_millis(100));
        assert_eq!(r.scheduler.stats().flushes, 0);
        assert!(!r.client.access("a.db").unwrap());

        r.scheduler.resume();
        wait_for_flushes(&r.scheduler, 1);
        thread::sleep(Duration::from_millis(100));

        assert_eq!(r.scheduler.stats().flushes, 1);
        assert_eq!(r.client.export("a.db").unwrap(), vec![0xCC; 800]);
    }

    /// Working filesystem that lands one engine write on page 1 the moment
    /// the flush worker reads from it, emulating a write racing the copy.
    struct WriteDuringRead {
        inner: MemVfs,
        tracker: Arc<DirtyTracker>,
        armed: std::sync::atomic::AtomicBool,
    }

    impl Vfs for WriteDuringRead {
        fn open(&self, path: &str, flags: OpenFlags) -> eyre::Result<FileId> {
            self.inner.open(path, flags)
        }

        fn read(&self, id: FileId, buf: &mut [u8], offset: u64) -> eyre::Result<usize> {
            let n = self.inner.read(id, buf, offset)?;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.inner.write(id, &[0xBB; PAGE], PAGE as u64)?;
                self.tracker.mark_range("a.db", PAGE as u64, PAGE);
            }
            Ok(n)
        }

        fn write(&self, id: FileId, data: &[u8], offset: u64) -> eyre::Result<()> {
            self.inner.write(id, data, offset)
        }

        fn truncate(&self, id: FileId, size: u64) -> eyre::Result<()> {
            self.inner.truncate(id, size)
        }

        fn sync(&self, id: FileId) -> eyre::Result<()> {
            self.inner.sync(id)
        }

        fn file_size(&self, id: FileId) -> eyre::Result<u64> {
            self.inner.file_size(id)
        }

        fn close(&self, id: FileId) -> eyre::Result<()> {
            self.inner.close(id)
        }

        fn access(&self, path: &str) -> eyre::Result<bool> {
            self.inner.access(path)
        }

        fn delete(&self, path: &str) -> eyre::Result<()> {
            self.inner.delete(path)
        }
    }

    #[test]
    fn page_dirtied_while_flush_copies_is_not_lost() {
        let cfg = quick_cfg();
        let tracker = Arc::new(DirtyTracker::new(cfg.page_size));
        let racer = Arc::new(WriteDuringRead {
            inner: MemVfs::new(),
            tracker: Arc::clone(&tracker),
            armed: std::sync::atomic::AtomicBool::new(false),
        });
        let vfs: Arc<dyn Vfs> = racer.clone();
        let pool = SahPool::open_with(MemStore::new(), cfg.clone()).unwrap();
        let (client, server) = PoolServer::spawn(pool);
        let scheduler = SyncScheduler::spawn(
            Arc::clone(&vfs),
            Some(Arc::clone(&tracker)),
            client.clone(),
            &cfg,
        );

        let id = open_rw(&vfs, "a.db");
        vfs.write(id, &[0xAA; PAGE], 0).unwrap();
        tracker.mark_range("a.db", 0, PAGE);
        vfs.close(id).unwrap();

        // The racing write lands while this flush is reading page 0.
        racer.armed.store(true, Ordering::SeqCst);
        scheduler.flush_now("a.db").unwrap();

        // The mid-flush page keeps its dirty bit and ships next time.
        assert_eq!(tracker.dirty_pages("a.db"), vec![1]);
        assert_eq!(client.export("a.db").unwrap(), vec![0xAA; PAGE]);

        scheduler.flush_now("a.db").unwrap();
        assert!(!tracker.has_dirty("a.db"));
        let mut expected = vec![0xAA; PAGE];
        expected.extend_from_slice(&[0xBB; PAGE]);
        assert_eq!(client.export("a.db").unwrap(), expected);

        scheduler.shutdown().unwrap();
        client.shutdown().unwrap();
        server.join();
    }

    #[test]
    fn flush_is_idempotent_when_nothing_changed() {
        let r = rig(quick_cfg());
        let id = open_rw(&r.vfs, "a.db");
        r.vfs.write(id, &[0xAB; 1000], 0).unwrap();
        r.vfs.close(id).unwrap();

        r.scheduler.flush_now("a.db").unwrap();
        let after_first = r.scheduler.stats();

        r.scheduler.flush_now("a.db").unwrap();
        let after_second = r.scheduler.stats();

        assert_eq!(after_first.flushes, 1);
        assert_eq!(after_second, after_first);
    }

    #[test]
    fn force_full_copies_the_whole_file() {
        let r = rig(quick_cfg().with_force_full_sync(true));
        let id = open_rw(&r.vfs, "a.db");
        r.vfs.write(id, &[0x42; PAGE * 3], 0).unwrap();
        r.vfs.close(id).unwrap();

        r.scheduler.flush_now("a.db").unwrap();

        let stats = r.scheduler.stats();
        assert_eq!(stats.full_syncs, 1);
        assert_eq!(stats.bytes_written, (PAGE * 3) as u64);
        assert_eq!(r.client.export("a.db").unwrap(), vec![0x42; PAGE * 3]);
    }

    #[test]
    fn truncation_is_carried_by_the_size() {
        let r = rig(quick_cfg());
        let id = open_rw(&r.vfs, "a.db");
        r.vfs.write(id, &[0x77; PAGE * 4], 0).unwrap();
        r.scheduler.flush_now("a.db").unwrap();

        r.vfs.truncate(id, 100).unwrap();
        r.vfs.close(id).unwrap();
        r.scheduler.flush_now("a.db").unwrap();

        assert_eq!(r.client.export("a.db").unwrap(), vec![0x77; 100]);
    }

    #[test]
    fn cancel_disarms_but_keeps_dirty_bits() {
        let r = rig(quick_cfg());
        let id = open_rw(&r.vfs, "a.db");
        r.vfs.write(id, &[1; 10], 0).unwrap();
        r.vfs.close(id).unwrap();

        r.scheduler.schedule("a.db");
        r.scheduler.cancel("a.db");
        thread::sleep(Duration::from_millis(100));

        assert_eq!(r.scheduler.stats().flushes, 0);
        assert!(r.tracker.has_dirty("a.db"));

        r.scheduler.flush_now("a.db").unwrap();
        assert_eq!(r.client.export("a.db").unwrap(), vec![1; 10]);
    }

    #[test]
    fn deleted_file_flush_is_a_no_op() {
        let r = rig(quick_cfg());
        let id = open_rw(&r.vfs, "a.db");
        r.vfs.write(id, &[1; 10], 0).unwrap();
        r.vfs.close(id).unwrap();
        r.scheduler.schedule("a.db");
        r.vfs.delete("a.db").unwrap();

        thread::sleep(Duration::from_millis(100));

        assert_eq!(r.scheduler.stats().flushes, 0);
        assert!(!r.client.access("a.db").unwrap());
    }

    #[test]
    fn hydrate_pulls_persisted_bytes_into_the_working_vfs() {
        let r = rig(quick_cfg());
        r.client.import("a.db", vec![0x99; 5000]).unwrap();

        assert!(r.scheduler.hydrate("a.db").unwrap());
        assert!(!r.scheduler.hydrate("missing.db").unwrap());

        let id = r.vfs.open("a.db", OpenFlags::READ_ONLY).unwrap();
        assert_eq!(r.vfs.file_size(id).unwrap(), 5000);
        let mut buf = vec![0u8; 5000];
        r.vfs.read(id, &mut buf, 0).unwrap();
        r.vfs.close(id).unwrap();
        assert_eq!(buf, vec![0x99; 5000]);

        // Hydration leaves nothing dirty to flush back.
        assert!(!r.tracker.has_dirty("a.db"));
    }

    #[test]
    fn shutdown_drains_pending_flushes() {
        let r = rig(PoolConfig::new().with_capacity(3).with_debounce(Duration::from_secs(60)));
        let id = open_rw(&r.vfs, "a.db");
        r.vfs.write(id, &[0x31; 256], 0).unwrap();
        r.vfs.close(id).unwrap();
        r.scheduler.schedule("a.db");

        r.scheduler.shutdown().unwrap();

        assert_eq!(r.client.export("a.db").unwrap(), vec![0x31; 256]);
    }

    #[test]
    fn scheduler_without_tracker_always_copies_whole_files() {
        let cfg = quick_cfg();
        let vfs: Arc<dyn Vfs> = Arc::new(MemVfs::new());
        let pool = SahPool::open_with(MemStore::new(), cfg.clone()).unwrap();
        let (client, server) = PoolServer::spawn(pool);
        let scheduler = SyncScheduler::spawn(Arc::clone(&vfs), None, client.clone(), &cfg);

        let id = open_rw(&vfs, "a.db");
        vfs.write(id, &[0x64; 2000], 0).unwrap();
        vfs.close(id).unwrap();
        scheduler.flush_now("a.db").unwrap();

        assert_eq!(scheduler.stats().full_syncs, 1);
        assert_eq!(client.export("a.db").unwrap(), vec![0x64; 2000]);

        scheduler.shutdown().unwrap();
        client.shutdown().unwrap();
        server.join();
    }
}
