//! # Dirty Page Tracker
//!
//! Per-file bitmap of pages written since the last confirmed flush, using
//! `RoaringBitmap` for memory-efficient page number storage: one set bit per
//! page, compressed runs for the common sequential-write case, and sorted
//! iteration for free.
//!
//! ## Marking Discipline
//!
//! Every intercepted write covering `[offset, offset + len)` marks pages
//! `offset / page_size ..= (offset + len - 1) / page_size`. Marking is a
//! single `insert_range` on the bitmap, O(1) amortized, so the hot write
//! path of the engine does not slow down measurably.
//!
//! ## Clearing Discipline
//!
//! Bits are only cleared after the corresponding bytes were durably written
//! to the backing store. Clearing earlier risks silent data loss: the pages
//! would never be flushed again. The flush path clears with `confirm`,
//! which removes exactly the page set it captured and shipped; a write
//! landing on another page while the flush is copying keeps its bit.
//! `reset` clears in bulk and is reserved for hydration, where the working
//! copy was just rebuilt from the durable bytes and no writer is racing.
//!
//! Bitmaps are allocated lazily on first write and discarded on
//! `drop_file` / `clear_all` when tracking shuts down.

use hashbrown::HashMap;
use parking_lot::Mutex;
use roaring::RoaringBitmap;

/// Tracks dirty pages per logical filename.
#[derive(Debug)]
pub struct DirtyTracker {
    page_size: u64,
    files: Mutex<HashMap<String, RoaringBitmap>>,
}

impl DirtyTracker {
    /// `page_size` must match the storage engine's page size; mismatched
    /// sizes would flush the wrong byte ranges.
    pub fn new(page_size: usize) -> Self {
        assert!(page_size > 0, "page size must be non-zero");
        Self {
            page_size: page_size as u64,
            files: Mutex::new(HashMap::new()),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size as usize
    }

    /// Marks every page touched by a write of `len` bytes at `offset`.
    pub fn mark_range(&self, path: &str, offset: u64, len: usize) {
        if len == 0 {
            return;
        }
        let first = (offset / self.page_size) as u32;
        let last = ((offset + len as u64 - 1) / self.page_size) as u32;

        let mut files = self.files.lock();
        files
            .entry_ref(path)
            .or_default()
            .insert_range(first..=last);
    }

    /// Sorted set of currently dirty page numbers. Empty means "nothing to
    /// synchronize" and callers must treat it as a no-op.
    pub fn dirty_pages(&self, path: &str) -> Vec<u32> {
        let files = self.files.lock();
        match files.get(path) {
            Some(bm) => bm.iter().collect(),
            None => Vec::new(),
        }
    }

    pub fn dirty_count(&self, path: &str) -> u64 {
        let files = self.files.lock();
        files.get(path).map(|bm| bm.len()).unwrap_or(0)
    }

    pub fn has_dirty(&self, path: &str) -> bool {
        let files = self.files.lock();
        files.get(path).map(|bm| !bm.is_empty()).unwrap_or(false)
    }

    /// Clears the bitmap for `path` in bulk. Only safe when no writer can
    /// race the caller (hydration, teardown).
    pub fn reset(&self, path: &str) {
        let mut files = self.files.lock();
        if let Some(bm) = files.get_mut(path) {
            bm.clear();
        }
    }

    /// Clears exactly `pages` from the bitmap for `path`, after a flush of
    /// those pages was confirmed durable. Pages dirtied after the caller
    /// captured the set stay marked, so a write landing mid-flush is picked
    /// up by the next flush instead of being lost.
    pub fn confirm(&self, path: &str, pages: &[u32]) {
        let mut files = self.files.lock();
        if let Some(bm) = files.get_mut(path) {
            for &page in pages {
                bm.remove(page);
            }
        }
    }

    /// Discards tracking state for `path` entirely.
    pub fn drop_file(&self, path: &str) {
        self.files.lock().remove(path);
    }

    pub fn clear_all(&self) {
        self.files.lock().clear();
    }

    /// Filenames with at least one dirty page.
    pub fn dirty_files(&self) -> Vec<String> {
        let files = self.files.lock();
        files
            .iter()
            .filter(|(_, bm)| !bm.is_empty())
            .map(|(path, _)| path.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_byte_write_at_5000_dirties_page_1() {
        let tracker = DirtyTracker::new(4096);

        tracker.mark_range("a.db", 5000, 1);

        assert_eq!(tracker.dirty_pages("a.db"), vec![1]);
    }

    #[test]
    fn second_write_at_100_adds_page_0() {
        let tracker = DirtyTracker::new(4096);
        tracker.mark_range("a.db", 5000, 1);
        tracker.mark_range("a.db", 100, 1);

        assert_eq!(tracker.dirty_pages("a.db"), vec![0, 1]);
    }

    #[test]
    fn write_spanning_page_boundary_marks_both_pages() {
        let tracker = DirtyTracker::new(4096);

        tracker.mark_range("a.db", 4090, 10);

        assert_eq!(tracker.dirty_pages("a.db"), vec![0, 1]);
    }

    #[test]
    fn write_ending_exactly_on_boundary_marks_one_page() {
        let tracker = DirtyTracker::new(4096);

        tracker.mark_range("a.db", 0, 4096);

        assert_eq!(tracker.dirty_pages("a.db"), vec![0]);
    }

    #[test]
    fn zero_length_write_marks_nothing() {
        let tracker = DirtyTracker::new(4096);

        tracker.mark_range("a.db", 1000, 0);

        assert!(!tracker.has_dirty("a.db"));
    }

    #[test]
    fn large_write_marks_contiguous_run() {
        let tracker = DirtyTracker::new(4096);

        tracker.mark_range("a.db", 0, 4096 * 100);

        let pages = tracker.dirty_pages("a.db");
        assert_eq!(pages.len(), 100);
        assert_eq!(pages.first(), Some(&0));
        assert_eq!(pages.last(), Some(&99));
    }

    #[test]
    fn reset_clears_only_that_file() {
        let tracker = DirtyTracker::new(4096);
        tracker.mark_range("a.db", 0, 1);
        tracker.mark_range("b.db", 0, 1);

        tracker.reset("a.db");

        assert!(!tracker.has_dirty("a.db"));
        assert!(tracker.has_dirty("b.db"));
    }

    #[test]
    fn empty_after_reset_with_no_intervening_writes() {
        let tracker = DirtyTracker::new(4096);
        tracker.mark_range("a.db", 0, 8192);
        tracker.reset("a.db");

        assert_eq!(tracker.dirty_pages("a.db"), Vec::<u32>::new());
        assert_eq!(tracker.dirty_count("a.db"), 0);
    }

    #[test]
    fn confirm_clears_only_the_captured_pages() {
        let tracker = DirtyTracker::new(4096);
        tracker.mark_range("a.db", 0, 4096 * 2);
        let captured = tracker.dirty_pages("a.db");
        assert_eq!(captured, vec![0, 1]);

        // A write lands on another page after the capture.
        tracker.mark_range("a.db", 4096 * 5, 1);

        tracker.confirm("a.db", &captured);

        assert_eq!(tracker.dirty_pages("a.db"), vec![5]);
    }

    #[test]
    fn confirm_of_a_recaptured_page_clears_it() {
        let tracker = DirtyTracker::new(4096);
        tracker.mark_range("a.db", 0, 1);
        tracker.confirm("a.db", &[0]);

        assert!(!tracker.has_dirty("a.db"));

        tracker.mark_range("a.db", 0, 1);
        assert_eq!(tracker.dirty_pages("a.db"), vec![0]);
    }

    #[test]
    fn dirty_pages_come_back_sorted() {
        let tracker = DirtyTracker::new(4096);
        tracker.mark_range("a.db", 4096 * 50, 1);
        tracker.mark_range("a.db", 0, 1);
        tracker.mark_range("a.db", 4096 * 7, 1);

        assert_eq!(tracker.dirty_pages("a.db"), vec![0, 7, 50]);
    }

    #[test]
    fn dirty_files_lists_only_files_with_set_bits() {
        let tracker = DirtyTracker::new(4096);
        tracker.mark_range("a.db", 0, 1);
        tracker.mark_range("b.db", 0, 1);
        tracker.reset("b.db");

        assert_eq!(tracker.dirty_files(), vec!["a.db".to_string()]);
    }
}
