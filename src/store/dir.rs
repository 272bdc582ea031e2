//! # Directory-Backed Store
//!
//! `DirStore` maps the backing-store contract onto a plain directory of
//! files via `std::fs`. On native platforms this is the real persistent
//! area; it is also what integration tests run against through `tempfile`.
//!
//! Handles hold an open `File` with read and write access. `flush` maps to
//! `sync_data`, which is the synchronous durability point the pool relies
//! on.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use eyre::{Result, WrapErr};

use super::{AccessHandle, BackingStore};
use crate::vfs::VfsError;

/// Backing store over one filesystem directory.
#[derive(Debug)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Opens (creating if needed) the directory at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .wrap_err_with(|| format!("failed to create store directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

/// Handle to one file inside the store directory.
#[derive(Debug)]
pub struct DirHandle {
    file: File,
}

impl AccessHandle for DirHandle {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut read = 0;
        while read < buf.len() {
            match self.file.read(&mut buf[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(read)
    }

    fn write_at(&mut self, data: &[u8], offset: u64) -> Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(data.len())
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        self.file.set_len(size)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    fn size(&mut self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

impl BackingStore for DirStore {
    type Handle = DirHandle;

    fn create(&mut self, name: &str) -> Result<Self::Handle> {
        let path = self.blob_path(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .wrap_err_with(|| format!("failed to create backing file {}", path.display()))?;
        Ok(DirHandle { file })
    }

    fn open(&mut self, name: &str) -> Result<Self::Handle> {
        let path = self.blob_path(name);
        if !path.exists() {
            return Err(VfsError::NotFound(name.to_string()).into());
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .wrap_err_with(|| format!("failed to open backing file {}", path.display()))?;
        Ok(DirHandle { file })
    }

    fn list(&mut self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    fn remove(&mut self, name: &str) -> Result<()> {
        let path = self.blob_path(name);
        if path.exists() {
            fs::remove_file(&path)
                .wrap_err_with(|| format!("failed to remove backing file {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_write_flush_reopen_reads_back() {
        let dir = tempdir().unwrap();
        let mut store = DirStore::open(dir.path()).unwrap();

        let mut h = store.create("blob-0").unwrap();
        h.write_at(b"durable bytes", 0).unwrap();
        h.flush().unwrap();
        drop(h);

        let mut h = store.open("blob-0").unwrap();
        let mut buf = [0u8; 13];
        assert_eq!(h.read_at(&mut buf, 0).unwrap(), 13);
        assert_eq!(&buf, b"durable bytes");
    }

    #[test]
    fn read_past_eof_returns_short_count() {
        let dir = tempdir().unwrap();
        let mut store = DirStore::open(dir.path()).unwrap();
        let mut h = store.create("blob-0").unwrap();
        h.write_at(&[0xAA; 4], 0).unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(h.read_at(&mut buf, 0).unwrap(), 4);
    }

    #[test]
    fn list_sees_created_blobs() {
        let dir = tempdir().unwrap();
        let mut store = DirStore::open(dir.path()).unwrap();
        store.create("blob-0").unwrap();
        store.create("blob-1").unwrap();

        let mut names = store.list().unwrap();
        names.sort();
        assert_eq!(names, vec!["blob-0".to_string(), "blob-1".to_string()]);
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut store = DirStore::open(dir.path()).unwrap();
        store.create("blob-0").unwrap();

        store.remove("blob-0").unwrap();
        store.remove("blob-0").unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn create_existing_blob_fails() {
        let dir = tempdir().unwrap();
        let mut store = DirStore::open(dir.path()).unwrap();
        store.create("blob-0").unwrap();

        assert!(store.create("blob-0").is_err());
    }

    #[test]
    fn open_missing_blob_reports_not_found() {
        let dir = tempdir().unwrap();
        let mut store = DirStore::open(dir.path()).unwrap();

        let err = store.open("nope").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<VfsError>(),
            Some(VfsError::NotFound(_))
        ));
    }
}
