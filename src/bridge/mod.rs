//! # Engine ↔ Pool Message Bridge
//!
//! The storage engine and the handle pool live in different execution
//! contexts (on the web: main-thread engine, worker-owned pool). There is
//! no shared-memory mutation between them; everything crosses this bridge
//! as a request/response pair correlated by id.
//!
//! ## Closed Message Set
//!
//! [`VfsRequest`] and [`VfsReply`] are closed tagged enums. The server
//! matches requests exhaustively, so adding a request variant without a
//! handler is a compile error, and every request has exactly one handler.
//!
//! ## Actor Discipline
//!
//! [`PoolServer`] owns the pool outright on its own thread; it is the
//! single mutator of pool state, so the pool needs no internal locking.
//! [`PoolClient`] is cheap to clone and blocks each call until its reply
//! arrives, preserving strict request/response pairing. Classified errors
//! ([`VfsError`]) cross the boundary verbatim; everything else is wrapped
//! as a transport I/O error.
//!
//! A client whose server never started, or has shut down, fails every call
//! with [`VfsError::NotInitialized`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use eyre::Result;
use log::error;

use crate::pool::SahPool;
use crate::store::BackingStore;
use crate::vfs::{FileId, OpenFlags, Vfs, VfsError};

/// Every operation the engine context may ask of the pool context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VfsRequest {
    Open { path: String, flags: OpenFlags },
    Read { id: FileId, amount: usize, offset: u64 },
    Write { id: FileId, data: Vec<u8>, offset: u64 },
    Truncate { id: FileId, size: u64 },
    Sync { id: FileId },
    FileSize { id: FileId },
    Close { id: FileId },
    Access { path: String },
    Delete { path: String },
    List,
    Export { path: String },
    Import { path: String, data: Vec<u8> },
    Load { path: String },
    Persist { path: String, writes: Vec<(u64, Vec<u8>)>, size: u64 },
    Capacity,
    AddCapacity { count: usize },
    Shutdown,
}

/// Successful replies, one shape per request family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VfsReply {
    Opened(FileId),
    /// Read result: `data` is `amount` long, zero-filled past `valid`.
    Bytes { data: Vec<u8>, valid: usize },
    Done,
    Size(u64),
    Exists(bool),
    Paths(Vec<String>),
    Contents(Option<Vec<u8>>),
    Capacity(usize),
}

#[derive(Debug)]
struct Envelope {
    id: u64,
    request: VfsRequest,
    reply_to: mpsc::Sender<ResponseEnvelope>,
}

#[derive(Debug)]
struct ResponseEnvelope {
    id: u64,
    result: Result<VfsReply, VfsError>,
}

/// Engine-side endpoint. Clone freely; every clone talks to the same pool.
#[derive(Debug, Clone)]
pub struct PoolClient {
    tx: mpsc::Sender<Envelope>,
    next_id: Arc<AtomicU64>,
}

impl PoolClient {
    /// One blocking round trip with strict id pairing.
    pub fn call(&self, request: VfsRequest) -> Result<VfsReply> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_to, reply_rx) = mpsc::channel();

        self.tx
            .send(Envelope {
                id,
                request,
                reply_to,
            })
            .map_err(|_| VfsError::NotInitialized)?;

        let response = reply_rx.recv().map_err(|_| VfsError::NotInitialized)?;
        if response.id != id {
            return Err(VfsError::Io(format!(
                "response id {} does not match request id {}",
                response.id, id
            ))
            .into());
        }
        response.result.map_err(eyre::Report::new)
    }

    fn expect_done(&self, request: VfsRequest) -> Result<()> {
        match self.call(request)? {
            VfsReply::Done => Ok(()),
            other => Err(protocol_violation(&other)),
        }
    }

    /// Logical paths currently persisted in the pool.
    pub fn list_files(&self) -> Result<Vec<String>> {
        match self.call(VfsRequest::List)? {
            VfsReply::Paths(paths) => Ok(paths),
            other => Err(protocol_violation(&other)),
        }
    }

    /// Full payload bytes of a persisted file; fails when absent.
    pub fn export(&self, path: &str) -> Result<Vec<u8>> {
        match self.call(VfsRequest::Export {
            path: path.to_string(),
        })? {
            VfsReply::Contents(Some(data)) => Ok(data),
            VfsReply::Contents(None) => Err(VfsError::NotFound(path.to_string()).into()),
            other => Err(protocol_violation(&other)),
        }
    }

    /// Full payload bytes, or `None` when nothing is persisted at `path`.
    pub fn load(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match self.call(VfsRequest::Load {
            path: path.to_string(),
        })? {
            VfsReply::Contents(contents) => Ok(contents),
            other => Err(protocol_violation(&other)),
        }
    }

    /// Imports `data` as the full content of `path`.
    pub fn import(&self, path: &str, data: Vec<u8>) -> Result<()> {
        self.expect_done(VfsRequest::Import {
            path: path.to_string(),
            data,
        })
    }

    /// Applies sparse payload writes and truncates to `size`; the
    /// incremental-sync fast path.
    pub fn persist(&self, path: &str, writes: Vec<(u64, Vec<u8>)>, size: u64) -> Result<()> {
        self.expect_done(VfsRequest::Persist {
            path: path.to_string(),
            writes,
            size,
        })
    }

    pub fn capacity(&self) -> Result<usize> {
        match self.call(VfsRequest::Capacity)? {
            VfsReply::Capacity(n) => Ok(n),
            other => Err(protocol_violation(&other)),
        }
    }

    /// Provisions `count` more backing files; returns the new capacity.
    pub fn add_capacity(&self, count: usize) -> Result<usize> {
        match self.call(VfsRequest::AddCapacity { count })? {
            VfsReply::Capacity(n) => Ok(n),
            other => Err(protocol_violation(&other)),
        }
    }

    /// Asks the server to stop after replying. Subsequent calls on any
    /// clone fail with `NotInitialized`.
    pub fn shutdown(&self) -> Result<()> {
        self.expect_done(VfsRequest::Shutdown)
    }
}

fn protocol_violation(reply: &VfsReply) -> eyre::Report {
    VfsError::Io(format!("mismatched reply variant: {:?}", reply)).into()
}

impl Vfs for PoolClient {
    fn open(&self, path: &str, flags: OpenFlags) -> Result<FileId> {
        match self.call(VfsRequest::Open {
            path: path.to_string(),
            flags,
        })? {
            VfsReply::Opened(id) => Ok(id),
            other => Err(protocol_violation(&other)),
        }
    }

    fn read(&self, id: FileId, buf: &mut [u8], offset: u64) -> Result<usize> {
        match self.call(VfsRequest::Read {
            id,
            amount: buf.len(),
            offset,
        })? {
            VfsReply::Bytes { data, valid } => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                buf[n..].fill(0);
                Ok(valid.min(buf.len()))
            }
            other => Err(protocol_violation(&other)),
        }
    }

    fn write(&self, id: FileId, data: &[u8], offset: u64) -> Result<()> {
        self.expect_done(VfsRequest::Write {
            id,
            data: data.to_vec(),
            offset,
        })
    }

    fn truncate(&self, id: FileId, size: u64) -> Result<()> {
        self.expect_done(VfsRequest::Truncate { id, size })
    }

    fn sync(&self, id: FileId) -> Result<()> {
        self.expect_done(VfsRequest::Sync { id })
    }

    fn file_size(&self, id: FileId) -> Result<u64> {
        match self.call(VfsRequest::FileSize { id })? {
            VfsReply::Size(size) => Ok(size),
            other => Err(protocol_violation(&other)),
        }
    }

    fn close(&self, id: FileId) -> Result<()> {
        self.expect_done(VfsRequest::Close { id })
    }

    fn access(&self, path: &str) -> Result<bool> {
        match self.call(VfsRequest::Access {
            path: path.to_string(),
        })? {
            VfsReply::Exists(exists) => Ok(exists),
            other => Err(protocol_violation(&other)),
        }
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.expect_done(VfsRequest::Delete {
            path: path.to_string(),
        })
    }
}

/// Pool-side endpoint: a thread that owns the pool and serves requests
/// until shutdown or until every client is gone.
#[derive(Debug)]
pub struct PoolServer {
    worker: JoinHandle<()>,
}

impl PoolServer {
    /// Moves `pool` onto a server thread and returns the client endpoint.
    pub fn spawn<S: BackingStore + 'static>(pool: SahPool<S>) -> (PoolClient, PoolServer) {
        let (tx, rx) = mpsc::channel::<Envelope>();

        let worker = thread::spawn(move || {
            let mut pool = pool;
            while let Ok(envelope) = rx.recv() {
                let shutdown = matches!(envelope.request, VfsRequest::Shutdown);
                let result = if shutdown {
                    Ok(VfsReply::Done)
                } else {
                    Self::handle(&mut pool, envelope.request)
                };
                if envelope
                    .reply_to
                    .send(ResponseEnvelope {
                        id: envelope.id,
                        result,
                    })
                    .is_err()
                {
                    error!("pool client dropped before receiving reply");
                }
                if shutdown {
                    break;
                }
            }
        });

        (
            PoolClient {
                tx,
                next_id: Arc::new(AtomicU64::new(1)),
            },
            PoolServer { worker },
        )
    }

    /// Blocks until the server thread exits.
    pub fn join(self) {
        let _ = self.worker.join();
    }

    fn handle<S: BackingStore>(
        pool: &mut SahPool<S>,
        request: VfsRequest,
    ) -> Result<VfsReply, VfsError> {
        let result: Result<VfsReply> = match request {
            VfsRequest::Open { path, flags } => {
                pool.open_file(&path, flags).map(VfsReply::Opened)
            }
            VfsRequest::Read { id, amount, offset } => {
                let mut data = vec![0u8; amount];
                pool.read(id, &mut data, offset)
                    .map(|valid| VfsReply::Bytes { data, valid })
            }
            VfsRequest::Write { id, data, offset } => {
                pool.write(id, &data, offset).map(|_| VfsReply::Done)
            }
            VfsRequest::Truncate { id, size } => {
                pool.truncate(id, size).map(|_| VfsReply::Done)
            }
            VfsRequest::Sync { id } => pool.sync(id).map(|_| VfsReply::Done),
            VfsRequest::FileSize { id } => pool.file_size(id).map(VfsReply::Size),
            VfsRequest::Close { id } => pool.close(id).map(|_| VfsReply::Done),
            VfsRequest::Access { path } => Ok(VfsReply::Exists(pool.access(&path))),
            VfsRequest::Delete { path } => pool.delete_path(&path).map(|_| VfsReply::Done),
            VfsRequest::List => Ok(VfsReply::Paths(pool.list_paths())),
            VfsRequest::Export { path } => pool
                .export(&path)
                .map(|data| VfsReply::Contents(Some(data))),
            VfsRequest::Load { path } => pool.load(&path).map(VfsReply::Contents),
            VfsRequest::Import { path, data } => {
                pool.import(&path, &data).map(|_| VfsReply::Done)
            }
            VfsRequest::Persist { path, writes, size } => {
                pool.persist(&path, &writes, size).map(|_| VfsReply::Done)
            }
            VfsRequest::Capacity => Ok(VfsReply::Capacity(pool.capacity())),
            VfsRequest::AddCapacity { count } => {
                pool.add_capacity(count).map(VfsReply::Capacity)
            }
            // Handled before dispatch; kept for exhaustiveness.
            VfsRequest::Shutdown => Ok(VfsReply::Done),
        };

        result.map_err(classify)
    }
}

/// Flattens an `eyre::Report` into a transportable error, keeping the
/// classified kinds intact.
fn classify(report: eyre::Report) -> VfsError {
    match report.downcast_ref::<VfsError>() {
        Some(err) => err.clone(),
        None => VfsError::Io(format!("{:#}", report)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::store::MemStore;

    fn spawn_pool(capacity: usize) -> (PoolClient, PoolServer, MemStore) {
        let store = MemStore::new();
        let cfg = PoolConfig::new().with_capacity(capacity);
        let pool = SahPool::open_with(store.clone(), cfg).unwrap();
        let (client, server) = PoolServer::spawn(pool);
        (client, server, store)
    }

    fn db_create() -> OpenFlags {
        OpenFlags::READ_WRITE | OpenFlags::CREATE | OpenFlags::MAIN_DB
    }

    #[test]
    fn open_write_read_round_trip_across_the_bridge() {
        let (client, server, _store) = spawn_pool(2);

        let id = client.open("a.db", db_create()).unwrap();
        client.write(id, b"over the bridge", 0).unwrap();
        client.sync(id).unwrap();

        let mut buf = [0u8; 15];
        assert_eq!(client.read(id, &mut buf, 0).unwrap(), 15);
        assert_eq!(&buf, b"over the bridge");

        client.shutdown().unwrap();
        server.join();
    }

    #[test]
    fn short_read_is_reported_with_zero_fill() {
        let (client, server, _store) = spawn_pool(2);
        let id = client.open("a.db", db_create()).unwrap();
        client.write(id, &[0xAA; 4], 0).unwrap();

        let mut buf = [0xFFu8; 8];
        let n = client.read(id, &mut buf, 0).unwrap();

        assert_eq!(n, 4);
        assert_eq!(&buf[..4], &[0xAA; 4]);
        assert_eq!(&buf[4..], &[0; 4]);

        client.shutdown().unwrap();
        server.join();
    }

    #[test]
    fn capacity_error_crosses_the_bridge_verbatim() {
        let (client, server, _store) = spawn_pool(1);
        client.open("a.db", db_create()).unwrap();

        let err = client.open("b.db", db_create()).unwrap_err();
        match err.downcast_ref::<VfsError>() {
            Some(VfsError::PoolExhausted { capacity }) => assert_eq!(*capacity, 1),
            other => panic!("expected capacity error, got {:?}", other),
        }

        client.shutdown().unwrap();
        server.join();
    }

    #[test]
    fn calls_after_shutdown_report_not_initialized() {
        let (client, server, _store) = spawn_pool(2);
        client.shutdown().unwrap();
        server.join();

        let err = client.access("a.db").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<VfsError>(),
            Some(VfsError::NotInitialized)
        ));
    }

    #[test]
    fn clones_share_one_pool() {
        let (client, server, _store) = spawn_pool(2);
        let other = client.clone();

        let id = client.open("a.db", db_create()).unwrap();
        other.write(id, b"shared", 0).unwrap();

        let mut buf = [0u8; 6];
        client.read(id, &mut buf, 0).unwrap();
        assert_eq!(&buf, b"shared");

        client.shutdown().unwrap();
        server.join();
    }

    #[test]
    fn bulk_operations_round_trip() {
        let (client, server, _store) = spawn_pool(3);

        client.import("a.db", vec![0x11; 5000]).unwrap();
        client
            .persist("b.db", vec![(0, vec![0x22; 4096])], 4096)
            .unwrap();

        let mut paths = client.list_files().unwrap();
        paths.sort();
        assert_eq!(paths, vec!["a.db".to_string(), "b.db".to_string()]);

        assert_eq!(client.export("a.db").unwrap(), vec![0x11; 5000]);
        assert_eq!(client.load("missing.db").unwrap(), None);
        assert!(client.export("missing.db").is_err());

        assert_eq!(client.capacity().unwrap(), 3);
        assert_eq!(client.add_capacity(2).unwrap(), 5);

        client.shutdown().unwrap();
        server.join();
    }

    #[test]
    fn persisted_bytes_survive_server_restart() {
        let (client, server, store) = spawn_pool(2);
        client.import("a.db", vec![0xEE; 8192]).unwrap();
        client.shutdown().unwrap();
        server.join();

        let pool = SahPool::open_with(store, PoolConfig::new().with_capacity(2)).unwrap();
        let (client, server) = PoolServer::spawn(pool);
        assert_eq!(client.export("a.db").unwrap(), vec![0xEE; 8192]);

        client.shutdown().unwrap();
        server.join();
    }
}
