//! Storage engine contract consumed by the session layer.
//!
//! The server never touches a concrete store directly; everything flows
//! through these trait objects so the engine stays swappable. The crate
//! ships one implementation (`btree::BTreeStore`), but the registry and
//! dispatcher only ever see `dyn StorageEngine` / `dyn DatabaseHandle`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod btree;

pub use btree::BTreeStore;

/// One operation inside an atomic write batch, in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Remove { key: Vec<u8> },
}

/// An ordered batch of puts and removes applied atomically.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.ops.push(BatchOp::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        });
    }

    pub fn remove(&mut self, key: &[u8]) {
        self.ops.push(BatchOp::Remove { key: key.to_vec() });
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl From<Vec<BatchOp>> for WriteBatch {
    fn from(ops: Vec<BatchOp>) -> Self {
        Self { ops }
    }
}

/// Factory for database handles. One engine serves the whole process.
pub trait StorageEngine: Send + Sync {
    /// Open the database at `path`, creating it when `create_if_needed`.
    fn open(&self, path: &Path, create_if_needed: bool) -> Result<Box<dyn DatabaseHandle>>;

    /// Destroy the database at `path`. Fails with `NoDatabaseFound` when
    /// nothing exists there.
    fn remove(&self, path: &Path) -> Result<()>;
}

/// An open database. Shared across sessions behind an `Arc`, so every
/// method takes `&self`; implementations handle their own interior locking.
pub trait DatabaseHandle: Send + Sync {
    /// Point read. `KeyNotFound` when the key is absent (an empty value is
    /// a successful read, not an absence).
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Apply all batch operations with atomic visibility: a concurrent
    /// reader observes either none or all of them.
    fn write(&self, batch: WriteBatch) -> Result<()>;

    /// Open a forward-only cursor over `[lower, upper)`. An empty bound is
    /// unbounded on that side. The cursor never observes writes made after
    /// its creation.
    fn lookup(&self, lower: &[u8], upper: &[u8]) -> Result<Box<dyn Cursor>>;

    /// Freeze the current key space into a point-in-time view.
    fn snapshot(&self) -> Result<Box<dyn SnapshotHandle>>;

    /// Persist in-memory state without closing.
    fn flush(&self) -> Result<()>;

    /// Flush and release the database. Called by the registry when the last
    /// reference goes away.
    fn close(&self) -> Result<()>;
}

/// Immutable point-in-time view of a database's key space.
pub trait SnapshotHandle: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;

    fn lookup(&self, lower: &[u8], upper: &[u8]) -> Result<Box<dyn Cursor>>;
}

/// Forward-only, non-restartable sequence of key/value pairs in ascending
/// key order. `Ok(None)` signals exhaustion; once exhausted a cursor stays
/// exhausted.
pub trait Cursor: Send {
    fn next(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>>;
}
