//! Session - per-connection state management
//!
//! Each client connection owns one session tracking the bound database,
//! the open cursors, and the open snapshots. Only the connection's own
//! task ever touches it, so no locking is needed here.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::{Cursor, SnapshotHandle};
use crate::error::{KvError, Result};
use crate::registry::{DatabaseRegistry, SharedDb};

/// Session state for one client connection.
///
/// Created when the connection is accepted and torn down (releasing every
/// held resource) when it ends. Cursor and snapshot IDs come from one
/// shared monotonic counter: unique within the session, never reused,
/// 0 reserved to mean "none" in request fields.
pub struct Session {
    db: Option<Arc<SharedDb>>,
    cursors: HashMap<u64, Box<dyn Cursor>>,
    snapshots: HashMap<u64, Box<dyn SnapshotHandle>>,
    next_id: u64,
}

impl Session {
    pub fn new() -> Self {
        Self {
            db: None,
            cursors: HashMap::new(),
            snapshots: HashMap::new(),
            next_id: 0,
        }
    }

    /// Bind this session to an open database.
    pub fn bind(&mut self, db: Arc<SharedDb>) {
        self.db = Some(db);
    }

    pub fn is_bound(&self) -> bool {
        self.db.is_some()
    }

    /// The bound database, or `NoDatabaseBound` while idle.
    pub fn require_db(&self) -> Result<&SharedDb> {
        self.db.as_deref().ok_or(KvError::NoDatabaseBound)
    }

    /// Allocate the next cursor/snapshot ID. First ID is 1.
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Store a cursor and hand back its session-unique ID.
    pub fn track_cursor(&mut self, cursor: Box<dyn Cursor>) -> u64 {
        let id = self.allocate_id();
        self.cursors.insert(id, cursor);
        id
    }

    pub fn cursor_mut(&mut self, id: u64) -> Result<&mut dyn Cursor> {
        match self.cursors.get_mut(&id) {
            Some(cursor) => Ok(&mut **cursor),
            None => Err(KvError::InvalidIterator),
        }
    }

    /// Forget an exhausted cursor. Its ID is never handed out again.
    pub fn drop_cursor(&mut self, id: u64) {
        self.cursors.remove(&id);
    }

    /// Store a snapshot and hand back its session-unique ID.
    pub fn track_snapshot(&mut self, snapshot: Box<dyn SnapshotHandle>) -> u64 {
        let id = self.allocate_id();
        self.snapshots.insert(id, snapshot);
        id
    }

    pub fn snapshot(&self, id: u64) -> Result<&dyn SnapshotHandle> {
        match self.snapshots.get(&id) {
            Some(snapshot) => Ok(&**snapshot),
            None => Err(KvError::InvalidSnapshot),
        }
    }

    pub fn cursor_count(&self) -> usize {
        self.cursors.len()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    /// Release the bound database, if any. Safe to call on an idle session
    /// (returns Ok), so an explicit Close followed by disconnect cleanup
    /// never double-decrements the registry refcount.
    pub fn close_db(&mut self, registry: &DatabaseRegistry) -> Result<()> {
        match self.db.take() {
            Some(db) => registry.release(&db.path),
            None => Ok(()),
        }
    }

    /// Tear down everything this session holds: cursors, snapshots, and
    /// the database binding. Idempotent; runs on every connection exit.
    pub fn release_all(&mut self, registry: &DatabaseRegistry) -> Result<()> {
        self.cursors.clear();
        self.snapshots.clear();
        self.close_db(registry)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
