//! DatabaseRegistry - reference-counted table of open databases.
//!
//! One registry per server process, created at startup and injected into the
//! connection-accept path. Every session bound to a database holds an `Arc`
//! to the same shared handle; the registry's refcount decides when the
//! underlying engine handle is actually closed.
//!
//! All registry operations serialize on one mutex. The lock is held across
//! the engine `open` call on the first-open path so two sessions racing to
//! open the same new database end up with one engine instance and a
//! refcount of 2, never two engines on one directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::engine::{DatabaseHandle, StorageEngine};
use crate::error::{KvError, Result};

/// One open database shared between sessions. Ownership stays with the
/// registry; sessions hold non-owning `Arc` references.
pub struct SharedDb {
    /// Canonical path, the registry key
    pub path: PathBuf,
    /// The engine handle behind this database
    pub handle: Box<dyn DatabaseHandle>,
}

struct RegistryEntry {
    db: Arc<SharedDb>,
    refcount: usize,
}

/// Process-wide table mapping canonical database paths to shared handles.
pub struct DatabaseRegistry {
    root: PathBuf,
    engine: Arc<dyn StorageEngine>,
    entries: Mutex<HashMap<PathBuf, RegistryEntry>>,
}

impl DatabaseRegistry {
    /// Create a registry rooted at `root`. Database names are joined onto
    /// this directory to form the canonical path.
    pub fn new(root: PathBuf, engine: Arc<dyn StorageEngine>) -> Self {
        Self {
            root,
            engine,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Canonical path for a client-supplied database name.
    pub fn db_path(&self, dbname: &str) -> PathBuf {
        self.root.join(dbname)
    }

    /// Open `dbname`, joining the existing entry when one is registered.
    /// `create_if_needed` only matters for the first opener of a path.
    pub fn open(&self, dbname: &str, create_if_needed: bool) -> Result<Arc<SharedDb>> {
        let path = self.db_path(dbname);
        let mut entries = self.entries.lock().unwrap();

        if let Some(entry) = entries.get_mut(&path) {
            entry.refcount += 1;
            tracing::debug!("database {} already open, returning ref (refcount {})", path.display(), entry.refcount);
            return Ok(Arc::clone(&entry.db));
        }

        // First opener: the engine open happens under the lock
        let handle = self.engine.open(&path, create_if_needed)?;
        tracing::info!("opened database {}", path.display());

        let db = Arc::new(SharedDb {
            path: path.clone(),
            handle,
        });
        entries.insert(
            path,
            RegistryEntry {
                db: Arc::clone(&db),
                refcount: 1,
            },
        );
        Ok(db)
    }

    /// Drop one reference to `path`. At refcount zero the handle is closed
    /// and the entry removed; close errors propagate to the caller.
    pub fn release(&self, path: &Path) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();

        let remaining = {
            let entry = entries.get_mut(path).ok_or(KvError::NotOpen)?;
            entry.refcount -= 1;
            entry.refcount
        };

        if remaining == 0 {
            if let Some(entry) = entries.remove(path) {
                tracing::info!("closing database {}", path.display());
                entry.db.handle.close()?;
            }
        }
        Ok(())
    }

    /// Destroy the database named `dbname`. Refused while any session has
    /// it open; otherwise delegated to the engine's destructive remove.
    pub fn remove(&self, dbname: &str) -> Result<()> {
        let path = self.db_path(dbname);
        let entries = self.entries.lock().unwrap();

        if entries.contains_key(&path) {
            return Err(KvError::DatabaseInUse(dbname.to_string()));
        }

        tracing::info!("removing database {}", path.display());
        self.engine.remove(&path)
    }

    /// Current refcount for `path` (0 when not registered).
    pub fn refcount(&self, path: &Path) -> usize {
        self.entries
            .lock()
            .unwrap()
            .get(path)
            .map(|e| e.refcount)
            .unwrap_or(0)
    }

    /// Whether any session currently has `path` open.
    pub fn is_open(&self, path: &Path) -> bool {
        self.refcount(path) > 0
    }

    /// Flush every open database. Used by the shutdown path.
    pub fn flush_all(&self) {
        let entries = self.entries.lock().unwrap();
        for (path, entry) in entries.iter() {
            match entry.db.handle.flush() {
                Ok(()) => tracing::info!("flushed database {}", path.display()),
                Err(e) => tracing::warn!("flush failed for {}: {}", path.display(), e),
            }
        }
    }
}
