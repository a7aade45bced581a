//! Default storage engine: a copy-on-write ordered map with file persistence.
//!
//! The live key space is an `Arc<BTreeMap>` behind an `RwLock`. Mutations go
//! through `Arc::make_mut`, so while no snapshot or cursor holds the map the
//! write is in place; once one does, the first following write clones the map
//! and the frozen view keeps the old version. Snapshots and cursors are
//! therefore O(1) to create and stay consistent for free.
//!
//! Persistence is deliberately simple: the whole map is bincode-encoded into
//! `data.bin` inside the database directory, rewritten atomically via a
//! temporary file. Flushes happen every `AUTO_FLUSH_OPS` mutations, on an
//! explicit `flush`, and on `close`.

use std::collections::BTreeMap;
use std::fs;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::engine::{BatchOp, Cursor, DatabaseHandle, SnapshotHandle, StorageEngine, WriteBatch};
use crate::error::{KvError, Result};

const DATA_FILE: &str = "data.bin";

/// Mutations between automatic flushes.
const AUTO_FLUSH_OPS: usize = 1000;

type KeyMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// Engine factory. Stateless; all state lives in the handles it opens.
#[derive(Debug, Default)]
pub struct BTreeStore;

impl BTreeStore {
    pub fn new() -> Self {
        Self
    }
}

impl StorageEngine for BTreeStore {
    fn open(&self, path: &Path, create_if_needed: bool) -> Result<Box<dyn DatabaseHandle>> {
        let db = BTreeDatabase::open(path, create_if_needed)?;
        Ok(Box::new(db))
    }

    fn remove(&self, path: &Path) -> Result<()> {
        if !path.is_dir() {
            return Err(KvError::NoDatabaseFound);
        }
        fs::remove_dir_all(path)?;
        Ok(())
    }
}

struct Inner {
    map: Arc<KeyMap>,
    ops_since_flush: usize,
    dirty: bool,
}

/// One open database directory.
pub struct BTreeDatabase {
    path: PathBuf,
    inner: RwLock<Inner>,
}

impl BTreeDatabase {
    fn open(path: &Path, create_if_needed: bool) -> Result<Self> {
        let data_file = path.join(DATA_FILE);

        let map: KeyMap = if data_file.is_file() {
            let bytes = fs::read(&data_file).map_err(|e| {
                KvError::OpenFailed(format!("{}: {}", data_file.display(), e))
            })?;
            bincode::deserialize(&bytes).map_err(|e| {
                KvError::OpenFailed(format!("{}: {}", data_file.display(), e))
            })?
        } else if path.is_dir() {
            // Directory exists but was never flushed
            BTreeMap::new()
        } else if create_if_needed {
            fs::create_dir_all(path).map_err(|e| {
                KvError::OpenFailed(format!("{}: {}", path.display(), e))
            })?;
            BTreeMap::new()
        } else {
            return Err(KvError::NoDatabaseFound);
        };

        Ok(Self {
            path: path.to_path_buf(),
            inner: RwLock::new(Inner {
                map: Arc::new(map),
                ops_since_flush: 0,
                dirty: false,
            }),
        })
    }

    /// Write `data.bin` through a temp file so a crash mid-write never
    /// leaves a truncated data file behind.
    fn flush_locked(&self, inner: &mut Inner) -> Result<()> {
        if !inner.dirty {
            return Ok(());
        }
        let bytes = bincode::serialize(&*inner.map)?;
        let tmp = self.path.join(format!("{}.tmp", DATA_FILE));
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, self.path.join(DATA_FILE))?;
        inner.ops_since_flush = 0;
        inner.dirty = false;
        Ok(())
    }

    fn mutated(&self, inner: &mut Inner, count: usize) -> Result<()> {
        inner.dirty = true;
        inner.ops_since_flush += count;
        if inner.ops_since_flush >= AUTO_FLUSH_OPS {
            self.flush_locked(inner)?;
        }
        Ok(())
    }

    fn frozen(&self) -> Arc<KeyMap> {
        Arc::clone(&self.inner.read().unwrap().map)
    }
}

impl DatabaseHandle for BTreeDatabase {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let inner = self.inner.read().unwrap();
        inner.map.get(key).cloned().ok_or(KvError::KeyNotFound)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        Arc::make_mut(&mut inner.map).insert(key.to_vec(), value.to_vec());
        self.mutated(&mut inner, 1)
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        let count = batch.len();
        let mut inner = self.inner.write().unwrap();
        let map = Arc::make_mut(&mut inner.map);
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => {
                    map.insert(key, value);
                }
                BatchOp::Remove { key } => {
                    map.remove(&key);
                }
            }
        }
        self.mutated(&mut inner, count)
    }

    fn lookup(&self, lower: &[u8], upper: &[u8]) -> Result<Box<dyn Cursor>> {
        Ok(Box::new(BTreeCursor::new(self.frozen(), lower, upper)))
    }

    fn snapshot(&self) -> Result<Box<dyn SnapshotHandle>> {
        Ok(Box::new(BTreeSnapshot { map: self.frozen() }))
    }

    fn flush(&self) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        self.flush_locked(&mut inner)
    }

    fn close(&self) -> Result<()> {
        self.flush()
    }
}

/// Frozen view taken at `snapshot()` time.
struct BTreeSnapshot {
    map: Arc<KeyMap>,
}

impl SnapshotHandle for BTreeSnapshot {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.map.get(key).cloned().ok_or(KvError::KeyNotFound)
    }

    fn lookup(&self, lower: &[u8], upper: &[u8]) -> Result<Box<dyn Cursor>> {
        Ok(Box::new(BTreeCursor::new(
            Arc::clone(&self.map),
            lower,
            upper,
        )))
    }
}

/// Cursor over a frozen map version. Steps lazily: each `next` re-seeks past
/// the last returned key, so the cursor itself stays small no matter how
/// large the range is.
struct BTreeCursor {
    map: Arc<KeyMap>,
    lower: Vec<u8>,
    upper: Vec<u8>,
    last: Option<Vec<u8>>,
    done: bool,
}

impl BTreeCursor {
    fn new(map: Arc<KeyMap>, lower: &[u8], upper: &[u8]) -> Self {
        // A reversed range is legal on the wire; it just yields nothing.
        let done = !lower.is_empty() && !upper.is_empty() && lower > upper;
        Self {
            map,
            lower: lower.to_vec(),
            upper: upper.to_vec(),
            last: None,
            done,
        }
    }
}

impl Cursor for BTreeCursor {
    fn next(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        if self.done {
            return Ok(None);
        }
        let start: Bound<Vec<u8>> = match &self.last {
            Some(k) => Bound::Excluded(k.clone()),
            None if self.lower.is_empty() => Bound::Unbounded,
            None => Bound::Included(self.lower.clone()),
        };
        let end: Bound<Vec<u8>> = if self.upper.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(self.upper.clone())
        };

        match self.map.range((start, end)).next() {
            Some((k, v)) => {
                self.last = Some(k.clone());
                Ok(Some((k.clone(), v.clone())))
            }
            None => {
                self.done = true;
                Ok(None)
            }
        }
    }
}
