//! Environment: named dbis over snapshot maps
//!
//! The substrate contract is LMDB-class: named typed databases, snapshot read
//! transactions that never block, one writer at a time, batched writes
//! applied atomically, and "inverted lists" (keys mapping to sorted sets of
//! values). The memory-mapped engine itself is an external collaborator; this
//! module ships the in-process reference engine with the same observable
//! semantics so every layer above it can be exercised unchanged.
//!
//! A snapshot is an immutable map of tables behind an `Arc`. A write
//! transaction clones the table `Arc`s, copy-on-writes only the tables it
//! touches, and publishes the new snapshot at commit. Readers pin whatever
//! snapshot was current when they started.

use crate::error::{Error, Result};
use crate::txn::{ReadTxn, WriteTxn};
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Process-wide set of open environment paths. A second open of the same
/// path is an error until the first environment is closed or dropped.
static OPEN_ENVS: Lazy<Mutex<FxHashSet<PathBuf>>> = Lazy::new(|| Mutex::new(FxHashSet::default()));

/// One entry in a table: either a plain value or an inverted list.
#[derive(Clone, Debug)]
pub(crate) enum Slot {
    Val(Vec<u8>),
    List(BTreeSet<Vec<u8>>),
}

/// One named dbi's sorted contents. Keys order bytewise; the value codec
/// makes bytewise order semantic.
#[derive(Clone, Debug, Default)]
pub(crate) struct Table {
    pub(crate) map: BTreeMap<Vec<u8>, Slot>,
}

/// An immutable multi-table snapshot.
#[derive(Clone, Debug, Default)]
pub(crate) struct Snapshot {
    pub(crate) tables: FxHashMap<String, Arc<Table>>,
}

/// Handle for a named dbi.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Dbi {
    pub(crate) name: Arc<str>,
}

impl Dbi {
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub(crate) struct EnvInner {
    path: PathBuf,
    pub(crate) current: RwLock<Arc<Snapshot>>,
    pub(crate) writer: Mutex<()>,
}

impl Drop for EnvInner {
    fn drop(&mut self) {
        OPEN_ENVS.lock().remove(&self.path);
    }
}

/// An open environment. Cheap to clone; the environment closes when the last
/// clone is dropped or `close()` is called.
#[derive(Clone)]
pub struct Env {
    pub(crate) inner: Arc<EnvInner>,
}

impl std::fmt::Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Env").field("path", &self.inner.path).finish()
    }
}

impl Env {
    /// Open the environment rooted at `path`, creating the directory if
    /// needed. Fails with `kv/env-open` if this process already has the path
    /// open.
    pub fn open(path: impl AsRef<Path>) -> Result<Env> {
        std::fs::create_dir_all(path.as_ref())?;
        let canonical = path.as_ref().canonicalize()?;
        {
            let mut open = OPEN_ENVS.lock();
            if !open.insert(canonical.clone()) {
                return Err(Error::AlreadyOpen(canonical));
            }
        }
        tracing::debug!(path = %canonical.display(), "opened kv environment");
        Ok(Env {
            inner: Arc::new(EnvInner {
                path: canonical,
                current: RwLock::new(Arc::new(Snapshot::default())),
                writer: Mutex::new(()),
            }),
        })
    }

    /// The canonical path this environment was opened at.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Open (or create) a named dbi.
    pub fn open_dbi(&self, name: &str) -> Dbi {
        let _write = self.inner.writer.lock();
        let mut current = self.inner.current.write();
        if !current.tables.contains_key(name) {
            let mut snap = Snapshot::clone(&current);
            snap.tables.insert(name.to_string(), Arc::new(Table::default()));
            *current = Arc::new(snap);
        }
        Dbi {
            name: Arc::from(name),
        }
    }

    /// Begin a read transaction pinned to the current snapshot. Never blocks
    /// and is never blocked by the writer.
    pub fn read(&self) -> ReadTxn {
        ReadTxn::new(Arc::clone(&self.inner.current.read()))
    }

    /// Begin the (single) write transaction. Blocks until any in-flight
    /// writer commits or aborts.
    pub fn write(&self) -> WriteTxn<'_> {
        let guard = self.inner.writer.lock();
        let work = Snapshot::clone(&self.inner.current.read());
        WriteTxn::new(self, guard, work)
    }

    /// Release this handle. The path becomes reopenable once every clone is
    /// gone; with a single handle this is immediate.
    pub fn close(self) {
        drop(self);
    }
}
