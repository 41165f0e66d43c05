//! Connections
//!
//! A [`Conn`] owns one environment: the datom store, the transaction fn
//! registry, and the writer lock that serializes mutating transactions.
//! The kv layer's process-wide registry (keyed by canonical path) refuses a
//! second open of the same path until the first connection is released.

use crate::error::Result;
use datalith_core::AttrSpec;
use datalith_kv::Env;
use datalith_query::{eval_query, parse_query, QueryInput, QueryResult};
use datalith_search::{SearchEngine, SearchOptions};
use datalith_store::{DatomStore, StoreOptions, StoreReader};
use datalith_transact::{transact, TxFnRegistry, TxItem, TxReport};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Options for opening a connection.
#[derive(Clone, Default)]
pub struct ConnOptions {
    /// Attribute declarations applied at open
    pub schema: Vec<AttrSpec>,
    /// Check every value against its attribute's declared type
    pub validate_data: bool,
    /// Maintain `:db/created-at` / `:db/updated-at` on touched entities
    pub auto_entity_time: bool,
}

impl ConnOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(mut self, specs: Vec<AttrSpec>) -> Self {
        self.schema = specs;
        self
    }

    pub fn validate_data(mut self) -> Self {
        self.validate_data = true;
        self
    }

    pub fn auto_entity_time(mut self) -> Self {
        self.auto_entity_time = true;
        self
    }
}

struct ConnInner {
    env: Env,
    store: DatomStore,
    fns: RwLock<TxFnRegistry>,
    /// Serializes transact() callers: one logical writer queue
    write_lock: Mutex<()>,
    path: PathBuf,
}

/// An open database connection. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Conn {
    inner: Arc<ConnInner>,
}

impl std::fmt::Debug for Conn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conn").field("path", &self.inner.path).finish()
    }
}

impl Conn {
    /// Open (or create) the database at `path`. A second open of the same
    /// path in this process fails with `kv/env-open`.
    pub fn open(path: impl AsRef<Path>, opts: ConnOptions) -> Result<Conn> {
        let env = Env::open(path.as_ref())?;
        let store_opts = StoreOptions {
            validate_data: opts.validate_data,
            auto_entity_time: opts.auto_entity_time,
        };
        let store = DatomStore::open(env.clone(), store_opts, opts.schema)?;
        let path = env.path().to_path_buf();
        tracing::info!(path = %path.display(), "opened connection");
        Ok(Conn {
            inner: Arc::new(ConnInner {
                env,
                store,
                fns: RwLock::new(TxFnRegistry::new()),
                write_lock: Mutex::new(()),
                path,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// A read view pinned to the current snapshot. Queries over it never
    /// block the writer and never see partial transactions.
    pub fn db(&self) -> StoreReader {
        self.inner.store.reader()
    }

    /// Run a transaction. Callers serialize on the connection's writer lock,
    /// so unique checks and tuple recomputation are race-free.
    pub fn transact(&self, items: Vec<TxItem>) -> Result<TxReport> {
        let _serialized = self.inner.write_lock.lock();
        let fns = self.inner.fns.read().clone();
        Ok(transact(&self.inner.store, &fns, items)?)
    }

    /// Query this connection's current snapshot as the default source.
    pub fn q(&self, query: &str, mut extra_inputs: Vec<QueryInput>) -> Result<QueryResult> {
        let parsed = parse_query(query)?;
        let mut inputs = Vec::with_capacity(extra_inputs.len() + 1);
        inputs.push(QueryInput::Source(self.db()));
        inputs.append(&mut extra_inputs);
        Ok(eval_query(&parsed, inputs)?)
    }

    /// Register a named transaction function.
    pub fn register_fn<F>(&self, ident: datalith_core::Keyword, f: F)
    where
        F: Fn(&StoreReader, &[datalith_core::Value]) -> datalith_transact::Result<Vec<TxItem>>
            + Send
            + Sync
            + 'static,
    {
        self.inner.fns.write().register(ident, f);
    }

    /// Declare further attributes on a live connection.
    pub fn update_schema(&self, specs: Vec<AttrSpec>) -> Result<()> {
        let _serialized = self.inner.write_lock.lock();
        Ok(self.inner.store.update_schema(specs)?)
    }

    /// Open the full-text search engine on this connection's environment.
    /// The search dbis live alongside the datom dbis.
    pub fn search_engine(&self, opts: SearchOptions) -> Result<SearchEngine> {
        Ok(SearchEngine::open(self.inner.env.clone(), opts)?)
    }

    /// Release the connection. The path becomes reopenable once the last
    /// clone (and every search engine opened from it) is dropped.
    pub fn close(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_open_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let conn = Conn::open(dir.path(), ConnOptions::new()).unwrap();
        let err = Conn::open(dir.path(), ConnOptions::new()).unwrap_err();
        assert_eq!(err.kind(), "kv/env-open");
        conn.close();
        Conn::open(dir.path(), ConnOptions::new()).unwrap();
    }

    #[test]
    fn test_snapshot_isolation_across_transact() {
        use datalith_core::{kw, Value};
        use datalith_transact::EidRef;

        let dir = tempfile::tempdir().unwrap();
        let conn = Conn::open(dir.path(), ConnOptions::new()).unwrap();
        conn.transact(vec![TxItem::Add(EidRef::Eid(1), kw(":n"), Value::Long(1))])
            .unwrap();

        let before = conn.db();
        conn.transact(vec![TxItem::Add(EidRef::Eid(1), kw(":n"), Value::Long(2))])
            .unwrap();

        assert_eq!(before.value(1, &kw(":n")).unwrap(), Some(Value::Long(1)));
        assert_eq!(conn.db().value(1, &kw(":n")).unwrap(), Some(Value::Long(2)));
    }
}
