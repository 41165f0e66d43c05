//! Read and write transactions
//!
//! `ReadTxn` pins an immutable snapshot for its whole lifetime. `WriteTxn`
//! batches puts, deletes and inverted-list edits against a private working
//! snapshot and publishes it atomically at commit; dropping the transaction
//! without committing aborts with no visible effect.

use crate::cursor::{ListIter, Scan};
use crate::env::{Dbi, Env, Slot, Snapshot, Table};
use parking_lot::MutexGuard;
use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::Arc;

/// Snapshot read transaction. Cheap to clone; all clones share the snapshot.
#[derive(Clone)]
pub struct ReadTxn {
    snap: Arc<Snapshot>,
}

impl ReadTxn {
    pub(crate) fn new(snap: Arc<Snapshot>) -> Self {
        Self { snap }
    }

    fn table(&self, dbi: &Dbi) -> Option<Arc<Table>> {
        self.snap.tables.get(dbi.name()).cloned()
    }

    /// Point lookup of a plain value.
    pub fn get(&self, dbi: &Dbi, key: &[u8]) -> Option<Vec<u8>> {
        match self.snap.tables.get(dbi.name())?.map.get(key)? {
            Slot::Val(v) => Some(v.clone()),
            Slot::List(_) => None,
        }
    }

    /// Forward range scan over plain values. Bounds may be open or closed on
    /// either end; iteration is lazy and owns the snapshot.
    pub fn scan(&self, dbi: &Dbi, lo: Bound<Vec<u8>>, hi: Bound<Vec<u8>>) -> Scan {
        Scan::new(self.table(dbi), lo, hi, false)
    }

    /// Reverse range scan over plain values.
    pub fn scan_back(&self, dbi: &Dbi, lo: Bound<Vec<u8>>, hi: Bound<Vec<u8>>) -> Scan {
        Scan::new(self.table(dbi), lo, hi, true)
    }

    /// Number of items in the inverted list at `key`.
    pub fn list_count(&self, dbi: &Dbi, key: &[u8]) -> usize {
        match self.snap.tables.get(dbi.name()).and_then(|t| t.map.get(key)) {
            Some(Slot::List(set)) => set.len(),
            _ => 0,
        }
    }

    /// Membership test in the inverted list at `key`.
    pub fn in_list(&self, dbi: &Dbi, key: &[u8], item: &[u8]) -> bool {
        match self.snap.tables.get(dbi.name()).and_then(|t| t.map.get(key)) {
            Some(Slot::List(set)) => set.contains(item),
            _ => false,
        }
    }

    /// Lazy iteration over the sorted inverted list at `key`.
    pub fn iter_list(&self, dbi: &Dbi, key: &[u8]) -> ListIter {
        ListIter::new(self.table(dbi), key.to_vec())
    }
}

/// The single write transaction. Holds the writer lock for its lifetime.
pub struct WriteTxn<'env> {
    env: &'env Env,
    _guard: MutexGuard<'env, ()>,
    work: Snapshot,
}

impl<'env> WriteTxn<'env> {
    pub(crate) fn new(env: &'env Env, guard: MutexGuard<'env, ()>, work: Snapshot) -> Self {
        Self {
            env,
            _guard: guard,
            work,
        }
    }

    fn table_mut(&mut self, dbi: &Dbi) -> &mut Table {
        let arc = self
            .work
            .tables
            .entry(dbi.name().to_string())
            .or_insert_with(|| Arc::new(Table::default()));
        Arc::make_mut(arc)
    }

    /// Read from the working state (own uncommitted writes visible).
    pub fn get(&self, dbi: &Dbi, key: &[u8]) -> Option<Vec<u8>> {
        match self.work.tables.get(dbi.name())?.map.get(key)? {
            Slot::Val(v) => Some(v.clone()),
            Slot::List(_) => None,
        }
    }

    pub fn put(&mut self, dbi: &Dbi, key: Vec<u8>, val: Vec<u8>) {
        self.table_mut(dbi).map.insert(key, Slot::Val(val));
    }

    /// Delete a key (plain value or whole list). No-op if absent.
    pub fn del(&mut self, dbi: &Dbi, key: &[u8]) {
        self.table_mut(dbi).map.remove(key);
    }

    /// Insert an item into the sorted inverted list at `key`.
    pub fn put_list_item(&mut self, dbi: &Dbi, key: Vec<u8>, item: Vec<u8>) {
        let table = self.table_mut(dbi);
        match table.map.get_mut(&key) {
            Some(Slot::List(set)) => {
                set.insert(item);
            }
            _ => {
                let mut set = BTreeSet::new();
                set.insert(item);
                table.map.insert(key, Slot::List(set));
            }
        }
    }

    /// Drop the whole inverted list at `key`.
    pub fn del_list(&mut self, dbi: &Dbi, key: &[u8]) {
        self.table_mut(dbi).map.remove(key);
    }

    /// Remove specific items from the inverted list at `key`; the key itself
    /// is removed when the last item goes.
    pub fn del_list_items(&mut self, dbi: &Dbi, key: &[u8], items: &[Vec<u8>]) {
        let table = self.table_mut(dbi);
        if let Some(Slot::List(set)) = table.map.get_mut(key) {
            for item in items {
                set.remove(item);
            }
            if set.is_empty() {
                table.map.remove(key);
            }
        }
    }

    /// Publish the working snapshot. All batched operations become visible
    /// atomically.
    pub fn commit(self) {
        *self.env.inner.current.write() = Arc::new(self.work);
    }
}
