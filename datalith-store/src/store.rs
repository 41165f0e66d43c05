//! The datom store
//!
//! Maintains the four sorted indices plus the `giants`, `schema` and `meta`
//! dbis over the substrate adapter. Writes go through [`DatomStore::apply`],
//! which turns a batch of assertion/retraction datoms into one atomic
//! substrate transaction. Reads go through [`StoreReader`], a cheap-to-clone
//! view pinned to one snapshot; iteration is lazy and owns the snapshot.

use crate::error::{Error, Result};
use crate::keys;
use datalith_core::codec;
use datalith_core::schema::{created_at_ident, updated_at_ident};
use datalith_core::value::TX0;
use datalith_core::{AttrSpec, Datom, Eid, Index, Keyword, Rschema, Schema, Value, ValueType};
use datalith_kv::{Dbi, Env, ReadTxn, Scan};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const META_MAX_EID: &[u8] = b"max-eid";
const META_MAX_TX: &[u8] = b"max-tx";
const META_VERSION: &[u8] = b"version";
const META_OPTS: &[u8] = b"opts";

const FORMAT_VERSION: u64 = 1;

/// Store configuration, persisted in the `meta` dbi.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Check every value against its attribute's declared type
    #[serde(default)]
    pub validate_data: bool,
    /// Maintain `:db/created-at` / `:db/updated-at` on touched entities
    #[serde(default)]
    pub auto_entity_time: bool,
}

#[derive(Clone)]
pub(crate) struct StoreDbis {
    pub eav: Dbi,
    pub aev: Dbi,
    pub ave: Dbi,
    pub vae: Dbi,
    pub giants: Dbi,
    pub schema: Dbi,
    pub meta: Dbi,
}

/// Schema plus its derived reverse schema, swapped atomically on change.
pub struct StoreState {
    pub schema: Schema,
    pub rschema: Rschema,
}

/// Scan components: any subset of (e, a, v) pins the matching key positions;
/// components out of the index's prefix order are applied as filters.
#[derive(Clone, Debug, Default)]
pub struct Components {
    pub e: Option<Eid>,
    pub a: Option<Keyword>,
    pub v: Option<Value>,
}

impl Components {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn e(e: Eid) -> Self {
        Self {
            e: Some(e),
            ..Self::default()
        }
    }

    pub fn ea(e: Eid, a: Keyword) -> Self {
        Self {
            e: Some(e),
            a: Some(a),
            ..Self::default()
        }
    }

    pub fn eav(e: Eid, a: Keyword, v: Value) -> Self {
        Self {
            e: Some(e),
            a: Some(a),
            v: Some(v),
        }
    }

    pub fn a(a: Keyword) -> Self {
        Self {
            a: Some(a),
            ..Self::default()
        }
    }

    pub fn av(a: Keyword, v: Value) -> Self {
        Self {
            a: Some(a),
            v: Some(v),
            ..Self::default()
        }
    }

    pub fn v(v: Value) -> Self {
        Self {
            v: Some(v),
            ..Self::default()
        }
    }
}

/// The datom store
pub struct DatomStore {
    env: Env,
    dbis: StoreDbis,
    state: RwLock<Arc<StoreState>>,
    max_eid: AtomicU64,
    max_tx: AtomicU64,
    opts: StoreOptions,
}

impl DatomStore {
    /// Open the store on an environment, declaring `specs` on top of any
    /// persisted schema.
    pub fn open(env: Env, opts: StoreOptions, specs: Vec<AttrSpec>) -> Result<DatomStore> {
        let dbis = StoreDbis {
            eav: env.open_dbi("eav"),
            aev: env.open_dbi("aev"),
            ave: env.open_dbi("ave"),
            vae: env.open_dbi("vae"),
            giants: env.open_dbi("giants"),
            schema: env.open_dbi("schema"),
            meta: env.open_dbi("meta"),
        };

        let mut schema = Schema::new();
        {
            let r = env.read();
            for (_k, val) in r.scan(&dbis.schema, Bound::Unbounded, Bound::Unbounded) {
                let spec: AttrSpec = serde_json::from_slice(&val)
                    .map_err(|e| Error::Meta(format!("schema entry: {e}")))?;
                schema.declare(spec)?;
            }
        }
        for spec in specs {
            schema.declare(spec)?;
        }
        if opts.auto_entity_time {
            schema.declare(AttrSpec::new(created_at_ident()).value_type(ValueType::Instant))?;
            schema.declare(AttrSpec::new(updated_at_ident()).value_type(ValueType::Instant))?;
        }
        schema.validate()?;

        let r = env.read();
        let max_eid = read_meta_u64(&r, &dbis.meta, META_MAX_EID)?.unwrap_or(0);
        let max_tx = read_meta_u64(&r, &dbis.meta, META_MAX_TX)?.unwrap_or(TX0);
        drop(r);

        let mut w = env.write();
        for spec in schema.iter() {
            let val = serde_json::to_vec(spec).map_err(|e| Error::Meta(e.to_string()))?;
            w.put(&dbis.schema, spec.ident.to_string().into_bytes(), val);
        }
        w.put(&dbis.meta, META_VERSION.to_vec(), FORMAT_VERSION.to_be_bytes().to_vec());
        w.put(
            &dbis.meta,
            META_OPTS.to_vec(),
            serde_json::to_vec(&opts).map_err(|e| Error::Meta(e.to_string()))?,
        );
        w.commit();

        let rschema = schema.rschema();
        Ok(DatomStore {
            env,
            dbis,
            state: RwLock::new(Arc::new(StoreState { schema, rschema })),
            max_eid: AtomicU64::new(max_eid),
            max_tx: AtomicU64::new(max_tx),
            opts,
        })
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn opts(&self) -> &StoreOptions {
        &self.opts
    }

    /// Current schema + rschema
    pub fn state(&self) -> Arc<StoreState> {
        Arc::clone(&self.state.read())
    }

    pub fn max_eid(&self) -> Eid {
        self.max_eid.load(Ordering::SeqCst)
    }

    pub fn max_tx(&self) -> u64 {
        self.max_tx.load(Ordering::SeqCst)
    }

    /// Declare (or redeclare) attributes, revalidate, persist, and swap in
    /// the rebuilt reverse schema.
    pub fn update_schema(&self, specs: Vec<AttrSpec>) -> Result<()> {
        let mut schema = self.state().schema.clone();
        for spec in specs {
            schema.declare(spec)?;
        }
        schema.validate()?;
        self.persist_and_swap(schema)
    }

    /// Intern any of `idents` not yet known, with default metadata.
    pub fn intern_idents(&self, idents: &[Keyword]) -> Result<()> {
        let state = self.state();
        if idents.iter().all(|i| state.schema.attr(i).is_some()) {
            return Ok(());
        }
        let mut schema = state.schema.clone();
        for ident in idents {
            schema.ensure(ident);
        }
        self.persist_and_swap(schema)
    }

    fn persist_and_swap(&self, schema: Schema) -> Result<()> {
        let mut w = self.env.write();
        for spec in schema.iter() {
            let val = serde_json::to_vec(spec).map_err(|e| Error::Meta(e.to_string()))?;
            w.put(&self.dbis.schema, spec.ident.to_string().into_bytes(), val);
        }
        w.commit();
        let rschema = schema.rschema();
        *self.state.write() = Arc::new(StoreState { schema, rschema });
        Ok(())
    }

    /// A read view pinned to the current snapshot.
    pub fn reader(&self) -> StoreReader {
        StoreReader {
            txn: self.env.read(),
            dbis: self.dbis.clone(),
            state: self.state(),
            basis_tx: self.max_tx(),
            max_eid: self.max_eid(),
        }
    }

    /// Apply a batch of datoms as one atomic substrate transaction and
    /// advance the counters. Assertions insert into every applicable index;
    /// retractions remove. Every attribute must already be interned.
    pub fn apply(&self, datoms: &[Datom], new_max_eid: Eid, new_max_tx: u64) -> Result<()> {
        let state = self.state();
        let mut w = self.env.write();
        for d in datoms {
            let spec = state
                .schema
                .attr(&d.a)
                .ok_or_else(|| datalith_core::Error::UnknownAttribute(d.a.to_string()))?;
            let aid = spec.aid;
            let vk = keys::vkey(&d.v);
            let giant = vk.giant_full.is_some();
            if d.added {
                let pl = keys::payload(d.tx, giant);
                w.put(&self.dbis.eav, keys::eav_key(d.e, aid, &vk.bytes), pl.clone());
                w.put(&self.dbis.aev, keys::aev_key(aid, d.e, &vk.bytes), pl.clone());
                if spec.in_ave() {
                    w.put(&self.dbis.ave, keys::ave_key(aid, &vk.bytes, d.e), pl.clone());
                }
                if spec.is_ref() {
                    if let Some(target) = d.v.as_eid() {
                        w.put(&self.dbis.vae, keys::vae_key(target, aid, d.e), pl);
                    }
                }
                if let Some(full) = vk.giant_full {
                    let digest = codec::giant_digest(&full);
                    w.put(&self.dbis.giants, digest.to_vec(), full);
                }
            } else {
                w.del(&self.dbis.eav, &keys::eav_key(d.e, aid, &vk.bytes));
                w.del(&self.dbis.aev, &keys::aev_key(aid, d.e, &vk.bytes));
                if spec.in_ave() {
                    w.del(&self.dbis.ave, &keys::ave_key(aid, &vk.bytes, d.e));
                }
                if spec.is_ref() {
                    if let Some(target) = d.v.as_eid() {
                        w.del(&self.dbis.vae, &keys::vae_key(target, aid, d.e));
                    }
                }
                // giants are content-addressed and may be shared; blobs are
                // left in place on retraction
            }
        }
        w.put(&self.dbis.meta, META_MAX_EID.to_vec(), new_max_eid.to_be_bytes().to_vec());
        w.put(&self.dbis.meta, META_MAX_TX.to_vec(), new_max_tx.to_be_bytes().to_vec());
        w.commit();
        self.max_eid.store(new_max_eid, Ordering::SeqCst);
        self.max_tx.store(new_max_tx, Ordering::SeqCst);
        tracing::debug!(
            datoms = datoms.len(),
            max_eid = new_max_eid,
            max_tx = new_max_tx,
            "applied datom batch"
        );
        Ok(())
    }
}

fn read_meta_u64(r: &ReadTxn, meta: &Dbi, key: &[u8]) -> Result<Option<u64>> {
    match r.get(meta, key) {
        None => Ok(None),
        Some(v) if v.len() == 8 => {
            let mut b = [0u8; 8];
            b.copy_from_slice(&v);
            Ok(Some(u64::from_be_bytes(b)))
        }
        Some(_) => Err(Error::Meta(format!(
            "bad {} entry",
            String::from_utf8_lossy(key)
        ))),
    }
}

/// Read view over one snapshot. Cheap to clone.
#[derive(Clone)]
pub struct StoreReader {
    txn: ReadTxn,
    dbis: StoreDbis,
    state: Arc<StoreState>,
    basis_tx: u64,
    max_eid: Eid,
}

impl StoreReader {
    /// The transaction id this view is based on
    pub fn basis_tx(&self) -> u64 {
        self.basis_tx
    }

    pub fn max_eid(&self) -> Eid {
        self.max_eid
    }

    pub fn schema(&self) -> &Schema {
        &self.state.schema
    }

    pub fn rschema(&self) -> &Rschema {
        &self.state.rschema
    }

    fn dbi_for(&self, index: Index) -> &Dbi {
        match index {
            Index::Eavt => &self.dbis.eav,
            Index::Aevt => &self.dbis.aev,
            Index::Avet => &self.dbis.ave,
            Index::Vaet => &self.dbis.vae,
        }
    }

    /// Longest contiguous key prefix the components pin for this index.
    /// Returns None when a named attribute is unknown (no datoms can match).
    fn prefix(&self, index: Index, comps: &Components) -> Option<Vec<u8>> {
        let aid = match &comps.a {
            Some(a) => match self.state.schema.attr(a) {
                Some(spec) => Some(spec.aid),
                None => return None,
            },
            None => None,
        };
        let mut p = Vec::new();
        match index {
            Index::Eavt => {
                if let Some(e) = comps.e {
                    p.extend_from_slice(&e.to_be_bytes());
                    if let Some(aid) = aid {
                        p.extend_from_slice(&aid.to_be_bytes());
                        if let Some(v) = &comps.v {
                            p.extend_from_slice(&keys::vkey(v).bytes);
                        }
                    }
                }
            }
            Index::Aevt => {
                if let Some(aid) = aid {
                    p.extend_from_slice(&aid.to_be_bytes());
                    if let Some(e) = comps.e {
                        p.extend_from_slice(&e.to_be_bytes());
                        if let Some(v) = &comps.v {
                            p.extend_from_slice(&keys::vkey(v).bytes);
                        }
                    }
                }
            }
            Index::Avet => {
                if let Some(aid) = aid {
                    p.extend_from_slice(&aid.to_be_bytes());
                    if let Some(v) = &comps.v {
                        p.extend_from_slice(&keys::vkey(v).bytes);
                        if let Some(e) = comps.e {
                            p.extend_from_slice(&e.to_be_bytes());
                        }
                    }
                }
            }
            Index::Vaet => {
                if let Some(target) = comps.v.as_ref().and_then(|v| v.as_eid()) {
                    p.extend_from_slice(&target.to_be_bytes());
                    if let Some(aid) = aid {
                        p.extend_from_slice(&aid.to_be_bytes());
                        if let Some(e) = comps.e {
                            p.extend_from_slice(&e.to_be_bytes());
                        }
                    }
                }
            }
        }
        Some(p)
    }

    fn iter_with(&self, index: Index, scan: Scan, filter: Components) -> DatomIter {
        DatomIter {
            scan: Some(scan),
            index,
            txn: self.txn.clone(),
            giants: self.dbis.giants.clone(),
            state: Arc::clone(&self.state),
            filter,
        }
    }

    fn empty_iter(&self, index: Index) -> DatomIter {
        DatomIter {
            scan: None,
            index,
            txn: self.txn.clone(),
            giants: self.dbis.giants.clone(),
            state: Arc::clone(&self.state),
            filter: Components::default(),
        }
    }

    /// Lazy sorted iteration over one index, restricted by `comps`.
    pub fn datoms(&self, index: Index, comps: Components) -> DatomIter {
        let Some(prefix) = self.prefix(index, &comps) else {
            return self.empty_iter(index);
        };
        let hi = match keys::prefix_successor(prefix.clone()) {
            Some(s) => Bound::Excluded(s),
            None => Bound::Unbounded,
        };
        let lo = if prefix.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Included(prefix)
        };
        let scan = self.txn.scan(self.dbi_for(index), lo, hi);
        self.iter_with(index, scan, comps)
    }

    /// Reverse iteration over the same restriction.
    pub fn datoms_back(&self, index: Index, comps: Components) -> DatomIter {
        let Some(prefix) = self.prefix(index, &comps) else {
            return self.empty_iter(index);
        };
        let hi = match keys::prefix_successor(prefix.clone()) {
            Some(s) => Bound::Excluded(s),
            None => Bound::Unbounded,
        };
        let lo = if prefix.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Included(prefix)
        };
        let scan = self.txn.scan_back(self.dbi_for(index), lo, hi);
        self.iter_with(index, scan, comps)
    }

    /// Iterate from the position `comps` pins to the end of the index.
    pub fn seek(&self, index: Index, comps: Components) -> DatomIter {
        let Some(prefix) = self.prefix(index, &comps) else {
            return self.empty_iter(index);
        };
        let lo = if prefix.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Included(prefix)
        };
        let scan = self.txn.scan(self.dbi_for(index), lo, Bound::Unbounded);
        self.iter_with(index, scan, Components::default())
    }

    /// Iterate backwards from the end of the pinned position to the start of
    /// the index (`:all-back` style).
    pub fn seek_back(&self, index: Index, comps: Components) -> DatomIter {
        let Some(prefix) = self.prefix(index, &comps) else {
            return self.empty_iter(index);
        };
        let hi = match keys::prefix_successor(prefix) {
            Some(s) => Bound::Excluded(s),
            None => Bound::Unbounded,
        };
        let scan = self.txn.scan_back(self.dbi_for(index), Bound::Unbounded, hi);
        self.iter_with(index, scan, Components::default())
    }

    /// AVET range scan over an attribute's values.
    pub fn index_range(
        &self,
        a: &Keyword,
        lo: Bound<&Value>,
        hi: Bound<&Value>,
    ) -> Result<DatomIter> {
        let spec = self
            .state
            .schema
            .attr(a)
            .ok_or_else(|| Error::Unindexed(a.to_string()))?;
        if !spec.in_ave() {
            return Err(Error::Unindexed(a.to_string()));
        }
        let mut aprefix = Vec::with_capacity(4);
        aprefix.extend_from_slice(&spec.aid.to_be_bytes());

        let lo_bytes = match lo {
            Bound::Unbounded => Bound::Included(aprefix.clone()),
            Bound::Included(v) => {
                let mut k = aprefix.clone();
                k.extend_from_slice(&keys::vkey(v).bytes);
                Bound::Included(k)
            }
            Bound::Excluded(v) => {
                let mut k = aprefix.clone();
                k.extend_from_slice(&keys::vkey(v).bytes);
                match keys::prefix_successor(k) {
                    Some(s) => Bound::Included(s),
                    None => return Ok(self.empty_iter(Index::Avet)),
                }
            }
        };
        let hi_bytes = match hi {
            Bound::Unbounded => match keys::prefix_successor(aprefix) {
                Some(s) => Bound::Excluded(s),
                None => Bound::Unbounded,
            },
            Bound::Included(v) => {
                let mut k = aprefix;
                k.extend_from_slice(&keys::vkey(v).bytes);
                match keys::prefix_successor(k) {
                    Some(s) => Bound::Excluded(s),
                    None => Bound::Unbounded,
                }
            }
            Bound::Excluded(v) => {
                let mut k = aprefix;
                k.extend_from_slice(&keys::vkey(v).bytes);
                Bound::Excluded(k)
            }
        };
        let scan = self.txn.scan(&self.dbis.ave, lo_bytes, hi_bytes);
        Ok(self.iter_with(Index::Avet, scan, Components::default()))
    }

    /// All current values of (e, a), in value order.
    pub fn values(&self, e: Eid, a: &Keyword) -> Result<Vec<Value>> {
        self.datoms(Index::Eavt, Components::ea(e, a.clone()))
            .map(|r| r.map(|d| d.v))
            .collect()
    }

    /// First (only, for cardinality-one) value of (e, a).
    pub fn value(&self, e: Eid, a: &Keyword) -> Result<Option<Value>> {
        match self.datoms(Index::Eavt, Components::ea(e, a.clone())).next() {
            None => Ok(None),
            Some(r) => Ok(Some(r?.v)),
        }
    }

    /// Resolve a unique (a, v) pair to its owning entity via AVET.
    pub fn eid_by_av(&self, a: &Keyword, v: &Value) -> Result<Option<Eid>> {
        match self
            .datoms(Index::Avet, Components::av(a.clone(), v.clone()))
            .next()
        {
            None => Ok(None),
            Some(r) => Ok(Some(r?.e)),
        }
    }

    /// All datoms of an entity.
    pub fn entity_datoms(&self, e: Eid) -> Result<Vec<Datom>> {
        self.datoms(Index::Eavt, Components::e(e)).collect()
    }

    /// All ref datoms pointing at `target` (reverse navigation via VAET).
    pub fn ref_datoms_to(&self, target: Eid) -> Result<Vec<Datom>> {
        self.datoms(Index::Vaet, Components::v(Value::Ref(target)))
            .collect()
    }

    pub fn entity_exists(&self, e: Eid) -> bool {
        self.datoms(Index::Eavt, Components::e(e)).next().is_some()
    }
}

/// Lazy datom iterator over one index scan.
pub struct DatomIter {
    scan: Option<Scan>,
    index: Index,
    txn: ReadTxn,
    giants: Dbi,
    state: Arc<StoreState>,
    filter: Components,
}

impl std::fmt::Debug for DatomIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatomIter").field("index", &self.index).finish()
    }
}

impl DatomIter {
    fn decode(&self, key: &[u8], val: &[u8]) -> Result<Datom> {
        let (e, aid, v) = match self.index {
            Index::Eavt => keys::split_eav(key)?,
            Index::Aevt => keys::split_aev(key)?,
            Index::Avet => keys::split_ave(key)?,
            Index::Vaet => {
                let (e, aid, target) = keys::split_vae(key)?;
                let a = self
                    .state
                    .schema
                    .attr_by_aid(aid)
                    .ok_or_else(|| Error::corrupt("vae", format!("unknown aid {aid}")))?
                    .ident
                    .clone();
                let (tx, _) = keys::decode_payload(val)?;
                return Ok(Datom::add(e, a, Value::Ref(target), tx));
            }
        };
        let a = self
            .state
            .schema
            .attr_by_aid(aid)
            .ok_or_else(|| Error::corrupt(self.index.dbi_name(), format!("unknown aid {aid}")))?
            .ident
            .clone();
        let (tx, giant) = keys::decode_payload(val)?;
        let value = if giant || codec::is_giant_key(v) {
            let digest = codec::giant_key_digest(v)?;
            let full = self
                .txn
                .get(&self.giants, &digest)
                .ok_or_else(|| Error::MissingGiant(hex(&digest)))?;
            codec::decode_value(&full)?.0
        } else {
            codec::decode_value(v)?.0
        };
        Ok(Datom::add(e, a, value, tx))
    }

    fn matches(&self, d: &Datom) -> bool {
        if let Some(e) = self.filter.e {
            if d.e != e {
                return false;
            }
        }
        if let Some(a) = &self.filter.a {
            if &d.a != a {
                return false;
            }
        }
        if let Some(v) = &self.filter.v {
            if &d.v != v {
                return false;
            }
        }
        true
    }
}

impl Iterator for DatomIter {
    type Item = Result<Datom>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (key, val) = self.scan.as_mut()?.next()?;
            match self.decode(&key, &val) {
                Ok(d) if self.matches(&d) => return Some(Ok(d)),
                Ok(_) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalith_core::kw;

    fn scratch(specs: Vec<AttrSpec>) -> (tempfile::TempDir, DatomStore) {
        let dir = tempfile::tempdir().unwrap();
        let env = Env::open(dir.path()).unwrap();
        let store = DatomStore::open(env, StoreOptions::default(), specs).unwrap();
        (dir, store)
    }

    fn seed(store: &DatomStore) {
        store
            .intern_idents(&[kw(":name"), kw(":age"), kw(":friend")])
            .unwrap();
        let tx = store.max_tx() + 1;
        let datoms = vec![
            Datom::add(1, kw(":name"), "Ivan".into(), tx),
            Datom::add(1, kw(":age"), Value::Long(10), tx),
            Datom::add(2, kw(":name"), "Oleg".into(), tx),
            Datom::add(2, kw(":friend"), Value::Ref(1), tx),
        ];
        store.apply(&datoms, 2, tx).unwrap();
    }

    #[test]
    fn test_eavt_and_aevt_iteration() {
        let (_d, store) = scratch(vec![AttrSpec::new(kw(":friend")).value_type(ValueType::Ref)]);
        seed(&store);
        let r = store.reader();

        let e1: Vec<Datom> = r.entity_datoms(1).unwrap();
        assert_eq!(e1.len(), 2);

        let names: Vec<Datom> = r
            .datoms(Index::Aevt, Components::a(kw(":name")))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names[0].e, 1);
        assert_eq!(names[1].e, 2);
    }

    #[test]
    fn test_vaet_reverse_navigation() {
        let (_d, store) = scratch(vec![AttrSpec::new(kw(":friend")).value_type(ValueType::Ref)]);
        seed(&store);
        let r = store.reader();
        let incoming = r.ref_datoms_to(1).unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].e, 2);
        assert_eq!(incoming[0].v, Value::Ref(1));
    }

    #[test]
    fn test_index_range() {
        let (_d, store) = scratch(vec![AttrSpec::new(kw(":age"))
            .value_type(ValueType::Long)
            .index()]);
        store.intern_idents(&[kw(":age")]).unwrap();
        let tx = store.max_tx() + 1;
        let datoms: Vec<Datom> = (0..10)
            .map(|i| Datom::add(i as Eid + 1, kw(":age"), Value::Long(i * 10), tx))
            .collect();
        store.apply(&datoms, 10, tx).unwrap();

        let r = store.reader();
        let hits: Vec<Datom> = r
            .index_range(
                &kw(":age"),
                Bound::Included(&Value::Long(20)),
                Bound::Excluded(&Value::Long(50)),
            )
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        let vals: Vec<i64> = hits.iter().map(|d| d.v.as_long().unwrap()).collect();
        assert_eq!(vals, vec![20, 30, 40]);

        // unindexed attribute refuses range scans
        store.intern_idents(&[kw(":plain")]).unwrap();
        let err = store
            .reader()
            .index_range(&kw(":plain"), Bound::Unbounded, Bound::Unbounded)
            .unwrap_err();
        assert_eq!(err.kind(), "store/unindexed");
    }

    #[test]
    fn test_retract_removes_all_indices() {
        let (_d, store) = scratch(vec![AttrSpec::new(kw(":friend")).value_type(ValueType::Ref)]);
        seed(&store);
        let tx = store.max_tx() + 1;
        store
            .apply(&[Datom::retract(2, kw(":friend"), Value::Ref(1), tx)], 2, tx)
            .unwrap();
        let r = store.reader();
        assert!(r.ref_datoms_to(1).unwrap().is_empty());
        assert_eq!(r.values(2, &kw(":friend")).unwrap(), Vec::<Value>::new());
    }

    #[test]
    fn test_giant_values_roundtrip() {
        let (_d, store) = scratch(vec![]);
        store.intern_idents(&[kw(":blob")]).unwrap();
        let tx = store.max_tx() + 1;
        let big = Value::Str("z".repeat(5000));
        store
            .apply(&[Datom::add(1, kw(":blob"), big.clone(), tx)], 1, tx)
            .unwrap();
        let r = store.reader();
        assert_eq!(r.value(1, &kw(":blob")).unwrap(), Some(big));
    }

    #[test]
    fn test_back_iteration() {
        let (_d, store) = scratch(vec![]);
        seed(&store);
        let r = store.reader();
        let back: Vec<Datom> = r
            .datoms_back(Index::Eavt, Components::e(1))
            .collect::<Result<_>>()
            .unwrap();
        let fwd: Vec<Datom> = r
            .datoms(Index::Eavt, Components::e(1))
            .collect::<Result<_>>()
            .unwrap();
        let mut rev = back.clone();
        rev.reverse();
        assert_eq!(rev, fwd);
    }

    #[test]
    fn test_counters_persist_in_meta() {
        let (_d, store) = scratch(vec![]);
        seed(&store);
        assert_eq!(store.max_eid(), 2);
        assert!(store.max_tx() > TX0);
    }
}
