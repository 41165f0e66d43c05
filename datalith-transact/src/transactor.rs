//! The transaction pipeline
//!
//! Phases, in order:
//!
//! 1. flatten (map entities, reverse refs, nested maps, fn calls)
//! 2. tempid resolution (lookup refs, upserts, fresh eids)
//! 3. sequential application into a staged overlay with cancellation
//! 4. composite tuple recomputation for touched entities
//! 5. optional entity timestamps
//! 6. unique enforcement over the staged result
//! 7. one atomic substrate commit + report
//!
//! Any failure in any phase aborts the whole transaction; nothing is written
//! until the final commit.

use crate::entities::Flattener;
use crate::error::{Error, Result};
use crate::functions::TxFnRegistry;
use crate::ir::{EidRef, FlatItem, RawVal, TempId, TxItem};
use datalith_core::schema::{created_at_ident, updated_at_ident};
use datalith_core::value::TX0;
use datalith_core::{AttrSpec, Datom, Eid, Keyword, Value};
use datalith_store::{DatomStore, StoreReader, StoreState};
use rustc_hash::{FxHashMap, FxHashSet};

/// Counter snapshot identifying a database value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DbInfo {
    pub max_eid: Eid,
    pub max_tx: u64,
}

/// Transaction report.
#[derive(Clone, Debug)]
pub struct TxReport {
    pub db_before: DbInfo,
    pub db_after: DbInfo,
    /// Asserted and retracted datoms, in staging order
    pub tx_data: Vec<Datom>,
    /// Tempid bindings, including the reserved `:db/current-tx` key
    pub tempids: FxHashMap<TempId, Eid>,
    /// The transaction id
    pub tx: u64,
}

/// Reserved tempid under which the current transaction id is reported.
pub fn current_tx_key() -> TempId {
    TempId::Str(":db/current-tx".to_string())
}

#[derive(Clone, Debug)]
struct Staged {
    add: bool,
    e: Eid,
    a: Keyword,
    v: Value,
    alive: bool,
}

struct TxState<'a> {
    reader: &'a StoreReader,
    state: &'a StoreState,
    validate: bool,
    staged: Vec<Staged>,
    add_idx: FxHashMap<(Eid, Keyword, Value), usize>,
    ret_idx: FxHashMap<(Eid, Keyword, Value), usize>,
    touched: FxHashSet<(Eid, Keyword)>,
}

impl<'a> TxState<'a> {
    fn new(reader: &'a StoreReader, state: &'a StoreState, validate: bool) -> Self {
        Self {
            reader,
            state,
            validate,
            staged: Vec::new(),
            add_idx: FxHashMap::default(),
            ret_idx: FxHashMap::default(),
            touched: FxHashSet::default(),
        }
    }

    /// Values of (e, a) as the transaction currently sees them: the store
    /// view minus staged retractions plus staged assertions.
    fn current_values(&self, e: Eid, a: &Keyword) -> Result<Vec<Value>> {
        let mut vals = self.reader.values(e, a)?;
        vals.retain(|v| {
            !self
                .ret_idx
                .get(&(e, a.clone(), v.clone()))
                .is_some_and(|&i| self.staged[i].alive)
        });
        for s in &self.staged {
            if s.alive && s.add && s.e == e && &s.a == a && !vals.contains(&s.v) {
                vals.push(s.v.clone());
            }
        }
        Ok(vals)
    }

    fn spec(&self, a: &Keyword) -> Result<AttrSpec> {
        self.state
            .schema
            .attr(a)
            .cloned()
            .ok_or_else(|| Error::Core(datalith_core::Error::UnknownAttribute(a.to_string())))
    }

    /// Type-check and coerce a value per the attribute declaration.
    fn checked(&self, spec: &AttrSpec, v: Value) -> Result<Value> {
        if !self.validate {
            return Ok(v);
        }
        let Some(ty) = spec.value_type else {
            return Ok(v);
        };
        let v = v.coerce(ty)?;
        if let Value::Tuple(elems) = &v {
            if let Some(ety) = spec.tuple_type {
                let elems = elems
                    .iter()
                    .map(|e| {
                        if e.is_nil() {
                            Ok(Value::Nil)
                        } else {
                            e.clone().coerce(ety)
                        }
                    })
                    .collect::<datalith_core::Result<Vec<_>>>()?;
                return Ok(Value::Tuple(elems));
            }
            if let Some(etys) = &spec.tuple_types {
                if elems.len() != etys.len() {
                    return Err(Error::Core(datalith_core::Error::InvalidValueType {
                        value: v.to_string(),
                        expected: format!("tuple of {} elements", etys.len()),
                    }));
                }
                let elems = elems
                    .iter()
                    .zip(etys)
                    .map(|(e, ty)| {
                        if e.is_nil() {
                            Ok(Value::Nil)
                        } else {
                            e.clone().coerce(*ty)
                        }
                    })
                    .collect::<datalith_core::Result<Vec<_>>>()?;
                return Ok(Value::Tuple(elems));
            }
        }
        Ok(v)
    }

    /// Stage an assertion, replacing the previous value for cardinality-one.
    /// Re-asserting a present value is a no-op.
    fn stage_add(&mut self, e: Eid, a: Keyword, v: Value) -> Result<()> {
        let spec = self.spec(&a)?;
        let v = self.checked(&spec, v)?;
        self.touched.insert((e, a.clone()));
        let cur = self.current_values(e, &a)?;
        if cur.contains(&v) {
            return Ok(());
        }
        if !spec.is_many() {
            if let Some(old) = cur.into_iter().next() {
                self.stage_retract(e, a.clone(), old)?;
            }
        }
        let key = (e, a.clone(), v.clone());
        if let Some(i) = self.ret_idx.remove(&key) {
            // cancelling: the store already holds this datom
            self.staged[i].alive = false;
            return Ok(());
        }
        let i = self.staged.len();
        self.staged.push(Staged {
            add: true,
            e,
            a,
            v,
            alive: true,
        });
        self.add_idx.insert(key, i);
        Ok(())
    }

    /// Stage a retraction; no-op when the datom is absent. A retraction of a
    /// datom staged earlier in this transaction cancels it instead.
    fn stage_retract(&mut self, e: Eid, a: Keyword, v: Value) -> Result<()> {
        self.touched.insert((e, a.clone()));
        let key = (e, a.clone(), v.clone());
        if let Some(i) = self.add_idx.remove(&key) {
            self.staged[i].alive = false;
            return Ok(());
        }
        if self.ret_idx.contains_key(&key) {
            return Ok(());
        }
        if !self.reader.values(e, &a)?.contains(&v) {
            return Ok(());
        }
        let i = self.staged.len();
        self.staged.push(Staged {
            add: false,
            e,
            a,
            v,
            alive: true,
        });
        self.ret_idx.insert(key, i);
        Ok(())
    }

    /// Current composite value for a tuple attribute of `e`, or None when
    /// every source is absent.
    fn compute_tuple(&self, e: Eid, spec: &AttrSpec) -> Result<Option<Value>> {
        let sources = spec
            .tuple_attrs
            .as_ref()
            .expect("compute_tuple on non-composite attr");
        let mut vals = Vec::with_capacity(sources.len());
        for src in sources {
            vals.push(
                self.current_values(e, src)?
                    .into_iter()
                    .next()
                    .unwrap_or(Value::Nil),
            );
        }
        if vals.iter().all(Value::is_nil) {
            Ok(None)
        } else {
            Ok(Some(Value::Tuple(vals)))
        }
    }

    /// Recompute every composite tuple whose sources were touched.
    fn recompute_tuples(&mut self) -> Result<()> {
        let mut affected: FxHashSet<(Eid, Keyword)> = FxHashSet::default();
        for (e, a) in self.touched.clone() {
            if let Some(tuples) = self.state.rschema.tuples_of(&a) {
                for ta in tuples.keys() {
                    affected.insert((e, ta.clone()));
                }
            }
        }
        let mut affected: Vec<_> = affected.into_iter().collect();
        affected.sort();
        for (e, ta) in affected {
            let spec = self.spec(&ta)?;
            let computed = self.compute_tuple(e, &spec)?;
            let stored = self.current_values(e, &ta)?.into_iter().next();
            match (stored, computed) {
                (Some(old), None) => self.stage_retract(e, ta, old)?,
                (None, Some(new)) => self.stage_add(e, ta, new)?,
                (Some(old), Some(new)) if old != new => {
                    self.stage_retract(e, ta.clone(), old)?;
                    self.stage_add(e, ta, new)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Retract an entity: all its datoms, all incoming refs, and component
    /// targets recursively.
    fn retract_entity(&mut self, e: Eid, seen: &mut FxHashSet<Eid>) -> Result<()> {
        if !seen.insert(e) {
            return Ok(());
        }
        let mut facts: Vec<(Keyword, Value)> = Vec::new();
        for d in self.reader.entity_datoms(e)? {
            facts.push((d.a, d.v));
        }
        for s in &self.staged {
            if s.alive && s.add && s.e == e && !facts.contains(&(s.a.clone(), s.v.clone())) {
                facts.push((s.a.clone(), s.v.clone()));
            }
        }

        let mut components: Vec<Eid> = Vec::new();
        for (a, v) in facts {
            if self.state.rschema.is_component(&a) {
                if let Some(target) = v.as_eid() {
                    components.push(target);
                }
            }
            self.stage_retract(e, a, v)?;
        }

        // incoming refs via VAET plus any staged this transaction
        let mut incoming: Vec<(Eid, Keyword)> = self
            .reader
            .ref_datoms_to(e)?
            .into_iter()
            .map(|d| (d.e, d.a))
            .collect();
        for s in &self.staged {
            if s.alive && s.add && s.v == Value::Ref(e) {
                incoming.push((s.e, s.a.clone()));
            }
        }
        for (pointer, a) in incoming {
            self.stage_retract(pointer, a, Value::Ref(e))?;
        }

        for target in components {
            self.retract_entity(target, seen)?;
        }
        Ok(())
    }

    /// Inject `:db/created-at` / `:db/updated-at` for every touched entity.
    fn entity_time(&mut self) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut entities: Vec<Eid> = self
            .staged
            .iter()
            .filter(|s| s.alive)
            .map(|s| s.e)
            .collect::<FxHashSet<_>>()
            .into_iter()
            .collect();
        entities.sort_unstable();
        for e in entities {
            if !self.reader.entity_exists(e) {
                self.stage_add(e, created_at_ident(), Value::Instant(now))?;
            }
            self.stage_add(e, updated_at_ident(), Value::Instant(now))?;
        }
        Ok(())
    }

    /// Every staged assertion on a unique attribute must be absent elsewhere,
    /// both in the store (minus in-tx retractions) and among staged adds.
    fn enforce_unique(&self) -> Result<()> {
        let mut in_tx: FxHashMap<(Keyword, Value), Eid> = FxHashMap::default();
        for s in &self.staged {
            if !s.alive || !s.add || !self.state.rschema.is_unique(&s.a) {
                continue;
            }
            let datom = format!("[{} {} {}]", s.e, s.a, s.v);
            if let Some(&other) = in_tx.get(&(s.a.clone(), s.v.clone())) {
                if other != s.e {
                    return Err(Error::UniqueViolation { datom });
                }
            } else {
                in_tx.insert((s.a.clone(), s.v.clone()), s.e);
            }
            if let Some(owner) = self.reader.eid_by_av(&s.a, &s.v)? {
                let retracted = self
                    .ret_idx
                    .get(&(owner, s.a.clone(), s.v.clone()))
                    .is_some_and(|&i| self.staged[i].alive);
                if owner != s.e && !retracted {
                    return Err(Error::UniqueViolation { datom });
                }
            }
        }
        Ok(())
    }
}

/// Run a transaction against the store. Serialization across callers is the
/// connection's responsibility; this function assumes it is the only writer.
pub fn transact(store: &DatomStore, fns: &TxFnRegistry, items: Vec<TxItem>) -> Result<TxReport> {
    let span = tracing::debug_span!("transact", items = items.len());
    let _guard = span.enter();

    let db_before = DbInfo {
        max_eid: store.max_eid(),
        max_tx: store.max_tx(),
    };
    let tx = db_before.max_tx + 1;

    // Phase 1: flatten against the pre-transaction view.
    let pre_state = store.state();
    let pre_reader = store.reader();
    let flat = Flattener::new(&pre_reader, fns, &pre_state.rschema).flatten(items)?;

    // Intern attributes so every op has an aid, then re-snapshot.
    let mut idents: Vec<Keyword> = Vec::new();
    for item in &flat {
        let a = match item {
            FlatItem::Op(op) => Some(&op.a),
            FlatItem::RetractAttribute(_, a) => Some(a),
            FlatItem::Cas { a, .. } => Some(a),
            FlatItem::RetractEntity(_) => None,
        };
        if let Some(a) = a {
            if !idents.contains(a) {
                idents.push(a.clone());
            }
        }
    }
    store.intern_idents(&idents)?;
    let state = store.state();
    let reader = store.reader();

    // Phase 2: tempid resolution.
    let res = crate::resolve::resolve_tempids(&flat, &reader, &state.rschema, db_before.max_eid)?;

    // Phase 3: sequential application.
    let mut st = TxState::new(&reader, &state, store.opts().validate_data);
    for item in &flat {
        match item {
            FlatItem::Op(op) => {
                let e = res.resolve(&op.e, tx, &reader)?;
                let v = match &op.v {
                    RawVal::Val(v) => v.clone(),
                    RawVal::ERef(er) => Value::Ref(res.resolve(er, tx, &reader)?),
                };
                if state.rschema.is_tuple_attr(&op.a) {
                    if op.add {
                        let spec = st.spec(&op.a)?;
                        if st.compute_tuple(e, &spec)?.as_ref() == Some(&v) {
                            // redundant restatement of the computed value
                            continue;
                        }
                    }
                    return Err(Error::TupleDirect(op.a.to_string()));
                }
                if op.add {
                    st.stage_add(e, op.a.clone(), v)?;
                } else {
                    st.stage_retract(e, op.a.clone(), v)?;
                }
            }
            FlatItem::RetractEntity(er) => {
                let e = res.resolve(er, tx, &reader)?;
                st.retract_entity(e, &mut FxHashSet::default())?;
            }
            FlatItem::RetractAttribute(er, a) => {
                let e = res.resolve(er, tx, &reader)?;
                for v in st.current_values(e, a)? {
                    st.stage_retract(e, a.clone(), v)?;
                }
            }
            FlatItem::Cas { e: er, a, old, new } => {
                if matches!(er, EidRef::Temp(_)) {
                    return Err(Error::TempidInCas);
                }
                let e = res.resolve(er, tx, &reader)?;
                if state.rschema.is_tuple_attr(a) {
                    return Err(Error::TupleDirect(a.to_string()));
                }
                let cur = st.current_values(e, a)?;
                let matched = match old {
                    Some(o) => cur.contains(o),
                    None => cur.is_empty(),
                };
                if !matched {
                    let current = match cur.len() {
                        0 => "nil".to_string(),
                        1 => cur[0].to_string(),
                        _ => format!(
                            "[{}]",
                            cur.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ")
                        ),
                    };
                    let expected = old.as_ref().map_or("nil".to_string(), |o| o.to_string());
                    return Err(Error::CasFailed {
                        e,
                        a: a.to_string(),
                        current,
                        expected,
                    });
                }
                if let Some(o) = old {
                    st.stage_retract(e, a.clone(), o.clone())?;
                }
                st.stage_add(e, a.clone(), new.clone())?;
            }
        }
    }

    // Phase 4: composite tuple maintenance.
    st.recompute_tuples()?;

    // Phase 5: entity timestamps.
    if store.opts().auto_entity_time {
        st.entity_time()?;
    }

    // Phase 6: unique enforcement over the final staged set.
    st.enforce_unique()?;

    // Phase 7: commit.
    let tx_data: Vec<Datom> = st
        .staged
        .iter()
        .filter(|s| s.alive)
        .map(|s| Datom {
            e: s.e,
            a: s.a.clone(),
            v: s.v.clone(),
            tx,
            added: s.add,
        })
        .collect();

    let mut max_eid = res.max_eid;
    for d in &tx_data {
        if d.e < TX0 {
            max_eid = max_eid.max(d.e);
        }
        if let Value::Ref(target) = &d.v {
            if *target < TX0 {
                max_eid = max_eid.max(*target);
            }
        }
    }

    store.apply(&tx_data, max_eid, tx)?;

    let mut tempids = res.bindings();
    tempids.insert(current_tx_key(), tx);

    tracing::debug!(tx, datoms = tx_data.len(), "transaction committed");
    Ok(TxReport {
        db_before,
        db_after: DbInfo {
            max_eid,
            max_tx: tx,
        },
        tx_data,
        tempids,
        tx,
    })
}
