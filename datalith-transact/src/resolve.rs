//! Tempid resolution
//!
//! Pass 1 resolves lookup refs against the pre-transaction view. Pass 2
//! binds tempids carrying unique-identity values that already exist (upsert),
//! failing on conflicts. Remaining tempids get fresh eids in increasing
//! order. Tempids appearing only in value position are an error.

use crate::error::{Error, Result};
use crate::ir::{EidRef, FlatItem, RawVal, TempId};
use datalith_core::{Eid, Rschema, Value};
use datalith_store::StoreReader;
use rustc_hash::FxHashMap;

/// Outcome of tempid resolution.
pub(crate) struct Resolution {
    map: FxHashMap<TempId, Eid>,
    /// Highest eid after fresh assignment
    pub max_eid: Eid,
}

impl Resolution {
    /// Resolve an entity reference to a concrete eid.
    pub fn resolve(&self, er: &EidRef, tx: u64, reader: &StoreReader) -> Result<Eid> {
        match er {
            EidRef::Eid(e) => Ok(*e),
            EidRef::CurrentTx => Ok(tx),
            EidRef::Temp(t) => self
                .map
                .get(t)
                .copied()
                .ok_or_else(|| Error::TempidsOnlyAsValue(t.to_string())),
            EidRef::Lookup(a, v) => reader.eid_by_av(a, v)?.ok_or_else(|| {
                Error::UnresolvedLookup {
                    attr: a.to_string(),
                    value: v.to_string(),
                }
            }),
        }
    }

    /// Tempid bindings for the transaction report.
    pub fn bindings(&self) -> FxHashMap<TempId, Eid> {
        self.map.clone()
    }
}

/// The unique-identity value a raw op asserts, if it is concrete enough to
/// drive an upsert lookup.
fn upsert_value(v: &RawVal, reader: &StoreReader) -> Result<Option<Value>> {
    match v {
        RawVal::Val(v) => Ok(Some(v.clone())),
        RawVal::ERef(EidRef::Eid(e)) => Ok(Some(Value::Ref(*e))),
        RawVal::ERef(EidRef::Lookup(a, lv)) => {
            match reader.eid_by_av(a, lv)? {
                Some(e) => Ok(Some(Value::Ref(e))),
                None => Err(Error::UnresolvedLookup {
                    attr: a.to_string(),
                    value: lv.to_string(),
                }),
            }
        }
        RawVal::ERef(_) => Ok(None),
    }
}

pub(crate) fn resolve_tempids(
    items: &[FlatItem],
    reader: &StoreReader,
    rschema: &Rschema,
    max_eid_start: Eid,
) -> Result<Resolution> {
    // Collect tempids: entity positions define, value positions only use.
    let mut defined: Vec<TempId> = Vec::new();
    let mut value_used: Vec<TempId> = Vec::new();
    fn define(t: &TempId, defined: &mut Vec<TempId>) {
        if !defined.contains(t) {
            defined.push(t.clone());
        }
    }
    for item in items {
        match item {
            FlatItem::Op(op) => {
                if let EidRef::Temp(t) = &op.e {
                    define(t, &mut defined);
                }
                if let RawVal::ERef(EidRef::Temp(t)) = &op.v {
                    if !value_used.contains(t) {
                        value_used.push(t.clone());
                    }
                }
            }
            FlatItem::RetractEntity(EidRef::Temp(t))
            | FlatItem::RetractAttribute(EidRef::Temp(t), _) => define(t, &mut defined),
            FlatItem::Cas {
                e: EidRef::Temp(_), ..
            } => return Err(Error::TempidInCas),
            _ => {}
        }
    }

    // Pass 2: upserts via unique-identity attributes.
    let mut map: FxHashMap<TempId, Eid> = FxHashMap::default();
    for t in &defined {
        let mut resolved: Option<Eid> = None;
        for item in items {
            let FlatItem::Op(op) = item else { continue };
            if !op.add || op.e != EidRef::Temp(t.clone()) {
                continue;
            }
            if !rschema.is_unique_identity(&op.a) {
                continue;
            }
            let Some(v) = upsert_value(&op.v, reader)? else {
                continue;
            };
            if let Some(found) = reader.eid_by_av(&op.a, &v)? {
                match resolved {
                    None => resolved = Some(found),
                    Some(prev) if prev != found => {
                        return Err(Error::ConflictingUpserts(format!(
                            "{t} resolves to both {prev} and {found}"
                        )));
                    }
                    _ => {}
                }
            }
        }
        if let Some(e) = resolved {
            // Upsert consistency: the tx must not carry a different value
            // for any other unique-identity attribute the entity already has.
            for item in items {
                let FlatItem::Op(op) = item else { continue };
                if !op.add || op.e != EidRef::Temp(t.clone()) {
                    continue;
                }
                if !rschema.is_unique_identity(&op.a) {
                    continue;
                }
                let Some(v) = upsert_value(&op.v, reader)? else {
                    continue;
                };
                if let Some(current) = reader.value(e, &op.a)? {
                    if current != v {
                        return Err(Error::ConflictingUpserts(format!(
                            "{t} resolves to {e} via unique attributes, but {} {v} conflicts \
                             with existing value {current}",
                            op.a
                        )));
                    }
                }
            }
            map.insert(t.clone(), e);
        }
    }

    // Fresh eids for whatever is left, in first-appearance order.
    let mut max_eid = max_eid_start;
    for t in &defined {
        if !map.contains_key(t) {
            max_eid += 1;
            map.insert(t.clone(), max_eid);
        }
    }

    // Tempids used only as value and never defined are an error.
    let missing: Vec<String> = value_used
        .iter()
        .filter(|t| !map.contains_key(t))
        .map(|t| t.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(Error::TempidsOnlyAsValue(missing.join(" ")));
    }

    Ok(Resolution { map, max_eid })
}
