//! Entity expansion (flatten phase)
//!
//! Map-form entities expand into `:db/add` ops. Nested maps become
//! sub-entities with generated tempids, reverse attributes (`:ns/_attr`)
//! flip direction, and multi-valued attributes fan out. Transaction fn calls
//! are expanded here against the pre-transaction read view so that any
//! tempids they produce take part in resolution.

use crate::error::{Error, Result};
use crate::functions::TxFnRegistry;
use crate::ir::{AttrValue, EidRef, Entity, FlatItem, RawOp, RawVal, TxItem};
use datalith_core::{Eid, Keyword, Rschema, Value};
use datalith_store::StoreReader;

/// Transaction fns may expand into further fn calls, but not unboundedly.
pub(crate) const MAX_FN_DEPTH: usize = 16;

/// Interpret a plain value in entity-reference position.
///
/// Negative longs and strings are tempids, non-negative longs and refs are
/// eids, and a `[keyword value]` pair is a lookup ref.
pub(crate) fn ref_of_value(v: Value) -> Result<EidRef> {
    match v {
        Value::Long(n) if n < 0 => Ok(EidRef::temp_int(n)),
        Value::Long(n) => Ok(EidRef::Eid(n as Eid)),
        Value::Ref(e) => Ok(EidRef::Eid(e)),
        Value::Str(s) => Ok(EidRef::temp_str(s)),
        Value::Tuple(mut t) if t.len() == 2 && matches!(t[0], Value::Keyword(_)) => {
            let v = t.pop().unwrap();
            let Value::Keyword(a) = t.pop().unwrap() else {
                unreachable!()
            };
            Ok(EidRef::Lookup(a, v))
        }
        other => Err(Error::Core(datalith_core::Error::InvalidValueType {
            value: other.to_string(),
            expected: "ref".to_string(),
        })),
    }
}

pub(crate) struct Flattener<'a> {
    reader: &'a StoreReader,
    fns: &'a TxFnRegistry,
    rschema: &'a Rschema,
    gensym: u64,
}

impl<'a> Flattener<'a> {
    pub fn new(reader: &'a StoreReader, fns: &'a TxFnRegistry, rschema: &'a Rschema) -> Self {
        Self {
            reader,
            fns,
            rschema,
            gensym: 0,
        }
    }

    pub fn flatten(&mut self, items: Vec<TxItem>) -> Result<Vec<FlatItem>> {
        let mut out = Vec::new();
        for item in items {
            self.flatten_item(item, MAX_FN_DEPTH, &mut out)?;
        }
        Ok(out)
    }

    fn raw_val(&self, a: &Keyword, v: Value) -> Result<RawVal> {
        if self.rschema.is_ref(a) {
            Ok(RawVal::ERef(ref_of_value(v)?))
        } else {
            Ok(RawVal::Val(v))
        }
    }

    fn gen_tempid(&mut self) -> EidRef {
        self.gensym += 1;
        EidRef::temp_str(format!("datalith.tmp/{}", self.gensym))
    }

    fn flatten_item(&mut self, item: TxItem, depth: usize, out: &mut Vec<FlatItem>) -> Result<()> {
        match item {
            TxItem::Add(e, a, v) => {
                let v = self.raw_val(&a, v)?;
                out.push(FlatItem::Op(RawOp {
                    add: true,
                    e,
                    a,
                    v,
                }));
            }
            TxItem::Retract(e, a, v) => {
                let v = self.raw_val(&a, v)?;
                out.push(FlatItem::Op(RawOp {
                    add: false,
                    e,
                    a,
                    v,
                }));
            }
            TxItem::RetractEntity(e) => out.push(FlatItem::RetractEntity(e)),
            TxItem::RetractAttribute(e, a) => out.push(FlatItem::RetractAttribute(e, a)),
            TxItem::Cas(e, a, old, new) => out.push(FlatItem::Cas { e, a, old, new }),
            TxItem::Call(ident, args) => {
                if depth == 0 {
                    return Err(Error::FnExpansionDepth);
                }
                let f = self.fns.get(&ident)?;
                for produced in f(self.reader, &args)? {
                    self.flatten_item(produced, depth - 1, out)?;
                }
            }
            TxItem::Map(entity) => {
                self.flatten_entity(entity, out)?;
            }
        }
        Ok(())
    }

    fn flatten_entity(&mut self, ent: Entity, out: &mut Vec<FlatItem>) -> Result<EidRef> {
        let eref = match ent.eid {
            Some(e) => e,
            None => self.gen_tempid(),
        };
        for (a, av) in ent.attrs {
            if a.is_reverse() {
                let fwd = a.forward().expect("is_reverse implies forward");
                if !self.rschema.is_ref(&fwd) {
                    return Err(Error::Core(datalith_core::Error::InvalidValueType {
                        value: a.to_string(),
                        expected: "reverse reference over a ref attribute".to_string(),
                    }));
                }
                self.flatten_reverse(eref.clone(), fwd, av, out)?;
            } else {
                self.flatten_attr(eref.clone(), a, av, out)?;
            }
        }
        Ok(eref)
    }

    /// `{:db/id E, :ns/_attr X}` asserts `X :ns/attr E`.
    fn flatten_reverse(
        &mut self,
        target: EidRef,
        fwd: Keyword,
        av: AttrValue,
        out: &mut Vec<FlatItem>,
    ) -> Result<()> {
        match av {
            AttrValue::One(v) => {
                let pointer = ref_of_value(v)?;
                out.push(FlatItem::Op(RawOp {
                    add: true,
                    e: pointer,
                    a: fwd,
                    v: RawVal::ERef(target),
                }));
            }
            AttrValue::Ref(pointer) => {
                out.push(FlatItem::Op(RawOp {
                    add: true,
                    e: pointer,
                    a: fwd,
                    v: RawVal::ERef(target),
                }));
            }
            AttrValue::Nested(sub) => {
                let pointer = self.flatten_entity(*sub, out)?;
                out.push(FlatItem::Op(RawOp {
                    add: true,
                    e: pointer,
                    a: fwd,
                    v: RawVal::ERef(target),
                }));
            }
            AttrValue::Many(vs) => {
                for v in vs {
                    self.flatten_reverse(target.clone(), fwd.clone(), v, out)?;
                }
            }
        }
        Ok(())
    }

    fn flatten_attr(
        &mut self,
        e: EidRef,
        a: Keyword,
        av: AttrValue,
        out: &mut Vec<FlatItem>,
    ) -> Result<()> {
        match av {
            AttrValue::One(v) => {
                let v = self.raw_val(&a, v)?;
                out.push(FlatItem::Op(RawOp {
                    add: true,
                    e,
                    a,
                    v,
                }));
            }
            AttrValue::Ref(er) => {
                out.push(FlatItem::Op(RawOp {
                    add: true,
                    e,
                    a,
                    v: RawVal::ERef(er),
                }));
            }
            AttrValue::Nested(sub) => {
                if !self.rschema.is_ref(&a) {
                    return Err(Error::Core(datalith_core::Error::InvalidValueType {
                        value: format!("nested entity under {a}"),
                        expected: "ref".to_string(),
                    }));
                }
                let sub_ref = self.flatten_entity(*sub, out)?;
                out.push(FlatItem::Op(RawOp {
                    add: true,
                    e,
                    a,
                    v: RawVal::ERef(sub_ref),
                }));
            }
            AttrValue::Many(vs) => {
                for v in vs {
                    self.flatten_attr(e.clone(), a.clone(), v, out)?;
                }
            }
        }
        Ok(())
    }
}
