//! Transaction input IR
//!
//! A transaction is an ordered sequence of [`TxItem`]s: datom-level ops,
//! entity-level ops, CAS, transaction fn calls, and map-form entities with
//! nested sub-entities and multi-valued attributes.

use datalith_core::{Eid, Keyword, Value};
use std::fmt;

/// A placeholder identity, valid only within one transaction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TempId {
    /// Negative-integer tempid (`-1`, `-2`, ...)
    Int(i64),
    /// String tempid
    Str(String),
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TempId::Int(n) => write!(f, "{}", n),
            TempId::Str(s) => write!(f, "{}", s),
        }
    }
}

/// Entity identity in transaction input: a concrete eid, a tempid, a lookup
/// ref, or the reserved current-transaction id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EidRef {
    Eid(Eid),
    Temp(TempId),
    Lookup(Keyword, Value),
    CurrentTx,
}

impl EidRef {
    pub fn temp_int(n: i64) -> Self {
        EidRef::Temp(TempId::Int(n))
    }

    pub fn temp_str(s: impl Into<String>) -> Self {
        EidRef::Temp(TempId::Str(s.into()))
    }

    pub fn lookup(a: Keyword, v: impl Into<Value>) -> Self {
        EidRef::Lookup(a, v.into())
    }
}

impl From<Eid> for EidRef {
    fn from(e: Eid) -> Self {
        EidRef::Eid(e)
    }
}

impl From<i64> for EidRef {
    fn from(n: i64) -> Self {
        if n < 0 {
            EidRef::temp_int(n)
        } else {
            EidRef::Eid(n as Eid)
        }
    }
}

/// Attribute value inside a map-form entity.
#[derive(Clone, Debug)]
pub enum AttrValue {
    /// A plain value (interpreted per the attribute's type; for ref attrs,
    /// negative longs and strings denote tempids, pairs denote lookup refs)
    One(Value),
    /// Multiple values for a cardinality-many attribute
    Many(Vec<AttrValue>),
    /// A nested sub-entity; gets a generated tempid unless it has `:db/id`
    Nested(Box<Entity>),
    /// An explicit entity reference
    Ref(EidRef),
}

impl AttrValue {
    pub fn many<I: IntoIterator<Item = Value>>(vals: I) -> AttrValue {
        AttrValue::Many(vals.into_iter().map(AttrValue::One).collect())
    }
}

/// Map-form entity: optional `:db/id` plus attribute/value pairs. Reverse
/// attributes (`:ns/_attr`) point incoming refs at this entity.
#[derive(Clone, Debug, Default)]
pub struct Entity {
    pub eid: Option<EidRef>,
    pub attrs: Vec<(Keyword, AttrValue)>,
}

impl Entity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(eid: impl Into<EidRef>) -> Self {
        Self {
            eid: Some(eid.into()),
            attrs: Vec::new(),
        }
    }

    pub fn set(mut self, a: Keyword, v: impl Into<Value>) -> Self {
        self.attrs.push((a, AttrValue::One(v.into())));
        self
    }

    pub fn set_ref(mut self, a: Keyword, r: impl Into<EidRef>) -> Self {
        self.attrs.push((a, AttrValue::Ref(r.into())));
        self
    }

    pub fn set_many<I: IntoIterator<Item = Value>>(mut self, a: Keyword, vals: I) -> Self {
        self.attrs.push((a, AttrValue::many(vals)));
        self
    }

    pub fn set_nested(mut self, a: Keyword, nested: Entity) -> Self {
        self.attrs.push((a, AttrValue::Nested(Box::new(nested))));
        self
    }
}

/// One transaction input item.
#[derive(Clone, Debug)]
pub enum TxItem {
    /// `[:db/add e a v]`
    Add(EidRef, Keyword, Value),
    /// `[:db/retract e a v]`
    Retract(EidRef, Keyword, Value),
    /// `[:db.fn/retractEntity e]`
    RetractEntity(EidRef),
    /// `[:db.fn/retractAttribute e a]`
    RetractAttribute(EidRef, Keyword),
    /// `[:db.fn/cas e a old new]`; `old = None` asserts current absence
    Cas(EidRef, Keyword, Option<Value>, Value),
    /// `[:db.fn/call f args...]` or `[:<ident> args...]`
    Call(Keyword, Vec<Value>),
    /// Map-form entity
    Map(Entity),
}

/// Value slot of a flattened op: either a concrete value or an entity
/// reference still awaiting resolution.
#[derive(Clone, Debug)]
pub(crate) enum RawVal {
    Val(Value),
    ERef(EidRef),
}

/// A flattened datom-level op.
#[derive(Clone, Debug)]
pub(crate) struct RawOp {
    pub add: bool,
    pub e: EidRef,
    pub a: Keyword,
    pub v: RawVal,
}

/// Items after map/call expansion; entity-level ops pass through untouched.
#[derive(Clone, Debug)]
pub(crate) enum FlatItem {
    Op(RawOp),
    RetractEntity(EidRef),
    RetractAttribute(EidRef, Keyword),
    Cas {
        e: EidRef,
        a: Keyword,
        old: Option<Value>,
        new: Value,
    },
}
