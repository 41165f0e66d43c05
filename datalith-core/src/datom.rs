//! Datom - the fundamental data unit
//!
//! A datom is a single fact with five components:
//! - `e`: entity id
//! - `a`: attribute keyword
//! - `v`: typed value
//! - `tx`: transaction id
//! - `added`: true = assertion, false = retraction
//!
//! Equality and hashing use fact identity (e, a, v) only; `tx` and `added`
//! are bookkeeping. Ordering depends on the index and is defined by the
//! encoded key, not by the struct.

use crate::keyword::Keyword;
use crate::value::{Eid, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A single fact (assertion or retraction)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Datom {
    /// Entity id
    pub e: Eid,
    /// Attribute
    pub a: Keyword,
    /// Value
    pub v: Value,
    /// Transaction id
    pub tx: u64,
    /// true = assertion, false = retraction
    pub added: bool,
}

impl Datom {
    /// Create an assertion datom
    pub fn add(e: Eid, a: Keyword, v: Value, tx: u64) -> Self {
        Self {
            e,
            a,
            v,
            tx,
            added: true,
        }
    }

    /// Create a retraction datom
    pub fn retract(e: Eid, a: Keyword, v: Value, tx: u64) -> Self {
        Self {
            e,
            a,
            v,
            tx,
            added: false,
        }
    }

    /// Flip this datom into a retraction at a new transaction
    pub fn retract_at(&self, tx: u64) -> Self {
        Self {
            tx,
            added: false,
            ..self.clone()
        }
    }
}

impl PartialEq for Datom {
    fn eq(&self, other: &Self) -> bool {
        self.e == other.e && self.a == other.a && self.v == other.v
    }
}

impl Eq for Datom {}

impl Hash for Datom {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.e.hash(state);
        self.a.hash(state);
        self.v.hash(state);
    }
}

impl fmt::Display for Datom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} {} {} {} {}]",
            self.e,
            self.a,
            self.v,
            self.tx,
            if self.added { "true" } else { "false" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyword::kw;

    #[test]
    fn test_fact_identity_equality() {
        let d1 = Datom::add(1, kw(":name"), Value::Str("Ivan".into()), 100);
        let d2 = Datom::retract(1, kw(":name"), Value::Str("Ivan".into()), 200);
        assert_eq!(d1, d2);

        let d3 = Datom::add(2, kw(":name"), Value::Str("Ivan".into()), 100);
        assert_ne!(d1, d3);
    }

    #[test]
    fn test_display() {
        let d = Datom::add(1, kw(":age"), Value::Long(10), 7);
        assert_eq!(d.to_string(), "[1 :age 10 7 true]");
    }
}
