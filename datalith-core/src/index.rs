//! Index orderings
//!
//! Four index orderings optimize different access patterns:
//!
//! | Index | Order | Use case |
//! |-------|---------|----------|
//! | EAVT | e, a, v | entity lookups, entity pull |
//! | AEVT | a, e, v | scan all values of an attribute |
//! | AVET | a, v, e | value/range lookups (indexed, unique, ref attrs only) |
//! | VAET | v, a, e | reverse navigation over ref attrs |
//!
//! Ordering within each index is defined entirely by the encoded key bytes;
//! the codec guarantees bytewise order matches semantic order.

use std::fmt;

/// Index type enumeration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Index {
    Eavt,
    Aevt,
    Avet,
    Vaet,
}

impl Index {
    /// All index types
    pub fn all() -> &'static [Index] {
        &[Index::Eavt, Index::Aevt, Index::Avet, Index::Vaet]
    }

    /// Name of the dbi backing this index
    pub fn dbi_name(&self) -> &'static str {
        match self {
            Index::Eavt => "eav",
            Index::Aevt => "aev",
            Index::Avet => "ave",
            Index::Vaet => "vae",
        }
    }

    /// Select the best index for a pattern given which components are bound.
    ///
    /// - entity bound: EAVT (most selective)
    /// - attribute and value bound, attr has AVE coverage: AVET
    /// - attribute bound: AEVT
    /// - value bound and it is a ref: VAET
    /// - fallback: EAVT full scan
    pub fn for_components(
        e_bound: bool,
        a_bound: bool,
        v_bound: bool,
        v_is_ref: bool,
        a_in_ave: bool,
    ) -> Index {
        if e_bound {
            Index::Eavt
        } else if a_bound && v_bound && a_in_ave {
            Index::Avet
        } else if a_bound {
            Index::Aevt
        } else if v_bound && v_is_ref {
            Index::Vaet
        } else {
            Index::Eavt
        }
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dbi_name())
    }
}
