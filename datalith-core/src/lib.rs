//! # datalith-core
//!
//! Core types for the Datalith triple store:
//!
//! - [`Value`] / [`ValueType`]: the polymorphic datom value union
//! - [`codec`]: order-preserving byte encoding backing the sorted indices
//! - [`Datom`]: the five-component fact
//! - [`Keyword`]: symbolic identifiers for attributes and idents
//! - [`Schema`] / [`Rschema`]: attribute metadata and derived capability maps
//! - [`Index`]: the four index orderings (EAVT, AEVT, AVET, VAET)

pub mod codec;
pub mod datom;
pub mod error;
pub mod index;
pub mod keyword;
pub mod schema;
pub mod value;

pub use datom::Datom;
pub use error::{Error, Result};
pub use index::Index;
pub use keyword::{kw, Keyword};
pub use schema::{
    created_at_ident, updated_at_ident, AttrSpec, Cardinality, Rschema, Schema, Unique,
};
pub use value::{Aid, Eid, Value, ValueType, TX0};
