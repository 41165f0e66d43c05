//! # datalith-store
//!
//! The datom store: maintains the EAVT / AEVT / AVET / VAET indices over the
//! substrate adapter, spills oversize values into the `giants` dbi, persists
//! the schema and counters, and serves lazy sorted datom iteration and AVET
//! range scans from snapshot-pinned read views.

pub mod error;
pub mod keys;
pub mod store;

pub use error::{Error, Result};
pub use store::{Components, DatomIter, DatomStore, StoreOptions, StoreReader, StoreState};
