//! # datalith-kv
//!
//! Substrate adapter for the Datalith triple store: a thin contract over an
//! LMDB-class ordered key-value engine.
//!
//! - [`Env`]: environment lifecycle with a process-wide open registry
//! - [`Dbi`]: named, typed databases
//! - [`ReadTxn`]: snapshot reads, range cursors, inverted lists
//! - [`WriteTxn`]: the single writer; batched operations applied atomically
//!
//! Key order is bytewise per dbi; the `datalith-core` codec guarantees that
//! bytewise order matches semantic value order.

pub mod cursor;
pub mod env;
pub mod error;
pub mod txn;

pub use cursor::{ListIter, Scan};
pub use env::{Dbi, Env};
pub use error::{Error, Result};
pub use txn::{ReadTxn, WriteTxn};
