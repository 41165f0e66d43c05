//! # datalith-transact
//!
//! Transaction processing for Datalith:
//!
//! - [`TxItem`] / [`Entity`]: the transaction input IR
//! - entity flattening with nested maps and reverse refs
//! - tempid resolution with lookup refs and unique-identity upserts
//! - composite tuple maintenance, CAS, entity retraction, unique enforcement
//! - [`TxFnRegistry`]: named transaction functions
//! - [`transact`]: the pipeline; returns a [`TxReport`]

mod entities;
pub mod error;
pub mod functions;
pub mod ir;
mod resolve;
pub mod transactor;

pub use error::{Error, Result};
pub use functions::{TxFn, TxFnRegistry};
pub use ir::{AttrValue, EidRef, Entity, TempId, TxItem};
pub use transactor::{current_tx_key, transact, DbInfo, TxReport};
