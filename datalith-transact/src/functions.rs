//! Named transaction functions
//!
//! `:db.fn/call` and `[:<ident> args...]` items look up a function registered
//! under its ident. Functions run with a read view of the pre-transaction db
//! and return further tx items, which are spliced into the expansion.
//! Arbitrary runtime closures are never marshalled across processes; only
//! registered names travel in transaction data.

use crate::error::{Error, Result};
use crate::ir::TxItem;
use datalith_core::{Keyword, Value};
use datalith_store::StoreReader;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// A registered transaction function.
pub type TxFn = Arc<dyn Fn(&StoreReader, &[Value]) -> Result<Vec<TxItem>> + Send + Sync>;

/// Registry of named transaction functions.
#[derive(Clone, Default)]
pub struct TxFnRegistry {
    fns: FxHashMap<Keyword, TxFn>,
}

impl TxFnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function under an ident, replacing any previous one.
    pub fn register<F>(&mut self, ident: Keyword, f: F)
    where
        F: Fn(&StoreReader, &[Value]) -> Result<Vec<TxItem>> + Send + Sync + 'static,
    {
        self.fns.insert(ident, Arc::new(f));
    }

    /// Look up by ident; unknown idents are a transaction error.
    pub fn get(&self, ident: &Keyword) -> Result<TxFn> {
        self.fns
            .get(ident)
            .cloned()
            .ok_or_else(|| Error::UnknownFn(ident.to_string()))
    }
}

impl std::fmt::Debug for TxFnRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxFnRegistry")
            .field("fns", &self.fns.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalith_core::kw;

    #[test]
    fn test_unknown_fn_error() {
        let reg = TxFnRegistry::new();
        let err = match reg.get(&kw(":my/fn")) {
            Err(e) => e,
            Ok(_) => panic!("expected unknown fn error"),
        };
        assert!(err.to_string().starts_with("Unknown transaction fn"));
        assert_eq!(err.kind(), "transact/unknown-fn");
    }

    #[test]
    fn test_register_and_call() {
        let mut reg = TxFnRegistry::new();
        reg.register(kw(":noop"), |_db, _args| Ok(vec![]));
        assert!(reg.get(&kw(":noop")).is_ok());
    }
}
