//! Top-level error type
//!
//! Composes every layer's error; `kind()` exposes the stable machine-readable
//! kind string of the underlying failure (`transact/unique`, `query/edn`,
//! `kv/env-open`, ...).

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Connection-level error type
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] datalith_core::Error),

    #[error(transparent)]
    Kv(#[from] datalith_kv::Error),

    #[error(transparent)]
    Store(#[from] datalith_store::Error),

    #[error(transparent)]
    Transact(#[from] datalith_transact::Error),

    #[error(transparent)]
    Query(#[from] datalith_query::Error),

    #[error(transparent)]
    Search(#[from] datalith_search::Error),
}

impl Error {
    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Core(e) => e.kind(),
            Error::Kv(e) => e.kind(),
            Error::Store(e) => e.kind(),
            Error::Transact(e) => e.kind(),
            Error::Query(e) => e.kind(),
            Error::Search(e) => e.kind(),
        }
    }
}
