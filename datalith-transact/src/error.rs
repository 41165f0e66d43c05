//! Error types for datalith-transact
//!
//! The message texts here are part of the public contract: callers match on
//! the prefixes ("Conflicting upserts", "Cannot add ... because of unique
//! constraint", ...). Change them and you break every caller's error
//! handling.

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Transaction error type
#[derive(Error, Debug)]
pub enum Error {
    /// Errors from the core types
    #[error(transparent)]
    Core(#[from] datalith_core::Error),

    /// Errors from the datom store
    #[error(transparent)]
    Store(#[from] datalith_store::Error),

    /// A tempid resolved to more than one entity, or an upsert would change
    /// a unique attribute the entity already carries
    #[error("Conflicting upserts: {0}")]
    ConflictingUpserts(String),

    /// Tempids that appear only in value position and are never defined
    #[error("Tempids used only as value in transaction: ({0})")]
    TempidsOnlyAsValue(String),

    /// Tempids are disallowed as the entity id of a CAS
    #[error("Can't use tempid in :db.fn/cas")]
    TempidInCas,

    /// CAS precondition mismatch
    #[error(":db.fn/cas failed on datom [{e} {a} {current}], expected {expected}")]
    CasFailed {
        e: u64,
        a: String,
        current: String,
        expected: String,
    },

    /// Unique constraint violation
    #[error("Cannot add {datom} because of unique constraint")]
    UniqueViolation { datom: String },

    /// Direct write or retract of a composite tuple attribute
    #[error("Can't modify tuple attrs directly: {0}")]
    TupleDirect(String),

    /// `:db.fn/call` or `[:<ident> ...]` with an unregistered ident
    #[error("Unknown transaction fn: {0}")]
    UnknownFn(String),

    /// A lookup ref did not resolve to any entity
    #[error("Unresolved lookup ref: [{attr} {value}]")]
    UnresolvedLookup { attr: String, value: String },

    /// Transaction fns expanding into transaction fns beyond reason
    #[error("Transaction fn expansion too deep")]
    FnExpansionDepth,
}

impl Error {
    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Core(e) => e.kind(),
            Error::Store(e) => e.kind(),
            Error::ConflictingUpserts(_) => "transact/upsert-conflict",
            Error::TempidsOnlyAsValue(_) => "transact/tempid-as-value",
            Error::TempidInCas => "transact/cas-tempid",
            Error::CasFailed { .. } => "transact/cas",
            Error::UniqueViolation { .. } => "transact/unique",
            Error::TupleDirect(_) => "transact/tuple",
            Error::UnknownFn(_) => "transact/unknown-fn",
            Error::UnresolvedLookup { .. } => "transact/lookup",
            Error::FnExpansionDepth => "transact/fn-depth",
        }
    }
}
