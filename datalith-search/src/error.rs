//! Error types for datalith-search

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Search engine error type
#[derive(Error, Debug)]
pub enum Error {
    /// Errors from the core codec (doc refs round-trip through it)
    #[error(transparent)]
    Core(#[from] datalith_core::Error),

    /// Errors from the substrate adapter
    #[error(transparent)]
    Kv(#[from] datalith_kv::Error),

    /// Unknown document id
    #[error("No document with id {0}")]
    NoSuchDoc(u32),

    /// Corrupt search index entry
    #[error("Corrupt search index entry in {dbi}: {reason}")]
    Corrupt { dbi: &'static str, reason: String },
}

impl Error {
    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Core(e) => e.kind(),
            Error::Kv(e) => e.kind(),
            Error::NoSuchDoc(_) => "search/no-such-doc",
            Error::Corrupt { .. } => "search/corrupt",
        }
    }

    pub fn corrupt(dbi: &'static str, reason: impl Into<String>) -> Self {
        Error::Corrupt {
            dbi,
            reason: reason.into(),
        }
    }
}
