//! Error types for datalith-store

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Datom store error type
#[derive(Error, Debug)]
pub enum Error {
    /// Errors from the core types (codec, schema)
    #[error(transparent)]
    Core(#[from] datalith_core::Error),

    /// Errors from the substrate adapter
    #[error(transparent)]
    Kv(#[from] datalith_kv::Error),

    /// Range scan on an attribute with no AVE coverage
    #[error("Attribute {0} is not AVE-indexed; declare :index, :unique or ref type")]
    Unindexed(String),

    /// A giant value's out-of-line payload is missing
    #[error("Missing out-of-line value for digest {0}")]
    MissingGiant(String),

    /// Corrupt index entry
    #[error("Corrupt index entry in {index}: {reason}")]
    Corrupt { index: &'static str, reason: String },

    /// Metadata (max-eid/max-tx/version) could not be read
    #[error("Corrupt store metadata: {0}")]
    Meta(String),
}

impl Error {
    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Core(e) => e.kind(),
            Error::Kv(e) => e.kind(),
            Error::Unindexed(_) => "store/unindexed",
            Error::MissingGiant(_) => "store/missing-giant",
            Error::Corrupt { .. } => "store/corrupt",
            Error::Meta(_) => "store/meta",
        }
    }

    pub fn corrupt(index: &'static str, reason: impl Into<String>) -> Self {
        Error::Corrupt {
            index,
            reason: reason.into(),
        }
    }
}
