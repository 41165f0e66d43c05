//! Error types for datalith-kv

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Substrate adapter error type
#[derive(Error, Debug)]
pub enum Error {
    /// The environment at this path is already open in this process
    #[error("Environment already open: {0}")]
    AlreadyOpen(PathBuf),

    /// I/O failure from the underlying store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation against a dbi that was never opened
    #[error("Unknown dbi: {0}")]
    UnknownDbi(String),
}

impl Error {
    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::AlreadyOpen(_) => "kv/env-open",
            Error::Io(_) => "kv/io",
            Error::UnknownDbi(_) => "kv/unknown-dbi",
        }
    }
}
