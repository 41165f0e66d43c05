//! Error types for datalith-core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or inconsistent attribute specification
    #[error("Bad attribute specification for {attr}: {reason}")]
    BadAttrSpec { attr: String, reason: String },

    /// Unknown attribute referenced by a datom or query
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    /// A byte sequence could not be decoded back into a value
    #[error("Cannot decode value: {0}")]
    Decode(String),

    /// A value does not conform to its attribute's declared type
    #[error("Invalid value {value} for type {expected}")]
    InvalidValueType { value: String, expected: String },

    /// Malformed keyword literal
    #[error("Invalid keyword: {0}")]
    InvalidKeyword(String),
}

impl Error {
    /// Stable machine-readable error kind (`{:error ...}` in the public contract)
    pub fn kind(&self) -> &'static str {
        match self {
            Error::BadAttrSpec { .. } => "schema/bad-attr-spec",
            Error::UnknownAttribute(_) => "schema/unknown-attribute",
            Error::Decode(_) => "core/decode",
            Error::InvalidValueType { .. } => "transact/value-type",
            Error::InvalidKeyword(_) => "core/keyword",
        }
    }

    /// Create a bad-attr-spec error
    pub fn bad_attr_spec(attr: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Error::BadAttrSpec {
            attr: attr.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Error::Decode(msg.into())
    }
}
