//! Error types for datalith-query
//!
//! Query errors are per-query: they never disturb store state. The message
//! prefixes ("All clauses in 'or' ...", "Insufficient bindings", "Cannot
//! parse clause") are part of the public contract.

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Query error type
#[derive(Error, Debug)]
pub enum Error {
    /// Errors from the core types
    #[error(transparent)]
    Core(#[from] datalith_core::Error),

    /// Errors from the datom store
    #[error(transparent)]
    Store(#[from] datalith_store::Error),

    /// The query text is not well-formed EDN
    #[error("Cannot parse EDN at offset {offset}: {message}")]
    Edn { offset: usize, message: String },

    /// A clause form that fits no clause shape
    #[error("Cannot parse clause: {0}")]
    MalformedClause(String),

    /// The query shape itself is wrong (missing :find, bad :in, ...)
    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    /// `or` branches with differing free variable sets
    #[error("All clauses in 'or' must use same set of free vars, had {0} and {1}")]
    OrVarsMismatch(String, String),

    /// `or-join` required bindings that nothing has bound yet
    #[error("Insufficient bindings: none of ({0}) is bound")]
    InsufficientBindings(String),

    /// A predicate or function ident with no built-in
    #[error("Unknown predicate or function: {0}")]
    UnknownFn(String),

    /// A pattern names a source that `:in` never declared
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// A rule was invoked that the rules input does not define
    #[error("Unknown rule: {0}")]
    UnknownRule(String),

    /// `:find`/`:with` variable never bound by the `:where` clauses
    #[error("Find variable {0} is not bound by any clause")]
    UnboundFind(String),

    /// Built-in applied to values outside its domain
    #[error("Cannot apply {op} to {args}")]
    BadApply { op: String, args: String },

    /// `:in` declares more bindings than inputs were passed, or fewer
    #[error("Expected {expected} inputs, got {got}")]
    InputArity { expected: usize, got: usize },
}

impl Error {
    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Core(e) => e.kind(),
            Error::Store(e) => e.kind(),
            Error::Edn { .. } => "query/edn",
            Error::MalformedClause(_) => "query/malformed-clause",
            Error::MalformedQuery(_) => "query/malformed",
            Error::OrVarsMismatch(..) => "query/or-vars",
            Error::InsufficientBindings(_) => "query/insufficient-bindings",
            Error::UnknownFn(_) => "query/unknown-fn",
            Error::UnknownSource(_) => "query/unknown-source",
            Error::UnknownRule(_) => "query/unknown-rule",
            Error::UnboundFind(_) => "query/unbound-find",
            Error::BadApply { .. } => "query/bad-apply",
            Error::InputArity { .. } => "query/input-arity",
        }
    }
}
