//! # datalith-query
//!
//! The Datalog query engine:
//!
//! - [`edn`]: winnow-based EDN reader for query/rules text
//! - [`parse`]: query and rules shaping into tagged clause variants
//! - [`plan`]: greedy bound-first clause ordering
//! - [`relation`]: header+tuples relations with hash joins
//! - [`eval`]: pattern scans, or/or-join, not/not-join, functions, rules
//! - [`builtins`]: built-in predicates and functions (incl. tuple/untuple)

pub mod builtins;
pub mod edn;
pub mod error;
pub mod eval;
pub mod parse;
pub mod plan;
pub mod relation;

pub use edn::{read_edn, Edn};
pub use error::{Error, Result};
pub use eval::{eval_query, q, QueryInput, QueryResult};
pub use parse::{parse_query, parse_rules, Clause, FindSpec, Pattern, Query, Rule, Term};
pub use relation::Relation;
