//! # datalith-search
//!
//! Companion full-text search engine for Datalith, sharing the substrate:
//!
//! - [`analyzer`]: English tokenization with positions and byte offsets
//! - [`fuzzy`]: symmetric-delete fuzzy term correction
//! - [`score`]: IDF/term scoring with bigram boosting
//! - [`engine`]: the five persistent index structures and ranked retrieval

pub mod analyzer;
pub mod engine;
pub mod error;
pub mod fuzzy;
pub mod score;

pub use analyzer::{en_analyzer, Token};
pub use engine::{DocId, SearchEngine, SearchOptions, SearchResults};
pub use error::{Error, Result};
pub use fuzzy::{edit_distance, FuzzyDict};
pub use score::ScoreParams;
