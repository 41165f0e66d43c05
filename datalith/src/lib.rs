//! # Datalith
//!
//! A durable, embedded, transactional triple store with Datalog queries and a
//! companion full-text search engine. Facts are five-component datoms
//! `(entity, attribute, value, transaction, added?)` kept in four sorted
//! indices over an ordered key-value substrate.
//!
//! ## Quick start
//!
//! ```ignore
//! use datalith::{Conn, ConnOptions, QueryInput, TxItem, EidRef, kw};
//! use datalith_core::{AttrSpec, Value, ValueType};
//!
//! let conn = Conn::open(
//!     "/var/data/people",
//!     ConnOptions::new().schema(vec![
//!         AttrSpec::new(kw(":friend")).value_type(ValueType::Ref).many(),
//!     ]),
//! )?;
//!
//! conn.transact(vec![
//!     TxItem::Add(EidRef::temp_int(-1), kw(":name"), "Ivan".into()),
//!     TxItem::Add(EidRef::temp_int(-1), kw(":age"), Value::Long(10)),
//! ])?;
//!
//! let result = conn.q(
//!     "[:find ?e :where (or [?e :name \"Oleg\"] [?e :age 10])]",
//!     vec![],
//! )?;
//! ```
//!
//! ## Full-text search
//!
//! ```ignore
//! use datalith_search::SearchOptions;
//!
//! let engine = conn.search_engine(SearchOptions::default())?;
//! engine.add_doc(Value::Long(0), "The quick red fox")?;
//! for (doc_ref, doc_id) in engine.search("red fox")? {
//!     println!("{doc_ref} ({doc_id})");
//! }
//! ```

pub mod conn;
pub mod error;

pub use conn::{Conn, ConnOptions};
pub use error::{Error, Result};

pub use datalith_core::{kw, AttrSpec, Datom, Eid, Index, Keyword, Value, ValueType};
pub use datalith_query::{QueryInput, QueryResult};
pub use datalith_search::{SearchEngine, SearchOptions};
pub use datalith_store::StoreReader;
pub use datalith_transact::{AttrValue, EidRef, Entity, TempId, TxItem, TxReport};
