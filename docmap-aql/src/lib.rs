//! AQL support for docmap.
//!
//! This crate renders the docmap [`QueryModel`](docmap_core::query::QueryModel) as an AQL query
//! string and converts documents between logical field names (`id`, `rev`) and the storage
//! names ArangoDB-style collections use (`_key`, `_rev`). It has no database client; adapters
//! that talk to such a store use it to build their native queries.
//!
//! To use it through the umbrella crate, keep the default `aql` feature enabled:
//!
//! ```toml
//! [dependencies]
//! docmap = { version = "x.y.z", features = ["aql"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use docmap_aql::AqlTranslator;
//! use docmap_core::query::QueryModel;
//!
//! let mut query = QueryModel::new();
//! query.where_("id").eq("u1").sort("name", 1)?.limit(10);
//!
//! let aql = AqlTranslator::new().translate("users", &query)?;
//! assert_eq!(aql, r#"FOR doc IN users FILTER doc._key == "u1" SORT doc.name LIMIT 10 RETURN doc"#);
//! ```

pub mod remap;
pub mod translator;

pub use remap::FieldMap;
pub use translator::{AqlTranslator, AqlTranslatorBuilder};
