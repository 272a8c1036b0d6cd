//! Main docmap crate: query construction and change tracking for documents.
//!
//! This crate is the primary entry point for users of docmap. It re-exports the core types from
//! the sub-crates and gives access to the bundled adapters and translators.
//!
//! # Features
//!
//! - **One query model, two front-ends** - Build queries fluently or parse MongoDB-style filter
//!   objects; both produce the same model, which serializes back to the filter form
//! - **Change-tracked records** - Every mutation is logged, can be reverted exactly and only
//!   touched fields are written on save
//! - **Virtual properties** - Computed fields that can be persisted, displayed or both
//! - **AQL translation** - Render queries as AQL (`aql` feature, on by default)
//!
//! # Quick Start
//!
//! ```ignore
//! use docmap::{prelude::*, memory::MemoryAdapter};
//! use bson::doc;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> DocmapResult<()> {
//!     let adapter = MemoryAdapter::builder().build().await?;
//!     let users = Mapper::builder("users", Arc::new(adapter)).build();
//!
//!     // Create and save a record
//!     let mut user = users.create(doc! { "name": "Alice", "status": "pending" });
//!     user.save().await?;
//!
//!     // Change it; only `status` (and the revision) is sent on the next save
//!     user.set("status", "active")?;
//!     user.save().await?;
//!
//!     // Query with the builder ...
//!     let mut query = users.query();
//!     query.where_("status").eq("active");
//!     let active = query.run().await?;
//!
//!     // ... or with a filter object
//!     let same = users
//!         .find(&doc! { "$where": { "status": "active" } })
//!         .await?;
//!
//!     assert_eq!(active.len(), same.len());
//!     Ok(())
//! }
//! ```
//!
//! # Translating queries
//!
//! ```ignore
//! use docmap::{aql::AqlTranslator, prelude::*};
//!
//! let mut query = QueryModel::new();
//! query.where_("status").eq("active");
//!
//! let aql = AqlTranslator::new().translate("collection", &query)?;
//! assert_eq!(aql, r#"FOR doc IN collection FILTER doc.status == "active" RETURN doc"#);
//! ```
//!
//! # Adapters
//!
//! - [`memory`] - In-memory storage for development and testing
//! - [`aql`] - AQL translation and `_key`/`_rev` remapping (requires the `aql` feature)

pub mod prelude;

pub use docmap_core::{backend, error, hooks, mapper, path, query, record, validate};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage adapter.
pub mod memory {
    pub use docmap_memory::{MemoryAdapter, MemoryAdapterBuilder};
}

/// AQL translation.
///
/// This module is only available when the `aql` feature is enabled.
#[cfg(feature = "aql")]
pub mod aql {
    pub use docmap_aql::{AqlTranslator, AqlTranslatorBuilder, FieldMap};
}
