//! Query construction and change tracking for a small object-document mapper.
//!
//! This crate is the core of the docmap project and provides:
//!
//! - **Query model** ([`query`]) - One canonical query form populated by a fluent builder or a
//!   MongoDB-style filter object, serializable back to that object
//! - **Records** ([`record`]) - Documents with an append-only change log, exact reversion,
//!   virtual properties and path-addressed access
//! - **Field paths** ([`path`]) - Dotted/bracketed path parsing and the get/set/unset primitives
//! - **Storage adapter abstraction** ([`backend`]) - Traits adapters implement to persist records
//! - **Validation and hooks** ([`validate`], [`hooks`]) - Extension points around saving
//! - **Mapper** ([`mapper`]) - Collection-level façade handing out records and bound queries
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docmap_core::{query::QueryModel, record::Record};
//! use bson::doc;
//!
//! let mut query = QueryModel::new();
//! query.where_("status").eq("active").sort("createdAt", -1)?.limit(20);
//!
//! let mut record = Record::new(doc! { "status": "draft" });
//! record.set("status", "active")?;
//! assert!(record.is_dirty());
//! ```

pub mod backend;
pub mod error;
pub mod hooks;
pub mod mapper;
pub mod path;
pub mod query;
pub mod record;
pub mod validate;
