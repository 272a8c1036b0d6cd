//! In-memory storage adapter for docmap.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StorageAdapter` trait.
//! It uses async-aware read-write locks for concurrent access and is meant for development and
//! tests.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using an async-aware RwLock
//! - **Revision tokens** - Every write assigns a fresh revision; stale writes are rejected
//! - **Full query support** - Evaluates the docmap query model: filtering, sorting, paging and
//!   projection
//!
//! # Quick Start
//!
//! ```ignore
//! use docmap::{prelude::*, memory::MemoryAdapter};
//! use bson::doc;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = MemoryAdapter::builder().build().await?;
//!     let users = Mapper::builder("users", Arc::new(adapter)).build();
//!
//!     let mut user = users.create(doc! { "name": "Alice" });
//!     user.save().await?;
//!
//!     Ok(())
//! }
//! ```

mod evaluator;
pub mod store;

pub use store::{MemoryAdapter, MemoryAdapterBuilder};
