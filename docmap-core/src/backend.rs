//! Storage adapter contract the record and mapper layers persist through.
//!
//! Adapters exchange plain documents that use the *logical* field names: `id` for identity and
//! `rev` for the optimistic-concurrency token. Any storage-specific renaming (for example
//! `_key`/`_rev`) and the translation of a [`QueryModel`] into a native query happen inside the
//! adapter.
//!
//! # Examples
//!
//! ```ignore
//! use docmap_core::backend::StorageAdapter;
//! use bson::doc;
//!
//! let saved = adapter.insert("users", doc! { "name": "Alice" }).await?;
//! let id = docmap_core::backend::key_string(saved.get("id").unwrap());
//! let fetched = adapter.get("users", &id).await?;
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use std::fmt::Debug;

use crate::{error::DocmapResult, query::QueryModel};

/// Reserved identity field.
pub const ID_FIELD: &str = "id";
/// Reserved revision-token field.
pub const REV_FIELD: &str = "rev";

/// Renders an id or revision value as the string key adapters address documents by.
pub fn key_string(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Abstract interface for document storage adapters.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the core holds them behind an `Arc` shared by every
/// record of a mapper.
///
/// # Error Handling
///
/// Adapters report [`DocmapError::NotFound`](crate::error::DocmapError::NotFound),
/// [`DocmapError::AlreadyExists`](crate::error::DocmapError::AlreadyExists) and
/// [`DocmapError::RevisionMismatch`](crate::error::DocmapError::RevisionMismatch); the core
/// passes them to the caller unchanged.
#[async_trait]
pub trait StorageAdapter: Send + Sync + Debug {
    /// Fetches one document by id.
    async fn get(&self, collection: &str, id: &str) -> DocmapResult<Document>;

    /// Returns the documents matching `query`, honouring its sort, paging and projection.
    async fn find_all(&self, collection: &str, query: &QueryModel) -> DocmapResult<Vec<Document>>;

    /// Stores a new document and returns it as stored, with `id` and `rev` assigned.
    ///
    /// An `id` already present in `data` is kept; otherwise the adapter generates one.
    async fn insert(&self, collection: &str, data: Document) -> DocmapResult<Document>;

    /// Merges the top-level fields of `patch` into the stored document.
    ///
    /// When `patch` carries a `rev`, it must match the stored revision.
    async fn update(&self, collection: &str, id: &str, patch: Document) -> DocmapResult<Document>;

    /// Replaces the stored document wholesale, with the same revision rule as [`update`](Self::update).
    async fn replace(&self, collection: &str, id: &str, data: Document) -> DocmapResult<Document>;

    /// Deletes a document and returns its last stored state.
    async fn remove(&self, collection: &str, id: &str) -> DocmapResult<Document>;

    /// Stores several new documents; nothing is stored if any of them conflicts.
    async fn insert_all(&self, collection: &str, data: Vec<Document>) -> DocmapResult<Vec<Document>>;
}

/// Factory trait for creating adapter instances.
///
/// Mirrors the builder each adapter exposes for its own configuration:
///
/// ```ignore
/// let adapter = MemoryAdapter::builder().build().await?;
/// ```
#[async_trait]
pub trait AdapterBuilder {
    type Adapter: StorageAdapter;

    async fn build(self) -> DocmapResult<Self::Adapter>;
}
