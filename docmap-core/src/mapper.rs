//! Collection-level façade tying records, queries and a storage adapter together.
//!
//! A [`Mapper`] owns the shared pieces every record of a collection uses (the adapter binding,
//! validator, hooks and virtuals) and hands out [`Record`]s and bound [`Query`]s.
//!
//! # Example
//!
//! ```ignore
//! use docmap_core::{mapper::Mapper, record::Virtual};
//! use bson::{doc, Bson};
//!
//! let users = Mapper::builder("users", adapter)
//!     .virtual_field("initial", Virtual::new(|doc| {
//!         doc.get_str("name").ok().map(|name| Bson::String(name[..1].to_string()))
//!     }))
//!     .build();
//!
//! let mut ada = users.create(doc! { "name": "Ada" });
//! ada.save().await?;
//!
//! let mut query = users.query();
//! query.where_("name").eq("Ada");
//! let found = query.run().await?;
//! ```

use async_trait::async_trait;
use bson::Document;
use std::sync::Arc;
use tracing::debug;

use crate::{
    backend::StorageAdapter,
    error::DocmapResult,
    hooks::{HookEvent, Hooks},
    query::{Query, QueryModel, QueryRunner},
    record::{Record, RecordBinding, SerializeMode, Virtual, Virtuals},
    validate::Validator,
};

/// Records and queries for one collection.
#[derive(Debug, Clone)]
pub struct Mapper {
    binding: Arc<RecordBinding>,
    virtuals: Arc<Virtuals>,
}

impl Mapper {
    /// Starts configuring a mapper for `collection` stored through `adapter`.
    pub fn builder(collection: impl Into<String>, adapter: Arc<dyn StorageAdapter>) -> MapperBuilder {
        MapperBuilder::new(collection.into(), adapter)
    }

    /// Returns the name of this collection.
    pub fn collection(&self) -> &str {
        self.binding.collection()
    }

    pub fn virtuals(&self) -> &Arc<Virtuals> {
        &self.virtuals
    }

    fn record(&self, data: Document) -> Record {
        Record::bound(data, Arc::clone(&self.virtuals), Arc::clone(&self.binding))
    }

    /// Creates an unsaved record bound to this collection.
    pub fn create(&self, data: Document) -> Record {
        self.record(data)
    }

    /// Fetches a record by id.
    ///
    /// # Errors
    ///
    /// Returns [`DocmapError::NotFound`](crate::error::DocmapError::NotFound) from the adapter
    /// when the id is unknown.
    pub async fn get(&self, id: &str) -> DocmapResult<Record> {
        let stored = self.binding.adapter().get(self.collection(), id).await?;
        self.binding.hooks().emit(HookEvent::AfterGet, &stored)?;
        Ok(self.record(stored))
    }

    /// A query bound to this collection's adapter.
    pub fn query(&self) -> Query {
        Query::bound(Arc::new(MapperRunner { binding: Arc::clone(&self.binding) }))
    }

    /// Finds records matching a filter object (`$where`, `$sort`, `$limit`, ...).
    ///
    /// # Errors
    ///
    /// Returns [`DocmapError::Query`](crate::error::DocmapError::Query) when the filter object
    /// cannot be parsed.
    pub async fn find(&self, filter: &Document) -> DocmapResult<Vec<Record>> {
        let query = QueryModel::from_filter(filter)?;
        self.find_query(&query).await
    }

    /// Finds records matching a query model.
    pub async fn find_query(&self, query: &QueryModel) -> DocmapResult<Vec<Record>> {
        let found = self.binding.adapter().find_all(self.collection(), query).await?;
        debug!(collection = self.collection(), count = found.len(), "found records");
        Ok(found.into_iter().map(|doc| self.record(doc)).collect())
    }

    /// Validates and stores several new documents at once.
    ///
    /// Every document is validated before anything is written; insert hooks fire per document.
    pub async fn insert_all(&self, docs: Vec<Document>) -> DocmapResult<Vec<Record>> {
        let hooks = self.binding.hooks();

        let mut shapes = Vec::with_capacity(docs.len());
        for doc in docs {
            let shape = self.record(doc).serialize(SerializeMode::Save);
            self.binding.run_validation(&shape).await?;
            hooks.emit(HookEvent::BeforeInsert, &shape)?;
            shapes.push(shape);
        }

        let saved = self.binding.adapter().insert_all(self.collection(), shapes).await?;
        for doc in &saved {
            hooks.emit(HookEvent::AfterInsert, doc)?;
        }

        debug!(collection = self.collection(), count = saved.len(), "inserted records");
        Ok(saved.into_iter().map(|doc| self.record(doc)).collect())
    }

    /// Deletes a document by id and returns its last stored state.
    pub async fn remove(&self, id: &str) -> DocmapResult<Document> {
        let hooks = self.binding.hooks();
        let current = self.binding.adapter().get(self.collection(), id).await?;

        hooks.emit(HookEvent::BeforeRemove, &current)?;
        let removed = self.binding.adapter().remove(self.collection(), id).await?;
        hooks.emit(HookEvent::AfterRemove, &removed)?;
        Ok(removed)
    }
}

struct MapperRunner {
    binding: Arc<RecordBinding>,
}

#[async_trait]
impl QueryRunner for MapperRunner {
    async fn run(&self, query: &QueryModel) -> DocmapResult<Vec<Document>> {
        self.binding.adapter().find_all(self.binding.collection(), query).await
    }
}

/// Builder for [`Mapper`] instances.
pub struct MapperBuilder {
    collection: String,
    adapter: Arc<dyn StorageAdapter>,
    validator: Option<Arc<dyn Validator>>,
    virtuals: Virtuals,
    hooks: Hooks,
}

impl MapperBuilder {
    fn new(collection: String, adapter: Arc<dyn StorageAdapter>) -> Self {
        Self {
            collection,
            adapter,
            validator: None,
            virtuals: Virtuals::new(),
            hooks: Hooks::new(),
        }
    }

    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn virtual_field(mut self, name: impl Into<String>, property: Virtual) -> Self {
        self.virtuals.insert(name, property);
        self
    }

    pub fn hook<F>(mut self, event: HookEvent, callback: F) -> Self
    where
        F: Fn(HookEvent, &Document) -> DocmapResult<()> + Send + Sync + 'static,
    {
        self.hooks.on(event, callback);
        self
    }

    pub fn build(self) -> Mapper {
        let mut binding = RecordBinding::new(self.collection, self.adapter).with_hooks(self.hooks);
        if let Some(validator) = self.validator {
            binding = binding.with_validator(validator);
        }

        Mapper {
            binding: Arc::new(binding),
            virtuals: Arc::new(self.virtuals),
        }
    }
}
