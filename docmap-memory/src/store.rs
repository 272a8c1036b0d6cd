//! In-memory storage adapter.
//!
//! Documents live in per-collection hash maps behind an async-aware read-write lock. Each
//! document remembers its insertion sequence so unsorted queries return documents in the order
//! they were first stored.

use async_trait::async_trait;
use bson::{Bson, Document};
use mea::rwlock::RwLock;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, trace};
use uuid::Uuid;

use docmap_core::{
    backend::{key_string, AdapterBuilder, StorageAdapter, ID_FIELD, REV_FIELD},
    error::{DocmapError, DocmapResult},
    query::QueryModel,
};

use crate::evaluator::{project, sort_documents, DocumentEvaluator};

#[derive(Debug, Clone)]
struct StoredDocument {
    seq: u64,
    body: Document,
}

type CollectionMap = HashMap<String, StoredDocument>;

#[derive(Debug, Default)]
struct State {
    collections: HashMap<String, CollectionMap>,
    next_seq: u64,
}

impl State {
    fn collection(&self, name: &str) -> Option<&CollectionMap> {
        self.collections.get(name)
    }

    fn stored_mut(&mut self, collection: &str, id: &str) -> DocmapResult<&mut StoredDocument> {
        self.collections
            .get_mut(collection)
            .and_then(|documents| documents.get_mut(id))
            .ok_or_else(|| DocmapError::NotFound(id.to_string(), collection.to_string()))
    }

    /// Assigns an id (when missing) and a fresh revision, and returns the document's key.
    fn prepare_new(data: &mut Document) -> String {
        let id = match data.get(ID_FIELD) {
            Some(id) => key_string(id),
            None => {
                let id = new_token();
                data.insert(ID_FIELD, id.clone());
                id
            }
        };
        data.insert(REV_FIELD, new_token());
        id
    }

    fn store(&mut self, collection: &str, id: String, body: Document) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, StoredDocument { seq, body });
    }
}

fn new_token() -> String {
    Uuid::new_v4().to_string()
}

/// Fails when `incoming` carries a revision that differs from the stored one.
fn check_revision(stored: &Document, incoming: &Document) -> DocmapResult<()> {
    let Some(expected) = incoming.get(REV_FIELD).map(key_string) else {
        return Ok(());
    };
    let actual = stored.get(REV_FIELD).map(key_string).unwrap_or_default();

    if expected == actual {
        Ok(())
    } else {
        Err(DocmapError::RevisionMismatch { expected, actual })
    }
}

/// Thread-safe in-memory storage adapter.
///
/// Ids are kept when supplied and generated as UUIDs otherwise; every write assigns a new UUID
/// revision token. Updates and replacements that carry a `rev` must match the stored one.
///
/// # Thread Safety
///
/// `MemoryAdapter` is cloneable and uses an `Arc`-wrapped internal state, so clones share the
/// same documents and can be used from several tasks.
///
/// # Performance
///
/// Queries scan every document of a collection; there are no indexes.
///
/// # Example
///
/// ```ignore
/// use docmap_memory::MemoryAdapter;
/// use docmap_core::backend::StorageAdapter;
/// use bson::doc;
///
/// let adapter = MemoryAdapter::new();
/// let saved = adapter.insert("users", doc! { "name": "Alice" }).await?;
/// assert!(saved.contains_key("id") && saved.contains_key("rev"));
/// ```
#[derive(Default, Clone, Debug)]
pub struct MemoryAdapter {
    state: Arc<RwLock<State>>,
}

impl MemoryAdapter {
    /// Creates a new empty adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder that can seed collections before the adapter is used.
    pub fn builder() -> MemoryAdapterBuilder {
        MemoryAdapterBuilder::default()
    }

    /// Number of documents stored in `collection`.
    pub async fn count(&self, collection: &str) -> usize {
        self.state
            .read()
            .await
            .collection(collection)
            .map_or(0, HashMap::len)
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    async fn get(&self, collection: &str, id: &str) -> DocmapResult<Document> {
        let state = self.state.read().await;
        state
            .collection(collection)
            .and_then(|documents| documents.get(id))
            .map(|stored| stored.body.clone())
            .ok_or_else(|| DocmapError::NotFound(id.to_string(), collection.to_string()))
    }

    async fn find_all(&self, collection: &str, query: &QueryModel) -> DocmapResult<Vec<Document>> {
        let state = self.state.read().await;
        let Some(documents) = state.collection(collection) else {
            return Ok(Vec::new());
        };

        let mut ordered = documents.values().collect::<Vec<_>>();
        ordered.sort_by_key(|stored| stored.seq);

        let mut matched = DocumentEvaluator::filter_documents(
            ordered.into_iter().map(|stored| &stored.body),
            &query.filter,
        )?;
        sort_documents(&mut matched, &query.sort)?;

        let take = match query.limit {
            0 => usize::MAX,
            limit => limit,
        };
        let page = matched.into_iter().skip(query.skip).take(take);

        let results = if query.fields.is_empty() {
            page.collect::<Vec<_>>()
        } else {
            page.map(|document| project(&document, &query.fields))
                .collect::<DocmapResult<Vec<_>>>()?
        };

        trace!(collection, count = results.len(), "evaluated query");
        Ok(results)
    }

    async fn insert(&self, collection: &str, mut data: Document) -> DocmapResult<Document> {
        let mut state = self.state.write().await;
        let id = State::prepare_new(&mut data);

        if state
            .collection(collection)
            .is_some_and(|documents| documents.contains_key(&id))
        {
            return Err(DocmapError::AlreadyExists(id, collection.to_string()));
        }

        debug!(collection, %id, "inserting document");
        state.store(collection, id, data.clone());
        Ok(data)
    }

    async fn update(&self, collection: &str, id: &str, patch: Document) -> DocmapResult<Document> {
        let mut state = self.state.write().await;
        let stored = state.stored_mut(collection, id)?;
        check_revision(&stored.body, &patch)?;

        for (key, value) in patch {
            if key != ID_FIELD && key != REV_FIELD {
                stored.body.insert(key, value);
            }
        }
        stored.body.insert(REV_FIELD, new_token());

        debug!(collection, id, "updated document");
        Ok(stored.body.clone())
    }

    async fn replace(&self, collection: &str, id: &str, mut data: Document) -> DocmapResult<Document> {
        let mut state = self.state.write().await;
        let stored = state.stored_mut(collection, id)?;
        check_revision(&stored.body, &data)?;

        let stored_id = stored
            .body
            .get(ID_FIELD)
            .cloned()
            .unwrap_or_else(|| Bson::String(id.to_string()));
        data.insert(ID_FIELD, stored_id);
        data.insert(REV_FIELD, new_token());
        stored.body = data;

        debug!(collection, id, "replaced document");
        Ok(stored.body.clone())
    }

    async fn remove(&self, collection: &str, id: &str) -> DocmapResult<Document> {
        let mut state = self.state.write().await;
        let removed = state
            .collections
            .get_mut(collection)
            .and_then(|documents| documents.remove(id))
            .ok_or_else(|| DocmapError::NotFound(id.to_string(), collection.to_string()))?;

        debug!(collection, id, "removed document");
        Ok(removed.body)
    }

    async fn insert_all(&self, collection: &str, data: Vec<Document>) -> DocmapResult<Vec<Document>> {
        let mut state = self.state.write().await;

        let mut prepared = Vec::with_capacity(data.len());
        for mut document in data {
            let id = State::prepare_new(&mut document);
            let taken = state
                .collection(collection)
                .is_some_and(|documents| documents.contains_key(&id))
                || prepared.iter().any(|(other, _): &(String, Document)| *other == id);
            if taken {
                return Err(DocmapError::AlreadyExists(id, collection.to_string()));
            }
            prepared.push((id, document));
        }

        debug!(collection, count = prepared.len(), "inserting documents");
        let mut saved = Vec::with_capacity(prepared.len());
        for (id, document) in prepared {
            state.store(collection, id, document.clone());
            saved.push(document);
        }

        Ok(saved)
    }
}

/// Builder for constructing [`MemoryAdapter`] instances.
///
/// # Example
///
/// ```ignore
/// use docmap_memory::MemoryAdapter;
/// use docmap_core::backend::AdapterBuilder;
///
/// let adapter = MemoryAdapter::builder()
///     .seed("users", vec![doc! { "id": "u1", "name": "Alice" }])
///     .build()
///     .await?;
/// ```
#[derive(Debug, Default)]
pub struct MemoryAdapterBuilder {
    seeds: Vec<(String, Vec<Document>)>,
}

impl MemoryAdapterBuilder {
    /// Documents to insert into `collection` when the adapter is built.
    pub fn seed(mut self, collection: impl Into<String>, documents: impl IntoIterator<Item = Document>) -> Self {
        self.seeds.push((collection.into(), documents.into_iter().collect()));
        self
    }
}

#[async_trait]
impl AdapterBuilder for MemoryAdapterBuilder {
    type Adapter = MemoryAdapter;

    /// Builds the adapter and inserts the seeded documents.
    ///
    /// Fails with [`DocmapError::AlreadyExists`] when seeds repeat an id.
    async fn build(self) -> DocmapResult<Self::Adapter> {
        let adapter = MemoryAdapter::new();
        for (collection, documents) in self.seeds {
            adapter.insert_all(&collection, documents).await?;
        }
        Ok(adapter)
    }
}
