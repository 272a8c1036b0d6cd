use bson::{Bson, Document};
use std::{borrow::Cow, fmt, sync::Arc};
use tracing::debug;

use super::{Record, SerializeMode};
use crate::{
    backend::{key_string, StorageAdapter, REV_FIELD},
    error::{DocmapError, DocmapResult},
    hooks::{HookEvent, Hooks},
    path::FieldPath,
    validate::Validator,
};

/// What a record needs to validate and persist itself: the collection it belongs to, the adapter
/// that stores it, an optional validator and the hooks to fire.
pub struct RecordBinding {
    collection: String,
    adapter: Arc<dyn StorageAdapter>,
    validator: Option<Arc<dyn Validator>>,
    hooks: Hooks,
}

impl RecordBinding {
    pub fn new(collection: impl Into<String>, adapter: Arc<dyn StorageAdapter>) -> Self {
        Self {
            collection: collection.into(),
            adapter,
            validator: None,
            hooks: Hooks::new(),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn adapter(&self) -> &Arc<dyn StorageAdapter> {
        &self.adapter
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Fires the validate hooks around the validator.
    pub(crate) async fn run_validation(&self, shape: &Document) -> DocmapResult<()> {
        self.hooks.emit(HookEvent::BeforeValidate, shape)?;
        if let Some(validator) = &self.validator {
            validator.validate(shape).await?;
        }
        self.hooks.emit(HookEvent::AfterValidate, shape)
    }
}

impl fmt::Debug for RecordBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordBinding")
            .field("collection", &self.collection)
            .field("adapter", &self.adapter)
            .field("validator", &self.validator.is_some())
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl Record {
    fn binding(&self) -> DocmapResult<Arc<RecordBinding>> {
        self.binding
            .clone()
            .ok_or_else(|| DocmapError::Unbound("record is not bound to a collection".into()))
    }

    fn stored_id(&self) -> DocmapResult<String> {
        self.id()
            .map(key_string)
            .ok_or_else(|| DocmapError::Unbound("record has not been stored".into()))
    }

    /// Runs the bound validator against the save shape. Unbound records always pass.
    ///
    /// # Errors
    ///
    /// The [`ValidationError`](crate::error::ValidationError) reported by the validator, or the
    /// error of a hook that aborted.
    pub async fn validate(&self) -> DocmapResult<()> {
        match &self.binding {
            Some(binding) => binding.run_validation(&self.serialize(SerializeMode::Save)).await,
            None => Ok(()),
        }
    }

    /// Persists the record and commits the stored document.
    ///
    /// A stored record (one with both `id` and `rev`) without pending changes is not written: its
    /// stored copy is fetched and, when the revisions differ, committed in place. Otherwise the
    /// record is validated and inserted (no `rev` yet) or updated. Updates send only the
    /// top-level fields touched by the change log plus `rev` (for a persisted virtual, its name and
    /// every field its setter wrote), unless a touched field no longer exists, in which case the
    /// whole save shape replaces the stored document.
    ///
    /// The stored document is committed before the after-insert and after-update hooks fire. An
    /// error from one of them is returned, but the write and the commit stand. On any earlier
    /// error the data and change log are left as they were.
    pub async fn save(&mut self) -> DocmapResult<()> {
        let binding = self.binding()?;
        let collection = binding.collection();
        let adapter = binding.adapter();

        let clean = (!self.is_dirty()).then(|| (self.id().map(key_string), self.rev().map(key_string)));
        if let Some((Some(id), Some(rev))) = clean {
            let stored = adapter.get(collection, &id).await?;
            let stored_rev = stored.get(REV_FIELD).map(key_string);

            if stored_rev.as_deref() == Some(rev.as_str()) {
                debug!(collection, %id, "record unchanged, skipping write");
            } else {
                debug!(collection, %id, ?stored_rev, "stored revision moved, refreshing record");
                self.commit(stored);
            }
            return Ok(());
        }

        let shape = self.serialize(SerializeMode::Save);
        binding.run_validation(&shape).await?;

        let (saved, after) = match self.rev() {
            None => {
                binding.hooks.emit(HookEvent::BeforeInsert, &shape)?;
                debug!(collection, "inserting record");
                (adapter.insert(collection, shape).await?, HookEvent::AfterInsert)
            }
            Some(rev) => {
                let id = self.stored_id()?;
                let write = self.update_patch(&shape, rev.clone());

                binding.hooks.emit(HookEvent::BeforeUpdate, write.document())?;
                let saved = match write {
                    Write::Patch(patch) => {
                        debug!(collection, %id, fields = patch.len(), "updating record");
                        adapter.update(collection, &id, patch).await?
                    }
                    Write::Replace(full) => {
                        debug!(collection, %id, "replacing record");
                        adapter.replace(collection, &id, full).await?
                    }
                };
                (saved, HookEvent::AfterUpdate)
            }
        };

        self.commit(saved.clone());
        binding.hooks.emit(after, &saved)
    }

    /// Builds the update for the current change log.
    fn update_patch(&self, shape: &Document, rev: Bson) -> Write {
        let mut patch = Document::new();

        for change in &self.changes {
            let head = match FieldPath::parse(&change.key) {
                Ok(path) => path.head().into_owned(),
                Err(_) => change.key.clone(),
            };
            let heads = std::iter::once(head).chain(change.anchored_heads().map(Cow::into_owned));

            for head in heads {
                if patch.contains_key(&head) {
                    continue;
                }
                let Some(value) = shape.get(&head) else {
                    return Write::Replace(shape.clone());
                };
                patch.insert(head, value.clone());
            }
        }

        patch.insert(REV_FIELD, rev);
        Write::Patch(patch)
    }

    /// Replaces the data with the stored copy, discarding pending changes.
    pub async fn reload(&mut self) -> DocmapResult<()> {
        let binding = self.binding()?;
        let id = self.stored_id()?;

        let stored = binding.adapter().get(binding.collection(), &id).await?;
        binding.hooks.emit(HookEvent::AfterGet, &stored)?;
        self.commit(stored);
        Ok(())
    }

    /// Deletes the stored document. The in-memory data is kept.
    pub async fn remove(&mut self) -> DocmapResult<()> {
        let binding = self.binding()?;
        let id = self.stored_id()?;

        binding.hooks.emit(HookEvent::BeforeRemove, &self.data)?;
        let removed = binding.adapter().remove(binding.collection(), &id).await?;
        binding.hooks.emit(HookEvent::AfterRemove, &removed)?;
        Ok(())
    }
}

enum Write {
    Patch(Document),
    Replace(Document),
}

impl Write {
    fn document(&self) -> &Document {
        match self {
            Write::Patch(doc) | Write::Replace(doc) => doc,
        }
    }
}
