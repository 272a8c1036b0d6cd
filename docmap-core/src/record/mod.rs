//! Records: a document plus the change log that tracks every mutation made to it.
//!
//! A [`Record`] owns its canonical data. Every write through [`Record::set`] or
//! [`Record::unset`] appends a [`Change`] to an append-only log, which [`Record::revert`] pops
//! and undoes in reverse order, restoring the data exactly. [`Record::commit`] replaces the data
//! with a fresh snapshot and clears the log; saving commits the stored document.
//!
//! ```ignore
//! let mut record = Record::new(doc! { "name": "Ada" });
//! record.set("name", "Grace")?;
//! record.set("address.city", "Paris")?;
//! assert_eq!(record.changes(None).len(), 2);
//!
//! record.revert(Some(1))?;
//! assert_eq!(record.data(), &doc! { "name": "Grace" });
//! ```

mod persist;
mod proxy;
mod virtuals;

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

use crate::{
    backend::{ID_FIELD, REV_FIELD},
    error::{DocmapError, DocmapResult},
    path::{self, FieldPath},
};

pub use persist::RecordBinding;
pub use proxy::{FieldRef, ProxyValue};
pub use virtuals::{Virtual, VirtualGetter, VirtualSetter, Virtuals};

/// Kind of a logged mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Add,
    Replace,
    Remove,
}

/// One entry of a record's change log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub operation: ChangeOp,
    /// Field path or virtual name the change applies to.
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Bson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Bson>,
    #[serde(skip)]
    anchors: Vec<Anchor>,
}

impl PartialEq for Change {
    fn eq(&self, other: &Self) -> bool {
        self.operation == other.operation
            && self.key == other.key
            && self.old == other.old
            && self.new == other.new
    }
}

impl Change {
    fn new(operation: ChangeOp, key: impl Into<String>, old: Option<Bson>, new: Option<Bson>) -> Self {
        Self { operation, key: key.into(), old, new, anchors: Vec::new() }
    }

    fn anchored(mut self, anchors: impl IntoIterator<Item = Anchor>) -> Self {
        self.anchors.extend(anchors);
        self
    }

    /// Top-level keys of the locations this change altered.
    pub(crate) fn anchored_heads(&self) -> impl Iterator<Item = std::borrow::Cow<'_, str>> {
        self.anchors.iter().map(|anchor| anchor.path.head())
    }
}

/// A location a change altered, with what it held before.
///
/// `previous: None` means the location did not exist and is removed on revert. A `position`
/// puts a restored key back at that index of its parent document.
#[derive(Debug, Clone, PartialEq)]
struct Anchor {
    path: FieldPath,
    previous: Option<Bson>,
    position: Option<usize>,
}

impl Anchor {
    fn restore(self, data: &mut Document) -> DocmapResult<()> {
        match (self.previous, self.position) {
            (None, _) => {
                path::unset(data, &self.path);
            }
            (Some(previous), Some(position)) => path::insert_at(data, &self.path, previous, position)?,
            (Some(previous), None) => {
                path::set(data, &self.path, previous)?;
            }
        }
        Ok(())
    }
}

/// Which virtuals [`Record::serialize`] includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializeMode {
    /// The shape handed to validators and adapters; includes virtuals with `persist`.
    Save,
    /// The shape shown to callers; includes virtuals with `display`.
    Display,
}

/// A document with change tracking, virtual properties and an optional storage binding.
///
/// Cloning shares the virtuals and binding and copies the data and change log.
#[derive(Debug, Clone)]
pub struct Record {
    data: Document,
    changes: Vec<Change>,
    virtuals: Arc<Virtuals>,
    binding: Option<Arc<RecordBinding>>,
}

impl Record {
    /// Creates an unbound record with no virtuals.
    pub fn new(data: Document) -> Self {
        Self::with_virtuals(data, Arc::new(Virtuals::new()))
    }

    pub fn with_virtuals(data: Document, virtuals: Arc<Virtuals>) -> Self {
        let mut record = Self {
            data: Document::new(),
            changes: Vec::new(),
            virtuals,
            binding: None,
        };
        record.commit(data);
        record
    }

    pub(crate) fn bound(data: Document, virtuals: Arc<Virtuals>, binding: Arc<RecordBinding>) -> Self {
        let mut record = Self::with_virtuals(data, virtuals);
        record.binding = Some(binding);
        record
    }

    /// Binds the record to a collection and adapter so it can be saved.
    pub fn bind(&mut self, binding: Arc<RecordBinding>) -> &mut Self {
        self.binding = Some(binding);
        self
    }

    pub fn data(&self) -> &Document {
        &self.data
    }

    pub fn id(&self) -> Option<&Bson> {
        self.data.get(ID_FIELD)
    }

    pub fn rev(&self) -> Option<&Bson> {
        self.data.get(REV_FIELD)
    }

    pub fn virtuals(&self) -> &Virtuals {
        &self.virtuals
    }

    /// `true` while there are uncommitted changes.
    pub fn is_dirty(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Reads a field path or a virtual. Malformed paths read as absent.
    pub fn get(&self, path: &str) -> Option<Bson> {
        if let Some(property) = self.virtuals.get(path) {
            return property.get(&self.data);
        }

        let path = FieldPath::parse(path).ok()?;
        path::get(&self.data, &path).cloned()
    }

    /// Writes a value and logs the change.
    ///
    /// Every call is logged, including writes of the value already present. Writes to a virtual
    /// go through its setter: a persisted virtual is logged under its name with old and new values
    /// taken from its getter, a display-only virtual is not logged.
    ///
    /// # Errors
    ///
    /// [`DocmapError::InvalidPath`](crate::error::DocmapError::InvalidPath) for malformed paths or
    /// a named key addressing an array or an index too far past its end, and
    /// [`DocmapError::ReadOnlyVirtual`](crate::error::DocmapError::ReadOnlyVirtual) for virtuals
    /// without a setter. The record is unchanged on error.
    pub fn set(&mut self, path: &str, value: impl Into<Bson>) -> DocmapResult<()> {
        let value = value.into();

        if let Some(property) = self.virtuals.get(path) {
            if !property.is_writable() {
                return Err(DocmapError::ReadOnlyVirtual(path.to_string()));
            }

            if property.is_persisted() {
                let before = self.data.clone();
                let old = property.get(&before);
                property.set(&mut self.data, value);
                let new = property.get(&self.data);
                let operation = if old.is_some() { ChangeOp::Replace } else { ChangeOp::Add };
                let touched = touched_keys(&before, &self.data);
                trace!(virtual_name = path, ?operation, touched = touched.len(), "logged virtual write");
                self.changes.push(Change::new(operation, path, old, new).anchored(touched));
            } else {
                property.set(&mut self.data, value);
            }
            return Ok(());
        }

        let field = FieldPath::parse(path)?;
        let anchor = anchor_for(&self.data, &field);
        let old = path::set(&mut self.data, &field, value.clone())?;
        let operation = if old.is_some() { ChangeOp::Replace } else { ChangeOp::Add };

        trace!(path, ?operation, "logged write");
        self.changes.push(Change {
            operation,
            key: path.to_string(),
            old,
            new: Some(value),
            anchors: anchor.into_iter().collect(),
        });
        Ok(())
    }

    /// Removes a field and logs the removal.
    ///
    /// Returns `false` without logging when the path is a virtual or holds no value.
    pub fn unset(&mut self, path: &str) -> DocmapResult<bool> {
        if self.virtuals.contains(path) {
            return Ok(false);
        }

        let field = FieldPath::parse(path)?;
        let position = path::key_position(&self.data, &field);
        match path::unset(&mut self.data, &field) {
            Some(old) => {
                trace!(path, "logged removal");
                let anchor = position.map(|position| Anchor {
                    path: field,
                    previous: Some(old.clone()),
                    position: Some(position),
                });
                self.changes.push(Change::new(ChangeOp::Remove, path, Some(old), None).anchored(anchor));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// The last `count` changes in chronological order, or all of them.
    pub fn changes(&self, count: Option<usize>) -> &[Change] {
        let start = count.map_or(0, |count| self.changes.len().saturating_sub(count));
        &self.changes[start..]
    }

    /// Undoes the last `count` changes, or all of them, newest first.
    pub fn revert(&mut self, count: Option<usize>) -> DocmapResult<()> {
        let count = count.unwrap_or(self.changes.len()).min(self.changes.len());
        trace!(count, "reverting changes");

        for _ in 0..count {
            let Some(change) = self.changes.pop() else {
                break;
            };
            self.undo(change)?;
        }

        Ok(())
    }

    fn undo(&mut self, change: Change) -> DocmapResult<()> {
        if !change.anchors.is_empty() {
            for anchor in change.anchors {
                anchor.restore(&mut self.data)?;
            }
            return Ok(());
        }

        // a virtual write whose setter changed nothing
        if self.virtuals.contains(&change.key) {
            return Ok(());
        }

        let field = FieldPath::parse(&change.key)?;
        match (change.operation, change.old) {
            (ChangeOp::Add, _) | (_, None) => {
                path::unset(&mut self.data, &field);
            }
            (_, Some(old)) => {
                path::set(&mut self.data, &field, old)?;
            }
        }
        Ok(())
    }

    /// Replaces the data with a fresh snapshot and clears the change log.
    ///
    /// Persisted virtuals with a setter whose name appears in `data` are re-applied through the
    /// setter and their raw key is removed.
    pub fn commit(&mut self, data: Document) {
        self.data = data;

        for (name, property) in self.virtuals.iter() {
            if !property.is_persisted() || !property.is_writable() {
                continue;
            }
            if let Some(value) = self.data.remove(name) {
                property.set(&mut self.data, value);
            }
        }

        self.changes.clear();
    }

    /// The data plus the virtuals selected by `mode`. Virtuals whose getter yields nothing are
    /// left out.
    pub fn serialize(&self, mode: SerializeMode) -> Document {
        let mut out = self.data.clone();

        for (name, property) in self.virtuals.iter() {
            let include = match mode {
                SerializeMode::Save => property.is_persisted(),
                SerializeMode::Display => property.is_displayed(),
            };
            if !include {
                continue;
            }
            if let Some(value) = property.get(&self.data) {
                out.insert(name, value);
            }
        }

        out
    }

    /// Path-addressed accessor for reading and writing through the change log.
    pub fn at(&mut self, path: impl Into<String>) -> FieldRef<'_> {
        FieldRef::new(self, path.into())
    }
}

/// Works out how to undo an `add` at `path` exactly, before it is applied.
fn anchor_for(data: &Document, path: &FieldPath) -> Option<Anchor> {
    let missing = (1..=path.len()).find(|&len| path::get(data, &path.prefix(len)).is_none())?;
    let segment = &path.segments()[missing - 1];

    let parent = match missing {
        1 => None,
        _ => path::get(data, &path.prefix(missing - 1)),
    };

    let grows_cleanly = match parent {
        None => true,
        Some(Bson::Document(_)) => true,
        Some(Bson::Array(items)) => segment.index() == Some(items.len()),
        Some(_) => false,
    };

    if grows_cleanly {
        (missing < path.len()).then(|| Anchor {
            path: path.prefix(missing),
            previous: None,
            position: None,
        })
    } else {
        Some(Anchor {
            path: path.prefix(missing - 1),
            previous: parent.cloned(),
            position: None,
        })
    }
}

/// The top-level keys a virtual setter changed, in the order they must be restored: keys it
/// added first, then the keys it rewrote or removed by ascending position.
fn touched_keys(before: &Document, after: &Document) -> Vec<Anchor> {
    let added = after
        .keys()
        .filter(|key| !before.contains_key(key.as_str()))
        .map(|key| Anchor {
            path: FieldPath::key(key.clone()),
            previous: None,
            position: None,
        });

    let changed = before
        .iter()
        .enumerate()
        .filter(|(_, (key, old))| after.get(key.as_str()) != Some(*old))
        .map(|(position, (key, old))| Anchor {
            path: FieldPath::key(key.clone()),
            previous: Some(old.clone()),
            position: Some(position),
        });

    added.chain(changed).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn full_name() -> Virtual {
        Virtual::new(|doc| {
            let first = doc.get_str("first").ok()?;
            let last = doc.get_str("last").ok()?;
            Some(Bson::String(format!("{first} {last}")))
        })
        .with_setter(|doc, value| {
            if let Bson::String(name) = value {
                let (first, last) = name.split_once(' ').unwrap_or((name.as_str(), ""));
                doc.insert("first", first);
                doc.insert("last", last);
            }
        })
    }

    fn record_with(virtuals: Virtuals, data: Document) -> Record {
        Record::with_virtuals(data, Arc::new(virtuals))
    }

    #[test]
    fn set_logs_add_and_replace() {
        let mut record = Record::new(doc! { "name": "Ada" });
        record.set("name", "Grace").unwrap();
        record.set("age", 36).unwrap();

        assert_eq!(
            record.changes(None),
            &[
                Change::new(ChangeOp::Replace, "name", Some("Ada".into()), Some("Grace".into())),
                Change::new(ChangeOp::Add, "age", None, Some(36.into())),
            ]
        );
    }

    #[test]
    fn set_of_same_value_is_still_logged() {
        let mut record = Record::new(doc! { "name": "Ada" });
        record.set("name", "Ada").unwrap();
        record.set("name", "Ada").unwrap();
        assert_eq!(record.changes(None).len(), 2);
        assert!(record.is_dirty());
    }

    #[test]
    fn changes_returns_most_recent_entries() {
        let mut record = Record::new(Document::new());
        for n in 0..4 {
            record.set("n", n).unwrap();
        }
        let last_two = record.changes(Some(2));
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[1].new, Some(Bson::Int32(3)));
        assert_eq!(record.changes(Some(10)).len(), 4);
    }

    #[test]
    fn unset_reports_presence() {
        let mut record = Record::new(doc! { "name": "Ada" });
        assert!(record.unset("name").unwrap());
        assert!(!record.unset("name").unwrap());
        assert_eq!(
            record.changes(None),
            &[Change::new(ChangeOp::Remove, "name", Some("Ada".into()), None)]
        );
    }

    #[test]
    fn revert_restores_exact_state() {
        let original = doc! {
            "name": "Ada",
            "score": 5,
            "tags": ["a", "b"],
            "meta": { "level": 1 },
        };
        let mut record = Record::new(original.clone());

        record.set("name", "Grace").unwrap();
        record.set("address.city", "Paris").unwrap();
        record.set("score.total", 10).unwrap();
        record.set("tags[4]", "e").unwrap();
        record.set("tags[2].label", "c").unwrap();
        record.set("meta.level", 2).unwrap();
        record.unset("meta.level").unwrap();
        record.unset("tags[0]").unwrap();
        record.set("list[0][1]", true).unwrap();

        record.revert(None).unwrap();
        assert_eq!(record.data(), &original);
        assert!(!record.is_dirty());
    }

    #[test]
    fn partial_revert_undoes_latest_changes() {
        let mut record = Record::new(doc! { "a": 1 });
        record.set("a", 2).unwrap();
        record.set("b", 3).unwrap();
        record.set("a", 4).unwrap();

        record.revert(Some(2)).unwrap();
        assert_eq!(record.data(), &doc! { "a": 2 });
        assert_eq!(record.changes(None).len(), 1);
    }

    #[test]
    fn invalid_paths_are_rejected_without_logging() {
        let mut record = Record::new(doc! { "tags": ["a"] });
        assert!(matches!(record.set("a..b", 1), Err(DocmapError::InvalidPath(..))));
        assert!(matches!(record.set("tags.name", 1), Err(DocmapError::InvalidPath(..))));
        assert!(record.get("a..b").is_none());
        assert!(!record.is_dirty());
    }

    #[test]
    fn display_only_virtual_is_not_logged() {
        let mut virtuals = Virtuals::new();
        virtuals.insert("fullName", full_name());
        let mut record = record_with(virtuals, doc! { "first": "Ada", "last": "Lovelace" });

        record.set("fullName", "Grace Hopper").unwrap();

        assert_eq!(record.data(), &doc! { "first": "Grace", "last": "Hopper" });
        assert!(!record.is_dirty());
        assert!(!record.unset("fullName").unwrap());
    }

    #[test]
    fn persisted_virtual_is_logged_and_reverted_exactly() {
        let mut virtuals = Virtuals::new();
        virtuals.insert("fullName", full_name().persist(true));
        let mut record = record_with(virtuals, doc! { "first": "Ada", "last": "Lovelace" });

        record.set("fullName", "Grace Hopper").unwrap();
        assert_eq!(
            record.changes(None),
            &[Change::new(
                ChangeOp::Replace,
                "fullName",
                Some("Ada Lovelace".into()),
                Some("Grace Hopper".into()),
            )]
        );

        record.revert(None).unwrap();
        assert_eq!(record.get("fullName"), Some(Bson::String("Ada Lovelace".into())));
    }

    #[test]
    fn reverting_a_virtual_add_removes_what_the_setter_wrote() {
        let mut virtuals = Virtuals::new();
        virtuals.insert("fullName", full_name().persist(true));
        let mut record = record_with(virtuals, Document::new());

        record.set("fullName", "Ada Lovelace").unwrap();
        assert_eq!(record.changes(None)[0].operation, ChangeOp::Add);
        assert_eq!(record.data(), &doc! { "first": "Ada", "last": "Lovelace" });

        record.revert(None).unwrap();
        assert_eq!(record.data(), &Document::new());
    }

    #[test]
    fn reverting_a_lossy_virtual_restores_raw_fields() {
        let mut virtuals = Virtuals::new();
        virtuals.insert(
            "label",
            Virtual::new(|doc| doc.get_str("name").ok().map(|name| Bson::String(name.trim().to_string())))
                .with_setter(|doc, value| {
                    doc.remove("draft");
                    doc.insert("name", value);
                })
                .persist(true),
        );
        let original = doc! { "draft": true, "name": "  Ada  ", "tier": 1 };
        let mut record = record_with(virtuals, original.clone());

        record.set("label", "Grace").unwrap();
        assert_eq!(record.data(), &doc! { "name": "Grace", "tier": 1 });

        record.revert(None).unwrap();
        assert_eq!(record.data(), &original);
        assert_eq!(record.data().keys().collect::<Vec<_>>(), ["draft", "name", "tier"]);
    }

    #[test]
    fn revert_keeps_key_order_of_removed_fields() {
        let mut record = Record::new(doc! { "a": 1, "b": 2, "c": 3, "meta": { "x": 1, "y": 2 } });
        record.unset("a").unwrap();
        record.unset("meta.x").unwrap();
        record.unset("b").unwrap();

        record.revert(None).unwrap();
        assert_eq!(record.data().keys().collect::<Vec<_>>(), ["a", "b", "c", "meta"]);
        assert_eq!(record.data().get_document("meta").unwrap().keys().collect::<Vec<_>>(), ["x", "y"]);
    }

    #[test]
    fn far_indices_are_rejected_without_logging() {
        let mut record = Record::new(doc! { "tags": ["a"] });
        for far in ["tags[18446744073709551615]", "tags[4000000000]", "tags.4000000000", "list[20000]"] {
            assert!(matches!(record.set(far, 1), Err(DocmapError::InvalidPath(..))), "{far}");
            assert!(!record.unset(far).unwrap());
        }
        assert_eq!(record.data(), &doc! { "tags": ["a"] });
        assert!(!record.is_dirty());
    }

    #[test]
    fn read_only_virtual_rejects_writes() {
        let mut virtuals = Virtuals::new();
        virtuals.insert(
            "upper",
            Virtual::new(|doc| doc.get_str("name").ok().map(|s| Bson::String(s.to_uppercase()))),
        );
        let mut record = record_with(virtuals, doc! { "name": "ada" });

        assert!(matches!(record.set("upper", "X"), Err(DocmapError::ReadOnlyVirtual(name)) if name == "upper"));
        assert_eq!(record.get("upper"), Some(Bson::String("ADA".into())));
    }

    #[test]
    fn serialize_splits_save_and_display_shapes() {
        let mut virtuals = Virtuals::new();
        virtuals.insert("fullName", full_name().persist(true).display(false));
        virtuals.insert(
            "initial",
            Virtual::new(|doc| doc.get_str("first").ok().map(|s| Bson::String(s[..1].to_string()))),
        );
        let record = record_with(virtuals, doc! { "first": "Ada", "last": "Lovelace" });

        let save = record.serialize(SerializeMode::Save);
        assert_eq!(save.get_str("fullName").unwrap(), "Ada Lovelace");
        assert!(!save.contains_key("initial"));

        let display = record.serialize(SerializeMode::Display);
        assert_eq!(display.get_str("initial").unwrap(), "A");
        assert!(!display.contains_key("fullName"));
    }

    #[test]
    fn commit_applies_persisted_virtuals_and_clears_log() {
        let mut virtuals = Virtuals::new();
        virtuals.insert("fullName", full_name().persist(true));
        let mut record = record_with(virtuals, Document::new());
        record.set("extra", 1).unwrap();

        record.commit(doc! { "id": "u1", "fullName": "Ada Lovelace" });

        assert_eq!(record.data(), &doc! { "id": "u1", "first": "Ada", "last": "Lovelace" });
        assert!(!record.is_dirty());
        assert_eq!(record.id(), Some(&Bson::String("u1".into())));
    }

    #[test]
    fn change_log_serializes_without_absent_values() {
        let change = Change::new(ChangeOp::Add, "age", None, Some(1.into()));
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json, serde_json::json!({ "operation": "add", "key": "age", "new": 1 }));
    }
}
