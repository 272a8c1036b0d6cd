//! Logical to storage field-name remapping.
//!
//! Records and adapters speak in logical names (`id`, `rev`). ArangoDB-style stores keep the
//! same information under `_key` and `_rev`. A [`FieldMap`] renames the top-level identity and
//! revision fields in both directions and maps field paths used in queries.

use bson::Document;

use docmap_core::backend::{ID_FIELD, REV_FIELD};

/// Storage names for the reserved logical fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMap {
    key: String,
    revision: String,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self::new("_key", "_rev")
    }
}

impl FieldMap {
    pub fn new(key: impl Into<String>, revision: impl Into<String>) -> Self {
        Self { key: key.into(), revision: revision.into() }
    }

    pub fn key_field(&self) -> &str {
        &self.key
    }

    pub fn revision_field(&self) -> &str {
        &self.revision
    }

    /// The storage name of a logical field path. Only the exact reserved names are renamed.
    pub fn storage_name<'a>(&'a self, field: &'a str) -> &'a str {
        match field {
            ID_FIELD => &self.key,
            REV_FIELD => &self.revision,
            other => other,
        }
    }

    /// The logical name of a storage field path.
    pub fn logical_name<'a>(&self, field: &'a str) -> &'a str {
        if field == self.key {
            ID_FIELD
        } else if field == self.revision {
            REV_FIELD
        } else {
            field
        }
    }

    /// Renames the top-level logical fields of `doc` to their storage names, keeping key order.
    pub fn to_storage(&self, doc: Document) -> Document {
        doc.into_iter()
            .map(|(key, value)| (self.storage_name(&key).to_string(), value))
            .collect()
    }

    /// Renames the top-level storage fields of `doc` back to their logical names.
    pub fn to_logical(&self, doc: Document) -> Document {
        doc.into_iter()
            .map(|(key, value)| (self.logical_name(&key).to_string(), value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn renames_reserved_fields_only() {
        let map = FieldMap::default();
        assert_eq!(map.storage_name("id"), "_key");
        assert_eq!(map.storage_name("rev"), "_rev");
        assert_eq!(map.storage_name("author.id"), "author.id");
        assert_eq!(map.logical_name("_key"), "id");
        assert_eq!(map.logical_name("name"), "name");
    }

    #[test]
    fn documents_convert_both_ways() {
        let map = FieldMap::new("key", "version");
        let logical = doc! { "id": "u1", "rev": "r1", "author": { "id": "nested" } };

        let stored = map.to_storage(logical.clone());
        assert_eq!(stored, doc! { "key": "u1", "version": "r1", "author": { "id": "nested" } });
        assert_eq!(map.to_logical(stored), logical);
    }
}
