//! Path-addressed access to a record.
//!
//! A [`FieldRef`] names a location inside a [`Record`]. Reads resolve virtuals first, nested
//! documents and arrays come back as further references, and every write or delete is funnelled
//! through the record's change log.
//!
//! ```ignore
//! let mut record = Record::new(doc! { "author": { "name": "Ada" } });
//! let mut author = record.at("author");
//! author.at("name").assign("Grace")?;
//! author.at("email").assign(Bson::Null)?; // absent, nothing logged
//! ```

use bson::Bson;

use super::Record;
use crate::error::{DocmapError, DocmapResult};

/// Result of reading through a [`FieldRef`].
#[derive(Debug)]
pub enum ProxyValue<'r> {
    /// The value computed by a virtual getter (`null` when it yields nothing).
    Virtual(Bson),
    /// A document or array, addressed further by reference.
    Nested(FieldRef<'r>),
    /// A scalar value.
    Value(Bson),
    /// Nothing is stored at the path.
    Missing,
}

/// A reference to one field path of a record.
#[derive(Debug)]
pub struct FieldRef<'r> {
    record: &'r mut Record,
    path: String,
}

impl<'r> FieldRef<'r> {
    pub(crate) fn new(record: &'r mut Record, path: String) -> Self {
        Self { record, path }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// A reference to `child` below this path. Children starting with `[` address array
    /// elements.
    pub fn at(&mut self, child: &str) -> FieldRef<'_> {
        let path = join(&self.path, child);
        FieldRef::new(self.record, path)
    }

    /// Like [`at`](Self::at), consuming this reference.
    pub fn into_at(self, child: &str) -> FieldRef<'r> {
        let path = join(&self.path, child);
        FieldRef::new(self.record, path)
    }

    /// The current value, virtuals included.
    pub fn get(&self) -> Option<Bson> {
        self.record.get(&self.path)
    }

    pub fn read(&mut self) -> ProxyValue<'_> {
        if self.record.virtuals().contains(&self.path) {
            return ProxyValue::Virtual(self.record.get(&self.path).unwrap_or(Bson::Null));
        }

        match self.record.get(&self.path) {
            Some(Bson::Document(_) | Bson::Array(_)) => {
                ProxyValue::Nested(FieldRef::new(self.record, self.path.clone()))
            }
            Some(value) => ProxyValue::Value(value),
            None => ProxyValue::Missing,
        }
    }

    /// Writes through the change log.
    ///
    /// Assigning `null` to a stored field removes it; assigning `null` to an absent field does
    /// nothing. Virtuals always receive the value through their setter.
    pub fn assign(&mut self, value: impl Into<Bson>) -> DocmapResult<()> {
        let value = value.into();

        if value == Bson::Null && !self.record.virtuals().contains(&self.path) {
            if self.record.get(&self.path).is_some() {
                self.record.unset(&self.path)?;
            }
            return Ok(());
        }

        self.record.set(&self.path, value)
    }

    /// Removes the field through the change log.
    ///
    /// # Errors
    ///
    /// [`DocmapError::Immutable`] when nothing is stored at the path or it names a virtual.
    pub fn delete(&mut self) -> DocmapResult<()> {
        if self.record.unset(&self.path)? {
            Ok(())
        } else {
            Err(DocmapError::Immutable(self.path.clone()))
        }
    }
}

fn join(parent: &str, child: &str) -> String {
    if child.starts_with('[') {
        format!("{parent}{child}")
    } else {
        format!("{parent}.{child}")
    }
}
