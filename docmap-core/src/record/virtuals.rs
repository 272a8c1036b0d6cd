//! Computed properties attached to records.

use bson::{Bson, Document};
use std::{fmt, sync::Arc};

pub type VirtualGetter = Arc<dyn Fn(&Document) -> Option<Bson> + Send + Sync>;
pub type VirtualSetter = Arc<dyn Fn(&mut Document, Bson) + Send + Sync>;

/// A computed property.
///
/// The getter derives a value from the record data; the optional setter writes a value back
/// into it. `persist` controls whether the value is part of the save shape and whether writes are
/// logged as changes; `display` controls whether it is part of the display shape.
///
/// ```ignore
/// let full_name = Virtual::new(|doc| {
///     let first = doc.get_str("first").ok()?;
///     let last = doc.get_str("last").ok()?;
///     Some(Bson::String(format!("{first} {last}")))
/// })
/// .with_setter(|doc, value| {
///     if let Bson::String(name) = value {
///         let (first, last) = name.split_once(' ').unwrap_or((&name, ""));
///         doc.insert("first", first);
///         doc.insert("last", last);
///     }
/// });
/// ```
#[derive(Clone)]
pub struct Virtual {
    get: VirtualGetter,
    set: Option<VirtualSetter>,
    persist: bool,
    display: bool,
}

impl Virtual {
    /// Creates a read-only virtual that is displayed but not persisted.
    pub fn new<G>(get: G) -> Self
    where
        G: Fn(&Document) -> Option<Bson> + Send + Sync + 'static,
    {
        Self { get: Arc::new(get), set: None, persist: false, display: true }
    }

    pub fn with_setter<S>(mut self, set: S) -> Self
    where
        S: Fn(&mut Document, Bson) + Send + Sync + 'static,
    {
        self.set = Some(Arc::new(set));
        self
    }

    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub fn display(mut self, display: bool) -> Self {
        self.display = display;
        self
    }

    pub fn is_persisted(&self) -> bool {
        self.persist
    }

    pub fn is_displayed(&self) -> bool {
        self.display
    }

    pub fn is_writable(&self) -> bool {
        self.set.is_some()
    }

    pub(crate) fn get(&self, data: &Document) -> Option<Bson> {
        (self.get)(data)
    }

    /// Calls the setter; returns `false` when there is none.
    pub(crate) fn set(&self, data: &mut Document, value: Bson) -> bool {
        match &self.set {
            Some(set) => {
                set(data, value);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Virtual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Virtual")
            .field("writable", &self.set.is_some())
            .field("persist", &self.persist)
            .field("display", &self.display)
            .finish()
    }
}

/// Named virtuals in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Virtuals {
    entries: Vec<(String, Virtual)>,
}

impl Virtuals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the virtual called `name`.
    pub fn insert(&mut self, name: impl Into<String>, property: Virtual) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = property,
            None => self.entries.push((name, property)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Virtual> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, property)| property)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Virtual)> {
        self.entries.iter().map(|(name, property)| (name.as_str(), property))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
