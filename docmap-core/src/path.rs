//! Dotted/bracketed field paths and the get/set/unset primitives the change tracker builds on.
//!
//! A path such as `author.tags[1].label` parses into key and index segments. The rules are:
//!
//! - reading a missing key or an out-of-range index yields `None`;
//! - writing creates missing intermediate containers (an array when the next segment is an
//!   index, a document otherwise) and overwrites scalar intermediates;
//! - writing past the end of an array extends it with `null` holes, at most
//!   [`MAX_ARRAY_GROWTH`] of them per write;
//! - a numeric key segment (`tags.0`) indexes arrays, a non-numeric key on an array is an error;
//! - unsetting the last array element pops it, unsetting an interior element leaves a `null`
//!   hole so later indices keep their meaning.

use bson::{Bson, Document};
use std::{borrow::Cow, fmt, mem, str::FromStr};

use crate::error::{DocmapError, DocmapResult};

/// How far past the end of an array a single write may reach.
pub const MAX_ARRAY_GROWTH: usize = 10_000;

/// A single step in a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// A document key (`author`).
    Key(String),
    /// An array index (`[2]`).
    Index(usize),
}

impl Segment {
    /// The document key this segment addresses.
    pub fn key(&self) -> Cow<'_, str> {
        match self {
            Segment::Key(key) => Cow::Borrowed(key),
            Segment::Index(index) => Cow::Owned(index.to_string()),
        }
    }

    /// The array index this segment addresses, if it has one.
    pub fn index(&self) -> Option<usize> {
        match self {
            Segment::Key(key) => key.parse().ok(),
            Segment::Index(index) => Some(*index),
        }
    }

    fn empty_container(&self) -> Bson {
        match self {
            Segment::Key(_) => Bson::Document(Document::new()),
            Segment::Index(_) => Bson::Array(Vec::new()),
        }
    }
}

/// A parsed field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    /// Parses `a.b[0].c` style paths.
    ///
    /// # Errors
    ///
    /// Returns [`DocmapError::InvalidPath`] for empty segments, a leading index, an unterminated
    /// bracket or an index that is not a non-negative integer.
    pub fn parse(path: &str) -> DocmapResult<Self> {
        let invalid = |reason: &str| DocmapError::InvalidPath(path.to_string(), reason.to_string());

        if path.is_empty() {
            return Err(invalid("empty path"));
        }

        let mut segments = Vec::new();
        let mut key = String::new();
        let mut after_index = false;
        let mut chars = path.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if key.is_empty() && !after_index {
                        return Err(invalid("empty segment"));
                    }
                    if !key.is_empty() {
                        segments.push(Segment::Key(mem::take(&mut key)));
                    }
                    if matches!(chars.peek(), None | Some('.') | Some('[')) {
                        return Err(invalid("empty segment"));
                    }
                    after_index = false;
                }
                '[' => {
                    if key.is_empty() && !after_index {
                        return Err(invalid("index without a parent field"));
                    }
                    if !key.is_empty() {
                        segments.push(Segment::Key(mem::take(&mut key)));
                    }

                    let mut digits = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(d) => digits.push(d),
                            None => return Err(invalid("unterminated index")),
                        }
                    }

                    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                        return Err(invalid("index must be a non-negative integer"));
                    }
                    let index = digits
                        .parse::<usize>()
                        .map_err(|_| invalid("index out of range"))?;
                    segments.push(Segment::Index(index));

                    if !matches!(chars.peek(), None | Some('.') | Some('[')) {
                        return Err(invalid("expected '.' or '[' after an index"));
                    }
                    after_index = true;
                }
                ']' => return Err(invalid("unexpected ']'")),
                _ => key.push(c),
            }
        }

        if !key.is_empty() {
            segments.push(Segment::Key(key));
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// A single-segment path naming a top-level key verbatim, dots and brackets included.
    pub fn key(name: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment::Key(name.into())],
        }
    }

    /// The top-level document key of this path.
    pub fn head(&self) -> Cow<'_, str> {
        self.segments
            .first()
            .map(Segment::key)
            .unwrap_or(Cow::Borrowed(""))
    }

    /// The path made of the first `len` segments.
    pub fn prefix(&self, len: usize) -> FieldPath {
        FieldPath {
            segments: self.segments[..len.min(self.segments.len())].to_vec(),
        }
    }
}

impl FromStr for FieldPath {
    type Err = DocmapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldPath::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(key) if position == 0 => write!(f, "{key}")?,
                Segment::Key(key) => write!(f, ".{key}")?,
                Segment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

fn child<'a>(value: &'a Bson, segment: &Segment) -> Option<&'a Bson> {
    match value {
        Bson::Document(doc) => doc.get(segment.key().as_ref()),
        Bson::Array(items) => items.get(segment.index()?),
        _ => None,
    }
}

fn child_mut<'a>(value: &'a mut Bson, segment: &Segment) -> Option<&'a mut Bson> {
    match value {
        Bson::Document(doc) => doc.get_mut(segment.key().as_ref()),
        Bson::Array(items) => items.get_mut(segment.index()?),
        _ => None,
    }
}

/// Reads the value at `path`.
pub fn get<'a>(doc: &'a Document, path: &FieldPath) -> Option<&'a Bson> {
    let (first, rest) = path.segments.split_first()?;
    let mut current = doc.get(first.key().as_ref())?;

    for segment in rest {
        current = child(current, segment)?;
    }

    Some(current)
}

fn get_mut<'a>(doc: &'a mut Document, segments: &[Segment]) -> Option<&'a mut Bson> {
    let (first, rest) = segments.split_first()?;
    let mut current = doc.get_mut(first.key().as_ref())?;

    for segment in rest {
        current = child_mut(current, segment)?;
    }

    Some(current)
}

/// Writes `value` at `path`, returning the value it replaced.
///
/// # Errors
///
/// Returns [`DocmapError::InvalidPath`] when a non-numeric key addresses an array or an index
/// lies more than [`MAX_ARRAY_GROWTH`] past the end of its array. `doc` is unchanged on error.
pub fn set(doc: &mut Document, path: &FieldPath, value: Bson) -> DocmapResult<Option<Bson>> {
    let Some((first, rest)) = path.segments.split_first() else {
        return Err(DocmapError::InvalidPath(path.to_string(), "empty path".into()));
    };
    check_growth(doc, path)?;

    let key = first.key().into_owned();
    if rest.is_empty() {
        return Ok(doc.insert(key, value));
    }

    if !doc.contains_key(&key) {
        doc.insert(key.clone(), rest[0].empty_container());
    }

    match doc.get_mut(&key) {
        Some(slot) => set_in(slot, rest, value, path),
        None => Err(DocmapError::InvalidPath(path.to_string(), "unreachable segment".into())),
    }
}

/// Rejects writes that would extend any array on the way by more than [`MAX_ARRAY_GROWTH`].
fn check_growth(doc: &Document, path: &FieldPath) -> DocmapResult<()> {
    for position in 1..path.len() {
        let segment = &path.segments[position];
        let len = match get(doc, &path.prefix(position)) {
            Some(Bson::Array(items)) => items.len(),
            Some(Bson::Document(_)) => continue,
            _ if matches!(segment, Segment::Index(_)) => 0,
            _ => continue,
        };

        if let Some(index) = segment.index() {
            if index.saturating_sub(len) > MAX_ARRAY_GROWTH {
                return Err(DocmapError::InvalidPath(
                    path.to_string(),
                    format!("index {index} is too far past the end of the array"),
                ));
            }
        }
    }
    Ok(())
}

fn set_in(
    target: &mut Bson,
    segments: &[Segment],
    value: Bson,
    path: &FieldPath,
) -> DocmapResult<Option<Bson>> {
    let Some((segment, rest)) = segments.split_first() else {
        return Err(DocmapError::InvalidPath(path.to_string(), "empty path".into()));
    };

    if !matches!(target, Bson::Document(_) | Bson::Array(_)) {
        *target = segment.empty_container();
    }

    let slot = match target {
        Bson::Document(doc) => {
            let key = segment.key().into_owned();
            if rest.is_empty() {
                return Ok(doc.insert(key, value));
            }
            if !doc.contains_key(&key) {
                doc.insert(key.clone(), rest[0].empty_container());
            }
            doc.get_mut(&key)
        }
        Bson::Array(items) => {
            let index = segment.index().ok_or_else(|| {
                DocmapError::InvalidPath(path.to_string(), format!("'{}' does not index an array", segment.key()))
            })?;

            if index >= items.len() {
                let len = index.checked_add(1).ok_or_else(|| {
                    DocmapError::InvalidPath(path.to_string(), "index out of range".into())
                })?;
                items.resize(len, Bson::Null);
                if rest.is_empty() {
                    items[index] = value;
                    return Ok(None);
                }
                items[index] = rest[0].empty_container();
            } else if rest.is_empty() {
                return Ok(Some(mem::replace(&mut items[index], value)));
            }
            items.get_mut(index)
        }
        _ => None,
    };

    match slot {
        Some(slot) => set_in(slot, rest, value, path),
        None => Err(DocmapError::InvalidPath(path.to_string(), "unreachable segment".into())),
    }
}

/// Removes the value at `path`, returning it if one was present.
pub fn unset(doc: &mut Document, path: &FieldPath) -> Option<Bson> {
    let (last, parents) = path.segments.split_last()?;

    if parents.is_empty() {
        return doc.remove(last.key().as_ref());
    }

    match get_mut(doc, parents)? {
        Bson::Document(parent) => parent.remove(last.key().as_ref()),
        Bson::Array(items) => {
            let index = last.index()?;
            if items.len().checked_sub(1) == Some(index) {
                items.pop()
            } else if index < items.len() {
                Some(mem::replace(&mut items[index], Bson::Null))
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Position of the key `path` names within its parent document.
pub fn key_position(doc: &Document, path: &FieldPath) -> Option<usize> {
    let (last, parents) = path.segments.split_last()?;
    let key = last.key();

    if parents.is_empty() {
        return doc.keys().position(|k| *k == key);
    }

    match get(doc, &path.prefix(parents.len()))? {
        Bson::Document(parent) => parent.keys().position(|k| *k == key),
        _ => None,
    }
}

/// Writes `value` at `path` so its key sits at `position` within the parent document.
///
/// Falls back to [`set`] when the parent is not a document.
pub fn insert_at(doc: &mut Document, path: &FieldPath, value: Bson, position: usize) -> DocmapResult<()> {
    let Some((last, parents)) = path.segments.split_last() else {
        return Err(DocmapError::InvalidPath(path.to_string(), "empty path".into()));
    };

    let parent_is_document =
        parents.is_empty() || matches!(get(doc, &path.prefix(parents.len())), Some(Bson::Document(_)));
    if !parent_is_document {
        return set(doc, path, value).map(|_| ());
    }

    let parent = if parents.is_empty() {
        doc
    } else {
        match get_mut(doc, parents) {
            Some(Bson::Document(parent)) => parent,
            _ => return Err(DocmapError::InvalidPath(path.to_string(), "unreachable segment".into())),
        }
    };

    let key = last.key().into_owned();
    parent.remove(&key);
    let mut entries = mem::take(parent).into_iter().collect::<Vec<_>>();
    entries.insert(position.min(entries.len()), (key, value));
    *parent = entries.into_iter().collect();
    Ok(())
}
