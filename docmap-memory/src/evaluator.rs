//! Query model evaluation for in-memory document filtering.
//!
//! A document matches a where-tree when every branch matches: an `and` branch needs all of its
//! predicates, an `or` branch any of them. Missing fields compare as `null`. When the stored
//! value is an array, `eq`, `in` and their negations look at its elements.

use bson::{datetime::DateTime, Bson, Document};
use std::{cmp::Ordering, collections::HashMap};

use docmap_core::{
    error::DocmapError,
    path::{self, FieldPath},
    query::{LogicalOp, Operator, Predicate, QueryVisitor, Sort, SortDirection, WhereTree},
};

/// Comparable view of a BSON value. Integers and floats compare as numbers.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(items) => Comparable::Array(items.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(key, value)| (key.as_str(), Comparable::from(value)))
                    .collect(),
            ),
            _ => Comparable::Null,
        }
    }
}

impl Comparable<'_> {
    /// Position in the cross-type sort order: null, bool, number, date, string, array, object.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Bool(_) => 1,
            Comparable::Number(_) => 2,
            Comparable::DateTime(_) => 3,
            Comparable::String(_) => 4,
            Comparable::Array(_) => 5,
            Comparable::Map(_) => 6,
        }
    }

    /// Total order used for sorting.
    fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Array(a), Comparable::Array(b)) => a
                .iter()
                .zip(b)
                .map(|(left, right)| left.sort_cmp(right))
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Comparable::Number(a), Comparable::Number(b)) => a.total_cmp(b),
            _ => self
                .partial_cmp(other)
                .unwrap_or_else(|| self.rank().cmp(&other.rank())),
        }
    }

    /// Equality that also matches an array against one of its elements.
    fn matches(&self, other: &Self) -> bool {
        match self {
            Comparable::Array(items) if !matches!(other, Comparable::Array(_)) => {
                items.iter().any(|item| item == other)
            }
            _ => self == other,
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

fn lookup<'a>(document: &'a Document, field: &str) -> Result<Comparable<'a>, DocmapError> {
    let path = FieldPath::parse(field)?;
    Ok(path::get(document, &path)
        .map(Comparable::from)
        .unwrap_or(Comparable::Null))
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, tree: &WhereTree) -> Result<bool, DocmapError> {
        Ok(self.visit_where(tree)?.into_iter().all(|matched| matched))
    }

    /// Keeps the documents matching `tree`, in their original order.
    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Document>,
        tree: &WhereTree,
    ) -> Result<Vec<Document>, DocmapError> {
        let mut matched = Vec::new();
        for document in documents {
            if DocumentEvaluator::new(document).evaluate(tree)? {
                matched.push(document.clone());
            }
        }
        Ok(matched)
    }
}

impl QueryVisitor for DocumentEvaluator<'_> {
    type Output = bool;
    type Error = DocmapError;

    fn visit_branch(
        &mut self,
        op: LogicalOp,
        predicates: &[Predicate],
        _siblings: usize,
    ) -> Result<Self::Output, Self::Error> {
        for predicate in predicates {
            let matched = self.visit_predicate(predicate)?;
            match op {
                LogicalOp::And if !matched => return Ok(false),
                LogicalOp::Or if matched => return Ok(true),
                _ => {}
            }
        }

        Ok(op == LogicalOp::And)
    }

    fn visit_predicate(&mut self, predicate: &Predicate) -> Result<Self::Output, Self::Error> {
        if predicate.op == Operator::Exists {
            let path = FieldPath::parse(&predicate.field)?;
            let present = path::get(self.document, &path).is_some();
            return Ok(present == matches!(predicate.value, Bson::Boolean(true)));
        }

        let stored = lookup(self.document, &predicate.field)?;
        let operand = Comparable::from(&predicate.value);

        let matched = match predicate.op {
            Operator::Eq => stored.matches(&operand),
            Operator::Ne => !stored.matches(&operand),
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
                match stored.partial_cmp(&operand) {
                    Some(ordering) => match predicate.op {
                        Operator::Gt => ordering.is_gt(),
                        Operator::Gte => ordering.is_ge(),
                        Operator::Lt => ordering.is_lt(),
                        _ => ordering.is_le(),
                    },
                    None => false,
                }
            }
            Operator::In | Operator::Nin => {
                let found = match &operand {
                    Comparable::Array(values) => values.iter().any(|value| stored.matches(value)),
                    single => stored.matches(single),
                };
                found == (predicate.op == Operator::In)
            }
            Operator::Exists => false,
        };

        Ok(matched)
    }
}

/// Orders documents by a sort sequence; earlier keys take priority. The sort is stable.
pub(crate) fn sort_documents(documents: &mut [Document], sort: &[Sort]) -> Result<(), DocmapError> {
    if sort.is_empty() {
        return Ok(());
    }

    let paths = sort
        .iter()
        .map(|key| Ok((FieldPath::parse(&key.field)?, key.direction)))
        .collect::<Result<Vec<_>, DocmapError>>()?;

    documents.sort_by(|a, b| {
        for (path, direction) in &paths {
            let left = path::get(a, path).map(Comparable::from).unwrap_or(Comparable::Null);
            let right = path::get(b, path).map(Comparable::from).unwrap_or(Comparable::Null);
            let ordering = match direction {
                SortDirection::Asc => left.sort_cmp(&right),
                SortDirection::Desc => right.sort_cmp(&left),
            };
            if ordering.is_ne() {
                return ordering;
            }
        }
        Ordering::Equal
    });

    Ok(())
}

/// Keeps only the requested field paths of `document`.
pub(crate) fn project(document: &Document, fields: &[String]) -> Result<Document, DocmapError> {
    let mut projected = Document::new();
    for field in fields {
        let path = FieldPath::parse(field)?;
        if let Some(value) = path::get(document, &path) {
            path::set(&mut projected, &path, value.clone())?;
        }
    }
    Ok(projected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docmap_core::query::QueryModel;

    fn matches(document: &Document, query: &QueryModel) -> bool {
        DocumentEvaluator::new(document).evaluate(&query.filter).unwrap()
    }

    #[test]
    fn and_branch_needs_every_predicate() {
        let doc = doc! { "status": "active", "age": 30 };
        let mut query = QueryModel::new();
        query.where_("status").eq("active").where_("age").gte(30);
        assert!(matches(&doc, &query));

        query.where_("age").lt(30);
        assert!(!matches(&doc, &query));
    }

    #[test]
    fn or_branch_needs_any_predicate() {
        let doc = doc! { "role": "admin", "age": 30 };
        let mut query = QueryModel::new();
        query.where_("role").eq("guest").or("role").unwrap().eq("admin");
        assert!(matches(&doc, &query));

        let mut both = QueryModel::new();
        both.where_("age").gt(40).where_("role").eq("guest").or("role").unwrap().eq("admin");
        assert!(!matches(&doc, &both));
    }

    #[test]
    fn numbers_compare_across_widths() {
        let doc = doc! { "score": 10_i64, "ratio": 0.5 };
        let mut query = QueryModel::new();
        query.where_("score").eq(10).where_("ratio").lt(1);
        assert!(matches(&doc, &query));
    }

    #[test]
    fn membership_and_existence() {
        let doc = doc! { "tags": ["rust", "db"], "kind": "post", "meta": { "draft": null } };

        let mut query = QueryModel::new();
        query
            .where_("tags")
            .eq("rust")
            .where_("kind")
            .in_(["post", "page"])
            .where_("tags")
            .nin(["java"])
            .where_("meta.draft")
            .exists(true)
            .where_("meta.published")
            .exists(false);
        assert!(matches(&doc, &query));
    }

    #[test]
    fn missing_fields_compare_as_null() {
        let doc = doc! { "name": "Ada" };
        let mut query = QueryModel::new();
        query.where_("email").eq(Bson::Null).where_("email").ne("x");
        assert!(matches(&doc, &query));
    }

    #[test]
    fn sorts_by_several_keys_with_nulls_first() {
        let mut docs = vec![
            doc! { "n": 1, "group": "b" },
            doc! { "n": 2, "group": "a" },
            doc! { "n": 3 },
            doc! { "n": 4, "group": "a" },
        ];
        let sort = vec![
            Sort { field: "group".into(), direction: SortDirection::Asc },
            Sort { field: "n".into(), direction: SortDirection::Desc },
        ];
        sort_documents(&mut docs, &sort).unwrap();

        let order = docs.iter().map(|doc| doc.get_i32("n").unwrap()).collect::<Vec<_>>();
        assert_eq!(order, vec![3, 4, 2, 1]);
    }

    #[test]
    fn nan_sorts_after_every_number() {
        let mut docs = vec![
            doc! { "n": 1, "x": 2.0 },
            doc! { "n": 2, "x": f64::NAN },
            doc! { "n": 3, "x": 1 },
            doc! { "n": 4, "x": 0.5 },
            doc! { "n": 5 },
        ];
        sort_documents(&mut docs, &[Sort { field: "x".into(), direction: SortDirection::Asc }]).unwrap();

        let order = docs.iter().map(|doc| doc.get_i32("n").unwrap()).collect::<Vec<_>>();
        assert_eq!(order, vec![5, 4, 3, 1, 2]);
    }

    #[test]
    fn projection_keeps_nested_paths() {
        let doc = doc! { "id": "1", "name": "Ada", "address": { "city": "London", "zip": "N1" } };
        let projected = project(&doc, &["name".to_string(), "address.city".to_string(), "missing".to_string()]).unwrap();
        assert_eq!(projected, doc! { "name": "Ada", "address": { "city": "London" } });
    }
}
