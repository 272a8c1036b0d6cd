//! Declarative filter-object front-end for [`QueryModel`].
//!
//! The wire shape is
//!
//! ```text
//! { $limit?, $skip?, $sort?: [[field, dir], ...], $fields?: [field, ...],
//!   $where?: { $and?: [group, ...], $or?: [group, ...] } }
//! ```
//!
//! where a group maps field paths to either a bare value (implicit `$eq`) or an operator object.
//! Nested objects without operators extend the field path, so `{author: {name: "Ada"}}` is the
//! same predicate as `{"author.name": {$eq: "Ada"}}`.

use bson::{Bson, Document, ser::serialize_to_bson};
use serde_json::Value;
use tracing::{debug, warn};

use super::{LogicalOp, Operator, QueryModel, SortDirection, Sort};
use crate::error::{DocmapResult, QueryError};

const WHERE_KEY: &str = "$where";
/// Root key used by older filter objects; read when `$where` is absent.
const LEGACY_WHERE_KEY: &str = "$query";

impl QueryModel {
    /// Parses a filter object.
    ///
    /// # Errors
    ///
    /// [`QueryError::Parse`] for unrecognized `$` keys or malformed operands,
    /// [`QueryError::InvalidSortOrder`] for a zero sort direction.
    pub fn from_filter(filter: &Document) -> Result<Self, QueryError> {
        let mut model = QueryModel::new();

        for (key, value) in filter {
            match key.as_str() {
                "$limit" => model.limit = parse_count(key, value)?,
                "$skip" => model.skip = parse_count(key, value)?,
                "$sort" => parse_sort(&mut model, value)?,
                "$fields" => {
                    let mut names = Vec::new();
                    collect_fields(value, &mut names)?;
                    model.fields(names);
                }
                WHERE_KEY | LEGACY_WHERE_KEY => {}
                other => {
                    return Err(QueryError::Parse(format!("unrecognized filter key '{other}'")));
                }
            }
        }

        let tree = match (filter.get(WHERE_KEY), filter.get(LEGACY_WHERE_KEY)) {
            (Some(tree), legacy) => {
                if legacy.is_some() {
                    warn!("filter has both {WHERE_KEY} and {LEGACY_WHERE_KEY}; ignoring {LEGACY_WHERE_KEY}");
                }
                Some(tree)
            }
            (None, Some(tree)) => {
                debug!("reading legacy {LEGACY_WHERE_KEY} filter root");
                Some(tree)
            }
            (None, None) => None,
        };

        if let Some(tree) = tree {
            let group = tree
                .as_document()
                .ok_or_else(|| QueryError::Parse(format!("{WHERE_KEY} must be an object")))?;
            walk(&mut model, group, "", LogicalOp::And)?;
        }

        Ok(model)
    }

    /// Serializes the model back into a filter object.
    ///
    /// Every predicate is written in explicit `{field: {$op: value}}` form; empty parts are
    /// omitted. Parsing the result yields an equal model.
    pub fn to_filter(&self) -> Document {
        let mut out = Document::new();

        if !self.filter.is_empty() {
            let mut tree = Document::new();
            for branch in self.filter.branches() {
                let groups = branch
                    .predicates
                    .iter()
                    .map(|predicate| {
                        let mut operand = Document::new();
                        operand.insert(predicate.op.key(), predicate.value.clone());
                        let mut group = Document::new();
                        group.insert(predicate.field.clone(), operand);
                        Bson::Document(group)
                    })
                    .collect::<Vec<_>>();
                tree.insert(branch.op.key(), Bson::Array(groups));
            }
            out.insert(WHERE_KEY, tree);
        }

        if !self.sort.is_empty() {
            let sort = self
                .sort
                .iter()
                .map(|sort| {
                    Bson::Array(vec![
                        Bson::String(sort.field.clone()),
                        Bson::Int32(sort.direction.value()),
                    ])
                })
                .collect::<Vec<_>>();
            out.insert("$sort", Bson::Array(sort));
        }

        if !self.fields.is_empty() {
            out.insert("$fields", self.fields.clone());
        }

        if self.limit > 0 {
            out.insert("$limit", count(self.limit));
        }

        if self.skip > 0 {
            out.insert("$skip", count(self.skip));
        }

        out
    }

    /// Parses a filter object given as JSON.
    pub fn from_json(value: &Value) -> DocmapResult<Self> {
        match serialize_to_bson(value)? {
            Bson::Document(filter) => Ok(Self::from_filter(&filter)?),
            other => Err(QueryError::Parse(format!("filter must be an object, got {other}")).into()),
        }
    }

    /// Serializes the model into a JSON filter object.
    pub fn to_json(&self) -> DocmapResult<Value> {
        Ok(serde_json::to_value(Bson::Document(self.to_filter()))?)
    }
}

fn walk(
    model: &mut QueryModel,
    group: &Document,
    prefix: &str,
    branch: LogicalOp,
) -> Result<(), QueryError> {
    for (key, value) in group {
        if let Some(logical) = LogicalOp::from_key(key) {
            let groups = value
                .as_array()
                .ok_or_else(|| QueryError::Parse(format!("{key} expects an array of groups")))?;
            for nested in groups {
                let nested = nested
                    .as_document()
                    .ok_or_else(|| QueryError::Parse(format!("{key} groups must be objects")))?;
                walk(model, nested, prefix, logical)?;
            }
        } else if let Some(op) = Operator::from_key(key) {
            if prefix.is_empty() {
                return Err(QueryError::Parse(format!("operator {key} has no field")));
            }
            let operand = op.operand(value.clone())?;
            model.push_predicate(branch, prefix.to_string(), op, operand);
        } else if key.starts_with('$') {
            return Err(QueryError::Parse(format!("unrecognized operator '{key}'")));
        } else {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };

            match value {
                Bson::Document(nested) if !nested.is_empty() => walk(model, nested, &path, branch)?,
                other => model.push_predicate(branch, path, Operator::Eq, other.clone()),
            }
        }
    }

    Ok(())
}

fn as_integer(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
        _ => None,
    }
}

/// Saturates at `i64::MAX`.
fn count(n: usize) -> Bson {
    Bson::Int64(i64::try_from(n).unwrap_or(i64::MAX))
}

fn parse_count(key: &str, value: &Bson) -> Result<usize, QueryError> {
    as_integer(value)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| QueryError::Parse(format!("{key} must be a non-negative integer, got {value}")))
}

fn parse_sort(model: &mut QueryModel, value: &Bson) -> Result<(), QueryError> {
    let mut specs = Vec::new();

    match value {
        Bson::Array(entries) => {
            for entry in entries {
                let pair = entry
                    .as_array()
                    .filter(|pair| pair.len() == 2)
                    .ok_or_else(|| QueryError::Parse("$sort entries must be [field, direction]".into()))?;
                let field = pair[0]
                    .as_str()
                    .ok_or_else(|| QueryError::Parse("$sort field must be a string".into()))?;
                specs.push((field.to_string(), &pair[1]));
            }
        }
        Bson::Document(entries) => {
            for (field, direction) in entries {
                specs.push((field.clone(), direction));
            }
        }
        other => {
            return Err(QueryError::Parse(format!("$sort must be an array or object, got {other}")));
        }
    }

    for (field, direction) in specs {
        let direction = as_integer(direction)
            .ok_or_else(|| QueryError::Parse(format!("sort direction must be an integer, got {direction}")))?;
        model.sort.push(Sort { field, direction: SortDirection::try_from(direction)? });
    }

    Ok(())
}

fn collect_fields(value: &Bson, names: &mut Vec<String>) -> Result<(), QueryError> {
    match value {
        Bson::String(name) => names.push(name.clone()),
        Bson::Array(items) => {
            for item in items {
                collect_fields(item, names)?;
            }
        }
        other => return Err(QueryError::Parse(format!("$fields entries must be strings, got {other}"))),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Predicate, SortDirection, MAX_COUNT};
    use bson::doc;
    use serde_json::json;

    #[test]
    fn parses_explicit_and_implicit_predicates() {
        let parsed = QueryModel::from_filter(&doc! {
            "$where": {
                "$and": [
                    { "status": "active" },
                    { "age": { "$gte": 18, "$lt": 65 } },
                ],
                "$or": [
                    { "role": { "$in": ["admin", "owner"] } },
                    { "deleted": { "$exists": false } },
                ],
            },
            "$limit": 10,
            "$skip": 5,
            "$sort": [["name", 1], ["age", -1]],
            "$fields": ["name", ["age", "name"]],
        })
        .unwrap();

        let mut built = QueryModel::new();
        built
            .where_("status")
            .eq("active")
            .where_("age")
            .gte(18)
            .where_("age")
            .lt(65)
            .where_("role")
            .in_(["admin", "owner"])
            .or("deleted")
            .unwrap()
            .exists(false)
            .limit(10)
            .skip(5)
            .sort("name", 1)
            .unwrap()
            .sort("age", -1)
            .unwrap()
            .fields(["name", "age"]);

        assert_eq!(parsed, built);
    }

    #[test]
    fn nested_objects_expand_to_dotted_paths() {
        let parsed = QueryModel::from_filter(&doc! {
            "$where": { "author": { "name": "Ada", "born": { "$gt": 1800 } } },
        })
        .unwrap();

        let predicates = &parsed.filter.branch(LogicalOp::And).unwrap().predicates;
        assert_eq!(
            predicates,
            &vec![
                Predicate { field: "author.name".into(), op: Operator::Eq, value: "Ada".into() },
                Predicate { field: "author.born".into(), op: Operator::Gt, value: 1800.into() },
            ]
        );
    }

    #[test]
    fn nested_logical_groups_switch_branch() {
        let parsed = QueryModel::from_filter(&doc! {
            "$where": { "$or": [ { "a": 1 }, { "$and": [ { "b": 2 } ] } ] },
        })
        .unwrap();
        assert_eq!(parsed.filter.branch(LogicalOp::Or).unwrap().predicates.len(), 1);
        assert_eq!(parsed.filter.branch(LogicalOp::And).unwrap().predicates[0].field, "b");
    }

    #[test]
    fn unknown_operator_is_a_parse_error() {
        let err = QueryModel::from_filter(&doc! { "$where": { "a": { "$regex": "x" } } }).unwrap_err();
        assert!(matches!(err, QueryError::Parse(_)));

        let err = QueryModel::from_filter(&doc! { "$where": { "$nor": [] } }).unwrap_err();
        assert!(matches!(err, QueryError::Parse(_)));

        let err = QueryModel::from_filter(&doc! { "$order": 1 }).unwrap_err();
        assert!(matches!(err, QueryError::Parse(_)));
    }

    #[test]
    fn malformed_operands_are_rejected() {
        assert!(QueryModel::from_filter(&doc! { "$limit": -1 }).is_err());
        assert!(QueryModel::from_filter(&doc! { "$where": { "a": { "$exists": 1 } } }).is_err());
        assert_eq!(
            QueryModel::from_filter(&doc! { "$sort": [["a", 0]] }).unwrap_err(),
            QueryError::InvalidSortOrder
        );
    }

    #[test]
    fn legacy_query_root_is_accepted() {
        let legacy = QueryModel::from_filter(&doc! { "$query": { "a": 1 } }).unwrap();
        let current = QueryModel::from_filter(&doc! { "$where": { "a": 1 } }).unwrap();
        assert_eq!(legacy, current);

        let both = QueryModel::from_filter(&doc! { "$where": { "a": 1 }, "$query": { "b": 2 } }).unwrap();
        assert_eq!(both, current);
    }

    #[test]
    fn sort_accepts_object_form() {
        let parsed = QueryModel::from_filter(&doc! { "$sort": { "a": 1, "b": -1 } }).unwrap();
        assert_eq!(parsed.sort[1].direction, SortDirection::Desc);
    }

    #[test]
    fn to_filter_round_trips() {
        let mut built = QueryModel::new();
        built
            .where_("a")
            .eq(1)
            .or("b")
            .unwrap()
            .ne("x")
            .where_("c")
            .nin([1, 2])
            .sort_desc("c")
            .limit(3);

        let serialized = built.to_filter();
        assert_eq!(
            serialized,
            doc! {
                "$where": {
                    "$or": [ { "a": { "$eq": 1 } }, { "b": { "$ne": "x" } } ],
                    "$and": [ { "c": { "$nin": [1, 2] } } ],
                },
                "$sort": [["c", -1]],
                "$limit": 3_i64,
            }
        );
        assert_eq!(QueryModel::from_filter(&serialized).unwrap(), built);
    }

    #[test]
    fn json_round_trip() {
        let parsed = QueryModel::from_json(&json!({
            "$where": { "status": "active" },
            "$limit": 2,
        }))
        .unwrap();
        assert_eq!(parsed.limit, 2);

        let json = parsed.to_json().unwrap();
        assert_eq!(json["$where"]["$and"][0]["status"]["$eq"], json!("active"));
        assert_eq!(QueryModel::from_json(&json).unwrap(), parsed);
    }

    #[test]
    fn oversized_counts_saturate_and_round_trip() {
        let mut built = QueryModel::new();
        built.limit(usize::MAX).skip(usize::MAX);
        assert_eq!(built.limit, MAX_COUNT);

        let filter = built.to_filter();
        assert_eq!(filter.get("$limit"), Some(&Bson::Int64(i64::MAX)));
        assert_eq!(filter.get("$skip"), Some(&Bson::Int64(i64::MAX)));
        assert_eq!(QueryModel::from_filter(&filter).unwrap(), built);

        let mut direct = QueryModel::new();
        direct.limit = usize::MAX;
        assert_eq!(direct.to_filter().get("$limit"), Some(&Bson::Int64(i64::MAX)));
    }
}
