//! Query translation from the docmap query model to AQL.
//!
//! The rendered query always has the same clause order:
//!
//! ```text
//! FOR doc IN <collection>
//! FILTER <branches>            (when there are predicates)
//! SORT doc.a, doc.b DESC       (when there are sort keys)
//! LIMIT <skip>, <limit>        (when a limit is set)
//! RETURN KEEP(doc, "f1", ...)  (or RETURN doc without a projection)
//! ```
//!
//! Translation is pure: the same collection and model always render to the same string.

use bson::Bson;
use tracing::trace;

use docmap_core::{
    error::{DocmapError, DocmapResult},
    path::{FieldPath, Segment},
    query::{LogicalOp, Operator, Predicate, QueryModel, QueryVisitor, SortDirection},
};

use crate::remap::FieldMap;

/// Renders [`QueryModel`]s as AQL strings.
///
/// ```ignore
/// let mut query = QueryModel::new();
/// query.where_("status").eq("active");
///
/// let aql = AqlTranslator::new().translate("collection", &query)?;
/// assert_eq!(aql, r#"FOR doc IN collection FILTER doc.status == "active" RETURN doc"#);
/// ```
#[derive(Debug, Clone)]
pub struct AqlTranslator {
    fields: FieldMap,
    variable: String,
}

impl Default for AqlTranslator {
    fn default() -> Self {
        Self {
            fields: FieldMap::default(),
            variable: "doc".to_string(),
        }
    }
}

impl AqlTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> AqlTranslatorBuilder {
        AqlTranslatorBuilder::default()
    }

    pub fn field_map(&self) -> &FieldMap {
        &self.fields
    }

    /// Renders `query` against `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`DocmapError::InvalidPath`] when a filter, sort or projection field is not a valid
    /// field path.
    pub fn translate(&self, collection: &str, query: &QueryModel) -> DocmapResult<String> {
        let mut clauses = vec![format!("FOR {} IN {}", self.variable, identifier(collection))];

        let branches = FilterRenderer { translator: self }.visit_where(&query.filter)?;
        if !branches.is_empty() {
            clauses.push(format!("FILTER {}", branches.join(" AND ")));
        }

        if !query.sort.is_empty() {
            let keys = query
                .sort
                .iter()
                .map(|sort| {
                    let field = self.attribute(&sort.field)?;
                    Ok(match sort.direction {
                        SortDirection::Asc => field,
                        SortDirection::Desc => format!("{field} DESC"),
                    })
                })
                .collect::<DocmapResult<Vec<_>>>()?;
            clauses.push(format!("SORT {}", keys.join(", ")));
        }

        if query.limit > 0 {
            clauses.push(match query.skip {
                0 => format!("LIMIT {}", query.limit),
                skip => format!("LIMIT {}, {}", skip, query.limit),
            });
        }

        if query.fields.is_empty() {
            clauses.push(format!("RETURN {}", self.variable));
        } else {
            let kept = query
                .fields
                .iter()
                .map(|field| string_literal(self.fields.storage_name(field)))
                .collect::<Vec<_>>();
            clauses.push(format!("RETURN KEEP({}, {})", self.variable, kept.join(", ")));
        }

        let aql = clauses.join(" ");
        trace!(collection, %aql, "translated query");
        Ok(aql)
    }

    /// `doc.a.b[0]` for the storage name of `field`.
    fn attribute(&self, field: &str) -> DocmapResult<String> {
        let path = FieldPath::parse(self.fields.storage_name(field))?;
        let mut out = self.variable.clone();

        for segment in path.segments() {
            match segment {
                Segment::Key(key) => {
                    out.push('.');
                    out.push_str(&identifier(key));
                }
                Segment::Index(index) => out.push_str(&format!("[{index}]")),
            }
        }

        Ok(out)
    }
}

/// Walks the where-tree, rendering one string per branch.
struct FilterRenderer<'t> {
    translator: &'t AqlTranslator,
}

impl QueryVisitor for FilterRenderer<'_> {
    type Output = String;
    type Error = DocmapError;

    fn visit_branch(
        &mut self,
        op: LogicalOp,
        predicates: &[Predicate],
        siblings: usize,
    ) -> Result<Self::Output, Self::Error> {
        let joiner = match op {
            LogicalOp::And => " AND ",
            LogicalOp::Or => " OR ",
        };
        let rendered = predicates
            .iter()
            .map(|predicate| self.visit_predicate(predicate))
            .collect::<Result<Vec<_>, _>>()?
            .join(joiner);

        if siblings > 1 && predicates.len() > 1 {
            Ok(format!("({rendered})"))
        } else {
            Ok(rendered)
        }
    }

    fn visit_predicate(&mut self, predicate: &Predicate) -> Result<Self::Output, Self::Error> {
        let field = self.translator.attribute(&predicate.field)?;

        let rendered = match (predicate.op, &predicate.value) {
            (Operator::Exists, Bson::Boolean(true)) => format!("{field} != null"),
            (Operator::Exists, _) => format!("{field} == null"),
            (op, value) => format!("{field} {} {}", comparison(op), literal(value)),
        };

        Ok(rendered)
    }
}

fn comparison(op: Operator) -> &'static str {
    match op {
        Operator::Eq => "==",
        Operator::Ne => "!=",
        Operator::Gt => ">",
        Operator::Gte => ">=",
        Operator::Lt => "<",
        Operator::Lte => "<=",
        Operator::In => "IN",
        Operator::Nin => "NOT IN",
        Operator::Exists => "!=",
    }
}

fn string_literal(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Renders a value as an AQL literal.
fn literal(value: &Bson) -> String {
    match value {
        Bson::String(s) => string_literal(s),
        Bson::Null | Bson::Undefined => "null".to_string(),
        Bson::Boolean(b) => b.to_string(),
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        Bson::Double(n) if n.is_finite() => n.to_string(),
        Bson::Double(_) => "null".to_string(),
        Bson::Array(items) => {
            let items = items.iter().map(literal).collect::<Vec<_>>();
            format!("[{}]", items.join(", "))
        }
        Bson::Document(doc) => {
            let entries = doc
                .iter()
                .map(|(key, value)| format!("{}: {}", string_literal(key), literal(value)))
                .collect::<Vec<_>>();
            format!("{{{}}}", entries.join(", "))
        }
        other => serde_json::to_value(other)
            .map(|json| json.to_string())
            .unwrap_or_else(|_| "null".to_string()),
    }
}

/// Backtick-quotes names that are not plain identifiers.
fn identifier(name: &str) -> String {
    let mut chars = name.chars();
    let plain = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if plain {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "\\`"))
    }
}

/// Builder for [`AqlTranslator`] instances.
///
/// ```ignore
/// let translator = AqlTranslator::builder()
///     .key_field("_key")
///     .revision_field("_rev")
///     .variable("d")
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct AqlTranslatorBuilder {
    key_field: Option<String>,
    revision_field: Option<String>,
    variable: Option<String>,
}

impl AqlTranslatorBuilder {
    pub fn key_field(mut self, name: impl Into<String>) -> Self {
        self.key_field = Some(name.into());
        self
    }

    pub fn revision_field(mut self, name: impl Into<String>) -> Self {
        self.revision_field = Some(name.into());
        self
    }

    /// The loop variable documents are bound to.
    pub fn variable(mut self, name: impl Into<String>) -> Self {
        self.variable = Some(name.into());
        self
    }

    pub fn build(self) -> AqlTranslator {
        let defaults = AqlTranslator::default();
        AqlTranslator {
            fields: FieldMap::new(
                self.key_field.unwrap_or_else(|| defaults.fields.key_field().to_string()),
                self.revision_field
                    .unwrap_or_else(|| defaults.fields.revision_field().to_string()),
            ),
            variable: self.variable.unwrap_or(defaults.variable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn translate(query: &QueryModel) -> String {
        AqlTranslator::new().translate("collection", query).unwrap()
    }

    #[test]
    fn renders_single_equality() {
        let mut query = QueryModel::new();
        query.where_("status").eq("active");
        assert_eq!(
            translate(&query),
            r#"FOR doc IN collection FILTER doc.status == "active" RETURN doc"#
        );
    }

    #[test]
    fn empty_query_returns_everything() {
        assert_eq!(translate(&QueryModel::new()), "FOR doc IN collection RETURN doc");
    }

    #[test]
    fn remaps_identity_and_revision() {
        let mut query = QueryModel::new();
        query.where_("id").eq("u1").where_("rev").ne("r1").fields(["id", "name"]);
        assert_eq!(
            translate(&query),
            r#"FOR doc IN collection FILTER doc._key == "u1" AND doc._rev != "r1" RETURN KEEP(doc, "_key", "name")"#
        );
    }

    #[test]
    fn parenthesizes_branches_when_both_present() {
        let mut query = QueryModel::new();
        query
            .where_("a")
            .gt(1)
            .where_("b")
            .lt(2)
            .where_("c")
            .eq(true)
            .or("d")
            .unwrap()
            .exists(false);

        assert_eq!(
            translate(&query),
            "FOR doc IN collection FILTER (doc.a > 1 AND doc.b < 2) AND (doc.c == true OR doc.d == null) RETURN doc"
        );
    }

    #[test]
    fn renders_sort_paging_and_literals() {
        let mut query = QueryModel::new();
        query
            .where_("tags")
            .in_(["x", "y\"z"])
            .where_("meta.scores[0]")
            .nin(vec![1.5, 2.0])
            .where_("owner")
            .exists(true)
            .where_("shape")
            .eq(doc! { "w": 1, "label": null })
            .sort_asc("name")
            .sort_desc("created-at")
            .skip(20)
            .limit(10);

        assert_eq!(
            translate(&query),
            concat!(
                "FOR doc IN collection ",
                r#"FILTER doc.tags IN ["x", "y\"z"] AND doc.meta.scores[0] NOT IN [1.5, 2] AND doc.owner != null AND doc.shape == {"w": 1, "label": null} "#,
                "SORT doc.name, doc.`created-at` DESC ",
                "LIMIT 20, 10 ",
                "RETURN doc"
            )
        );
    }

    #[test]
    fn limit_without_skip_and_skip_without_limit() {
        let mut query = QueryModel::new();
        query.limit(5);
        assert_eq!(translate(&query), "FOR doc IN collection LIMIT 5 RETURN doc");

        let mut query = QueryModel::new();
        query.skip(5);
        assert_eq!(translate(&query), "FOR doc IN collection RETURN doc");
    }

    #[test]
    fn builder_overrides_names() {
        let translator = AqlTranslator::builder().key_field("key").variable("d").build();
        let mut query = QueryModel::new();
        query.where_("id").eq(7).sort_desc("rev");

        assert_eq!(
            translator.translate("users", &query).unwrap(),
            "FOR d IN users FILTER d.key == 7 SORT d._rev DESC RETURN d"
        );
    }

    #[test]
    fn invalid_field_paths_fail() {
        let mut query = QueryModel::new();
        query.where_("a..b").eq(1);
        assert!(matches!(
            AqlTranslator::new().translate("c", &query),
            Err(DocmapError::InvalidPath(..))
        ));
    }
}
