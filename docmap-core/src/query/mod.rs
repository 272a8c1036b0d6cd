//! Query construction, parsing and a visitor for query translation across backends.
//!
//! A [`QueryModel`] is the single canonical form of a request: a where-tree of predicates grouped
//! into `and`/`or` branches, an ordered sort sequence, paging and a projection. It can be
//! populated two ways that produce identical models:
//!
//! ```ignore
//! use docmap_core::query::QueryModel;
//! use bson::doc;
//!
//! // fluent builder
//! let mut built = QueryModel::new();
//! built.where_("status").eq("active").where_("age").gte(18);
//! built.sort("name", 1)?.limit(10);
//!
//! // declarative filter object
//! let parsed = QueryModel::from_filter(&doc! {
//!     "$where": { "$and": [{ "status": "active" }, { "age": { "$gte": 18 } }] },
//!     "$sort": [["name", 1]],
//!     "$limit": 10,
//! })?;
//!
//! assert_eq!(built, parsed);
//! ```
//!
//! Backends walk the where-tree through [`QueryVisitor`].

mod builder;
mod filter;

use async_trait::async_trait;
use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    ops::{Deref, DerefMut},
    str::FromStr,
    sync::Arc,
};

use crate::error::{DocmapError, DocmapResult, QueryError};

pub use builder::FieldClause;

/// Largest `limit` or `skip` a filter object can carry; the builder clamps larger values to it.
pub const MAX_COUNT: usize = i64::MAX as usize;

/// Logical branch of a where-tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
        }
    }

    /// The filter-object key for this branch (`$and`, `$or`).
    pub fn key(&self) -> &'static str {
        match self {
            LogicalOp::And => "$and",
            LogicalOp::Or => "$or",
        }
    }

    pub(crate) fn from_key(key: &str) -> Option<Self> {
        match key {
            "$and" => Some(LogicalOp::And),
            "$or" => Some(LogicalOp::Or),
            _ => None,
        }
    }
}

impl FromStr for LogicalOp {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "and" | "$and" => Ok(LogicalOp::And),
            "or" | "$or" => Ok(LogicalOp::Or),
            other => Err(QueryError::InvalidLogicalOperator(other.to_string())),
        }
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison and element operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    /// Equal to.
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Value is one of an array of candidates.
    In,
    /// Value is none of an array of candidates.
    Nin,
    /// Field is (or is not) set; the operand is a boolean.
    Exists,
}

impl Operator {
    pub const ALL: [Operator; 9] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
        Operator::In,
        Operator::Nin,
        Operator::Exists,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::In => "in",
            Operator::Nin => "nin",
            Operator::Exists => "exists",
        }
    }

    /// The filter-object key for this operator (`$eq`, `$in`, ...).
    pub fn key(&self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::In => "$in",
            Operator::Nin => "$nin",
            Operator::Exists => "$exists",
        }
    }

    pub(crate) fn from_key(key: &str) -> Option<Self> {
        Operator::ALL.into_iter().find(|op| op.key() == key)
    }

    /// Checks and normalizes an operand for this operator.
    ///
    /// Membership operators take an array (a single value is wrapped), `exists` takes a boolean.
    pub(crate) fn operand(&self, value: Bson) -> Result<Bson, QueryError> {
        match (self, value) {
            (Operator::In | Operator::Nin, Bson::Array(items)) => Ok(Bson::Array(items)),
            (Operator::In | Operator::Nin, single) => Ok(Bson::Array(vec![single])),
            (Operator::Exists, Bson::Boolean(flag)) => Ok(Bson::Boolean(flag)),
            (Operator::Exists, other) => Err(QueryError::Parse(format!(
                "$exists expects a boolean, got {other}"
            ))),
            (_, value) => Ok(value),
        }
    }
}

impl FromStr for Operator {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::ALL
            .into_iter()
            .find(|op| op.as_str() == s || op.key() == s)
            .ok_or_else(|| QueryError::InvalidOperator(s.to_string()))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `{field: {operator: value}}` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub op: Operator,
    pub value: Bson,
}

/// An ordered group of predicates combined with one logical operator.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub op: LogicalOp,
    pub predicates: Vec<Predicate>,
}

/// The where-tree: non-empty branches in the order they were created.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WhereTree {
    branches: Vec<Branch>,
}

impl WhereTree {
    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn branch(&self, op: LogicalOp) -> Option<&Branch> {
        self.branches.iter().find(|branch| branch.op == op)
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Total number of predicates across branches.
    pub fn len(&self) -> usize {
        self.branches.iter().map(|branch| branch.predicates.len()).sum()
    }

    pub(crate) fn push(&mut self, op: LogicalOp, predicate: Predicate) {
        match self.branches.iter_mut().find(|branch| branch.op == op) {
            Some(branch) => branch.predicates.push(predicate),
            None => self.branches.push(Branch { op, predicates: vec![predicate] }),
        }
    }

    /// Removes the most recent predicate of a branch, dropping the branch once it is empty.
    pub(crate) fn pop(&mut self, op: LogicalOp) -> Option<Predicate> {
        let position = self.branches.iter().position(|branch| branch.op == op)?;
        let predicate = self.branches[position].predicates.pop();
        if self.branches[position].predicates.is_empty() {
            self.branches.remove(position);
        }
        predicate
    }
}

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    /// Ascending order, serialized as `1`.
    Asc,
    /// Descending order, serialized as `-1`.
    Desc,
}

impl SortDirection {
    pub fn value(&self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

impl TryFrom<i64> for SortDirection {
    type Error = QueryError;

    /// Normalizes by sign; `0` is rejected.
    fn try_from(direction: i64) -> Result<Self, Self::Error> {
        match direction {
            0 => Err(QueryError::InvalidSortOrder),
            d if d > 0 => Ok(SortDirection::Asc),
            _ => Ok(SortDirection::Desc),
        }
    }
}

/// One entry of the sort sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

/// The canonical query representation.
///
/// Builder methods live in the `builder` submodule, filter-object parsing and serialization in
/// the `filter` submodule. A limit of `0` means unlimited.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryModel {
    /// Maximum number of documents to return, `0` for no limit.
    pub limit: usize,
    /// Number of documents to skip.
    pub skip: usize,
    /// Sort sequence in priority order.
    pub sort: Vec<Sort>,
    /// Projection; empty selects whole documents.
    pub fields: Vec<String>,
    /// Filter predicates.
    pub filter: WhereTree,
}

impl QueryModel {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Execution callback a [`Query`] is bound to.
///
/// Mappers bind their queries to a runner that forwards to the storage adapter, so the query
/// core never depends on the façade.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    async fn run(&self, query: &QueryModel) -> DocmapResult<Vec<Document>>;
}

/// A [`QueryModel`] optionally bound to a [`QueryRunner`].
///
/// Dereferences to the model, so the builder API is available directly:
///
/// ```ignore
/// let mut query = mapper.query();
/// query.where_("status").eq("active");
/// let docs = query.run().await?;
/// ```
#[derive(Clone, Default)]
pub struct Query {
    model: QueryModel,
    runner: Option<Arc<dyn QueryRunner>>,
}

impl Query {
    /// Creates an unbound query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query bound to `runner`.
    pub fn bound(runner: Arc<dyn QueryRunner>) -> Self {
        Self { model: QueryModel::new(), runner: Some(runner) }
    }

    /// Binds an existing model to `runner`.
    pub fn with_model(model: QueryModel, runner: Arc<dyn QueryRunner>) -> Self {
        Self { model, runner: Some(runner) }
    }

    pub fn model(&self) -> &QueryModel {
        &self.model
    }

    pub fn into_model(self) -> QueryModel {
        self.model
    }

    pub fn is_bound(&self) -> bool {
        self.runner.is_some()
    }

    /// Hands the model to the bound runner.
    ///
    /// # Errors
    ///
    /// Returns [`DocmapError::Unbound`] when no runner is bound, otherwise whatever the runner
    /// returns.
    pub async fn run(&self) -> DocmapResult<Vec<Document>> {
        match &self.runner {
            Some(runner) => runner.run(&self.model).await,
            None => Err(DocmapError::Unbound("query has no runner".into())),
        }
    }
}

impl Deref for Query {
    type Target = QueryModel;

    fn deref(&self) -> &Self::Target {
        &self.model
    }
}

impl DerefMut for Query {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.model
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("model", &self.model)
            .field("bound", &self.runner.is_some())
            .finish()
    }
}

impl From<QueryModel> for Query {
    fn from(model: QueryModel) -> Self {
        Self { model, runner: None }
    }
}

/// Walks a where-tree on behalf of a backend.
///
/// Translators produce query text, evaluators produce match results; both see branches in
/// insertion order and predicates in the order they were added.
pub trait QueryVisitor {
    type Output;
    type Error: Into<DocmapError>;

    fn visit_branch(
        &mut self,
        op: LogicalOp,
        predicates: &[Predicate],
        siblings: usize,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_predicate(&mut self, predicate: &Predicate) -> Result<Self::Output, Self::Error>;

    fn visit_where(&mut self, tree: &WhereTree) -> Result<Vec<Self::Output>, Self::Error> {
        tree.branches()
            .iter()
            .map(|branch| self.visit_branch(branch.op, &branch.predicates, tree.branches().len()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingRunner;

    #[async_trait]
    impl QueryRunner for CountingRunner {
        async fn run(&self, query: &QueryModel) -> DocmapResult<Vec<Document>> {
            Ok(vec![bson::doc! { "predicates": query.filter.len() as i64 }])
        }
    }

    #[test]
    fn operators_parse_by_name_or_key() {
        assert_eq!("gte".parse::<Operator>().unwrap(), Operator::Gte);
        assert_eq!("$nin".parse::<Operator>().unwrap(), Operator::Nin);
        assert_eq!(
            "customOp".parse::<Operator>(),
            Err(QueryError::InvalidOperator("customOp".into()))
        );
        assert_eq!(
            "xor".parse::<LogicalOp>(),
            Err(QueryError::InvalidLogicalOperator("xor".into()))
        );
    }

    #[test]
    fn sort_direction_normalizes_by_sign() {
        assert_eq!(SortDirection::try_from(5).unwrap(), SortDirection::Asc);
        assert_eq!(SortDirection::try_from(-3).unwrap(), SortDirection::Desc);
        assert_eq!(SortDirection::try_from(0), Err(QueryError::InvalidSortOrder));
    }

    #[test]
    fn pop_drops_emptied_branch() {
        let mut tree = WhereTree::default();
        tree.push(LogicalOp::And, Predicate { field: "a".into(), op: Operator::Eq, value: Bson::Int32(1) });
        assert!(tree.pop(LogicalOp::And).is_some());
        assert!(tree.is_empty());
        assert!(tree.pop(LogicalOp::And).is_none());
    }

    #[tokio::test]
    async fn run_requires_a_runner() {
        let query = Query::new();
        assert!(matches!(query.run().await, Err(DocmapError::Unbound(_))));

        let mut query = Query::bound(Arc::new(CountingRunner));
        query.where_("a").eq(1).where_("b").eq(2);
        let out = query.run().await.unwrap();
        assert_eq!(out[0].get_i64("predicates").unwrap(), 2);
    }
}
