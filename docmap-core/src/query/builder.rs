//! Fluent builder front-end for [`QueryModel`].

use bson::Bson;

use super::{LogicalOp, Operator, Predicate, QueryModel, Sort, SortDirection, MAX_COUNT};
use crate::error::QueryError;

/// A field bound to the branch its next predicate will be added to.
///
/// Returned by [`QueryModel::where_`] and [`QueryModel::or`]; every comparison method appends
/// one predicate and hands the model back for chaining.
#[derive(Debug)]
pub struct FieldClause<'q> {
    query: &'q mut QueryModel,
    field: String,
    branch: LogicalOp,
}

impl<'q> FieldClause<'q> {
    fn new(query: &'q mut QueryModel, field: String, branch: LogicalOp) -> Self {
        Self { query, field, branch }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn branch(&self) -> LogicalOp {
        self.branch
    }

    fn push(self, op: Operator, value: Bson) -> &'q mut QueryModel {
        self.query.filter.push(self.branch, Predicate { field: self.field, op, value });
        self.query
    }

    pub fn eq(self, value: impl Into<Bson>) -> &'q mut QueryModel {
        self.push(Operator::Eq, value.into())
    }

    pub fn ne(self, value: impl Into<Bson>) -> &'q mut QueryModel {
        self.push(Operator::Ne, value.into())
    }

    pub fn gt(self, value: impl Into<Bson>) -> &'q mut QueryModel {
        self.push(Operator::Gt, value.into())
    }

    pub fn gte(self, value: impl Into<Bson>) -> &'q mut QueryModel {
        self.push(Operator::Gte, value.into())
    }

    pub fn lt(self, value: impl Into<Bson>) -> &'q mut QueryModel {
        self.push(Operator::Lt, value.into())
    }

    pub fn lte(self, value: impl Into<Bson>) -> &'q mut QueryModel {
        self.push(Operator::Lte, value.into())
    }

    /// Matches when the field equals one of `values`.
    pub fn in_<I, V>(self, values: I) -> &'q mut QueryModel
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.push(Operator::In, Bson::Array(values))
    }

    /// Matches when the field equals none of `values`.
    pub fn nin<I, V>(self, values: I) -> &'q mut QueryModel
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.push(Operator::Nin, Bson::Array(values))
    }

    pub fn exists(self, should_exist: bool) -> &'q mut QueryModel {
        self.push(Operator::Exists, Bson::Boolean(should_exist))
    }

    /// Appends a predicate with an operator given by name (`"gte"` or `"$gte"`).
    ///
    /// # Errors
    ///
    /// [`QueryError::InvalidOperator`] for unsupported names, [`QueryError::Parse`] when an
    /// `exists` operand is not a boolean.
    pub fn op(self, name: &str, value: impl Into<Bson>) -> Result<&'q mut QueryModel, QueryError> {
        let op: Operator = name.parse()?;
        let value = op.operand(value.into())?;
        Ok(self.push(op, value))
    }
}

impl QueryModel {
    /// Starts a predicate on `field` in the `and` branch.
    pub fn where_(&mut self, field: impl Into<String>) -> FieldClause<'_> {
        FieldClause::new(self, field.into(), LogicalOp::And)
    }

    /// Moves the most recent `and` predicate into the `or` branch and starts a predicate on
    /// `field` in that branch.
    ///
    /// # Errors
    ///
    /// [`QueryError::PrecedingWhereRequired`] when there is no `and` predicate to pair with.
    pub fn or(&mut self, field: impl Into<String>) -> Result<FieldClause<'_>, QueryError> {
        let previous = self
            .filter
            .pop(LogicalOp::And)
            .ok_or(QueryError::PrecedingWhereRequired)?;
        self.filter.push(LogicalOp::Or, previous);

        Ok(FieldClause::new(self, field.into(), LogicalOp::Or))
    }

    /// Appends a predicate to a branch named by string.
    ///
    /// # Errors
    ///
    /// [`QueryError::InvalidLogicalOperator`] or [`QueryError::InvalidOperator`] for unknown
    /// names.
    pub fn add_predicate(
        &mut self,
        branch: &str,
        field: impl Into<String>,
        op: &str,
        value: impl Into<Bson>,
    ) -> Result<&mut Self, QueryError> {
        let branch: LogicalOp = branch.parse()?;
        FieldClause::new(self, field.into(), branch).op(op, value)
    }

    pub(crate) fn push_predicate(&mut self, branch: LogicalOp, field: String, op: Operator, value: Bson) {
        self.filter.push(branch, Predicate { field, op, value });
    }

    /// Appends a sort key; the direction is normalized by sign.
    ///
    /// # Errors
    ///
    /// [`QueryError::InvalidSortOrder`] when `direction` is `0`.
    pub fn sort(&mut self, field: impl Into<String>, direction: i64) -> Result<&mut Self, QueryError> {
        let direction = SortDirection::try_from(direction)?;
        Ok(self.sort_by(field, direction))
    }

    /// Appends several sort keys. Nothing is appended if any direction is invalid.
    pub fn sort_all<I, S>(&mut self, specs: I) -> Result<&mut Self, QueryError>
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let specs = specs
            .into_iter()
            .map(|(field, direction)| -> Result<Sort, QueryError> {
                Ok(Sort { field: field.into(), direction: SortDirection::try_from(direction)? })
            })
            .collect::<Result<Vec<_>, QueryError>>()?;
        self.sort.extend(specs);
        Ok(self)
    }

    pub fn sort_by(&mut self, field: impl Into<String>, direction: SortDirection) -> &mut Self {
        self.sort.push(Sort { field: field.into(), direction });
        self
    }

    pub fn sort_asc(&mut self, field: impl Into<String>) -> &mut Self {
        self.sort_by(field, SortDirection::Asc)
    }

    pub fn sort_desc(&mut self, field: impl Into<String>) -> &mut Self {
        self.sort_by(field, SortDirection::Desc)
    }

    /// Sets the maximum number of documents to return; `0` removes the limit. Values above
    /// [`MAX_COUNT`] are clamped.
    pub fn limit(&mut self, limit: usize) -> &mut Self {
        self.limit = limit.min(MAX_COUNT);
        self
    }

    /// Sets the number of documents to skip.
    pub fn skip(&mut self, skip: usize) -> &mut Self {
        self.skip = skip.min(MAX_COUNT);
        self
    }

    /// Extends the projection, ignoring names already present.
    pub fn fields<I, S>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.fields.contains(&name) {
                self.fields.push(name);
            }
        }
        self
    }

    /// Extends the projection from groups of names, flattening them.
    pub fn fields_nested<I, J, S>(&mut self, groups: I) -> &mut Self
    where
        I: IntoIterator<Item = J>,
        J: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields(groups.into_iter().flatten())
    }
}
