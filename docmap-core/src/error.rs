//! Error types and result types for query construction and record operations.
//!
//! Builder misuse surfaces as a [`QueryError`] at the call site. Everything else travels as a
//! [`DocmapError`]; use [`DocmapResult<T>`] as the return type for fallible operations.

use bson::error::Error as BsonError;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Errors raised while building or parsing a query.
///
/// These are programmer-usage errors: they are returned synchronously and never recovered
/// internally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The operator name is not one of the supported comparison or element operators.
    #[error("Invalid operator: {0}")]
    InvalidOperator(String),
    /// The branch name is neither `and` nor `or`.
    #[error("Invalid logical operator: {0}")]
    InvalidLogicalOperator(String),
    /// A sort direction of `0` was supplied.
    #[error("Invalid sort order: direction must be non-zero")]
    InvalidSortOrder,
    /// `or` was called before any `where` predicate existed to pair it with.
    #[error("A preceding where clause is required before or()")]
    PrecedingWhereRequired,
    /// The filter object could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// A structured validation failure reported by a [`Validator`](crate::validate::Validator).
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{keyword} at '{path}': {message}")]
pub struct ValidationError {
    /// The rule that failed (e.g. `required`, `type`).
    pub keyword: String,
    /// Field path of the offending value.
    pub path: String,
    /// Human readable description.
    pub message: String,
}

impl ValidationError {
    pub fn new(
        keyword: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            keyword: keyword.into(),
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Represents all possible errors that can occur when working with records and queries.
///
/// Storage failures (`NotFound`, `AlreadyExists`, `RevisionMismatch`, `Backend`) come from the
/// storage adapter and are passed through untouched.
#[derive(Error, Debug)]
pub enum DocmapError {
    /// Builder or parser misuse.
    #[error(transparent)]
    Query(#[from] QueryError),
    /// The validator rejected the record.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    /// The requested document was not found in the collection.
    /// The first argument is the document id, the second is the collection name.
    #[error("Document {0} not found in collection {1}")]
    NotFound(String, String),
    /// A document with the given id already exists in the collection.
    /// The first argument is the document id, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    AlreadyExists(String, String),
    /// The stored revision differs from the one the write was based on.
    #[error("Revision mismatch: expected {expected}, found {actual}")]
    RevisionMismatch { expected: String, actual: String },
    /// A field path could not be parsed or does not address a writable location.
    #[error("Invalid path '{0}': {1}")]
    InvalidPath(String, String),
    /// Attempted to delete a path that holds no value.
    #[error("Cannot delete '{0}': no value is set")]
    Immutable(String),
    /// Attempted to assign a virtual that has no setter.
    #[error("Virtual '{0}' is read-only")]
    ReadOnlyVirtual(String),
    /// The operation needs a storage binding the record or query does not have.
    #[error("Unbound: {0}")]
    Unbound(String),
    /// A hook callback aborted the operation.
    #[error("Hook error: {0}")]
    Hook(String),
    /// Serialization/deserialization error when converting between BSON and JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// An error occurred in the underlying storage adapter.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for docmap operations.
pub type DocmapResult<T> = Result<T, DocmapError>;

impl From<BsonError> for DocmapError {
    fn from(err: BsonError) -> Self {
        DocmapError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocmapError {
    fn from(err: SerdeJsonError) -> Self {
        DocmapError::Serialization(err.to_string())
    }
}
