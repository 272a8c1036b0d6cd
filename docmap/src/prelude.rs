//! Convenient re-exports of commonly used types from docmap.
//!
//! ```ignore
//! use docmap::prelude::*;
//! ```
//!
//! This provides access to:
//! - Records, virtuals and path-addressed field references
//! - The query model, its builder and runner types
//! - The mapper façade, adapter, validator and hook traits
//! - Error types

pub use docmap_core::{
    backend::{AdapterBuilder, StorageAdapter},
    error::{DocmapError, DocmapResult, QueryError, ValidationError},
    hooks::{HookEvent, Hooks},
    mapper::{Mapper, MapperBuilder},
    query::{
        FieldClause, LogicalOp, Operator, Query, QueryModel, QueryRunner, QueryVisitor, Sort,
        SortDirection,
    },
    record::{Change, ChangeOp, FieldRef, ProxyValue, Record, SerializeMode, Virtual, Virtuals},
    validate::{FnValidator, Validator},
};
