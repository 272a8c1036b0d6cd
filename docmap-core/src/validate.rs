//! Pluggable validation.
//!
//! Rule evaluation is not part of this crate: a [`Validator`] receives the storage shape of a
//! record and either accepts it or reports a [`ValidationError`]. Any rejection is fatal to the
//! operation that asked for validation and reaches the caller unchanged.

use async_trait::async_trait;
use bson::Document;

use crate::error::ValidationError;

#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, data: &Document) -> Result<(), ValidationError>;
}

/// Adapts a synchronous closure into a [`Validator`].
///
/// ```ignore
/// let validator = FnValidator::new(|doc: &Document| {
///     if doc.contains_key("name") {
///         Ok(())
///     } else {
///         Err(ValidationError::new("required", "name", "name is required"))
///     }
/// });
/// ```
pub struct FnValidator<F> {
    check: F,
}

impl<F> FnValidator<F>
where
    F: Fn(&Document) -> Result<(), ValidationError> + Send + Sync,
{
    pub fn new(check: F) -> Self {
        Self { check }
    }
}

#[async_trait]
impl<F> Validator for FnValidator<F>
where
    F: Fn(&Document) -> Result<(), ValidationError> + Send + Sync,
{
    async fn validate(&self, data: &Document) -> Result<(), ValidationError> {
        (self.check)(data)
    }
}
