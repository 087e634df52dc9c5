//! Query Builder - Core builder implementation

use crate::dialect::Dialect;
use crate::error::QueryError;
use crate::sanitizer::{sanitize_column, sanitize_table, sanitize_value};
use crate::value::Value;

use super::types::*;

/// Fluent builder for one SQL statement.
///
/// Every method consumes and returns the builder. The first construction
/// error is kept and every later call becomes a no-op, so a chain never
/// panics; [`get_query`](Self::get_query) reports the recorded error.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    pub(crate) dialect: Dialect,
    pub(crate) parts: QueryParts,
    pub(crate) error: Option<QueryError>,
}

impl QueryBuilder {
    /// Create a new query builder for `dialect`
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            parts: QueryParts::default(),
            error: None,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Clause storage as built so far
    pub fn parts(&self) -> &QueryParts {
        &self.parts
    }

    /// First construction error, if any
    pub fn error(&self) -> Option<&QueryError> {
        self.error.as_ref()
    }

    /// Run a clause mutation unless an earlier call already failed
    pub(crate) fn apply<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut Self) -> Result<(), QueryError>,
    {
        if self.error.is_none() {
            if let Err(err) = f(&mut self) {
                self.error = Some(err);
            }
        }
        self
    }

    pub(crate) fn column(&self, name: &str) -> Result<String, QueryError> {
        sanitize_column(self.dialect, name)
    }

    pub(crate) fn table_name(&self, name: &str) -> Result<String, QueryError> {
        sanitize_table(self.dialect, name)
    }

    pub(crate) fn value(value: impl Into<Value>) -> Value {
        sanitize_value(value.into())
    }

    /// Build and compile a nested statement on the same dialect
    pub(crate) fn subquery<F>(&self, build: F) -> Result<Fragment, QueryError>
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let compiled = build(QueryBuilder::new(self.dialect)).get_query()?;
        Ok(Fragment::with_bindings(compiled.query, compiled.bindings))
    }

    /// Build a nested builder and render only its WHERE conditions
    pub(crate) fn condition_group<F>(&self, build: F) -> Result<Option<Fragment>, QueryError>
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let nested = build(QueryBuilder::new(self.dialect));
        if let Some(err) = nested.error {
            return Err(err);
        }
        Ok(super::sql_generation::render_conditions(&nested.parts.wheres))
    }
}
