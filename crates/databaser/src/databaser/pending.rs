//! A built statement waiting to be executed

use std::sync::Arc;

use super::{Databaser, QueryOutput, ReturnType};
use crate::collection::{Collection, Paginated};
use crate::entity::Entity;
use crate::error::{ModelError, OrmResult, QueryError};
use crate::query::{CompiledQuery, QueryBuilder};
use crate::value::Row;

/// Statement returned by [`Databaser::q`]; owns its builder so statements
/// built on one `Databaser` never share clause state
#[derive(Debug, Clone)]
pub struct PendingQuery {
    db: Arc<Databaser>,
    builder: QueryBuilder,
    return_type: Option<ReturnType>,
    with: Vec<String>,
}

impl PendingQuery {
    pub(crate) fn new(db: Arc<Databaser>, builder: QueryBuilder, return_type: Option<ReturnType>) -> Self {
        Self {
            db,
            builder,
            return_type,
            with: Vec::new(),
        }
    }

    pub fn builder(&self) -> &QueryBuilder {
        &self.builder
    }

    pub fn into_builder(self) -> QueryBuilder {
        self.builder
    }

    /// Override the `Databaser`'s result shape for this statement only
    pub fn return_type(mut self, return_type: ReturnType) -> Self {
        self.return_type = Some(return_type);
        self
    }

    /// Relations to load on every hydrated entity
    pub fn with(mut self, relations: &[&str]) -> Self {
        self.with.extend(relations.iter().map(|r| r.to_string()));
        self
    }

    /// Compile without executing
    pub fn get_query(&self) -> Result<CompiledQuery, QueryError> {
        self.builder.clone().get_query()
    }

    pub async fn execute(self) -> OrmResult<QueryOutput> {
        let return_type = self.return_type.unwrap_or_else(|| self.db.return_type());
        self.db.run(self.builder, return_type, &self.with).await
    }

    /// First matching entity
    pub async fn first(self) -> OrmResult<Option<Entity>> {
        let Self { db, builder, with, .. } = self;
        let output = db.run(builder.limit(1), ReturnType::Orm, &with).await?;
        Ok(output.into_entities().and_then(|c| c.into_items().into_iter().next()))
    }

    /// First matching row as a plain column map
    pub async fn first_row(self) -> OrmResult<Option<Row>> {
        let Self { db, builder, .. } = self;
        let output = db.run(builder.limit(1), ReturnType::Raw, &[]).await?;
        Ok(output.into_rows().into_iter().next())
    }

    /// Execute and wrap the hydrated entities
    pub async fn all(self) -> OrmResult<Collection<Entity>> {
        let Self { db, builder, with, .. } = self;
        match db.run(builder, ReturnType::Orm, &with).await? {
            QueryOutput::Entities(collection) => Ok(collection),
            QueryOutput::Skipped | QueryOutput::Executed(_) => Ok(Collection::from_items(Some(db), Vec::new())),
            QueryOutput::Rows(_) => Err(ModelError::Query("ORM execution returned raw rows".to_string())),
        }
    }

    /// Collection that executes the statement on first access
    pub fn lazy(self) -> Collection<Entity> {
        let Self { db, builder, with, .. } = self;
        let mut collection = Collection::from_query(db, builder);
        collection.set_with(with);
        collection
    }

    /// Page of results computed with SQL `COUNT` and `LIMIT/OFFSET`
    pub async fn paginate(self, per_page: u64, current_page: u64) -> OrmResult<Paginated<Entity>> {
        self.lazy().paginate(per_page, current_page).await
    }
}
