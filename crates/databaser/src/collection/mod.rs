//! Lazy collections of entities or rows
//!
//! A [`Collection`] is built either from finished items or from a pending
//! query, never both. A query-backed collection runs its statement the first
//! time any operator needs the items and never again; afterwards the original
//! builder is kept so SQL-level pagination can still inspect it.

mod operators;
pub mod pagination;

pub use pagination::{build_pagination_result, Paginated};

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::databaser::{guess_table, Databaser, ReturnType};
use crate::entity::Entity;
use crate::error::{ModelError, OrmResult};
use crate::query::QueryBuilder;
use crate::value::{row_to_json, Row, Value};

/// Something a collection can hold
#[async_trait]
pub trait CollectionItem: Clone + Send + Sync + 'static {
    /// Hydrate one fetched row of `table`
    fn from_row(db: &Arc<Databaser>, table: &str, row: Row) -> Self;

    /// Named field used by the field-based operators
    fn field(&self, name: &str) -> Option<Value>;

    fn to_json(&self) -> JsonValue;

    /// Apply eager loads after hydration
    async fn prepare(&mut self, _with: &[String]) -> OrmResult<()> {
        Ok(())
    }
}

#[async_trait]
impl CollectionItem for Entity {
    fn from_row(db: &Arc<Databaser>, table: &str, row: Row) -> Self {
        Entity::from_row(db.clone(), table, row)
    }

    fn field(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }

    fn to_json(&self) -> JsonValue {
        Entity::to_json(self)
    }

    async fn prepare(&mut self, with: &[String]) -> OrmResult<()> {
        if with.is_empty() {
            return Ok(());
        }
        self.with(with);
        self.load_relations().await
    }
}

#[async_trait]
impl CollectionItem for Row {
    fn from_row(_db: &Arc<Databaser>, _table: &str, row: Row) -> Self {
        row
    }

    fn field(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }

    fn to_json(&self) -> JsonValue {
        row_to_json(self)
    }
}

/// Scalars, e.g. the output of `pluck`. A scalar is its own value for every
/// field name.
#[async_trait]
impl CollectionItem for Value {
    fn from_row(_db: &Arc<Databaser>, _table: &str, row: Row) -> Self {
        row.into_values().next().unwrap_or_default()
    }

    fn field(&self, _name: &str) -> Option<Value> {
        Some(self.clone())
    }

    fn to_json(&self) -> JsonValue {
        Value::to_json(self)
    }
}

/// Ordering used by sorting and min/max: null first, numbers by value,
/// everything else by string form
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Entities or rows, loaded at most once
#[derive(Debug, Clone)]
pub struct Collection<T> {
    items: Vec<T>,
    query: Option<QueryBuilder>,
    loaded: bool,
    with: Vec<String>,
    db: Option<Arc<Databaser>>,
    table: Option<String>,
}

impl<T: CollectionItem> Collection<T> {
    /// Collection over finished items
    pub fn from_items(db: Option<Arc<Databaser>>, items: Vec<T>) -> Self {
        Self {
            items,
            query: None,
            loaded: true,
            with: Vec::new(),
            db,
            table: None,
        }
    }

    /// Collection populated from `query` on first access
    pub fn from_query(db: Arc<Databaser>, query: QueryBuilder) -> Self {
        Self {
            items: Vec::new(),
            query: Some(query),
            loaded: false,
            with: Vec::new(),
            db: Some(db),
            table: None,
        }
    }

    /// Same handle and table, different items
    pub(crate) fn derive<U: CollectionItem>(&self, items: Vec<U>) -> Collection<U> {
        Collection {
            items,
            query: None,
            loaded: true,
            with: Vec::new(),
            db: self.db.clone(),
            table: self.table.clone(),
        }
    }

    pub fn with_table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn db(&self) -> Option<&Arc<Databaser>> {
        self.db.as_ref()
    }

    /// Builder of a query-backed collection (unexecuted shape)
    pub fn query(&self) -> Option<&QueryBuilder> {
        self.query.as_ref()
    }

    /// Relations applied to every hydrated item
    pub fn with(&mut self, relations: &[&str]) -> &mut Self {
        self.with.extend(relations.iter().map(|r| r.to_string()));
        self
    }

    pub(crate) fn set_with(&mut self, relations: Vec<String>) {
        self.with = relations;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Items as they are now, without loading
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Consume the collection without loading
    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    /// Run the pending query once; later calls do nothing
    pub async fn load(&mut self) -> OrmResult<()> {
        if self.loaded {
            return Ok(());
        }
        let Some(query) = self.query.clone() else {
            self.loaded = true;
            return Ok(());
        };
        let db = self
            .db
            .clone()
            .ok_or_else(|| ModelError::Connection("collection has no Databaser".to_string()))?;

        let table = match &self.table {
            Some(table) => table.clone(),
            None => guess_table(&query.clone().get_query()?.query),
        };
        let rows = db.run(query.clone(), ReturnType::Raw, &[]).await?.into_rows();

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let mut item = T::from_row(&db, &table, row);
            item.prepare(&self.with).await?;
            items.push(item);
        }
        tracing::debug!("Loaded {} item(s) of '{}'", items.len(), table);

        self.items = items;
        self.table = Some(table);
        self.query = Some(query);
        self.loaded = true;
        Ok(())
    }

    pub async fn to_json(&mut self) -> OrmResult<JsonValue> {
        self.load().await?;
        Ok(JsonValue::Array(self.items.iter().map(CollectionItem::to_json).collect()))
    }
}

impl Collection<Entity> {
    /// Save every entity, stopping at the first failure
    pub async fn save_all(&mut self) -> OrmResult<()> {
        self.load().await?;
        for entity in &mut self.items {
            entity.save().await?;
        }
        Ok(())
    }
}

impl<T: CollectionItem> IntoIterator for Collection<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
