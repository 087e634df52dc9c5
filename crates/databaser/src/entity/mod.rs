//! Active-record entities
//!
//! An [`Entity`] is one row of one table: a typed attribute map, the snapshot
//! it was loaded with, validation rules, lifecycle hooks and memoised
//! relations. Persistence lives in `lifecycle`, relation loading in
//! [`relations`].

mod lifecycle;
pub mod relations;
pub mod validation;

pub use relations::{RelationDef, RelationValue};
pub use validation::{validate_attributes, Rule};

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::databaser::Databaser;
use crate::error::{ModelError, ModelResult};
use crate::events::{EntityEvent, EntityHandler};
use crate::value::{Row, Value};

pub const DEFAULT_PRIMARY_KEY: &str = "id";
pub const DEFAULT_DELETED_AT_COLUMN: &str = "deleted_at";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// Timestamp format written into `created_at` / `updated_at` / `deleted_at`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One row of `table`
#[derive(Clone)]
pub struct Entity {
    db: Option<Arc<Databaser>>,
    table: String,
    primary_key: String,
    attributes: Row,
    original: Row,
    rules: BTreeMap<String, String>,
    relations: BTreeMap<String, RelationValue>,
    relation_defs: BTreeMap<String, RelationDef>,
    with: Vec<String>,
    soft_deletes: bool,
    deleted_at_column: String,
    events: HashMap<EntityEvent, Vec<EntityHandler>>,
}

impl Entity {
    /// New, unsaved entity
    pub fn new(db: Arc<Databaser>, table: &str) -> Self {
        let mut entity = Self::detached(table);
        entity.db = Some(db);
        entity
    }

    /// Entity without a `Databaser`; attribute and dirty tracking work, any
    /// persistence call fails with a connection error
    pub fn detached(table: &str) -> Self {
        Self {
            db: None,
            table: table.to_string(),
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
            attributes: Row::new(),
            original: Row::new(),
            rules: BTreeMap::new(),
            relations: BTreeMap::new(),
            relation_defs: BTreeMap::new(),
            with: Vec::new(),
            soft_deletes: false,
            deleted_at_column: DEFAULT_DELETED_AT_COLUMN.to_string(),
            events: HashMap::new(),
        }
    }

    /// Hydrate a fetched row; the row is also the original snapshot
    pub fn from_row(db: Arc<Databaser>, table: &str, row: Row) -> Self {
        let mut entity = Self::new(db, table);
        entity.original = row.clone();
        entity.attributes = row;
        entity
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn set_primary_key(&mut self, column: &str) -> &mut Self {
        self.primary_key = column.to_string();
        self
    }

    pub fn databaser(&self) -> Option<&Arc<Databaser>> {
        self.db.as_ref()
    }

    pub(crate) fn db(&self) -> ModelResult<Arc<Databaser>> {
        self.db
            .clone()
            .ok_or_else(|| ModelError::Connection(format!("entity of '{}' is not bound to a Databaser", self.table)))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Assign several attributes at once
    pub fn fill<K, V, I>(&mut self, values: I) -> &mut Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in values {
            self.attributes.insert(key.into(), value.into());
        }
        self
    }

    pub fn has(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    pub fn unset(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(key)
    }

    pub fn attributes(&self) -> &Row {
        &self.attributes
    }

    /// Primary key value, if set and not null
    pub fn get_key(&self) -> Option<&Value> {
        self.attributes.get(&self.primary_key).filter(|v| !v.is_null())
    }

    /// Whether the entity has no primary key value yet
    pub fn is_new(&self) -> bool {
        match self.get_key() {
            None => true,
            Some(key) => key.to_string().is_empty(),
        }
    }

    /// Attributes that differ from the snapshot.
    ///
    /// Values compare by string form, so `1` and `"1"` are equal and only
    /// top-level replacement counts as a change.
    pub fn get_dirty(&self) -> Row {
        self.attributes
            .iter()
            .filter(|(key, value)| match self.original.get(*key) {
                Some(original) => original.to_string() != value.to_string(),
                None => true,
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        !self.get_dirty().is_empty()
    }

    pub fn get_original(&self) -> &Row {
        &self.original
    }

    /// Take the current attributes as the persisted snapshot
    pub(crate) fn sync_original(&mut self) {
        self.original = self.attributes.clone();
    }

    /// Pipe-syntax rules per column, e.g. `("email", "required|email")`
    pub fn set_rules<K, V, I>(&mut self, rules: I) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.rules = rules.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    pub fn rules(&self) -> &BTreeMap<String, String> {
        &self.rules
    }

    pub fn validate(&self) -> ModelResult<()> {
        validate_attributes(&self.attributes, &self.rules)
    }

    pub fn set_soft_deletes(&mut self, enabled: bool) -> &mut Self {
        self.soft_deletes = enabled;
        self
    }

    pub fn soft_deletes(&self) -> bool {
        self.soft_deletes
    }

    pub fn set_deleted_at_column(&mut self, column: &str) -> &mut Self {
        self.deleted_at_column = column.to_string();
        self
    }

    pub fn deleted_at_column(&self) -> &str {
        &self.deleted_at_column
    }

    /// Register a lifecycle hook; an `Err` aborts the operation
    pub fn on<F>(&mut self, event: EntityEvent, handler: F) -> &mut Self
    where
        F: Fn(&mut Entity) -> Result<(), crate::error::EventError> + Send + Sync + 'static,
    {
        self.events.entry(event).or_default().push(Arc::new(handler));
        self
    }

    pub(crate) fn fire(&mut self, event: EntityEvent) -> ModelResult<()> {
        let handlers = match self.events.get(&event) {
            Some(handlers) if !handlers.is_empty() => handlers.clone(),
            _ => return Ok(()),
        };
        tracing::trace!("Firing {} on '{}'", event, self.table);
        for handler in handlers {
            handler(self)?;
        }
        Ok(())
    }

    /// Relations to load eagerly, by name
    pub fn with<S: AsRef<str>>(&mut self, relations: &[S]) -> &mut Self {
        for relation in relations {
            let relation = relation.as_ref().trim();
            if !relation.is_empty() && !self.with.iter().any(|w| w == relation) {
                self.with.push(relation.to_string());
            }
        }
        self
    }

    pub fn eager_loads(&self) -> &[String] {
        &self.with
    }

    /// Attributes plus every eagerly loaded relation, keyed by name
    pub fn to_json(&self) -> JsonValue {
        let mut object = serde_json::Map::new();
        for (key, value) in &self.attributes {
            object.insert(key.clone(), value.to_json());
        }
        for name in &self.with {
            if let Some(value) = self.loaded_relation(name) {
                object.insert(name.clone(), value.to_json());
            }
        }
        JsonValue::Object(object)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("attributes", &self.attributes)
            .field("dirty", &self.get_dirty().len())
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .field("soft_deletes", &self.soft_deletes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EventError;
    use crate::row;

    fn persisted() -> Entity {
        let mut entity = Entity::detached("users");
        entity.fill(row! {"id" => 1, "name" => "a", "age" => 1});
        entity.sync_original();
        entity
    }

    #[test]
    fn test_dirty_diff() {
        let mut entity = persisted();
        assert!(!entity.is_dirty());

        entity.fill([("name", "b")]);
        assert!(entity.is_dirty());
        assert_eq!(entity.get_dirty(), row! {"name" => "b"});

        // Same string form is not a change
        entity.set("age", "1");
        assert_eq!(entity.get_dirty().len(), 1);

        entity.set("email", "b@example.com");
        assert_eq!(entity.get_dirty().len(), 2);
    }

    #[test]
    fn test_key_and_newness() {
        let mut entity = Entity::detached("users");
        assert!(entity.is_new());
        entity.set("id", Value::Null);
        assert!(entity.is_new());
        entity.set("id", 5);
        assert!(!entity.is_new());
        assert_eq!(entity.get_key(), Some(&Value::Int(5)));

        entity.set_primary_key("uuid");
        assert!(entity.is_new());
        assert_eq!(entity.unset("id"), Some(Value::Int(5)));
        assert!(!entity.has("id"));
    }

    #[test]
    fn test_handlers_can_mutate_and_abort() {
        let mut entity = persisted();
        entity.on(EntityEvent::Saving, |e| {
            e.set("slug", "a-slug");
            Ok(())
        });
        entity.on(EntityEvent::Deleting, |_| Err(EventError::handler_failed("protected")));

        entity.fire(EntityEvent::Saving).unwrap();
        assert_eq!(entity.get("slug"), Some(&Value::from("a-slug")));
        assert!(matches!(entity.fire(EntityEvent::Deleting), Err(ModelError::Event(_))));
        assert!(entity.fire(EntityEvent::Created).is_ok());
    }

    #[test]
    fn test_with_deduplicates() {
        let mut entity = Entity::detached("users");
        entity.with(&["posts", "profile"]).with(&["posts", " "]);
        assert_eq!(entity.eager_loads(), ["posts".to_string(), "profile".to_string()]);
    }

    #[test]
    fn test_to_json_and_validation() {
        let mut entity = persisted();
        assert_eq!(entity.to_json(), serde_json::json!({"id": 1, "name": "a", "age": 1}));

        entity.set_rules([("name", "required|min:2")]);
        assert!(matches!(entity.validate(), Err(ModelError::Validation(_))));
        entity.set("name", "ab");
        assert!(entity.validate().is_ok());
    }

    #[tokio::test]
    async fn test_detached_entity_cannot_persist() {
        let mut entity = Entity::detached("users");
        entity.set("name", "x");
        assert!(matches!(entity.save().await, Err(ModelError::Connection(_))));
    }
}
