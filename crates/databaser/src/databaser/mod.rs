//! The `Databaser` dispatch object
//!
//! One `Databaser` owns the statement state of a logical caller (a request,
//! a job) and runs every statement through the same pipeline: existence
//! check, compile, event, cache lookup, driver call, cache write, event,
//! state reset. Which driver family does the talking is decided by
//! configuration; callers only see this type.

pub mod cache_key;
mod cached_rows;
mod connection_cache;
mod pending;
mod state;

pub use cache_key::{cache_key, guess_table, php_serialize, UNKNOWN_TABLE};
pub use connection_cache::{ConnectionCache, SharedConnection};
pub use pending::PendingQuery;
pub use state::{ExecutionData, StatementState};

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use dotapp_cache::CacheDriver;
use parking_lot::Mutex;
use serde_json::json;

use self::cached_rows::{decode_rows, encode_rows};
use crate::backends::{driver_for, Driver};
use crate::collection::{Collection, CollectionItem};
use crate::config::DatabaserConfig;
use crate::dialect::Dialect;
use crate::entity::{Entity, RelationDef};
use crate::error::{ModelError, OrmResult};
use crate::events::{self, EventDispatcher};
use crate::query::{CompiledQuery, QueryBuilder, RawBindings};
use crate::value::{Row, Value};

/// Result shape of row-returning statements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReturnType {
    /// Rows are hydrated into [`Entity`] values inside a [`Collection`]
    #[default]
    Orm,
    /// Rows are returned as plain column maps
    Raw,
}

impl fmt::Display for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnType::Orm => write!(f, "ORM"),
            ReturnType::Raw => write!(f, "RAW"),
        }
    }
}

impl FromStr for ReturnType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ORM" => Ok(ReturnType::Orm),
            "RAW" => Ok(ReturnType::Raw),
            other => Err(ModelError::Configuration(format!("unknown return type '{}'", other))),
        }
    }
}

/// What one `execute()` produced
#[derive(Debug, Clone)]
pub enum QueryOutput {
    Entities(Collection<Entity>),
    Rows(Vec<Row>),
    /// A statement without a result set
    Executed(ExecutionData),
    /// `create_table_if_not_exist` on a table that already exists
    Skipped,
}

impl QueryOutput {
    pub fn is_skipped(&self) -> bool {
        matches!(self, QueryOutput::Skipped)
    }

    pub fn into_entities(self) -> Option<Collection<Entity>> {
        match self {
            QueryOutput::Entities(collection) => Some(collection),
            _ => None,
        }
    }

    /// Plain rows regardless of mode; entities contribute their attributes
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            QueryOutput::Rows(rows) => rows,
            QueryOutput::Entities(collection) => collection
                .into_items()
                .into_iter()
                .map(|entity| entity.attributes().clone())
                .collect(),
            QueryOutput::Executed(_) | QueryOutput::Skipped => Vec::new(),
        }
    }
}

#[derive(Clone)]
struct ActiveConnection {
    name: String,
    dialect: Dialect,
    handle: SharedConnection,
}

enum Outcome {
    Rows(Vec<Row>),
    Executed(crate::backends::ExecResult),
}

/// Driver-agnostic entry point to the query core
pub struct Databaser {
    config: DatabaserConfig,
    driver: Arc<dyn Driver>,
    connections: Arc<ConnectionCache>,
    active: Mutex<Option<ActiveConnection>>,
    state: Mutex<StatementState>,
    return_type: Mutex<ReturnType>,
    cache: Option<Arc<dyn CacheDriver>>,
    events: Arc<EventDispatcher>,
    relations: DashMap<String, BTreeMap<String, RelationDef>>,
}

impl Databaser {
    /// Build a `Databaser` with the driver named by `config.driver`
    pub fn new(config: DatabaserConfig) -> Self {
        let driver = driver_for(config.driver);
        Self {
            config,
            driver,
            connections: Arc::new(ConnectionCache::new()),
            active: Mutex::new(None),
            state: Mutex::new(StatementState::default()),
            return_type: Mutex::new(ReturnType::default()),
            cache: None,
            events: Arc::new(EventDispatcher::new()),
            relations: DashMap::new(),
        }
    }

    /// Validate `config`, build a shared `Databaser` and select the default database
    pub async fn connect(config: DatabaserConfig) -> OrmResult<Arc<Self>> {
        config.validate()?;
        let default = config.default_database.clone();
        let db = Arc::new(Self::new(config));
        db.select_db(&default).await?;
        Ok(db)
    }

    pub fn with_driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.driver = driver;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheDriver>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Share sessions with other `Databaser` instances of the same context
    pub fn with_connections(mut self, connections: Arc<ConnectionCache>) -> Self {
        self.connections = connections;
        self
    }

    pub fn with_events(mut self, events: Arc<EventDispatcher>) -> Self {
        self.events = events;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn config(&self) -> &DatabaserConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    pub fn cache(&self) -> Option<&Arc<dyn CacheDriver>> {
        self.cache.as_ref()
    }

    pub fn connections(&self) -> &Arc<ConnectionCache> {
        &self.connections
    }

    /// Make `name` the active database, reusing a cached session when possible
    pub async fn select_db(&self, name: &str) -> OrmResult<()> {
        let database = self
            .config
            .database(name)
            .ok_or_else(|| ModelError::Configuration(format!("unknown database '{}'", name)))?;
        let handle = self.connections.get_or_connect(self.driver.as_ref(), database).await?;
        *self.active.lock() = Some(ActiveConnection {
            name: database.name.clone(),
            dialect: database.dialect,
            handle,
        });
        tracing::debug!("Selected database '{}' ({})", database.name, database.dialect);
        Ok(())
    }

    /// Name of the active database
    pub fn database_name(&self) -> Option<String> {
        self.active.lock().as_ref().map(|active| active.name.clone())
    }

    /// Dialect new builders are created for.
    ///
    /// Falls back to the configured default database before a connection is
    /// selected, and to MySQL without any configuration.
    pub fn dialect(&self) -> Dialect {
        if let Some(active) = self.active.lock().as_ref() {
            return active.dialect;
        }
        self.config
            .database(&self.config.default_database)
            .map(|database| database.dialect)
            .unwrap_or(Dialect::MySql)
    }

    /// Empty builder on the active dialect
    pub fn builder(&self) -> QueryBuilder {
        QueryBuilder::new(self.dialect())
    }

    /// Start a statement: clears the statement state and lets `build` fill a
    /// fresh builder
    pub fn q<F>(self: &Arc<Self>, build: F) -> PendingQuery
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.reset_statement();
        PendingQuery::new(self.clone(), build(self.builder()), None)
    }

    /// Like [`q`](Self::q) for DDL; results always come back in RAW mode
    pub fn schema<F>(self: &Arc<Self>, build: F) -> PendingQuery
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.reset_statement();
        PendingQuery::new(self.clone(), build(self.builder()), Some(ReturnType::Raw))
    }

    /// Hand-written SQL with positional or named bindings
    pub fn raw(self: &Arc<Self>, sql: &str, bindings: impl Into<RawBindings>) -> PendingQuery {
        let bindings = bindings.into();
        self.q(move |qb| qb.raw(sql, bindings))
    }

    /// Default result shape of later statements
    pub fn set_return_type(&self, return_type: ReturnType) -> &Self {
        *self.return_type.lock() = return_type;
        self
    }

    pub fn return_type(&self) -> ReturnType {
        *self.return_type.lock()
    }

    /// Last statement handed to the driver
    pub fn get_query(&self) -> Option<CompiledQuery> {
        self.state.lock().last_query.clone()
    }

    /// Snapshot of the statement state
    pub fn statement(&self) -> StatementState {
        self.state.lock().clone()
    }

    pub fn execution_data(&self) -> ExecutionData {
        self.state.lock().execution_data.clone()
    }

    pub fn inserted_id(&self) -> Option<i64> {
        self.state.lock().execution_data.insert_id
    }

    pub fn affected_rows(&self) -> u64 {
        self.state.lock().execution_data.affected_rows
    }

    /// Rows of an execution result
    pub fn fetch_array(&self, output: &QueryOutput) -> Vec<Row> {
        output.clone().into_rows()
    }

    /// First row of an execution result
    pub fn fetch_first(&self, output: &QueryOutput) -> Option<Row> {
        match output {
            QueryOutput::Rows(rows) => rows.first().cloned(),
            QueryOutput::Entities(collection) => collection
                .items()
                .first()
                .map(|entity| entity.attributes().clone()),
            QueryOutput::Executed(_) | QueryOutput::Skipped => None,
        }
    }

    /// Unsaved entity bound to this `Databaser`
    pub fn new_entity(self: &Arc<Self>, table: &str) -> Entity {
        Entity::new(self.clone(), table)
    }

    /// Collection over already materialised items
    pub fn new_collection<T: CollectionItem>(self: &Arc<Self>, items: Vec<T>) -> Collection<T> {
        Collection::from_items(Some(self.clone()), items)
    }

    /// Collection that runs `builder` on first access
    pub fn new_query_collection<T: CollectionItem>(self: &Arc<Self>, builder: QueryBuilder) -> Collection<T> {
        Collection::from_query(self.clone(), builder)
    }

    /// Relation definitions resolvable by name on every entity of `table`
    pub fn define_relation(&self, table: &str, name: &str, relation: RelationDef) {
        self.relations
            .entry(table.to_string())
            .or_default()
            .insert(name.to_string(), relation);
    }

    pub fn relation_def(&self, table: &str, name: &str) -> Option<RelationDef> {
        self.relations.get(table).and_then(|defs| defs.get(name).cloned())
    }

    pub async fn transaction(&self) -> OrmResult<()> {
        let active = self.active_connection()?;
        active.handle.lock().await.begin().await?;
        self.state.lock().transaction = true;
        tracing::debug!("Transaction started on '{}'", active.name);
        Ok(())
    }

    pub async fn commit(&self) -> OrmResult<()> {
        let active = self.active_connection()?;
        active.handle.lock().await.commit().await?;
        self.state.lock().transaction = false;
        tracing::debug!("Transaction committed on '{}'", active.name);
        Ok(())
    }

    pub async fn rollback(&self) -> OrmResult<()> {
        let active = self.active_connection()?;
        let result = active.handle.lock().await.rollback().await;
        self.state.lock().transaction = false;
        result?;
        tracing::debug!("Transaction rolled back on '{}'", active.name);
        Ok(())
    }

    /// Run `operations` inside a transaction: commit on `Ok`, roll back on `Err`
    pub async fn transact<F, Fut, T>(self: &Arc<Self>, operations: F) -> OrmResult<T>
    where
        F: FnOnce(Arc<Databaser>) -> Fut,
        Fut: Future<Output = OrmResult<T>>,
    {
        self.transaction().await?;
        match operations(self.clone()).await {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback().await {
                    tracing::error!("Rollback after failed transaction also failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    /// Evict every cached result of `table`.
    ///
    /// Without a cache this is a no-op; a cache that cannot delete by
    /// pattern is an error.
    pub async fn invalidate_table(&self, table: &str) -> OrmResult<()> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };
        let removed = cache.delete_keys(&format!("{}:*", table)).await?;
        tracing::debug!("Invalidated {} cached result(s) of '{}'", removed, table);
        Ok(())
    }

    /// Close the active session and forget it
    pub async fn disconnect(&self) -> OrmResult<()> {
        let active = self.active.lock().take();
        if let Some(active) = active {
            self.connections.close(self.driver.kind(), &active.name).await?;
        }
        Ok(())
    }

    fn active_connection(&self) -> OrmResult<ActiveConnection> {
        self.active
            .lock()
            .clone()
            .ok_or_else(|| ModelError::Connection("no database selected".to_string()))
    }

    fn reset_statement(&self) {
        self.state.lock().reset();
    }

    /// The execution pipeline shared by every statement
    pub(crate) async fn run(
        self: &Arc<Self>,
        builder: QueryBuilder,
        return_type: ReturnType,
        with: &[String],
    ) -> OrmResult<QueryOutput> {
        let active = self.active_connection()?;
        let mut builder = builder;

        if let Some((sql, bindings)) = builder.existence_check() {
            let existence = QueryBuilder::new(active.dialect).raw(&sql, bindings).get_query()?;
            let rows = active.handle.lock().await.fetch_all(&existence).await?;
            builder = builder.resolve_if_not_exist(!rows.is_empty());
        }

        let compiled = builder.get_query()?;
        if compiled.is_empty() {
            self.reset_statement();
            if compiled.query_parts.if_not_exist_used {
                tracing::debug!("Table already exists, skipping CREATE TABLE");
                return Ok(QueryOutput::Skipped);
            }
            return Err(ModelError::Query("statement compiled to an empty query".to_string()));
        }

        let table = guess_table(&compiled.query);
        self.state.lock().record(&compiled, &table);
        self.events.trigger(
            events::EXECUTE,
            &json!({
                "table": table,
                "query": compiled.query,
                "bindings": compiled.bindings.iter().map(Value::to_json).collect::<Vec<_>>(),
            }),
        );

        let returns_rows = compiled.returns_rows();
        let key = compiled
            .is_cacheable()
            .then(|| cache_key(&table, return_type, &compiled.query, &compiled.bindings));

        if let Some(rows) = self.cached_rows(key.as_deref()).await {
            let data = ExecutionData {
                affected_rows: 0,
                insert_id: None,
                num_rows: rows.len(),
                query: compiled.query.clone(),
                bindings: compiled.bindings.clone(),
            };
            self.finish(&table, true, data);
            return self.materialize(Outcome::Rows(rows), &table, return_type, with).await;
        }

        tracing::debug!("Executing on '{}': {}", active.name, compiled.query);
        let result = {
            let mut connection = active.handle.lock().await;
            if returns_rows {
                connection.fetch_all(&compiled).await.map(Outcome::Rows)
            } else {
                connection.execute(&compiled).await.map(Outcome::Executed)
            }
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                let (error, errno) = match &err {
                    ModelError::Execution { error, errno } => (error.clone(), errno.clone()),
                    other => (other.to_string(), "0".to_string()),
                };
                tracing::error!("Query on '{}' failed: {}", table, error);
                self.events.trigger(
                    events::EXECUTE_ERROR,
                    &json!({"table": table, "error": error, "errno": errno}),
                );
                self.reset_statement();
                return Err(err);
            }
        };

        let data = match &outcome {
            Outcome::Rows(rows) => ExecutionData {
                affected_rows: rows.len() as u64,
                insert_id: None,
                num_rows: rows.len(),
                query: compiled.query.clone(),
                bindings: compiled.bindings.clone(),
            },
            Outcome::Executed(result) => ExecutionData {
                affected_rows: result.affected_rows,
                insert_id: result.last_insert_id,
                num_rows: 0,
                query: compiled.query.clone(),
                bindings: compiled.bindings.clone(),
            },
        };

        if let (Some(key), Outcome::Rows(rows)) = (key.as_deref(), &outcome) {
            self.store_rows(key, rows).await;
        }
        if compiled.is_write() {
            self.evict_after_write(&table).await;
        }

        self.finish(&table, false, data);
        self.materialize(outcome, &table, return_type, with).await
    }

    async fn cached_rows(&self, key: Option<&str>) -> Option<Vec<Row>> {
        let (cache, key) = (self.cache.as_ref()?, key?);
        match cache.get(key).await {
            Ok(Some(bytes)) => match decode_rows(&bytes) {
                Ok(rows) => {
                    tracing::debug!("Cache hit for {}", key);
                    Some(rows)
                }
                Err(e) => {
                    tracing::warn!("Ignoring undecodable cache entry {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Cache lookup for {} failed: {}", key, e);
                None
            }
        }
    }

    async fn store_rows(&self, key: &str, rows: &[Row]) {
        let Some(cache) = &self.cache else {
            return;
        };
        if rows.is_empty() {
            return;
        }
        let bytes = match encode_rows(rows) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Could not encode rows for cache key {}: {}", key, e);
                return;
            }
        };
        match cache.set(key, bytes, Some(self.config.cache_ttl)).await {
            Ok(()) => tracing::debug!("Cached {} row(s) under {}", rows.len(), key),
            Err(e) => tracing::warn!("Cache write for {} failed: {}", key, e),
        }
    }

    /// Cached reads of a table go stale once a statement writes to it
    async fn evict_after_write(&self, table: &str) {
        let Some(cache) = &self.cache else {
            return;
        };
        match cache.delete_keys(&format!("{}:*", table)).await {
            Ok(0) => {}
            Ok(removed) => tracing::debug!("Write to '{}' evicted {} cached result(s)", table, removed),
            Err(e) => tracing::warn!("Could not evict cached results of '{}': {}", table, e),
        }
    }

    /// Record the execution, notify listeners and clear the statement
    fn finish(&self, table: &str, cached: bool, data: ExecutionData) {
        let payload = json!({
            "table": table,
            "cached": cached,
            "execution_data": data.to_json(),
        });
        {
            let mut state = self.state.lock();
            state.execution_data = data;
            state.reset();
        }
        self.events.trigger(events::EXECUTE_SUCCESS, &payload);
    }

    async fn materialize(
        self: &Arc<Self>,
        outcome: Outcome,
        table: &str,
        return_type: ReturnType,
        with: &[String],
    ) -> OrmResult<QueryOutput> {
        let rows = match outcome {
            Outcome::Executed(_) => return Ok(QueryOutput::Executed(self.execution_data())),
            Outcome::Rows(rows) => rows,
        };
        match return_type {
            ReturnType::Raw => Ok(QueryOutput::Rows(rows)),
            ReturnType::Orm => {
                let mut entities = Vec::with_capacity(rows.len());
                for row in rows {
                    let mut entity = Entity::from_row(self.clone(), table, row);
                    entity.with(with);
                    entity.load_relations().await?;
                    entities.push(entity);
                }
                Ok(QueryOutput::Entities(
                    Collection::from_items(Some(self.clone()), entities).with_table(table),
                ))
            }
        }
    }
}

impl fmt::Debug for Databaser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Databaser")
            .field("driver", &self.driver.kind())
            .field("database", &self.database_name())
            .field("return_type", &self.return_type())
            .field("cache", &self.cache.is_some())
            .finish()
    }
}
