//! Recording in-memory driver for execution-layer tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dotapp_databaser::{
    CompiledQuery, DatabaseConfig, DatabaseConnection, Databaser, DatabaserConfig, Dialect, Driver, DriverKind,
    ExecResult, ModelError, OrmResult, Row, Value,
};
use parking_lot::Mutex;

pub type Responder = Arc<dyn Fn(&str, &[Value]) -> Vec<Row> + Send + Sync>;

/// Everything the mock connection saw
#[derive(Default)]
pub struct MockLog {
    pub statements: Mutex<Vec<(String, Vec<Value>)>>,
    pub transactions: Mutex<Vec<&'static str>>,
    pub connects: AtomicUsize,
    pub fetches: AtomicUsize,
    pub executes: AtomicUsize,
}

impl MockLog {
    pub fn sql(&self) -> Vec<String> {
        self.statements.lock().iter().map(|(sql, _)| sql.clone()).collect()
    }

    pub fn last(&self) -> (String, Vec<Value>) {
        self.statements.lock().last().cloned().expect("a statement was run")
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn executes(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct MockDriver {
    pub log: Arc<MockLog>,
    responder: Responder,
    insert_id: Option<i64>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            log: Arc::new(MockLog::default()),
            responder: Arc::new(|_, _| Vec::new()),
            insert_id: None,
        }
    }

    /// Rows returned for every row-producing statement
    pub fn respond<F>(mut self, responder: F) -> Self
    where
        F: Fn(&str, &[Value]) -> Vec<Row> + Send + Sync + 'static,
    {
        self.responder = Arc::new(responder);
        self
    }

    pub fn insert_id(mut self, id: i64) -> Self {
        self.insert_id = Some(id);
        self
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Pdo
    }

    async fn connect(&self, config: &DatabaseConfig) -> OrmResult<Box<dyn DatabaseConnection>> {
        self.log.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            dialect: config.dialect,
            log: self.log.clone(),
            responder: self.responder.clone(),
            insert_id: self.insert_id,
            in_transaction: false,
        }))
    }
}

pub struct MockConnection {
    dialect: Dialect,
    log: Arc<MockLog>,
    responder: Responder,
    insert_id: Option<i64>,
    in_transaction: bool,
}

impl MockConnection {
    fn record(&self, query: &CompiledQuery) -> OrmResult<()> {
        self.log
            .statements
            .lock()
            .push((query.query.clone(), query.bindings.clone()));
        if query.query.contains("broken_table") {
            return Err(ModelError::Execution {
                error: "Table 'app.broken_table' doesn't exist".to_string(),
                errno: "42S02".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DatabaseConnection for MockConnection {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn execute(&mut self, query: &CompiledQuery) -> OrmResult<ExecResult> {
        self.log.executes.fetch_add(1, Ordering::SeqCst);
        self.record(query)?;
        let is_insert = query.query.starts_with("INSERT");
        Ok(ExecResult {
            affected_rows: 1,
            last_insert_id: if is_insert { self.insert_id } else { None },
        })
    }

    async fn fetch_all(&mut self, query: &CompiledQuery) -> OrmResult<Vec<Row>> {
        self.log.fetches.fetch_add(1, Ordering::SeqCst);
        self.record(query)?;
        Ok((self.responder)(&query.query, &query.bindings))
    }

    async fn begin(&mut self) -> OrmResult<()> {
        self.in_transaction = true;
        self.log.transactions.lock().push("begin");
        Ok(())
    }

    async fn commit(&mut self) -> OrmResult<()> {
        self.in_transaction = false;
        self.log.transactions.lock().push("commit");
        Ok(())
    }

    async fn rollback(&mut self) -> OrmResult<()> {
        self.in_transaction = false;
        self.log.transactions.lock().push("rollback");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    async fn close(&mut self) -> OrmResult<()> {
        Ok(())
    }
}

pub fn config(url: &str) -> DatabaserConfig {
    DatabaserConfig::new(DriverKind::Pdo).with_database(DatabaseConfig::from_url("main", url).unwrap())
}

/// `Databaser` on a mock MySQL connection
pub async fn databaser(driver: &MockDriver) -> Arc<Databaser> {
    databaser_for(driver, "mysql://localhost/app").await
}

pub async fn databaser_for(driver: &MockDriver, url: &str) -> Arc<Databaser> {
    let db = Databaser::new(config(url))
        .with_driver(Arc::new(driver.clone()))
        .shared();
    db.select_db("main").await.unwrap();
    db
}
