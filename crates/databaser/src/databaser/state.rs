//! Instance-scoped statement state

use serde_json::{json, Value as JsonValue};

use crate::query::{CompiledQuery, QueryParts, QueryType};
use crate::value::Value;

/// Outcome of the last statement that reached the database
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionData {
    pub affected_rows: u64,
    pub insert_id: Option<i64>,
    pub num_rows: usize,
    pub query: String,
    pub bindings: Vec<Value>,
}

impl ExecutionData {
    pub fn to_json(&self) -> JsonValue {
        json!({
            "affected_rows": self.affected_rows,
            "insert_id": self.insert_id,
            "num_rows": self.num_rows,
            "query": self.query,
            "bindings": self.bindings.iter().map(Value::to_json).collect::<Vec<_>>(),
        })
    }
}

/// What a `Databaser` remembers between `q()` and the end of `execute()`
#[derive(Debug, Clone, Default)]
pub struct StatementState {
    pub execution_type: QueryType,
    pub query_parts: QueryParts,
    pub bindings: Vec<Value>,
    pub binding_types: String,
    /// Best-effort table name of the statement being run
    pub table: Option<String>,
    pub execution_data: ExecutionData,
    pub last_query: Option<CompiledQuery>,
    pub transaction: bool,
}

impl StatementState {
    /// Clear the builder-derived fields. Execution data, the last query and
    /// the transaction flag describe the session and survive.
    pub fn reset(&mut self) {
        self.execution_type = QueryType::default();
        self.query_parts = QueryParts::default();
        self.bindings.clear();
        self.binding_types.clear();
        self.table = None;
    }

    pub(crate) fn record(&mut self, compiled: &CompiledQuery, table: &str) {
        self.execution_type = compiled.query_parts.kind;
        self.query_parts = compiled.query_parts.clone();
        self.bindings = compiled.bindings.clone();
        self.binding_types = compiled.types.clone();
        self.table = Some(table.to_string());
        self.last_query = Some(compiled.clone());
    }
}
