//! Wire form of row sets kept in the result cache
//!
//! Every cell carries its type so a cache hit yields exactly the rows the
//! driver returned: bytes travel as hex and floats as their shortest
//! round-trip text, which also covers NaN and the infinities.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, OrmResult};
use crate::value::{Row, Value};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "lowercase")]
enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(String),
    Str(String),
    Bytes(String),
}

impl From<&Value> for Cell {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Cell::Null,
            Value::Bool(b) => Cell::Bool(*b),
            Value::Int(i) => Cell::Int(*i),
            Value::Float(f) => Cell::Float(f.to_string()),
            Value::String(s) => Cell::Str(s.clone()),
            Value::Bytes(b) => Cell::Bytes(hex::encode(b)),
        }
    }
}

impl TryFrom<Cell> for Value {
    type Error = ModelError;

    fn try_from(cell: Cell) -> Result<Self, Self::Error> {
        Ok(match cell {
            Cell::Null => Value::Null,
            Cell::Bool(b) => Value::Bool(b),
            Cell::Int(i) => Value::Int(i),
            Cell::Float(text) => Value::Float(
                text.parse()
                    .map_err(|_| ModelError::Serialization(format!("cached float '{}' is malformed", text)))?,
            ),
            Cell::Str(s) => Value::String(s),
            Cell::Bytes(encoded) => Value::Bytes(
                hex::decode(&encoded).map_err(|e| ModelError::Serialization(format!("cached bytes: {}", e)))?,
            ),
        })
    }
}

pub(crate) fn encode_rows(rows: &[Row]) -> OrmResult<Vec<u8>> {
    let cells: Vec<BTreeMap<&str, Cell>> = rows
        .iter()
        .map(|row| row.iter().map(|(k, v)| (k.as_str(), Cell::from(v))).collect())
        .collect();
    Ok(serde_json::to_vec(&cells)?)
}

pub(crate) fn decode_rows(bytes: &[u8]) -> OrmResult<Vec<Row>> {
    let cells: Vec<BTreeMap<String, Cell>> = serde_json::from_slice(bytes)?;
    cells
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(k, cell)| Ok((k, Value::try_from(cell)?)))
                .collect::<OrmResult<Row>>()
        })
        .collect()
}
