//! Row decoding per native driver
//!
//! Columns are read by the type the server reports for them. Temporal
//! values become `Y-m-d H:i:s` style strings, DECIMAL/NUMERIC stay exact as
//! text, and JSON is kept as its serialized form.

use sqlx::mysql::MySqlRow;
use sqlx::postgres::{PgRow, PgValueFormat, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row as SqlxRow, TypeInfo, ValueRef};

use crate::error::{ModelError, OrmResult};
use crate::value::{Row, Value};

fn decode_columns<R, F>(row: &R, decode: F) -> OrmResult<Row>
where
    R: SqlxRow,
    F: Fn(&R, usize, &str) -> OrmResult<Value>,
{
    let mut decoded = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        decoded.insert(column.name().to_string(), decode(row, index, column.type_info().name())?);
    }
    Ok(decoded)
}

pub(crate) fn mysql_row(row: &MySqlRow) -> OrmResult<Row> {
    decode_columns(row, |row, index, _| mysql_value(row, index))
}

pub(crate) fn postgres_row(row: &PgRow) -> OrmResult<Row> {
    decode_columns(row, postgres_value)
}

pub(crate) fn sqlite_row(row: &SqliteRow) -> OrmResult<Row> {
    decode_columns(row, |row, index, _| sqlite_value(row, index))
}

fn mysql_value(row: &MySqlRow, index: usize) -> OrmResult<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    if let Ok(v) = row.try_get::<i64, _>(index) {
        return Ok(Value::Int(v));
    }
    if let Ok(v) = row.try_get::<u64, _>(index) {
        return Ok(i64::try_from(v).map(Value::Int).unwrap_or_else(|_| Value::String(v.to_string())));
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return Ok(Value::Float(v));
    }
    if let Ok(v) = row.try_get::<f32, _>(index) {
        return Ok(Value::Float(v.into()));
    }
    if let Ok(v) = row.try_get::<chrono::NaiveDateTime, _>(index) {
        return Ok(Value::from(v));
    }
    if let Ok(v) = row.try_get::<chrono::NaiveDate, _>(index) {
        return Ok(Value::String(v.format("%Y-%m-%d").to_string()));
    }
    if let Ok(v) = row.try_get::<chrono::NaiveTime, _>(index) {
        return Ok(Value::String(v.format("%H:%M:%S").to_string()));
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return Ok(Value::String(v));
    }
    if let Ok(v) = row.try_get::<serde_json::Value, _>(index) {
        return Ok(Value::String(v.to_string()));
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(index) {
        return Ok(Value::Bytes(v));
    }
    // DECIMAL and friends arrive as text on the wire
    Ok(Value::String(row.try_get_unchecked::<String, _>(index)?))
}

fn postgres_value(row: &PgRow, index: usize, type_name: &str) -> OrmResult<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let value = match type_name {
        "BOOL" => Value::Bool(row.try_get(index)?),
        "INT2" => Value::Int(row.try_get::<i16, _>(index)?.into()),
        "INT4" => Value::Int(row.try_get::<i32, _>(index)?.into()),
        "INT8" => Value::Int(row.try_get(index)?),
        "FLOAT4" => Value::Float(row.try_get::<f32, _>(index)?.into()),
        "FLOAT8" => Value::Float(row.try_get(index)?),
        "BYTEA" => Value::Bytes(row.try_get(index)?),
        "UUID" => Value::String(row.try_get::<uuid::Uuid, _>(index)?.to_string()),
        "TIMESTAMP" => Value::from(row.try_get::<chrono::NaiveDateTime, _>(index)?),
        "TIMESTAMPTZ" => Value::from(row.try_get::<chrono::DateTime<chrono::Utc>, _>(index)?.naive_utc()),
        "DATE" => Value::String(row.try_get::<chrono::NaiveDate, _>(index)?.format("%Y-%m-%d").to_string()),
        "TIME" => Value::String(row.try_get::<chrono::NaiveTime, _>(index)?.format("%H:%M:%S").to_string()),
        "JSON" | "JSONB" => Value::String(row.try_get::<serde_json::Value, _>(index)?.to_string()),
        "NUMERIC" => Value::String(postgres_numeric(&raw)?),
        _ => match row.try_get::<String, _>(index) {
            Ok(text) => Value::String(text),
            Err(_) => Value::String(postgres_text(&raw, type_name)?),
        },
    };
    Ok(value)
}

fn postgres_text(raw: &PgValueRef<'_>, type_name: &str) -> OrmResult<String> {
    if !matches!(raw.format(), PgValueFormat::Text) {
        return Err(ModelError::Serialization(format!(
            "cannot decode PostgreSQL column of type {}",
            type_name
        )));
    }
    raw.as_str()
        .map(str::to_string)
        .map_err(|e| ModelError::Serialization(e.to_string()))
}

fn postgres_numeric(raw: &PgValueRef<'_>) -> OrmResult<String> {
    if matches!(raw.format(), PgValueFormat::Text) {
        return postgres_text(raw, "NUMERIC");
    }
    let bytes = raw.as_bytes().map_err(|e| ModelError::Serialization(e.to_string()))?;
    numeric_to_string(bytes).ok_or_else(|| ModelError::Serialization("malformed NUMERIC value".to_string()))
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;

/// Render the binary NUMERIC format (base-10000 digit groups) as decimal text
pub(crate) fn numeric_to_string(bytes: &[u8]) -> Option<String> {
    let word = |i: usize| bytes.get(i * 2..i * 2 + 2).map(|b| u16::from_be_bytes([b[0], b[1]]));

    let ndigits = usize::from(word(0)?);
    let weight = i64::from(word(1)? as i16);
    let sign = word(2)?;
    let dscale = usize::from(word(3)?);
    if sign == NUMERIC_NAN {
        return Some("NaN".to_string());
    }
    let groups: Vec<u16> = (0..ndigits).map(|i| word(4 + i)).collect::<Option<_>>()?;
    let group = |position: i64| -> u16 {
        usize::try_from(position)
            .ok()
            .and_then(|p| groups.get(p).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&group(0).to_string());
        for position in 1..=weight {
            out.push_str(&format!("{:04}", group(position)));
        }
    }
    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut position = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", group(position)));
            position += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Some(out)
}

/// SQLite values are decoded by their storage class, not the declared type
fn sqlite_value(row: &SqliteRow, index: usize) -> OrmResult<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let storage = raw.type_info().name().to_string();
    let value = match storage.as_str() {
        "INTEGER" => Value::Int(row.try_get_unchecked(index)?),
        "REAL" => Value::Float(row.try_get_unchecked(index)?),
        "BLOB" => Value::Bytes(row.try_get_unchecked(index)?),
        _ => Value::String(row.try_get_unchecked(index)?),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(words: &[u16]) -> Option<String> {
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
        numeric_to_string(&bytes)
    }

    #[test]
    fn test_numeric_rendering() {
        // ndigits, weight, sign, dscale, groups...
        assert_eq!(numeric(&[2, 0, 0, 2, 12, 5000]).as_deref(), Some("12.50"));
        assert_eq!(numeric(&[1, 1, 0, 0, 1]).as_deref(), Some("10000"));
        assert_eq!(numeric(&[1, 0xFFFF, NUMERIC_NEG, 3, 500]).as_deref(), Some("-0.050"));
        assert_eq!(numeric(&[0, 0, 0, 0]).as_deref(), Some("0"));
        assert_eq!(numeric(&[3, 1, 0, 4, 12, 3456, 7800]).as_deref(), Some("123456.7800"));
        assert_eq!(numeric(&[0, 0, NUMERIC_NAN, 0]).as_deref(), Some("NaN"));
        assert_eq!(numeric(&[2, 0, 0, 0, 7]), None);
    }
}
