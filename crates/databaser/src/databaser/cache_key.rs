//! Result-cache keys and table labelling
//!
//! Keys follow `"{table}:{ORM|RAW}:" + md5(sql + serialize(bindings))` where
//! `serialize` is the PHP serialisation of the binding list, so entries stay
//! shareable with other DotApp processes using the same cache store.

use std::sync::OnceLock;

use md5::{Digest, Md5};
use regex::Regex;

use super::ReturnType;
use crate::value::Value;

/// Label used when no table can be read from the SQL
pub const UNKNOWN_TABLE: &str = "unknown_table";

fn table_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\b(?:FROM|UPDATE|INTO|TABLE)\s+[`"\[]?([A-Za-z0-9_]+)[`"\]]?(?:\.[`"\[]?([A-Za-z0-9_]+)[`"\]]?)?"#)
            .expect("valid regex")
    })
}

/// Best-effort table name of a compiled statement.
///
/// Plain text inspection: the first `FROM`/`UPDATE`/`INTO`/`TABLE` target
/// wins, so CTEs and multi-table statements may be labelled after an inner
/// table. Only cache keys and hydration labels depend on it.
pub fn guess_table(sql: &str) -> String {
    table_pattern()
        .captures(sql)
        .and_then(|caps| caps.get(2).or_else(|| caps.get(1)))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN_TABLE.to_string())
}

/// PHP `serialize()` of a list of bindings
pub fn php_serialize(bindings: &[Value]) -> String {
    let mut out = format!("a:{}:{{", bindings.len());
    for (index, value) in bindings.iter().enumerate() {
        out.push_str(&format!("i:{};", index));
        out.push_str(&serialize_value(value));
    }
    out.push('}');
    out
}

fn serialize_value(value: &Value) -> String {
    match value {
        Value::Null => "N;".to_string(),
        Value::Bool(b) => format!("b:{};", *b as u8),
        Value::Int(i) => format!("i:{};", i),
        Value::Float(f) => format!("d:{};", f),
        Value::String(s) => format!("s:{}:\"{}\";", s.len(), s),
        Value::Bytes(b) => format!("s:{}:\"{}\";", b.len(), String::from_utf8_lossy(b)),
    }
}

/// Cache key of one statement
pub fn cache_key(table: &str, return_type: ReturnType, sql: &str, bindings: &[Value]) -> String {
    let mut hasher = Md5::new();
    hasher.update(sql.as_bytes());
    hasher.update(php_serialize(bindings).as_bytes());
    format!("{}:{}:{}", table, return_type, hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_php_serialize_format() {
        let bindings = vec![Value::Int(5), Value::from("abc"), Value::Float(1.5), Value::Null];
        assert_eq!(php_serialize(&bindings), "a:4:{i:0;i:5;i:1;s:3:\"abc\";i:2;d:1.5;i:3;N;}");
        assert_eq!(php_serialize(&[]), "a:0:{}");
        // Length is in bytes, not characters
        assert_eq!(php_serialize(&[Value::from("é")]), "a:1:{i:0;s:2:\"é\";}");
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        let sql = "SELECT * FROM `users` WHERE `id` = ?";
        let a = cache_key("users", ReturnType::Orm, sql, &[Value::Int(1)]);
        let b = cache_key("users", ReturnType::Orm, sql, &[Value::Int(1)]);
        let c = cache_key("users", ReturnType::Orm, sql, &[Value::Int(2)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("users:ORM:"));
        assert_eq!(a.len(), "users:ORM:".len() + 32);
        assert_ne!(a, cache_key("users", ReturnType::Raw, sql, &[Value::Int(1)]));
    }

    #[test]
    fn test_md5_of_known_input() {
        // md5("SELECT 1" . "a:0:{}")
        let key = cache_key("t", ReturnType::Raw, "SELECT 1", &[]);
        let mut hasher = Md5::new();
        hasher.update(b"SELECT 1a:0:{}");
        assert_eq!(key, format!("t:RAW:{}", hex::encode(hasher.finalize())));
    }

    #[test]
    fn test_guess_table() {
        assert_eq!(guess_table("SELECT * FROM `users` WHERE `id` = ?"), "users");
        assert_eq!(guess_table("UPDATE \"posts\" SET \"title\" = ?"), "posts");
        assert_eq!(guess_table("INSERT INTO [audit].[events] ([kind]) VALUES (?)"), "events");
        assert_eq!(guess_table("DELETE FROM logs"), "logs");
        assert_eq!(guess_table("SELECT 1"), UNKNOWN_TABLE);
        assert_eq!(guess_table("SELECT updated_at FROM orders"), "orders");
    }
}
