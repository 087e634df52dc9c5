//! Query Builder Types - Core types and enums for query building

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::QueryError;
use crate::value::Value;

/// Comparison operators accepted by `where_condition` / `having`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    NotLike,
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOperator::Equal => write!(f, "="),
            QueryOperator::NotEqual => write!(f, "!="),
            QueryOperator::GreaterThan => write!(f, ">"),
            QueryOperator::GreaterThanOrEqual => write!(f, ">="),
            QueryOperator::LessThan => write!(f, "<"),
            QueryOperator::LessThanOrEqual => write!(f, "<="),
            QueryOperator::Like => write!(f, "LIKE"),
            QueryOperator::NotLike => write!(f, "NOT LIKE"),
        }
    }
}

impl FromStr for QueryOperator {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
        match normalized.as_str() {
            "=" => Ok(QueryOperator::Equal),
            "!=" | "<>" => Ok(QueryOperator::NotEqual),
            ">" => Ok(QueryOperator::GreaterThan),
            ">=" => Ok(QueryOperator::GreaterThanOrEqual),
            "<" => Ok(QueryOperator::LessThan),
            "<=" => Ok(QueryOperator::LessThanOrEqual),
            "LIKE" => Ok(QueryOperator::Like),
            "NOT LIKE" => Ok(QueryOperator::NotLike),
            _ => Err(QueryError::InvalidOperator(s.to_string())),
        }
    }
}

/// Boolean connective joining a condition to the ones before it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
}

impl fmt::Display for Connective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connective::And => write!(f, "AND"),
            Connective::Or => write!(f, "OR"),
        }
    }
}

/// Join types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER JOIN"),
            JoinType::Left => write!(f, "LEFT JOIN"),
            JoinType::Right => write!(f, "RIGHT JOIN"),
            JoinType::Full => write!(f, "FULL OUTER JOIN"),
            JoinType::Cross => write!(f, "CROSS JOIN"),
        }
    }
}

/// Order by direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// Set operations appended after the main statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperator {
    Union,
    UnionAll,
    Intersect,
    Except,
}

impl fmt::Display for SetOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetOperator::Union => write!(f, "UNION"),
            SetOperator::UnionAll => write!(f, "UNION ALL"),
            SetOperator::Intersect => write!(f, "INTERSECT"),
            SetOperator::Except => write!(f, "EXCEPT"),
        }
    }
}

/// Statement kind; exactly one body renderer fires per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryType {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
    Truncate,
    Raw,
    CreateTable,
    AlterTable,
    DropTable,
    CreateIndex,
}

impl QueryType {
    pub fn is_ddl(&self) -> bool {
        matches!(
            self,
            QueryType::CreateTable | QueryType::AlterTable | QueryType::DropTable | QueryType::CreateIndex
        )
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryType::Select => "SELECT",
            QueryType::Insert => "INSERT",
            QueryType::Update => "UPDATE",
            QueryType::Delete => "DELETE",
            QueryType::Truncate => "TRUNCATE",
            QueryType::Raw => "RAW",
            QueryType::CreateTable => "CREATE_TABLE",
            QueryType::AlterTable => "ALTER_TABLE",
            QueryType::DropTable => "DROP_TABLE",
            QueryType::CreateIndex => "CREATE_INDEX",
        };
        write!(f, "{}", name)
    }
}

/// Rendered SQL text together with the bindings its placeholders consume
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fragment {
    pub sql: String,
    pub bindings: Vec<Value>,
}

impl Fragment {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            bindings: Vec::new(),
        }
    }

    pub fn with_bindings(sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            bindings,
        }
    }
}

/// WHERE / HAVING entry
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub connective: Connective,
    pub fragment: Fragment,
}

/// `ON CONFLICT` / `ON DUPLICATE KEY` settings of an upsert
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictClause {
    pub target: Vec<String>,
    pub update: Vec<String>,
}

/// Ordered clause storage of one statement
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryParts {
    pub kind: QueryType,
    pub with: Vec<Fragment>,
    pub with_recursive: bool,
    pub select: Vec<Fragment>,
    pub distinct: bool,
    pub from: Option<Fragment>,
    /// Quoted target table of DML/DDL statements
    pub table: Option<String>,
    /// Quoted column names of INSERT/UPDATE/upsert
    pub columns: Vec<String>,
    /// INSERT value rows, or the single SET row of an UPDATE
    pub rows: Vec<Vec<Value>>,
    pub joins: Vec<Fragment>,
    pub wheres: Vec<Condition>,
    pub group_by: Vec<String>,
    pub havings: Vec<Condition>,
    pub order_by: Vec<Fragment>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub unions: Vec<(SetOperator, Fragment)>,
    /// Bare column names (unquoted) for RETURNING / OUTPUT
    pub returning: Vec<String>,
    pub conflict: Option<ConflictClause>,
    /// Raw SQL or DDL text
    pub body: Option<Fragment>,
    pub if_not_exist_used: bool,
    /// Unquoted table name awaiting an existence check before CREATE
    pub pending_existence_check: Option<String>,
}

/// Output of [`QueryBuilder::get_query`](super::QueryBuilder::get_query)
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub query: String,
    pub bindings: Vec<Value>,
    /// One type code (`i|d|s|b`) per binding
    pub types: String,
    pub query_parts: QueryParts,
}

const ROW_RETURNING_PREFIXES: [&str; 7] = ["SELECT", "WITH", "SHOW", "PRAGMA", "DESCRIBE", "EXPLAIN", "VALUES"];

const WRITE_KEYWORDS: [&str; 9] = [
    "INSERT", "UPDATE", "DELETE", "REPLACE", "MERGE", "UPSERT", "TRUNCATE", "DROP", "ALTER",
];

impl CompiledQuery {
    pub fn is_empty(&self) -> bool {
        self.query.trim().is_empty()
    }

    /// Whether the statement produces a result set (fetched rather than executed)
    pub fn returns_rows(&self) -> bool {
        match self.query_parts.kind {
            QueryType::Select => true,
            QueryType::Insert | QueryType::Update | QueryType::Delete => {
                !self.query_parts.returning.is_empty()
            }
            QueryType::Raw => {
                ROW_RETURNING_PREFIXES.contains(&self.leading_keyword().as_str())
                    || self.query.to_ascii_uppercase().contains(" RETURNING ")
            }
            _ => false,
        }
    }

    /// Whether the result set may be served from and stored in the result
    /// cache: plain reads only, never a statement that also writes or locks
    pub fn is_cacheable(&self) -> bool {
        match self.query_parts.kind {
            QueryType::Select => !self.mentions_write(),
            QueryType::Raw => matches!(self.leading_keyword().as_str(), "SELECT" | "WITH") && !self.mentions_write(),
            _ => false,
        }
    }

    /// Whether the statement changes the rows of its table
    pub fn is_write(&self) -> bool {
        match self.query_parts.kind {
            QueryType::Insert
            | QueryType::Update
            | QueryType::Delete
            | QueryType::Truncate
            | QueryType::AlterTable
            | QueryType::DropTable => true,
            QueryType::Raw => {
                let head = self.leading_keyword();
                WRITE_KEYWORDS.contains(&head.as_str()) || (head == "WITH" && self.mentions_write())
            }
            _ => false,
        }
    }

    fn leading_keyword(&self) -> String {
        self.query
            .trim_start()
            .split(|c: char| c.is_whitespace() || c == '(')
            .next()
            .unwrap_or("")
            .to_ascii_uppercase()
    }

    /// Any write or locking keyword outside of quoted identifiers and literals
    fn mentions_write(&self) -> bool {
        let mut quote: Option<char> = None;
        let mut word = String::new();
        let mut found = false;
        for c in self.query.chars().chain(std::iter::once(' ')) {
            if let Some(q) = quote {
                if c == q {
                    quote = None;
                }
                continue;
            }
            if c.is_ascii_alphanumeric() || c == '_' {
                word.push(c.to_ascii_uppercase());
                continue;
            }
            found |= WRITE_KEYWORDS.contains(&word.as_str()) || word == "RETURNING";
            word.clear();
            if matches!(c, '\'' | '"' | '`') {
                quote = Some(c);
            }
        }
        found
    }
}

/// Bindings handed to [`QueryBuilder::raw`](super::QueryBuilder::raw)
#[derive(Debug, Clone, PartialEq)]
pub enum RawBindings {
    Positional(Vec<Value>),
    Named(BTreeMap<String, Value>),
}

impl RawBindings {
    pub fn none() -> Self {
        RawBindings::Positional(Vec::new())
    }

    pub fn named<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        RawBindings::Named(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<Vec<Value>> for RawBindings {
    fn from(values: Vec<Value>) -> Self {
        RawBindings::Positional(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_whitelist() {
        assert_eq!("<>".parse::<QueryOperator>().unwrap(), QueryOperator::NotEqual);
        assert_eq!("not  like".parse::<QueryOperator>().unwrap(), QueryOperator::NotLike);
        assert!("=>".parse::<QueryOperator>().is_err());
        assert!("= 1 OR 1 =".parse::<QueryOperator>().is_err());
    }

    fn compiled(kind: QueryType, query: &str) -> CompiledQuery {
        CompiledQuery {
            query: query.to_string(),
            bindings: Vec::new(),
            types: String::new(),
            query_parts: QueryParts { kind, ..Default::default() },
        }
    }

    #[test]
    fn test_returns_rows() {
        assert!(compiled(QueryType::Select, "SELECT 1").returns_rows());
        assert!(compiled(QueryType::Raw, "  select * from t").returns_rows());
        assert!(compiled(QueryType::Raw, "INSERT INTO t (a) VALUES (?) RETURNING id").returns_rows());
        assert!(!compiled(QueryType::Raw, "DELETE FROM t").returns_rows());
        assert!(!compiled(QueryType::Insert, "INSERT INTO t (a) VALUES (?)").returns_rows());
    }

    #[test]
    fn test_only_reads_are_cacheable() {
        assert!(compiled(QueryType::Select, "SELECT * FROM `t` WHERE `a` = ?").is_cacheable());
        assert!(compiled(QueryType::Raw, "WITH x AS (SELECT 1) SELECT * FROM x").is_cacheable());
        assert!(compiled(QueryType::Raw, "SELECT 'update me' AS note").is_cacheable());

        let returning = compiled(QueryType::Insert, "INSERT INTO \"t\" (\"a\") VALUES (?) RETURNING \"id\"");
        assert!(!returning.is_cacheable());
        assert!(returning.is_write());
        assert!(!compiled(QueryType::Raw, "INSERT INTO t (a) VALUES (?) RETURNING id").is_cacheable());
        assert!(!compiled(QueryType::Raw, "WITH d AS (DELETE FROM t RETURNING *) SELECT * FROM d").is_cacheable());
        assert!(compiled(QueryType::Raw, "WITH d AS (DELETE FROM t RETURNING *) SELECT * FROM d").is_write());
        assert!(!compiled(QueryType::Raw, "SELECT * FROM t FOR UPDATE").is_cacheable());
        assert!(!compiled(QueryType::Raw, "SHOW TABLES").is_cacheable());
        assert!(!compiled(QueryType::Select, "SELECT 1").is_write());
    }
}
