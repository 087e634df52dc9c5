//! Schema Builder - DSL for table definitions and alter actions
//!
//! Columns, constraints and alter actions are recorded in call order and
//! rendered for the builder's dialect when the definition is requested.
//! Modifiers (`nullable`, `default_value`, `unsigned`, `unique_column`) apply
//! to the most recently declared column; `references`/`on_delete`/`on_update`
//! apply to the most recent `foreign` entry.

use crate::dialect::Dialect;
use crate::error::QueryError;
use crate::sanitizer::{sanitize_column, sanitize_table};
use crate::value::Value;

use super::column::{ColumnDef, ColumnType};

const REFERENTIAL_ACTIONS: [&str; 5] = ["CASCADE", "SET NULL", "RESTRICT", "NO ACTION", "SET DEFAULT"];

#[derive(Debug, Clone, PartialEq)]
struct ForeignKeyDef {
    columns: Vec<String>,
    references: Option<(String, Vec<String>)>,
    on_delete: Option<String>,
    on_update: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum SchemaEntry {
    Column(ColumnDef),
    Primary(Vec<String>),
    Index {
        name: Option<String>,
        columns: Vec<String>,
        unique: bool,
    },
    Foreign(ForeignKeyDef),
    DropColumn(String),
    RenameColumn(String, String),
    DropForeign(String),
}

/// Fluent table definition for `create_table` / `alter_table`
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    dialect: Dialect,
    entries: Vec<SchemaEntry>,
    error: Option<QueryError>,
}

impl SchemaBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            entries: Vec::new(),
            error: None,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn fail(&mut self, err: QueryError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn push_column(&mut self, name: &str, column_type: ColumnType) -> &mut Self {
        self.entries.push(SchemaEntry::Column(ColumnDef::new(name, column_type)));
        self
    }

    fn last_column(&mut self, modifier: &str) -> Option<&mut ColumnDef> {
        let found = matches!(self.entries.last(), Some(SchemaEntry::Column(_)));
        if !found {
            self.fail(QueryError::InvalidSql(format!(
                "{}() must follow a column declaration",
                modifier
            )));
            return None;
        }
        match self.entries.last_mut() {
            Some(SchemaEntry::Column(col)) => Some(col),
            _ => None,
        }
    }

    fn last_foreign(&mut self, modifier: &str) -> Option<&mut ForeignKeyDef> {
        let found = matches!(self.entries.last(), Some(SchemaEntry::Foreign(_)));
        if !found {
            self.fail(QueryError::InvalidSql(format!("{}() must follow foreign()", modifier)));
            return None;
        }
        match self.entries.last_mut() {
            Some(SchemaEntry::Foreign(fk)) => Some(fk),
            _ => None,
        }
    }

    /// Auto-incrementing primary key column (default name `id`)
    pub fn id(&mut self) -> &mut Self {
        self.push_column("id", ColumnType::Id)
    }

    pub fn id_named(&mut self, name: &str) -> &mut Self {
        self.push_column(name, ColumnType::Id)
    }

    pub fn string(&mut self, name: &str, length: u32) -> &mut Self {
        self.push_column(name, ColumnType::String(length))
    }

    pub fn text(&mut self, name: &str) -> &mut Self {
        self.push_column(name, ColumnType::Text)
    }

    pub fn integer(&mut self, name: &str) -> &mut Self {
        self.push_column(name, ColumnType::Integer)
    }

    pub fn big_integer(&mut self, name: &str) -> &mut Self {
        self.push_column(name, ColumnType::BigInteger)
    }

    pub fn boolean(&mut self, name: &str) -> &mut Self {
        self.push_column(name, ColumnType::Boolean)
    }

    pub fn decimal(&mut self, name: &str, precision: u8, scale: u8) -> &mut Self {
        self.push_column(name, ColumnType::Decimal(precision, scale))
    }

    pub fn float(&mut self, name: &str) -> &mut Self {
        self.push_column(name, ColumnType::Float)
    }

    pub fn date(&mut self, name: &str) -> &mut Self {
        self.push_column(name, ColumnType::Date)
    }

    pub fn datetime(&mut self, name: &str) -> &mut Self {
        self.push_column(name, ColumnType::DateTime)
    }

    pub fn timestamp(&mut self, name: &str) -> &mut Self {
        self.push_column(name, ColumnType::Timestamp)
    }

    /// Nullable `created_at` and `updated_at`
    pub fn timestamps(&mut self) -> &mut Self {
        self.push_column("created_at", ColumnType::Timestamp).nullable();
        self.push_column("updated_at", ColumnType::Timestamp).nullable()
    }

    pub fn json(&mut self, name: &str) -> &mut Self {
        self.push_column(name, ColumnType::Json)
    }

    /// Declare a column of an explicit type (alter: `ADD COLUMN`)
    pub fn add_column(&mut self, name: &str, column_type: ColumnType) -> &mut Self {
        self.push_column(name, column_type)
    }

    pub fn nullable(&mut self) -> &mut Self {
        if let Some(col) = self.last_column("nullable") {
            col.nullable = true;
        }
        self
    }

    pub fn default_value(&mut self, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        if let Some(col) = self.last_column("default_value") {
            col.default = Some(value);
        }
        self
    }

    pub fn unsigned(&mut self) -> &mut Self {
        if let Some(col) = self.last_column("unsigned") {
            col.unsigned = true;
        }
        self
    }

    pub fn unique_column(&mut self) -> &mut Self {
        if let Some(col) = self.last_column("unique_column") {
            col.unique = true;
        }
        self
    }

    pub fn primary(&mut self, columns: &[&str]) -> &mut Self {
        self.entries
            .push(SchemaEntry::Primary(columns.iter().map(|c| c.to_string()).collect()));
        self
    }

    /// Plain index. Only MySQL can declare it inside the table definition.
    pub fn index(&mut self, columns: &[&str], name: Option<&str>) -> &mut Self {
        self.entries.push(SchemaEntry::Index {
            name: name.map(str::to_string),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique: false,
        });
        self
    }

    pub fn unique(&mut self, columns: &[&str], name: Option<&str>) -> &mut Self {
        self.entries.push(SchemaEntry::Index {
            name: name.map(str::to_string),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique: true,
        });
        self
    }

    pub fn foreign(&mut self, columns: &[&str]) -> &mut Self {
        self.entries.push(SchemaEntry::Foreign(ForeignKeyDef {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            references: None,
            on_delete: None,
            on_update: None,
        }));
        self
    }

    pub fn references(&mut self, table: &str, columns: &[&str]) -> &mut Self {
        let target = (table.to_string(), columns.iter().map(|c| c.to_string()).collect());
        if let Some(fk) = self.last_foreign("references") {
            fk.references = Some(target);
        }
        self
    }

    pub fn on_delete(&mut self, action: &str) -> &mut Self {
        match normalize_action(action) {
            Ok(action) => {
                if let Some(fk) = self.last_foreign("on_delete") {
                    fk.on_delete = Some(action);
                }
            }
            Err(err) => self.fail(err),
        }
        self
    }

    pub fn on_update(&mut self, action: &str) -> &mut Self {
        if self.dialect == Dialect::Oracle {
            self.fail(QueryError::UnsupportedOperation(
                "ON UPDATE referential actions are not supported on oci".to_string(),
            ));
            return self;
        }
        match normalize_action(action) {
            Ok(action) => {
                if let Some(fk) = self.last_foreign("on_update") {
                    fk.on_update = Some(action);
                }
            }
            Err(err) => self.fail(err),
        }
        self
    }

    pub fn drop_column(&mut self, name: &str) -> &mut Self {
        self.entries.push(SchemaEntry::DropColumn(name.to_string()));
        self
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> &mut Self {
        self.entries
            .push(SchemaEntry::RenameColumn(from.to_string(), to.to_string()));
        self
    }

    pub fn drop_foreign(&mut self, name: &str) -> &mut Self {
        self.entries.push(SchemaEntry::DropForeign(name.to_string()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Comma-joined body of a `CREATE TABLE (...)`
    pub fn get_definition(&self) -> Result<String, QueryError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let fragments = self
            .entries
            .iter()
            .map(|entry| self.render_create(entry))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(fragments.join(", "))
    }

    /// Comma-joined action list of an `ALTER TABLE`
    pub fn get_alter_definition(&self) -> Result<String, QueryError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let fragments = self
            .entries
            .iter()
            .map(|entry| self.render_alter(entry))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(fragments.join(", "))
    }

    fn column_list(&self, columns: &[String]) -> Result<String, QueryError> {
        let quoted = columns
            .iter()
            .map(|c| sanitize_column(self.dialect, c))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(quoted.join(", "))
    }

    fn index_name(prefix: &str, columns: &[String], name: &Option<String>) -> String {
        name.clone()
            .unwrap_or_else(|| format!("{}_{}", prefix, columns.join("_")))
    }

    fn render_foreign(&self, fk: &ForeignKeyDef) -> Result<String, QueryError> {
        let (table, ref_columns) = fk.references.as_ref().ok_or_else(|| {
            QueryError::MissingFields(format!(
                "foreign key on ({}) has no references()",
                fk.columns.join(", ")
            ))
        })?;
        let name = format!("fk_{}_{}", fk.columns.join("_"), table);
        let mut sql = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.dialect.quote_identifier(&name),
            self.column_list(&fk.columns)?,
            sanitize_table(self.dialect, table)?,
            self.column_list(ref_columns)?
        );
        if let Some(action) = &fk.on_delete {
            sql.push_str(" ON DELETE ");
            sql.push_str(action);
        }
        if let Some(action) = &fk.on_update {
            sql.push_str(" ON UPDATE ");
            sql.push_str(action);
        }
        Ok(sql)
    }

    fn render_index(&self, name: &Option<String>, columns: &[String], unique: bool) -> Result<String, QueryError> {
        if unique {
            let name = Self::index_name("uniq", columns, name);
            return Ok(format!(
                "CONSTRAINT {} UNIQUE ({})",
                self.dialect.quote_identifier(&name),
                self.column_list(columns)?
            ));
        }
        if !self.dialect.supports_inline_index() {
            return Err(QueryError::UnsupportedOperation(format!(
                "inline indexes are not supported on {}; use QueryBuilder::create_index",
                self.dialect
            )));
        }
        let name = Self::index_name("idx", columns, name);
        Ok(format!(
            "INDEX {} ({})",
            self.dialect.quote_identifier(&name),
            self.column_list(columns)?
        ))
    }

    fn render_create(&self, entry: &SchemaEntry) -> Result<String, QueryError> {
        match entry {
            SchemaEntry::Column(col) => {
                Ok(col.render(self.dialect, &sanitize_column(self.dialect, &col.name)?))
            }
            SchemaEntry::Primary(columns) => Ok(format!("PRIMARY KEY ({})", self.column_list(columns)?)),
            SchemaEntry::Index { name, columns, unique } => self.render_index(name, columns, *unique),
            SchemaEntry::Foreign(fk) => self.render_foreign(fk),
            SchemaEntry::DropColumn(_) | SchemaEntry::RenameColumn(..) | SchemaEntry::DropForeign(_) => {
                Err(QueryError::InvalidSql(
                    "drop/rename actions are only valid in alter_table".to_string(),
                ))
            }
        }
    }

    fn render_alter(&self, entry: &SchemaEntry) -> Result<String, QueryError> {
        match entry {
            SchemaEntry::Column(col) => {
                let def = col.render(self.dialect, &sanitize_column(self.dialect, &col.name)?);
                Ok(match self.dialect {
                    Dialect::Oracle => format!("ADD ({})", def),
                    Dialect::SqlServer => format!("ADD {}", def),
                    _ => format!("ADD COLUMN {}", def),
                })
            }
            SchemaEntry::Primary(columns) => {
                Ok(format!("ADD PRIMARY KEY ({})", self.column_list(columns)?))
            }
            SchemaEntry::Index { name, columns, unique } => {
                Ok(format!("ADD {}", self.render_index(name, columns, *unique)?))
            }
            SchemaEntry::Foreign(fk) => Ok(format!("ADD {}", self.render_foreign(fk)?)),
            SchemaEntry::DropColumn(name) => {
                Ok(format!("DROP COLUMN {}", sanitize_column(self.dialect, name)?))
            }
            SchemaEntry::RenameColumn(from, to) => {
                if self.dialect == Dialect::SqlServer {
                    return Err(QueryError::UnsupportedOperation(
                        "RENAME COLUMN is not supported on sqlsrv".to_string(),
                    ));
                }
                Ok(format!(
                    "RENAME COLUMN {} TO {}",
                    sanitize_column(self.dialect, from)?,
                    sanitize_column(self.dialect, to)?
                ))
            }
            SchemaEntry::DropForeign(name) => {
                let quoted = sanitize_column(self.dialect, name)?;
                Ok(match self.dialect {
                    Dialect::MySql => format!("DROP FOREIGN KEY {}", quoted),
                    _ => format!("DROP CONSTRAINT {}", quoted),
                })
            }
        }
    }
}

fn normalize_action(action: &str) -> Result<String, QueryError> {
    let upper = action.trim().to_ascii_uppercase();
    if REFERENTIAL_ACTIONS.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Err(QueryError::InvalidSql(format!("unknown referential action '{}'", action)))
    }
}
