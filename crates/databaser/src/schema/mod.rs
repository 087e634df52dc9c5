//! Table definitions rendered per dialect

pub mod builder;
pub mod column;

pub use builder::SchemaBuilder;
pub use column::{ColumnDef, ColumnType};
