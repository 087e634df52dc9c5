//! Query Builder Module - fluent, dialect-aware SQL construction
//!
//! A [`QueryBuilder`] accumulates clause fragments with their bindings and
//! compiles them with [`QueryBuilder::get_query`].

pub mod builder;
pub mod ddl;
pub mod dml;
pub mod joins;
pub mod ordering;
pub mod pagination;
pub mod raw;
pub mod select;
pub mod set_ops;
pub mod sql_generation;
pub mod types;
pub mod upsert;
pub mod where_clause;

pub use builder::QueryBuilder;
pub use raw::{scan_placeholders, PlaceholderScan};
pub use types::{
    CompiledQuery, Connective, Fragment, JoinType, OrderDirection, QueryOperator, QueryParts, QueryType,
    RawBindings, SetOperator,
};
