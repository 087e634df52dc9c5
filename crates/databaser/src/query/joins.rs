//! Query Builder JOIN operations

use super::builder::QueryBuilder;
use super::types::*;
use crate::dialect::Dialect;
use crate::error::QueryError;

impl QueryBuilder {
    fn push_join(self, join_type: JoinType, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.apply(|qb| {
            if join_type == JoinType::Full && qb.dialect == Dialect::MySql {
                return Err(QueryError::UnsupportedOperation(
                    "FULL OUTER JOIN is not supported on mysql".to_string(),
                ));
            }
            let op: QueryOperator = operator.parse()?;
            let sql = format!(
                "{} {} ON {} {} {}",
                join_type,
                qb.table_name(table)?,
                qb.column(first)?,
                op,
                qb.column(second)?
            );
            qb.parts.joins.push(Fragment::new(sql));
            Ok(())
        })
    }

    /// Add INNER JOIN to the query
    pub fn join(self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.push_join(JoinType::Inner, table, first, operator, second)
    }

    /// Add LEFT JOIN to the query
    pub fn left_join(self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.push_join(JoinType::Left, table, first, operator, second)
    }

    /// Add RIGHT JOIN to the query
    pub fn right_join(self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.push_join(JoinType::Right, table, first, operator, second)
    }

    /// Add FULL OUTER JOIN (not available on MySQL)
    pub fn full_join(self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.push_join(JoinType::Full, table, first, operator, second)
    }

    /// Add CROSS JOIN to the query
    pub fn cross_join(self, table: &str) -> Self {
        self.apply(|qb| {
            let sql = format!("{} {}", JoinType::Cross, qb.table_name(table)?);
            qb.parts.joins.push(Fragment::new(sql));
            Ok(())
        })
    }
}
