//! Query Builder grouping, HAVING and ordering

use super::builder::QueryBuilder;
use super::types::*;
use crate::value::Value;

impl QueryBuilder {
    /// Add GROUP BY columns
    pub fn group_by(self, columns: &[&str]) -> Self {
        self.apply(|qb| {
            for column in columns {
                let column = qb.column(column)?;
                qb.parts.group_by.push(column);
            }
            Ok(())
        })
    }

    fn push_having(self, connective: Connective, column: &str, operator: &str, value: Value) -> Self {
        self.apply(|qb| {
            let op: QueryOperator = operator.parse()?;
            let fragment = Fragment::with_bindings(
                format!("{} {} ?", qb.column(column)?, op),
                vec![QueryBuilder::value(value)],
            );
            qb.parts.havings.push(Condition { connective, fragment });
            Ok(())
        })
    }

    /// HAVING condition; `column` may be an aggregate such as `COUNT(*)`
    pub fn having<T: Into<Value>>(self, column: &str, operator: &str, value: T) -> Self {
        self.push_having(Connective::And, column, operator, value.into())
    }

    pub fn or_having<T: Into<Value>>(self, column: &str, operator: &str, value: T) -> Self {
        self.push_having(Connective::Or, column, operator, value.into())
    }

    pub fn having_raw(self, sql: &str, bindings: Vec<Value>) -> Self {
        self.apply(|qb| {
            let fragment = super::raw::positional_fragment(sql, bindings)?;
            qb.parts.havings.push(Condition {
                connective: Connective::And,
                fragment,
            });
            Ok(())
        })
    }

    fn push_order(self, column: &str, direction: OrderDirection) -> Self {
        self.apply(|qb| {
            let sql = format!("{} {}", qb.column(column)?, direction);
            qb.parts.order_by.push(Fragment::new(sql));
            Ok(())
        })
    }

    /// Add ORDER BY clause (ascending)
    pub fn order_by(self, column: &str) -> Self {
        self.push_order(column, OrderDirection::Asc)
    }

    /// Add ORDER BY clause (descending)
    pub fn order_by_desc(self, column: &str) -> Self {
        self.push_order(column, OrderDirection::Desc)
    }

    pub fn order_by_direction(self, column: &str, direction: OrderDirection) -> Self {
        self.push_order(column, direction)
    }

    /// Verbatim ORDER BY expression
    pub fn order_by_raw(self, sql: &str, bindings: Vec<Value>) -> Self {
        self.apply(|qb| {
            let fragment = super::raw::positional_fragment(sql, bindings)?;
            qb.parts.order_by.push(fragment);
            Ok(())
        })
    }
}
