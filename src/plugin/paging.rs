//! Dialect-aware pagination plugin.
//!
//! Rewrites a query's SQL with the database dialect's paging clause and
//! zeroes the logical row bounds, so the driver returns only the requested
//! window and the executor's in-memory paging is skipped.

use std::sync::Arc;

use super::{Action, ExecutorMethod, Interceptor, Invocation, Outcome};
use crate::error::{DynSqlError, DynSqlResult};
use crate::mapping::RowBounds;

/// Database paging dialect.
pub trait Dialect: Send + Sync {
    /// Whether this dialect can express paging in SQL.
    fn supports_paging(&self) -> bool;

    /// Wraps `sql` with the dialect's paging clause.
    fn paging_sql(&self, sql: &str, offset: usize, limit: usize) -> String;
}

/// `LIMIT n OFFSET m` dialect (MySQL, PostgreSQL, SQLite).
#[derive(Debug, Default)]
pub struct LimitOffsetDialect;

impl Dialect for LimitOffsetDialect {
    fn supports_paging(&self) -> bool {
        true
    }

    fn paging_sql(&self, sql: &str, offset: usize, limit: usize) -> String {
        let mut paged = sql.trim().to_string();
        if limit != RowBounds::NO_LIMIT {
            paged = format!("{paged} LIMIT {limit}");
        }
        if offset != RowBounds::NO_OFFSET {
            paged = format!("{paged} OFFSET {offset}");
        }
        paged
    }
}

/// Interceptor rewriting bounded queries through a [`Dialect`].
pub struct PagingInterceptor {
    dialect: Arc<dyn Dialect>,
}

impl PagingInterceptor {
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        Self { dialect }
    }
}

impl Interceptor for PagingInterceptor {
    fn applies_to(&self, method: ExecutorMethod) -> bool {
        method == ExecutorMethod::Query
    }

    fn intercept(&self, mut invocation: Invocation<'_, '_>) -> DynSqlResult<Outcome> {
        if let Action::Query {
            statement,
            parameter,
            bounds,
            ..
        } = invocation.action_mut()
        {
            if self.dialect.supports_paging() && !bounds.is_default() {
                let mut bound = statement
                    .bound_sql(parameter)
                    .map_err(|e| DynSqlError::interceptor(self.name(), e.to_string()))?;
                let paged = self
                    .dialect
                    .paging_sql(bound.sql(), bounds.offset, bounds.limit);
                bound.set_sql(paged);
                *statement = statement.rebound(bound);
                *bounds = RowBounds::default();
            }
        }
        invocation.proceed()
    }

    fn name(&self) -> &'static str {
        "PagingInterceptor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_offset_dialect() {
        let dialect = LimitOffsetDialect;
        assert!(dialect.supports_paging());
        assert_eq!(
            dialect.paging_sql("SELECT * FROM t", 20, 10),
            "SELECT * FROM t LIMIT 10 OFFSET 20"
        );
        assert_eq!(
            dialect.paging_sql("SELECT * FROM t", 0, 10),
            "SELECT * FROM t LIMIT 10"
        );
        assert_eq!(
            dialect.paging_sql("SELECT * FROM t", 20, RowBounds::NO_LIMIT),
            "SELECT * FROM t OFFSET 20"
        );
    }
}
