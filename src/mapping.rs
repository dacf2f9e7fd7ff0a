//! Statement model: registered statements, row bounds and batch results.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DynSqlResult;
use crate::scripting::{BoundSql, SqlSource};

/// What kind of SQL command a statement issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlCommandType {
    Select,
    Insert,
    Update,
    Delete,
}

impl SqlCommandType {
    pub fn is_write(self) -> bool {
        !matches!(self, SqlCommandType::Select)
    }
}

/// How the driver prepares the statement. Callable statements carry OUT
/// parameters that the executor replays from its output-parameter cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StatementType {
    #[default]
    Prepared,
    Callable,
}

/// A registered statement: id, command kind and the immutable SQL source.
/// Cloning is cheap; the node tree sits behind an `Arc`.
#[derive(Debug, Clone)]
pub struct MappedStatement {
    id: String,
    command: SqlCommandType,
    statement_type: StatementType,
    sql_source: Arc<SqlSource>,
    flush_cache: bool,
}

impl MappedStatement {
    pub fn new(id: impl Into<String>, command: SqlCommandType, sql_source: SqlSource) -> Self {
        Self {
            id: id.into(),
            command,
            statement_type: StatementType::Prepared,
            sql_source: Arc::new(sql_source),
            // Writes invalidate the local cache by default
            flush_cache: command.is_write(),
        }
    }

    pub fn with_statement_type(mut self, statement_type: StatementType) -> Self {
        self.statement_type = statement_type;
        self
    }

    pub fn with_flush_cache(mut self, flush_cache: bool) -> Self {
        self.flush_cache = flush_cache;
        self
    }

    /// Clone of this statement with its SQL source replaced by a fixed,
    /// already-composed BoundSql. Used by plugins rewriting SQL in flight.
    pub fn rebound(&self, bound: BoundSql) -> Self {
        let mut rebound = self.clone();
        rebound.sql_source = Arc::new(SqlSource::Prebound(bound));
        rebound
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn command(&self) -> SqlCommandType {
        self.command
    }

    pub fn statement_type(&self) -> StatementType {
        self.statement_type
    }

    pub fn flush_cache(&self) -> bool {
        self.flush_cache
    }

    pub fn sql_source(&self) -> &SqlSource {
        &self.sql_source
    }

    /// Composes the SQL source against `parameter`.
    pub fn bound_sql(&self, parameter: &Value) -> DynSqlResult<BoundSql> {
        self.sql_source.bound_sql(parameter)
    }
}

/// Logical paging window applied by the executor (or rewritten away by a
/// paging plugin).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowBounds {
    pub offset: usize,
    pub limit: usize,
}

impl RowBounds {
    pub const NO_OFFSET: usize = 0;
    pub const NO_LIMIT: usize = usize::MAX;

    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    pub fn is_default(&self) -> bool {
        self.offset == Self::NO_OFFSET && self.limit == Self::NO_LIMIT
    }
}

impl Default for RowBounds {
    fn default() -> Self {
        Self {
            offset: Self::NO_OFFSET,
            limit: Self::NO_LIMIT,
        }
    }
}

/// Result of one batched statement drained by `flush_statements`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub statement_id: String,
    pub sql: String,
    pub update_counts: Vec<u64>,
}
