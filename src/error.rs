//! Error types for dynsql.

use thiserror::Error;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum DynSqlError {
    #[error("Executor was closed")]
    ExecutorClosed,

    #[error("Expression error in '{expression}': {message}")]
    Expression { expression: String, message: String },

    #[error("SQL build error: {0}")]
    Build(String),

    #[error("Statement '{statement_id}' failed: {message}; SQL: [{sql}]")]
    Statement {
        statement_id: String,
        sql: String,
        message: String,
    },

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Interceptor '{0}' failed: {1}")]
    Interceptor(String, String),

    #[error("Mapper parse error: {0}")]
    MapperParse(String),

    #[error("Execution error: {0}")]
    Execution(String),
}

impl DynSqlError {
    /// Expression failure tied to its source text.
    pub fn expression(expression: impl Into<String>, message: impl Into<String>) -> Self {
        DynSqlError::Expression {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// Plugin failure surfaced with the interceptor name.
    pub fn interceptor(name: impl Into<String>, message: impl Into<String>) -> Self {
        DynSqlError::Interceptor(name.into(), message.into())
    }
}

/// Result type for dynsql operations.
pub type DynSqlResult<T> = Result<T, DynSqlError>;

impl serde::Serialize for DynSqlError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}
