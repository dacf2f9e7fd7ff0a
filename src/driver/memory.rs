//! In-memory driver for examples and tests.
//!
//! Serves canned rows per statement id and records every call so tests can
//! assert how often the database was actually hit. Handles are cheap clones
//! over shared state, so a test can keep one while the executor owns
//! another.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use super::{Connection, RowCursor, StatementHandler, Transaction};
use crate::error::{DynSqlError, DynSqlResult};
use crate::mapping::{BatchResult, MappedStatement, RowBounds};
use crate::scripting::BoundSql;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Query,
    Update,
    Cursor,
    Flush,
}

/// One recorded driver invocation.
#[derive(Debug, Clone)]
pub struct DriverCall {
    pub kind: CallKind,
    pub statement_id: String,
    pub sql: String,
    pub parameters: Vec<Value>,
}

#[derive(Default)]
struct DriverState {
    results: HashMap<String, Vec<Value>>,
    affected: HashMap<String, u64>,
    fail_query: HashMap<String, String>,
    calls: Vec<DriverCall>,
}

/// Clonable in-memory statement handler.
#[derive(Clone, Default)]
pub struct InMemoryDriver {
    state: Arc<Mutex<DriverState>>,
}

impl InMemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the rows returned for a statement id.
    pub fn seed_rows(&self, statement_id: impl Into<String>, rows: Vec<Value>) {
        self.state
            .lock()
            .unwrap()
            .results
            .insert(statement_id.into(), rows);
    }

    /// Seeds the affected-row count returned for a write statement.
    pub fn seed_affected(&self, statement_id: impl Into<String>, affected: u64) {
        self.state
            .lock()
            .unwrap()
            .affected
            .insert(statement_id.into(), affected);
    }

    /// Makes the next query for `statement_id` fail with `message`.
    pub fn fail_next_query(&self, statement_id: impl Into<String>, message: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .fail_query
            .insert(statement_id.into(), message.into());
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// How many queries ran for a statement id.
    pub fn query_count(&self, statement_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.kind == CallKind::Query && c.statement_id == statement_id)
            .count()
    }

    fn record(&self, kind: CallKind, statement: &MappedStatement, bound: &BoundSql, parameters: &[Value]) {
        self.state.lock().unwrap().calls.push(DriverCall {
            kind,
            statement_id: statement.id().to_string(),
            sql: bound.sql().to_string(),
            parameters: parameters.to_vec(),
        });
    }
}

impl StatementHandler for InMemoryDriver {
    fn query(
        &mut self,
        _connection: &mut dyn Connection,
        statement: &MappedStatement,
        bound: &BoundSql,
        parameters: &[Value],
        _timeout: Option<Duration>,
    ) -> DynSqlResult<Vec<Value>> {
        self.record(CallKind::Query, statement, bound, parameters);
        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.fail_query.remove(statement.id()) {
            return Err(DynSqlError::Execution(message));
        }
        Ok(state.results.get(statement.id()).cloned().unwrap_or_default())
    }

    fn update(
        &mut self,
        _connection: &mut dyn Connection,
        statement: &MappedStatement,
        bound: &BoundSql,
        parameters: &[Value],
        _timeout: Option<Duration>,
    ) -> DynSqlResult<u64> {
        self.record(CallKind::Update, statement, bound, parameters);
        let state = self.state.lock().unwrap();
        Ok(state.affected.get(statement.id()).copied().unwrap_or(1))
    }

    fn query_cursor(
        &mut self,
        _connection: &mut dyn Connection,
        statement: &MappedStatement,
        bound: &BoundSql,
        parameters: &[Value],
        bounds: RowBounds,
        _timeout: Option<Duration>,
    ) -> DynSqlResult<RowCursor> {
        self.record(CallKind::Cursor, statement, bound, parameters);
        let state = self.state.lock().unwrap();
        let rows = state.results.get(statement.id()).cloned().unwrap_or_default();
        let window: Vec<Value> = rows
            .into_iter()
            .skip(bounds.offset)
            .take(bounds.limit)
            .collect();
        Ok(Box::new(window.into_iter().map(Ok)))
    }

    fn flush(&mut self, _rollback: bool) -> DynSqlResult<Vec<BatchResult>> {
        self.state.lock().unwrap().calls.push(DriverCall {
            kind: CallKind::Flush,
            statement_id: String::new(),
            sql: String::new(),
            parameters: Vec::new(),
        });
        Ok(Vec::new())
    }
}

/// Unit connection handed out by [`StubTransaction`].
#[derive(Debug, Default)]
pub struct StubConnection;

impl Connection for StubConnection {
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[derive(Default)]
struct TxState {
    commits: usize,
    rollbacks: usize,
    closes: usize,
    fail_commit: bool,
    fail_rollback: bool,
}

/// Recording transaction stub.
#[derive(Clone, Default)]
pub struct StubTransaction {
    state: Arc<Mutex<TxState>>,
    timeout: Option<Duration>,
    // Not shared between clones; each handle carries its own unit connection
    connection: StubConnection,
}

impl StubTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Makes subsequent commits fail, for error-path tests.
    pub fn fail_commits(&self) {
        self.state.lock().unwrap().fail_commit = true;
    }

    /// Makes subsequent rollbacks fail, for close-swallows-errors tests.
    pub fn fail_rollbacks(&self) {
        self.state.lock().unwrap().fail_rollback = true;
    }

    pub fn commits(&self) -> usize {
        self.state.lock().unwrap().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.state.lock().unwrap().rollbacks
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }
}

impl Clone for StubConnection {
    fn clone(&self) -> Self {
        StubConnection
    }
}

impl Transaction for StubTransaction {
    fn connection(&mut self) -> DynSqlResult<&mut dyn Connection> {
        Ok(&mut self.connection)
    }

    fn commit(&mut self) -> DynSqlResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_commit {
            return Err(DynSqlError::Transaction("commit refused".to_string()));
        }
        state.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> DynSqlResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_rollback {
            return Err(DynSqlError::Transaction("rollback refused".to_string()));
        }
        state.rollbacks += 1;
        Ok(())
    }

    fn close(&mut self) -> DynSqlResult<()> {
        self.state.lock().unwrap().closes += 1;
        Ok(())
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::SqlCommandType;
    use crate::scripting::{SqlNode, SqlSource};
    use serde_json::json;

    fn statement(id: &str) -> MappedStatement {
        let source = SqlSource::from_node(SqlNode::text("SELECT 1")).unwrap();
        MappedStatement::new(id, SqlCommandType::Select, source)
    }

    #[test]
    fn test_seeded_rows_and_call_recording() {
        let driver = InMemoryDriver::new();
        driver.seed_rows("s", vec![json!({"id": 1}), json!({"id": 2})]);

        let stmt = statement("s");
        let bound = stmt.bound_sql(&Value::Null).unwrap();
        let mut handler = driver.clone();
        let mut conn = StubConnection;
        let rows = handler
            .query(&mut conn, &stmt, &bound, &[], None)
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(driver.query_count("s"), 1);
        assert_eq!(driver.calls()[0].sql, "SELECT 1");
    }

    #[test]
    fn test_fail_next_query_fails_once() {
        let driver = InMemoryDriver::new();
        driver.seed_rows("s", vec![json!(1)]);
        driver.fail_next_query("s", "boom");

        let stmt = statement("s");
        let bound = stmt.bound_sql(&Value::Null).unwrap();
        let mut handler = driver.clone();
        let mut conn = StubConnection;
        assert!(handler.query(&mut conn, &stmt, &bound, &[], None).is_err());
        assert!(handler.query(&mut conn, &stmt, &bound, &[], None).is_ok());
    }

    #[test]
    fn test_stub_transaction_counters() {
        let tx = StubTransaction::new();
        let mut handle = tx.clone();
        handle.commit().unwrap();
        handle.rollback().unwrap();
        handle.close().unwrap();
        assert_eq!(tx.commits(), 1);
        assert_eq!(tx.rollbacks(), 1);
        assert_eq!(tx.closes(), 1);

        tx.fail_commits();
        assert!(handle.commit().is_err());
    }
}
