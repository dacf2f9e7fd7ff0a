//! Statement execution.
//!
//! [`SessionExecutor`] implements the session semantics: the local result
//! cache with its building sentinel, nesting-depth accounting, the
//! deferred-load queue and transactional lifecycle. [`Executor`] is the
//! public facade that threads the interceptor chain in front of it.

pub mod deferred;
pub mod session;

use std::sync::Arc;

use serde_json::Value;

use crate::cache::CacheKey;
use crate::config::Configuration;
use crate::driver::{ResultHandler, RowCursor, StatementHandler, Transaction};
use crate::error::{DynSqlError, DynSqlResult};
use crate::mapping::{BatchResult, MappedStatement, RowBounds};
use crate::plugin::{Action, Interceptor, Invocation, Outcome};

pub use deferred::{DeferredLoad, LoadTarget, ResultObject};
pub use session::SessionExecutor;

/// The public executor: a [`SessionExecutor`] wrapped by the configured
/// interceptor chain. Interceptors wrap in reverse registration order, so
/// the last one registered sees a call first.
pub struct Executor {
    interceptors: Vec<Arc<dyn Interceptor>>,
    core: SessionExecutor,
}

impl Executor {
    pub fn new(
        configuration: Arc<Configuration>,
        transaction: Box<dyn Transaction>,
        handler: Box<dyn StatementHandler>,
    ) -> Self {
        let mut interceptors: Vec<Arc<dyn Interceptor>> =
            configuration.interceptors().to_vec();
        interceptors.reverse();
        Self {
            interceptors,
            core: SessionExecutor::new(configuration, transaction, handler),
        }
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        self.core.configuration()
    }

    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Executes a write; returns the affected-row count.
    pub fn update(
        &mut self,
        statement: &MappedStatement,
        parameter: &mut Value,
    ) -> DynSqlResult<u64> {
        let outcome = self.invoke_from(
            0,
            Action::Update {
                statement: statement.clone(),
                parameter,
            },
        )?;
        match outcome {
            Outcome::Affected(count) => Ok(count),
            _ => Err(mismatched_outcome("update")),
        }
    }

    /// Executes a read; results come back as a shared list (cache hits
    /// return the identical list).
    pub fn query(
        &mut self,
        statement: &MappedStatement,
        parameter: &mut Value,
        bounds: RowBounds,
    ) -> DynSqlResult<Arc<Vec<Value>>> {
        self.run_query(statement, parameter, bounds, None)
    }

    /// Read variant feeding rows to a handler; bypasses the local cache.
    pub fn query_with_handler(
        &mut self,
        statement: &MappedStatement,
        parameter: &mut Value,
        bounds: RowBounds,
        handler: &mut dyn ResultHandler,
    ) -> DynSqlResult<Arc<Vec<Value>>> {
        self.run_query(statement, parameter, bounds, Some(handler))
    }

    fn run_query<'a>(
        &mut self,
        statement: &MappedStatement,
        parameter: &'a mut Value,
        bounds: RowBounds,
        handler: Option<&'a mut dyn ResultHandler>,
    ) -> DynSqlResult<Arc<Vec<Value>>> {
        let outcome = self.invoke_from(
            0,
            Action::Query {
                statement: statement.clone(),
                parameter,
                bounds,
                handler,
            },
        )?;
        match outcome {
            Outcome::Rows(rows) => Ok(rows),
            _ => Err(mismatched_outcome("query")),
        }
    }

    /// Streaming read; bypasses the local cache.
    pub fn query_cursor(
        &mut self,
        statement: &MappedStatement,
        parameter: &mut Value,
        bounds: RowBounds,
    ) -> DynSqlResult<RowCursor> {
        let outcome = self.invoke_from(
            0,
            Action::QueryCursor {
                statement: statement.clone(),
                parameter,
                bounds,
            },
        )?;
        match outcome {
            Outcome::Cursor(cursor) => Ok(cursor),
            _ => Err(mismatched_outcome("query_cursor")),
        }
    }

    pub fn flush_statements(&mut self, rollback: bool) -> DynSqlResult<Vec<BatchResult>> {
        let outcome = self.invoke_from(0, Action::FlushStatements { rollback })?;
        match outcome {
            Outcome::Batches(batches) => Ok(batches),
            _ => Err(mismatched_outcome("flush_statements")),
        }
    }

    pub fn commit(&mut self, required: bool) -> DynSqlResult<()> {
        self.core.commit(required)
    }

    pub fn rollback(&mut self, required: bool) -> DynSqlResult<()> {
        self.core.rollback(required)
    }

    /// Best-effort close; never fails, idempotent.
    pub fn close(&mut self, force_rollback: bool) {
        self.core.close(force_rollback)
    }

    pub fn defer_load(
        &mut self,
        owner: &ResultObject,
        property: &str,
        key: CacheKey,
        target: LoadTarget,
    ) -> DynSqlResult<()> {
        self.core.defer_load(owner, property, key, target)
    }

    pub fn create_cache_key(
        &self,
        statement: &MappedStatement,
        parameter: &Value,
        bounds: RowBounds,
    ) -> DynSqlResult<CacheKey> {
        self.core.create_cache_key(statement, parameter, bounds)
    }

    pub fn is_cached(&self, key: &CacheKey) -> bool {
        self.core.is_cached(key)
    }

    pub fn clear_local_cache(&mut self) {
        self.core.clear_local_cache()
    }

    #[doc(hidden)]
    pub fn local_cache_has_sentinel(&self) -> bool {
        self.core.local_cache().has_sentinel()
    }

    #[doc(hidden)]
    pub fn pending_deferred_loads(&self) -> usize {
        self.core.deferred_load_count()
    }

    /// Runs the chain from `index` down to the session executor.
    pub(crate) fn invoke_from(
        &mut self,
        index: usize,
        action: Action<'_>,
    ) -> DynSqlResult<Outcome> {
        let method = action.method();
        let mut index = index;
        while index < self.interceptors.len() && !self.interceptors[index].applies_to(method) {
            index += 1;
        }
        if index < self.interceptors.len() {
            let interceptor = self.interceptors[index].clone();
            interceptor.intercept(Invocation::new(method, action, self, index + 1))
        } else {
            self.core.execute(action)
        }
    }
}

fn mismatched_outcome(method: &str) -> DynSqlError {
    DynSqlError::Execution(format!(
        "interceptor chain returned a mismatched outcome for {method}"
    ))
}
