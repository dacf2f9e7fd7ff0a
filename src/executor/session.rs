use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::deferred::{DeferredLoad, LoadTarget, ResultObject};
use crate::cache::{CacheEntry, CacheKey, LocalCache};
use crate::config::{Configuration, LocalCacheScope};
use crate::driver::{ResultHandler, RowCursor, StatementHandler, Transaction};
use crate::error::{DynSqlError, DynSqlResult};
use crate::mapping::{BatchResult, MappedStatement, RowBounds, StatementType};
use crate::plugin::{Action, Outcome};
use crate::scripting::{BoundSql, ParameterMode};

/// Session-scoped executor: owns the transaction, the local cache, the
/// output-parameter cache and the deferred-load queue. Single-owner; all
/// operations (including re-entrant ones through deferred loads and
/// plugins) run on one logical thread.
pub struct SessionExecutor {
    configuration: Arc<Configuration>,
    transaction: Box<dyn Transaction>,
    handler: Box<dyn StatementHandler>,
    local_cache: LocalCache,
    output_parameter_cache: HashMap<CacheKey, Value>,
    deferred_loads: VecDeque<DeferredLoad>,
    query_stack: u32,
    closed: bool,
}

impl SessionExecutor {
    pub fn new(
        configuration: Arc<Configuration>,
        transaction: Box<dyn Transaction>,
        handler: Box<dyn StatementHandler>,
    ) -> Self {
        Self {
            configuration,
            transaction,
            handler,
            local_cache: LocalCache::new(),
            output_parameter_cache: HashMap::new(),
            deferred_loads: VecDeque::new(),
            query_stack: 0,
            closed: false,
        }
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn check_open(&self) -> DynSqlResult<()> {
        if self.closed {
            return Err(DynSqlError::ExecutorClosed);
        }
        Ok(())
    }

    /// Dispatches a (possibly interceptor-rewritten) action.
    pub(crate) fn execute(&mut self, action: Action<'_>) -> DynSqlResult<Outcome> {
        match action {
            Action::Update {
                statement,
                parameter,
            } => self.update(&statement, parameter).map(Outcome::Affected),
            Action::Query {
                statement,
                parameter,
                bounds,
                handler,
            } => self
                .query(&statement, parameter, bounds, handler)
                .map(Outcome::Rows),
            Action::QueryCursor {
                statement,
                parameter,
                bounds,
            } => self
                .query_cursor(&statement, parameter, bounds)
                .map(Outcome::Cursor),
            Action::FlushStatements { rollback } => {
                self.flush_statements(rollback).map(Outcome::Batches)
            }
        }
    }

    /// Executes a write. Clears the local cache first, so no later read can
    /// observe pre-write results.
    pub fn update(&mut self, statement: &MappedStatement, parameter: &mut Value) -> DynSqlResult<u64> {
        self.check_open()?;
        debug!(statement = statement.id(), "executing update");
        self.clear_local_cache();

        let bound = statement.bound_sql(parameter)?;
        let values = self.resolved_parameters(&bound)?;
        let timeout = self.transaction.timeout();
        let connection = self.transaction.connection()?;
        self.handler
            .update(connection, statement, &bound, &values, timeout)
            .map_err(|e| statement_error(statement, &bound, e))
    }

    /// Canonical read path; see the query algorithm in the crate docs.
    pub fn query(
        &mut self,
        statement: &MappedStatement,
        parameter: &mut Value,
        bounds: RowBounds,
        handler: Option<&mut dyn ResultHandler>,
    ) -> DynSqlResult<Arc<Vec<Value>>> {
        self.check_open()?;
        let bound = statement.bound_sql(parameter)?;
        let key = self.build_cache_key(statement, &bound, bounds)?;
        self.query_with_key(statement, parameter, bounds, handler, key, &bound)
    }

    fn query_with_key(
        &mut self,
        statement: &MappedStatement,
        parameter: &mut Value,
        bounds: RowBounds,
        handler: Option<&mut dyn ResultHandler>,
        key: CacheKey,
        bound: &BoundSql,
    ) -> DynSqlResult<Arc<Vec<Value>>> {
        if self.query_stack == 0 && statement.flush_cache() {
            self.clear_local_cache();
        }

        self.query_stack += 1;
        let result = self.query_cached_or_database(statement, parameter, bounds, handler, &key, bound);
        self.query_stack -= 1;
        let rows = result?;

        if self.query_stack == 0 {
            // The cache is now guaranteed complete: resolve staged
            // back-references, then drop everything under STATEMENT scope.
            self.drain_deferred_loads()?;
            if self.configuration.local_cache_scope() == LocalCacheScope::Statement {
                self.clear_local_cache();
            }
        }
        Ok(rows)
    }

    fn query_cached_or_database(
        &mut self,
        statement: &MappedStatement,
        parameter: &mut Value,
        bounds: RowBounds,
        handler: Option<&mut dyn ResultHandler>,
        key: &CacheKey,
        bound: &BoundSql,
    ) -> DynSqlResult<Arc<Vec<Value>>> {
        if handler.is_none() {
            if let Some(rows) = self.local_cache.rows(key) {
                debug!(statement = statement.id(), "local cache hit");
                self.replay_output_parameters(statement, key, parameter, bound);
                return Ok(rows);
            }
        }
        self.query_from_database(statement, parameter, bounds, handler, key, bound)
    }

    fn query_from_database(
        &mut self,
        statement: &MappedStatement,
        parameter: &mut Value,
        bounds: RowBounds,
        handler: Option<&mut dyn ResultHandler>,
        key: &CacheKey,
        bound: &BoundSql,
    ) -> DynSqlResult<Arc<Vec<Value>>> {
        debug!(statement = statement.id(), sql = bound.sql(), "querying database");
        // Sentinel first: a deferred-load probe for this key must see
        // "in progress", not "absent" and not a stale list.
        self.local_cache.put(key.clone(), CacheEntry::InProgress);
        let result = self.run_query(statement, bounds, handler, bound);
        self.local_cache.remove(key);
        let rows = Arc::new(result?);

        self.local_cache
            .put(key.clone(), CacheEntry::Rows(rows.clone()));
        if statement.statement_type() == StatementType::Callable {
            self.output_parameter_cache
                .insert(key.clone(), parameter.clone());
        }
        Ok(rows)
    }

    fn run_query(
        &mut self,
        statement: &MappedStatement,
        bounds: RowBounds,
        handler: Option<&mut dyn ResultHandler>,
        bound: &BoundSql,
    ) -> DynSqlResult<Vec<Value>> {
        let values = self.resolved_parameters(bound)?;
        let timeout = self.transaction.timeout();
        let connection = self.transaction.connection()?;
        let rows = self
            .handler
            .query(connection, statement, bound, &values, timeout)
            .map_err(|e| statement_error(statement, bound, e))?;

        // In-memory paging window; a dialect plugin that rewrites the SQL
        // zeroes the bounds so this pass is skipped.
        let rows = apply_bounds(rows, bounds);
        if let Some(handler) = handler {
            for row in &rows {
                handler.handle_row(row);
            }
        }
        Ok(rows)
    }

    /// Streaming read; bypasses the local cache entirely.
    pub fn query_cursor(
        &mut self,
        statement: &MappedStatement,
        parameter: &mut Value,
        bounds: RowBounds,
    ) -> DynSqlResult<RowCursor> {
        self.check_open()?;
        let bound = statement.bound_sql(parameter)?;
        let values = self.resolved_parameters(&bound)?;
        let timeout = self.transaction.timeout();
        let connection = self.transaction.connection()?;
        self.handler
            .query_cursor(connection, statement, &bound, &values, bounds, timeout)
            .map_err(|e| statement_error(statement, &bound, e))
    }

    /// Forces a drain of any batched statements.
    pub fn flush_statements(&mut self, rollback: bool) -> DynSqlResult<Vec<BatchResult>> {
        self.check_open()?;
        self.handler.flush(rollback)
    }

    pub fn commit(&mut self, required: bool) -> DynSqlResult<()> {
        self.check_open()?;
        self.clear_local_cache();
        self.flush_statements(false)?;
        if required {
            self.transaction.commit()?;
        }
        Ok(())
    }

    pub fn rollback(&mut self, required: bool) -> DynSqlResult<()> {
        self.check_open()?;
        self.clear_local_cache();
        let flush_result = self.flush_statements(true);
        let tx_result = if required {
            self.transaction.rollback()
        } else {
            Ok(())
        };
        // A transaction-level failure outranks a flush failure
        tx_result?;
        flush_result?;
        Ok(())
    }

    /// Rolls back, closes the transaction and releases session state.
    /// Best-effort: failures are logged and swallowed, and the executor
    /// ends up closed regardless. Idempotent.
    pub fn close(&mut self, force_rollback: bool) {
        if self.closed {
            return;
        }
        if let Err(e) = self.rollback(force_rollback) {
            warn!("unexpected error rolling back on close: {e}");
        }
        if let Err(e) = self.transaction.close() {
            warn!("unexpected error closing transaction: {e}");
        }
        self.local_cache.clear();
        self.output_parameter_cache.clear();
        self.deferred_loads.clear();
        self.closed = true;
    }

    /// Stages a nested-query result for assignment into `owner.property`,
    /// or assigns immediately when the cache entry is already materialized.
    pub fn defer_load(
        &mut self,
        owner: &ResultObject,
        property: &str,
        key: CacheKey,
        target: LoadTarget,
    ) -> DynSqlResult<()> {
        self.check_open()?;
        let load = DeferredLoad::new(
            owner.clone(),
            property,
            key,
            target,
            self.configuration.object_factory().clone(),
        );
        if load.can_load(&self.local_cache) {
            load.load(&self.local_cache)
        } else {
            self.deferred_loads.push_back(load);
            Ok(())
        }
    }

    fn drain_deferred_loads(&mut self) -> DynSqlResult<()> {
        let loads = std::mem::take(&mut self.deferred_loads);
        let mut first_error = None;
        for load in loads {
            if let Err(e) = load.load(&self.local_cache) {
                // Entries are already materialized; a failed assignment
                // cannot corrupt the cache. Finish the drain regardless.
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Builds the cache key for a query invocation: statement id, bounds,
    /// final SQL, IN-parameter values, environment id.
    pub fn create_cache_key(
        &self,
        statement: &MappedStatement,
        parameter: &Value,
        bounds: RowBounds,
    ) -> DynSqlResult<CacheKey> {
        let bound = statement.bound_sql(parameter)?;
        self.build_cache_key(statement, &bound, bounds)
    }

    fn build_cache_key(
        &self,
        statement: &MappedStatement,
        bound: &BoundSql,
        bounds: RowBounds,
    ) -> DynSqlResult<CacheKey> {
        self.check_open()?;
        let mut key = CacheKey::new();
        key.update_str(statement.id());
        key.update_usize(bounds.offset);
        key.update_usize(bounds.limit);
        key.update_str(bound.sql());
        let converters = self.configuration.converters();
        for mapping in bound.parameter_mappings() {
            if mapping.mode == ParameterMode::Out {
                continue;
            }
            key.update(bound.parameter_value(&mapping.property, converters));
        }
        if let Some(environment_id) = self.configuration.environment_id() {
            key.update_str(environment_id);
        }
        Ok(key)
    }

    pub fn is_cached(&self, key: &CacheKey) -> bool {
        self.local_cache.is_materialized(key)
    }

    pub fn clear_local_cache(&mut self) {
        if !self.closed {
            self.local_cache.clear();
            self.output_parameter_cache.clear();
        }
    }

    pub(crate) fn local_cache(&self) -> &LocalCache {
        &self.local_cache
    }

    pub(crate) fn deferred_load_count(&self) -> usize {
        self.deferred_loads.len()
    }

    /// Values bound at statement preparation, in descriptor order. OUT-only
    /// slots bind null; everything else runs through its declared-type
    /// converter.
    fn resolved_parameters(&self, bound: &BoundSql) -> DynSqlResult<Vec<Value>> {
        let converters = self.configuration.converters();
        let mut values = Vec::with_capacity(bound.parameter_mappings().len());
        for mapping in bound.parameter_mappings() {
            if mapping.mode == ParameterMode::Out {
                values.push(Value::Null);
                continue;
            }
            let raw = bound.parameter_value(&mapping.property, converters);
            let converter = converters.converter_for(mapping.declared_type.as_deref());
            values.push(converter.to_database(&raw)?);
        }
        Ok(values)
    }

    /// On a callable-statement cache hit, replays the cached OUT-mode
    /// parameters back into the caller's parameter object.
    fn replay_output_parameters(
        &self,
        statement: &MappedStatement,
        key: &CacheKey,
        parameter: &mut Value,
        bound: &BoundSql,
    ) {
        if statement.statement_type() != StatementType::Callable {
            return;
        }
        let Some(cached) = self.output_parameter_cache.get(key) else {
            return;
        };
        for mapping in bound.parameter_mappings() {
            if mapping.mode == ParameterMode::In {
                continue;
            }
            if let (Some(object), Some(value)) =
                (parameter.as_object_mut(), cached.get(&mapping.property))
            {
                object.insert(mapping.property.clone(), value.clone());
            }
        }
    }
}

fn apply_bounds(rows: Vec<Value>, bounds: RowBounds) -> Vec<Value> {
    if bounds.is_default() {
        return rows;
    }
    rows.into_iter()
        .skip(bounds.offset)
        .take(bounds.limit)
        .collect()
}

fn statement_error(
    statement: &MappedStatement,
    bound: &BoundSql,
    source: DynSqlError,
) -> DynSqlError {
    match source {
        // Session-level failures keep their kind
        DynSqlError::ExecutorClosed => DynSqlError::ExecutorClosed,
        other => DynSqlError::Statement {
            statement_id: statement.id().to_string(),
            sql: bound.sql().to_string(),
            message: other.to_string(),
        },
    }
}
