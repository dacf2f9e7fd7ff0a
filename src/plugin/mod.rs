//! Interceptor pipeline around the executor.
//!
//! Interceptors declare which executor methods they wrap and receive an
//! [`Invocation`] carrying the live argument bundle. Calling
//! [`Invocation::proceed`] hands control to the next layer (ultimately the
//! session executor); `proceed` consumes the invocation, so a plugin can
//! call it at most once — short-circuiting is returning an outcome without
//! calling it.

pub mod paging;

use std::sync::Arc;

use serde_json::Value;

use crate::driver::{ResultHandler, RowCursor};
use crate::error::DynSqlResult;
use crate::executor::Executor;
use crate::mapping::{BatchResult, MappedStatement, RowBounds};

pub use paging::{Dialect, LimitOffsetDialect, PagingInterceptor};

/// The interceptable executor surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorMethod {
    Update,
    Query,
    QueryCursor,
    FlushStatements,
}

/// Argument bundle of one executor call. Interceptors may rewrite the
/// statement, the parameter object and the bounds before proceeding.
pub enum Action<'a> {
    Update {
        statement: MappedStatement,
        parameter: &'a mut Value,
    },
    Query {
        statement: MappedStatement,
        parameter: &'a mut Value,
        bounds: RowBounds,
        handler: Option<&'a mut dyn ResultHandler>,
    },
    QueryCursor {
        statement: MappedStatement,
        parameter: &'a mut Value,
        bounds: RowBounds,
    },
    FlushStatements { rollback: bool },
}

impl Action<'_> {
    pub fn method(&self) -> ExecutorMethod {
        match self {
            Action::Update { .. } => ExecutorMethod::Update,
            Action::Query { .. } => ExecutorMethod::Query,
            Action::QueryCursor { .. } => ExecutorMethod::QueryCursor,
            Action::FlushStatements { .. } => ExecutorMethod::FlushStatements,
        }
    }

    pub fn statement(&self) -> Option<&MappedStatement> {
        match self {
            Action::Update { statement, .. }
            | Action::Query { statement, .. }
            | Action::QueryCursor { statement, .. } => Some(statement),
            Action::FlushStatements { .. } => None,
        }
    }
}

/// What an executor call produced; variants mirror [`ExecutorMethod`].
pub enum Outcome {
    Affected(u64),
    Rows(Arc<Vec<Value>>),
    Cursor(RowCursor),
    Batches(Vec<BatchResult>),
}

/// A plugin wrapping executor operations.
pub trait Interceptor: Send + Sync {
    /// Which methods this interceptor wraps; others pass through.
    fn applies_to(&self, method: ExecutorMethod) -> bool;

    fn intercept(&self, invocation: Invocation<'_, '_>) -> DynSqlResult<Outcome>;

    /// Name surfaced in interceptor errors.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// One in-flight, intercepted call.
pub struct Invocation<'a, 'e> {
    method: ExecutorMethod,
    action: Action<'a>,
    executor: &'e mut Executor,
    next: usize,
}

impl<'a, 'e> Invocation<'a, 'e> {
    pub(crate) fn new(
        method: ExecutorMethod,
        action: Action<'a>,
        executor: &'e mut Executor,
        next: usize,
    ) -> Self {
        Self {
            method,
            action,
            executor,
            next,
        }
    }

    pub fn method(&self) -> ExecutorMethod {
        self.method
    }

    pub fn action(&self) -> &Action<'a> {
        &self.action
    }

    pub fn action_mut(&mut self) -> &mut Action<'a> {
        &mut self.action
    }

    /// Re-entrant access to the wrapped executor, e.g. for metadata
    /// pre-fetches. Re-entrant calls run the full chain and participate in
    /// nesting-depth accounting.
    pub fn executor(&mut self) -> &mut Executor {
        self.executor
    }

    /// Continues down the chain with the (possibly rewritten) arguments.
    /// Consumes the invocation: it cannot be called twice.
    pub fn proceed(self) -> DynSqlResult<Outcome> {
        self.executor.invoke_from(self.next, self.action)
    }
}
