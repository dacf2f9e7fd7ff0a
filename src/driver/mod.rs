//! External collaborator contracts.
//!
//! The executor composes SQL and manages the session cache; everything that
//! touches an actual database lives behind these traits: the transactional
//! connection, the statement handler that prepares and runs SQL, the type
//! converter registry consulted while binding parameters, and the object
//! factory used when reifying results.

pub mod memory;

use std::any::Any;
use std::time::Duration;

use serde_json::{json, Value};

use crate::error::DynSqlResult;
use crate::mapping::{BatchResult, MappedStatement, RowBounds};
use crate::scripting::BoundSql;

pub use memory::{InMemoryDriver, StubTransaction};

/// Opaque driver connection handle. Implementations downcast to their own
/// concrete type.
pub trait Connection: Any {
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Transactional connection owned by one executor.
pub trait Transaction {
    fn connection(&mut self) -> DynSqlResult<&mut dyn Connection>;

    fn commit(&mut self) -> DynSqlResult<()>;

    fn rollback(&mut self) -> DynSqlResult<()>;

    fn close(&mut self) -> DynSqlResult<()>;

    /// Remaining time budget propagated to each driver call.
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

/// Streaming row cursor; rows are fetched as the iterator is driven.
pub type RowCursor = Box<dyn Iterator<Item = DynSqlResult<Value>>>;

/// Prepares, parameterizes and executes a composed statement against a
/// connection. `parameters` holds the resolved values in descriptor order.
pub trait StatementHandler {
    fn query(
        &mut self,
        connection: &mut dyn Connection,
        statement: &MappedStatement,
        bound: &BoundSql,
        parameters: &[Value],
        timeout: Option<Duration>,
    ) -> DynSqlResult<Vec<Value>>;

    fn update(
        &mut self,
        connection: &mut dyn Connection,
        statement: &MappedStatement,
        bound: &BoundSql,
        parameters: &[Value],
        timeout: Option<Duration>,
    ) -> DynSqlResult<u64>;

    fn query_cursor(
        &mut self,
        connection: &mut dyn Connection,
        statement: &MappedStatement,
        bound: &BoundSql,
        parameters: &[Value],
        bounds: RowBounds,
        timeout: Option<Duration>,
    ) -> DynSqlResult<RowCursor>;

    /// Drains any batched statements; `rollback` discards them instead.
    fn flush(&mut self, rollback: bool) -> DynSqlResult<Vec<BatchResult>>;
}

/// Row callback for handler-driven reads (which bypass the local cache).
pub trait ResultHandler {
    fn handle_row(&mut self, row: &Value);
}

impl<F: FnMut(&Value)> ResultHandler for F {
    fn handle_row(&mut self, row: &Value) {
        self(row)
    }
}

/// Maps values between application and database representations.
pub trait TypeConverter: Send + Sync {
    fn to_database(&self, value: &Value) -> DynSqlResult<Value>;

    fn from_database(&self, value: &Value) -> DynSqlResult<Value>;
}

/// Identity converter; the default for every scalar kind.
#[derive(Debug, Default)]
pub struct IdentityConverter;

impl TypeConverter for IdentityConverter {
    fn to_database(&self, value: &Value) -> DynSqlResult<Value> {
        Ok(value.clone())
    }

    fn from_database(&self, value: &Value) -> DynSqlResult<Value> {
        Ok(value.clone())
    }
}

/// Answers "does a converter exist for this value" and performs the
/// mapping. Scalars have converters by default; containers do not, which
/// routes container roots through property lookup instead.
pub struct TypeConverterRegistry {
    named: std::collections::HashMap<String, std::sync::Arc<dyn TypeConverter>>,
}

impl TypeConverterRegistry {
    pub fn new() -> Self {
        Self {
            named: std::collections::HashMap::new(),
        }
    }

    /// Registers a converter under a declared-type name (the `javaType`
    /// hint of a parameter token).
    pub fn register(
        &mut self,
        declared_type: impl Into<String>,
        converter: std::sync::Arc<dyn TypeConverter>,
    ) {
        self.named.insert(declared_type.into(), converter);
    }

    pub fn has_converter(&self, value: &Value) -> bool {
        !matches!(value, Value::Array(_) | Value::Object(_))
    }

    /// The converter for a declared type, falling back to identity.
    pub fn converter_for(&self, declared_type: Option<&str>) -> std::sync::Arc<dyn TypeConverter> {
        declared_type
            .and_then(|name| self.named.get(name).cloned())
            .unwrap_or_else(|| std::sync::Arc::new(IdentityConverter))
    }
}

impl Default for TypeConverterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TypeConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeConverterRegistry")
            .field("named", &self.named.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Constructs result objects and their intermediate containers.
pub trait ObjectFactory: Send + Sync {
    fn create(&self) -> Value {
        json!({})
    }

    fn create_list(&self) -> Value {
        json!([])
    }
}

/// JSON containers, nothing fancier.
#[derive(Debug, Default)]
pub struct DefaultObjectFactory;

impl ObjectFactory for DefaultObjectFactory {}
