//! dynsql - dynamic SQL composition and session-scoped execution.
//!
//! The core of a declarative persistence framework: mapping definitions
//! (an XML tag grammar of dynamic SQL fragments) plus runtime JSON
//! parameters compose into executable SQL with positional placeholders.
//! A session executor runs the result through pluggable driver contracts,
//! with a first-level result cache, a deferred-load queue for cyclic
//! object graphs, and an interceptor chain that can rewrite operations in
//! flight.
//!
//! # Main Components
//!
//! - **expr**: expression language evaluated against the binding map
//! - **scripting**: SQL node trees, composition context and mapper XML
//! - **cache**: the value-equality cache key and the session-local cache
//! - **executor**: the session executor and its deferred loads
//! - **plugin**: the interceptor chain and the paging plugin
//! - **driver**: external collaborator contracts plus in-memory stubs
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use dynsql::driver::{InMemoryDriver, StubTransaction};
//! use dynsql::{Configuration, Executor, RowBounds};
//!
//! let mut config = Configuration::new();
//! config
//!     .load_mapper_xml(
//!         r#"<mapper namespace="user">
//!             <select id="byName">
//!                 SELECT * FROM users
//!                 <where><if test="name != null">name = #{name}</if></where>
//!             </select>
//!         </mapper>"#,
//!     )
//!     .unwrap();
//!
//! let driver = InMemoryDriver::new();
//! driver.seed_rows("user.byName", vec![json!({"id": 1, "name": "alice"})]);
//!
//! let config = Arc::new(config);
//! let statement = config.statement("user.byName").unwrap();
//! let mut executor = Executor::new(
//!     config.clone(),
//!     Box::new(StubTransaction::new()),
//!     Box::new(driver.clone()),
//! );
//!
//! let mut parameter = json!({"name": "alice"});
//! let rows = executor
//!     .query(&statement, &mut parameter, RowBounds::default())
//!     .unwrap();
//! assert_eq!(rows.len(), 1);
//! assert_eq!(driver.calls()[0].sql, "SELECT * FROM users WHERE name = ?");
//! ```

pub mod cache;
pub mod config;
pub mod driver;
pub mod error;
pub mod executor;
pub mod expr;
pub mod mapping;
pub mod plugin;
pub mod scripting;

// Re-export the main types for convenience
pub use cache::{CacheEntry, CacheKey, LocalCache};
pub use config::{Configuration, LocalCacheScope};
pub use error::{DynSqlError, DynSqlResult};
pub use executor::{Executor, LoadTarget, ResultObject, SessionExecutor};
pub use mapping::{BatchResult, MappedStatement, RowBounds, SqlCommandType, StatementType};
pub use plugin::{
    Action, Dialect, ExecutorMethod, Interceptor, Invocation, LimitOffsetDialect, Outcome,
    PagingInterceptor,
};
pub use scripting::{BoundSql, DynamicContext, ParameterMapping, ParameterMode, SqlNode, SqlSource};
