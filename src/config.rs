//! Framework configuration: statement registry, cache scope and the
//! pluggable collaborators shared by every executor of a session factory.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::driver::{DefaultObjectFactory, ObjectFactory, TypeConverterRegistry};
use crate::error::{DynSqlError, DynSqlResult};
use crate::mapping::MappedStatement;
use crate::plugin::Interceptor;
use crate::scripting::MapperParser;

/// When the session-local cache is dropped: at session boundaries (the
/// default) or at the end of every top-level statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LocalCacheScope {
    #[default]
    Session,
    Statement,
}

/// Shared, immutable-after-setup configuration. Executors hold it behind an
/// `Arc`.
pub struct Configuration {
    statements: HashMap<String, Arc<MappedStatement>>,
    local_cache_scope: LocalCacheScope,
    environment_id: Option<String>,
    converters: TypeConverterRegistry,
    object_factory: Arc<dyn ObjectFactory>,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl Configuration {
    pub fn new() -> Self {
        Self {
            statements: HashMap::new(),
            local_cache_scope: LocalCacheScope::default(),
            environment_id: None,
            converters: TypeConverterRegistry::new(),
            object_factory: Arc::new(DefaultObjectFactory),
            interceptors: Vec::new(),
        }
    }

    pub fn with_local_cache_scope(mut self, scope: LocalCacheScope) -> Self {
        self.local_cache_scope = scope;
        self
    }

    pub fn with_environment_id(mut self, environment_id: impl Into<String>) -> Self {
        self.environment_id = Some(environment_id.into());
        self
    }

    pub fn with_object_factory(mut self, factory: Arc<dyn ObjectFactory>) -> Self {
        self.object_factory = factory;
        self
    }

    /// Appends an interceptor; the last added wraps outermost.
    pub fn add_interceptor(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.add_interceptor(interceptor);
        self
    }

    /// Registers a statement under its id.
    pub fn register_statement(&mut self, statement: MappedStatement) -> DynSqlResult<()> {
        let id = statement.id().to_string();
        if self.statements.contains_key(&id) {
            return Err(DynSqlError::Build(format!(
                "statement '{id}' is already registered"
            )));
        }
        self.statements.insert(id, Arc::new(statement));
        Ok(())
    }

    /// Parses a mapper XML document and registers all its statements.
    pub fn load_mapper_xml(&mut self, xml: &str) -> DynSqlResult<()> {
        let mapper = MapperParser::new(xml).parse()?;
        for statement in mapper.statements {
            self.register_statement(statement)?;
        }
        Ok(())
    }

    pub fn statement(&self, id: &str) -> DynSqlResult<Arc<MappedStatement>> {
        self.statements.get(id).cloned().ok_or_else(|| {
            DynSqlError::Build(format!("statement '{id}' is not registered"))
        })
    }

    pub fn local_cache_scope(&self) -> LocalCacheScope {
        self.local_cache_scope
    }

    pub fn environment_id(&self) -> Option<&str> {
        self.environment_id.as_deref()
    }

    pub fn converters(&self) -> &TypeConverterRegistry {
        &self.converters
    }

    pub fn converters_mut(&mut self) -> &mut TypeConverterRegistry {
        &mut self.converters
    }

    pub fn object_factory(&self) -> &Arc<dyn ObjectFactory> {
        &self.object_factory
    }

    pub fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.interceptors
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("statements", &self.statements.keys().collect::<Vec<_>>())
            .field("local_cache_scope", &self.local_cache_scope)
            .field("environment_id", &self.environment_id)
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}
