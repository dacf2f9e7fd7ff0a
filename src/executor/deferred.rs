use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::cache::{CacheKey, LocalCache};
use crate::driver::ObjectFactory;
use crate::error::{DynSqlError, DynSqlResult};

/// A result object whose properties deferred loads assign into. Sessions
/// are single-owner; the lock is structural, not a synchronization
/// protocol.
pub type ResultObject = Arc<RwLock<Value>>;

/// Shape the loaded rows reduce to before assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTarget {
    /// Single value: one row, or null for none; more than one is an error
    Scalar,
    /// The whole row list, in a factory-created container
    List,
}

/// A pending assignment of a nested-query result into a parent object's
/// property, resolved once the top-level query completes and the cache
/// entry is guaranteed materialized.
pub struct DeferredLoad {
    owner: ResultObject,
    property: String,
    key: CacheKey,
    target: LoadTarget,
    object_factory: Arc<dyn ObjectFactory>,
}

impl DeferredLoad {
    pub fn new(
        owner: ResultObject,
        property: impl Into<String>,
        key: CacheKey,
        target: LoadTarget,
        object_factory: Arc<dyn ObjectFactory>,
    ) -> Self {
        Self {
            owner,
            property: property.into(),
            key,
            target,
            object_factory,
        }
    }

    /// True once the cache holds a materialized list for the key — not the
    /// building sentinel, which means the nested query is still running.
    pub fn can_load(&self, cache: &LocalCache) -> bool {
        cache.is_materialized(&self.key)
    }

    /// Reads the materialized rows and assigns them into the owner.
    pub fn load(&self, cache: &LocalCache) -> DynSqlResult<()> {
        let rows = cache.rows(&self.key).ok_or_else(|| {
            DynSqlError::Execution(format!(
                "deferred load for '{}' has no materialized cache entry",
                self.property
            ))
        })?;
        let value = extract_from_rows(&rows, self.target, &self.object_factory)?;

        let mut owner = self.owner.write().unwrap();
        match owner.as_object_mut() {
            Some(object) => {
                object.insert(self.property.clone(), value);
                Ok(())
            }
            None => Err(DynSqlError::Execution(format!(
                "deferred load owner for '{}' is not an object",
                self.property
            ))),
        }
    }
}

fn extract_from_rows(
    rows: &[Value],
    target: LoadTarget,
    object_factory: &Arc<dyn ObjectFactory>,
) -> DynSqlResult<Value> {
    match target {
        LoadTarget::List => {
            let mut list = object_factory.create_list();
            if let Some(items) = list.as_array_mut() {
                items.extend(rows.iter().cloned());
            }
            Ok(list)
        }
        LoadTarget::Scalar => match rows.len() {
            0 => Ok(Value::Null),
            1 => Ok(rows[0].clone()),
            n => Err(DynSqlError::Execution(format!(
                "expected one result for a scalar load, got {n}"
            ))),
        },
    }
}
