use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::key::CacheKey;

/// One local-cache slot: either a query in flight or a materialized list.
#[derive(Debug, Clone)]
pub enum CacheEntry {
    /// Building sentinel: a query for this key has started but its result
    /// is not yet reified. A deferred-load probe must treat this as
    /// "not loadable", unlike an absent key after a failed query.
    InProgress,
    /// Materialized result list, shared by identity with callers.
    Rows(Arc<Vec<Value>>),
}

/// Session-scoped key/value store. No eviction; cleared explicitly on
/// writes, flush, commit/rollback and (under STATEMENT scope) at the end
/// of each top-level query.
#[derive(Debug, Default)]
pub struct LocalCache {
    entries: HashMap<CacheKey, CacheEntry>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// The materialized list for `key`, if present and not in progress.
    pub fn rows(&self, key: &CacheKey) -> Option<Arc<Vec<Value>>> {
        match self.entries.get(key) {
            Some(CacheEntry::Rows(rows)) => Some(rows.clone()),
            _ => None,
        }
    }

    pub fn is_materialized(&self, key: &CacheKey) -> bool {
        matches!(self.entries.get(key), Some(CacheEntry::Rows(_)))
    }

    pub fn put(&mut self, key: CacheKey, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    pub fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.remove(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if any slot still holds the building sentinel.
    pub fn has_sentinel(&self) -> bool {
        self.entries
            .values()
            .any(|e| matches!(e, CacheEntry::InProgress))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(tag: &str) -> CacheKey {
        let mut key = CacheKey::new();
        key.update_str(tag);
        key
    }

    #[test]
    fn test_put_get_remove() {
        let mut cache = LocalCache::new();
        let k = key("a");
        cache.put(k.clone(), CacheEntry::Rows(Arc::new(vec![json!(1)])));
        assert!(cache.is_materialized(&k));
        assert_eq!(cache.rows(&k).unwrap().len(), 1);

        cache.remove(&k);
        assert!(cache.get(&k).is_none());
    }

    #[test]
    fn test_sentinel_is_not_materialized() {
        let mut cache = LocalCache::new();
        let k = key("a");
        cache.put(k.clone(), CacheEntry::InProgress);
        assert!(cache.get(&k).is_some());
        assert!(!cache.is_materialized(&k));
        assert!(cache.rows(&k).is_none());
        assert!(cache.has_sentinel());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut cache = LocalCache::new();
        cache.put(key("a"), CacheEntry::InProgress);
        cache.clear();
        assert!(cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_rows_are_shared_by_identity() {
        let mut cache = LocalCache::new();
        let k = key("a");
        let rows = Arc::new(vec![json!({"id": 1})]);
        cache.put(k.clone(), CacheEntry::Rows(rows.clone()));
        let first = cache.rows(&k).unwrap();
        let second = cache.rows(&k).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &rows));
    }
}
