use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use super::ast::Expression;
use super::parser::Parser;
use crate::error::DynSqlResult;

static EXPRESSION_CACHE: OnceLock<DashMap<String, Arc<Expression>>> = OnceLock::new();

fn cache() -> &'static DashMap<String, Arc<Expression>> {
    EXPRESSION_CACHE.get_or_init(DashMap::new)
}

/// Parse an expression through the process-wide cache.
///
/// Expressions come from a fixed set of mapper definitions, so the cache is
/// unbounded. Concurrent duplicate parses are harmless; parse failures are
/// not cached.
pub fn parse_cached(source: &str) -> DynSqlResult<Arc<Expression>> {
    if let Some(expr) = cache().get(source) {
        return Ok(expr.clone());
    }
    let parsed = Arc::new(Parser::new(source)?.parse()?);
    cache().insert(source.to_string(), parsed.clone());
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_returns_same_tree() {
        let a = parse_cached("cached_test_name != null").unwrap();
        let b = parse_cached("cached_test_name != null").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_parse_errors_are_not_cached() {
        assert!(parse_cached("&& &&").is_err());
        assert!(parse_cached("&& &&").is_err());
    }
}
