//! Session executor tests.
//!
//! Covers:
//! - local cache hits returning the identical list
//! - cache invalidation on writes, commit and rollback
//! - STATEMENT cache scope
//! - cache key determinism
//! - deferred loads
//! - callable output-parameter replay
//! - closed-executor semantics

mod common;

use std::sync::Arc;
use std::sync::RwLock;

use common::{session_with_config, session_with_mapper, USERS_MAPPER};
use dynsql::executor::LoadTarget;
use dynsql::{
    Configuration, DynSqlError, LocalCacheScope, ResultObject, RowBounds, StatementType,
};
use serde_json::{json, Value};

#[test]
fn test_local_cache_hit_returns_identical_list() {
    let mut session = session_with_mapper(USERS_MAPPER);
    session
        .driver
        .seed_rows("user.findByName", vec![json!({"id": 1, "name": "alice"})]);

    let stmt = session.statement("user.findByName");
    let mut parameter = json!({"name": "alice"});

    let first = session
        .executor
        .query(&stmt, &mut parameter, RowBounds::default())
        .unwrap();
    let second = session
        .executor
        .query(&stmt, &mut parameter, RowBounds::default())
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second), "cache hit must preserve identity");
    assert_eq!(session.driver.query_count("user.findByName"), 1);
}

#[test]
fn test_different_parameters_miss_the_cache() {
    let mut session = session_with_mapper(USERS_MAPPER);
    session.driver.seed_rows("user.findByName", vec![json!(1)]);

    let stmt = session.statement("user.findByName");
    session
        .executor
        .query(&stmt, &mut json!({"name": "alice"}), RowBounds::default())
        .unwrap();
    session
        .executor
        .query(&stmt, &mut json!({"name": "bob"}), RowBounds::default())
        .unwrap();

    assert_eq!(session.driver.query_count("user.findByName"), 2);
}

#[test]
fn test_update_clears_cache_between_queries() {
    let mut session = session_with_mapper(USERS_MAPPER);
    session.driver.seed_rows("user.findAll", vec![json!(1)]);

    let find = session.statement("user.findAll");
    let rename = session.statement("user.rename");

    session
        .executor
        .query(&find, &mut Value::Null, RowBounds::default())
        .unwrap();
    session
        .executor
        .update(&rename, &mut json!({"id": 1, "name": "x"}))
        .unwrap();
    session
        .executor
        .query(&find, &mut Value::Null, RowBounds::default())
        .unwrap();

    assert_eq!(session.driver.query_count("user.findAll"), 2);
}

#[test]
fn test_commit_and_rollback_clear_the_cache() {
    let mut session = session_with_mapper(USERS_MAPPER);
    session.driver.seed_rows("user.findAll", vec![json!(1)]);
    let find = session.statement("user.findAll");

    session
        .executor
        .query(&find, &mut Value::Null, RowBounds::default())
        .unwrap();
    session.executor.commit(true).unwrap();
    session
        .executor
        .query(&find, &mut Value::Null, RowBounds::default())
        .unwrap();
    session.executor.rollback(true).unwrap();
    session
        .executor
        .query(&find, &mut Value::Null, RowBounds::default())
        .unwrap();

    assert_eq!(session.driver.query_count("user.findAll"), 3);
    assert_eq!(session.transaction.commits(), 1);
    assert_eq!(session.transaction.rollbacks(), 1);
}

#[test]
fn test_statement_scope_drops_cache_after_each_top_level_query() {
    let mut config = Configuration::new().with_local_cache_scope(LocalCacheScope::Statement);
    config.load_mapper_xml(USERS_MAPPER).unwrap();
    let mut session = session_with_config(config);
    session.driver.seed_rows("user.findAll", vec![json!(1)]);

    let find = session.statement("user.findAll");
    session
        .executor
        .query(&find, &mut Value::Null, RowBounds::default())
        .unwrap();
    session
        .executor
        .query(&find, &mut Value::Null, RowBounds::default())
        .unwrap();

    assert_eq!(session.driver.query_count("user.findAll"), 2);
}

#[test]
fn test_cache_key_determinism() {
    let session = session_with_mapper(USERS_MAPPER);
    let stmt = session.statement("user.findByName");

    let a = session
        .executor
        .create_cache_key(&stmt, &json!({"name": "x"}), RowBounds::default())
        .unwrap();
    let b = session
        .executor
        .create_cache_key(&stmt, &json!({"name": "x"}), RowBounds::default())
        .unwrap();
    assert_eq!(a, b);

    let other_param = session
        .executor
        .create_cache_key(&stmt, &json!({"name": "y"}), RowBounds::default())
        .unwrap();
    assert_ne!(a, other_param);

    let other_bounds = session
        .executor
        .create_cache_key(&stmt, &json!({"name": "x"}), RowBounds::new(5, 10))
        .unwrap();
    assert_ne!(a, other_bounds);
}

#[test]
fn test_environment_id_participates_in_the_key() {
    let mut config_a = Configuration::new().with_environment_id("dev");
    config_a.load_mapper_xml(USERS_MAPPER).unwrap();
    let session_a = session_with_config(config_a);

    let mut config_b = Configuration::new().with_environment_id("prod");
    config_b.load_mapper_xml(USERS_MAPPER).unwrap();
    let session_b = session_with_config(config_b);

    let key_a = session_a
        .executor
        .create_cache_key(
            &session_a.statement("user.findAll"),
            &Value::Null,
            RowBounds::default(),
        )
        .unwrap();
    let key_b = session_b
        .executor
        .create_cache_key(
            &session_b.statement("user.findAll"),
            &Value::Null,
            RowBounds::default(),
        )
        .unwrap();
    assert_ne!(key_a, key_b);
}

#[test]
fn test_clear_local_cache_is_idempotent() {
    let mut session = session_with_mapper(USERS_MAPPER);
    session.executor.clear_local_cache();
    session.executor.clear_local_cache();
}

#[test]
fn test_failed_query_leaves_no_sentinel_and_no_entry() {
    let mut session = session_with_mapper(USERS_MAPPER);
    session.driver.seed_rows("user.findAll", vec![json!(1)]);
    session.driver.fail_next_query("user.findAll", "disk on fire");

    let find = session.statement("user.findAll");
    let err = session
        .executor
        .query(&find, &mut Value::Null, RowBounds::default())
        .unwrap_err();
    match err {
        DynSqlError::Statement {
            statement_id, sql, ..
        } => {
            assert_eq!(statement_id, "user.findAll");
            assert_eq!(sql, "SELECT * FROM users");
        }
        other => panic!("expected a statement error, got {other}"),
    }
    assert!(!session.executor.local_cache_has_sentinel());

    // Absent, not in-progress: the retry goes back to the database
    session
        .executor
        .query(&find, &mut Value::Null, RowBounds::default())
        .unwrap();
    assert_eq!(session.driver.query_count("user.findAll"), 2);
}

#[test]
fn test_no_sentinel_survives_a_successful_query() {
    let mut session = session_with_mapper(USERS_MAPPER);
    session.driver.seed_rows("user.findAll", vec![json!(1)]);
    let find = session.statement("user.findAll");
    session
        .executor
        .query(&find, &mut Value::Null, RowBounds::default())
        .unwrap();
    assert!(!session.executor.local_cache_has_sentinel());
}

#[test]
fn test_deferred_load_is_immediate_when_already_materialized() {
    let mut session = session_with_mapper(USERS_MAPPER);
    session.driver.seed_rows(
        "user.childrenOf",
        vec![json!({"id": 2}), json!({"id": 3})],
    );

    let children = session.statement("user.childrenOf");
    let mut parameter = json!({"parentId": 1});
    session
        .executor
        .query(&children, &mut parameter, RowBounds::default())
        .unwrap();

    let key = session
        .executor
        .create_cache_key(&children, &parameter, RowBounds::default())
        .unwrap();
    assert!(session.executor.is_cached(&key));

    let parent: ResultObject = Arc::new(RwLock::new(json!({"id": 1})));
    session
        .executor
        .defer_load(&parent, "children", key, LoadTarget::List)
        .unwrap();

    // Materialized entry: assignment happened immediately
    assert_eq!(session.executor.pending_deferred_loads(), 0);
    assert_eq!(
        parent.read().unwrap()["children"],
        json!([{"id": 2}, {"id": 3}])
    );
}

#[test]
fn test_deferred_load_resolves_when_top_level_query_completes() {
    let mut session = session_with_mapper(USERS_MAPPER);
    session
        .driver
        .seed_rows("user.childrenOf", vec![json!({"id": 2})]);

    let children = session.statement("user.childrenOf");
    let parameter = json!({"parentId": 1});
    let key = session
        .executor
        .create_cache_key(&children, &parameter, RowBounds::default())
        .unwrap();

    // Probe before anything is materialized: the load is enqueued
    let parent: ResultObject = Arc::new(RwLock::new(json!({"id": 1})));
    session
        .executor
        .defer_load(&parent, "children", key, LoadTarget::List)
        .unwrap();
    assert_eq!(session.executor.pending_deferred_loads(), 1);
    assert_eq!(parent.read().unwrap().get("children"), None);

    // The next top-level query materializes the entry and drains the queue
    session
        .executor
        .query(&children, &mut parameter.clone(), RowBounds::default())
        .unwrap();
    assert_eq!(session.executor.pending_deferred_loads(), 0);
    assert_eq!(parent.read().unwrap()["children"], json!([{"id": 2}]));
}

#[test]
fn test_callable_output_parameters_replay_on_cache_hit() {
    let mut config = Configuration::new();
    let call = dynsql::MappedStatement::new(
        "report.refresh",
        dynsql::SqlCommandType::Select,
        dynsql::SqlSource::from_node(dynsql::SqlNode::text(
            "{call refresh_report(#{id}, #{total, mode=OUT})}",
        ))
        .unwrap(),
    )
    .with_statement_type(StatementType::Callable);
    config.register_statement(call).unwrap();

    let mut session = session_with_config(config);
    session.driver.seed_rows("report.refresh", vec![json!(1)]);
    let stmt = session.statement("report.refresh");

    // First run: the session caches the post-execution parameter object
    // (the driver's OUT materialization is its own concern; here the
    // caller-visible object already carries the total).
    let mut first = json!({"id": 7, "total": 99});
    session
        .executor
        .query(&stmt, &mut first, RowBounds::default())
        .unwrap();

    // Second run with the same IN parameters: OUT slots replay from the
    // output-parameter cache into the caller's object.
    let mut second = json!({"id": 7, "total": 0});
    session
        .executor
        .query(&stmt, &mut second, RowBounds::default())
        .unwrap();

    assert_eq!(session.driver.query_count("report.refresh"), 1);
    assert_eq!(second["total"], json!(99));
}

#[test]
fn test_query_cursor_bypasses_the_cache() {
    let mut session = session_with_mapper(USERS_MAPPER);
    session
        .driver
        .seed_rows("user.findAll", vec![json!(1), json!(2), json!(3)]);
    let find = session.statement("user.findAll");

    for _ in 0..2 {
        let cursor = session
            .executor
            .query_cursor(&find, &mut Value::Null, RowBounds::default())
            .unwrap();
        let rows: Vec<Value> = cursor.map(Result::unwrap).collect();
        assert_eq!(rows, vec![json!(1), json!(2), json!(3)]);
    }
    let cursor_calls = session
        .driver
        .calls()
        .iter()
        .filter(|c| matches!(c.kind, dynsql::driver::memory::CallKind::Cursor))
        .count();
    assert_eq!(cursor_calls, 2);
}

#[test]
fn test_row_bounds_window_applies_in_memory() {
    let mut session = session_with_mapper(USERS_MAPPER);
    session.driver.seed_rows(
        "user.findAll",
        (0..10).map(|i| json!({"id": i})).collect(),
    );
    let find = session.statement("user.findAll");

    let rows = session
        .executor
        .query(&find, &mut Value::Null, RowBounds::new(3, 4))
        .unwrap();
    let ids: Vec<i64> = rows.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![3, 4, 5, 6]);
}

#[test]
fn test_handler_driven_query_bypasses_cache_reads() {
    let mut session = session_with_mapper(USERS_MAPPER);
    session.driver.seed_rows("user.findAll", vec![json!(1), json!(2)]);
    let find = session.statement("user.findAll");

    // Prime the cache
    session
        .executor
        .query(&find, &mut Value::Null, RowBounds::default())
        .unwrap();

    let mut seen = Vec::new();
    let mut collect = |row: &Value| seen.push(row.clone());
    session
        .executor
        .query_with_handler(&find, &mut Value::Null, RowBounds::default(), &mut collect)
        .unwrap();

    assert_eq!(seen, vec![json!(1), json!(2)]);
    assert_eq!(
        session.driver.query_count("user.findAll"),
        2,
        "handler-driven reads must go to the database"
    );
}

#[test]
fn test_operations_fail_after_close() {
    let mut session = session_with_mapper(USERS_MAPPER);
    let find = session.statement("user.findAll");

    session.executor.close(false);
    assert!(session.executor.is_closed());
    assert_eq!(session.transaction.closes(), 1);

    let err = session
        .executor
        .query(&find, &mut Value::Null, RowBounds::default())
        .unwrap_err();
    assert!(matches!(err, DynSqlError::ExecutorClosed));
    assert!(matches!(
        session.executor.commit(true),
        Err(DynSqlError::ExecutorClosed)
    ));
    assert!(matches!(
        session.executor.rollback(true),
        Err(DynSqlError::ExecutorClosed)
    ));
    assert!(matches!(
        session
            .executor
            .update(&find, &mut Value::Null),
        Err(DynSqlError::ExecutorClosed)
    ));

    // Close is idempotent
    session.executor.close(true);
    assert_eq!(session.transaction.closes(), 1);
}

#[test]
fn test_close_swallows_rollback_errors() {
    let mut session = session_with_mapper(USERS_MAPPER);
    session.transaction.fail_rollbacks();
    session.executor.close(true);
    assert!(session.executor.is_closed());
    assert_eq!(session.transaction.closes(), 1);
}

#[test]
fn test_commit_failure_surfaces_as_transaction_error() {
    let mut session = session_with_mapper(USERS_MAPPER);
    session.transaction.fail_commits();
    assert!(matches!(
        session.executor.commit(true),
        Err(DynSqlError::Transaction(_))
    ));
}
