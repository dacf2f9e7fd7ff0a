//! Common test utilities.
//!
//! Provides shared helpers for:
//! - Building configurations from mapper XML
//! - Creating executors over the in-memory driver
//! - Seeding canned rows

use std::sync::Arc;

use dynsql::driver::{InMemoryDriver, StubTransaction};
use dynsql::{Configuration, Executor, MappedStatement};

pub struct TestSession {
    pub config: Arc<Configuration>,
    pub driver: InMemoryDriver,
    pub transaction: StubTransaction,
    pub executor: Executor,
}

impl TestSession {
    pub fn statement(&self, id: &str) -> Arc<MappedStatement> {
        self.config
            .statement(id)
            .unwrap_or_else(|e| panic!("statement lookup failed: {e}"))
    }
}

pub fn session_with_config(config: Configuration) -> TestSession {
    let config = Arc::new(config);
    let driver = InMemoryDriver::new();
    let transaction = StubTransaction::new();
    let executor = Executor::new(
        config.clone(),
        Box::new(transaction.clone()),
        Box::new(driver.clone()),
    );
    TestSession {
        config,
        driver,
        transaction,
        executor,
    }
}

pub fn session_with_mapper(xml: &str) -> TestSession {
    let mut config = Configuration::new();
    config
        .load_mapper_xml(xml)
        .unwrap_or_else(|e| panic!("mapper failed to parse: {e}"));
    session_with_config(config)
}

/// A small users mapper shared by the executor tests.
pub const USERS_MAPPER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<mapper namespace="user">
    <select id="findAll">
        SELECT * FROM users
    </select>

    <select id="findByName">
        SELECT * FROM users
        <where>
            <if test="name != null">AND name = #{name}</if>
        </where>
    </select>

    <select id="childrenOf">
        SELECT * FROM users WHERE parent_id = #{parentId}
    </select>

    <update id="rename">
        UPDATE users SET name = #{name} WHERE id = #{id}
    </update>
</mapper>"#;
