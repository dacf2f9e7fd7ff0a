//! Dynamic SQL composition benchmark.
//!
//! Measures composition throughput for a static statement, a conditional
//! where-clause and a foreach over a medium collection.

use std::time::Instant;

use dynsql::scripting::MapperParser;
use serde_json::json;

const MAPPER: &str = r#"<mapper namespace="bench">
    <select id="static">SELECT * FROM users WHERE id = #{id}</select>

    <select id="filter">
        SELECT * FROM users
        <where>
            <if test="name != null">AND name = #{name}</if>
            <if test="age != null">AND age &gt; #{age}</if>
        </where>
    </select>

    <select id="inList">
        SELECT * FROM users WHERE id IN
        <foreach collection="ids" item="x" open="(" close=")" separator=",">#{x}</foreach>
    </select>
</mapper>"#;

fn main() {
    let mapper = MapperParser::new(MAPPER).parse().expect("mapper parses");
    let find = |id: &str| {
        mapper
            .statements
            .iter()
            .find(|s| s.id() == id)
            .expect("statement exists")
    };

    println!("=== Dynamic SQL Composition Benchmark ===\n");

    let iterations = 100_000u32;

    let stmt = find("bench.static");
    let parameter = json!({"id": 42});
    let start = Instant::now();
    for _ in 0..iterations {
        let bound = stmt.bound_sql(&parameter).unwrap();
        assert_eq!(bound.parameter_mappings().len(), 1);
    }
    report("pre-normalized static statement", iterations, start);

    let stmt = find("bench.filter");
    let parameter = json!({"name": "alice", "age": 30});
    let start = Instant::now();
    for _ in 0..iterations {
        let bound = stmt.bound_sql(&parameter).unwrap();
        assert_eq!(bound.parameter_mappings().len(), 2);
    }
    report("where/if composition", iterations, start);

    let stmt = find("bench.inList");
    let ids: Vec<u32> = (0..50).collect();
    let parameter = json!({ "ids": ids });
    let start = Instant::now();
    let foreach_iterations = iterations / 10;
    for _ in 0..foreach_iterations {
        let bound = stmt.bound_sql(&parameter).unwrap();
        assert_eq!(bound.parameter_mappings().len(), 50);
    }
    report("foreach over 50 elements", foreach_iterations, start);
}

fn report(label: &str, iterations: u32, start: Instant) {
    let elapsed = start.elapsed();
    let per_op = elapsed / iterations;
    println!(
        "{label}: {iterations} iterations in {elapsed:?} ({per_op:?}/op)"
    );
}
