// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Terminal aggregate renderings

use arrowql::{Dialect, QuerySchema, define_select, params_from_json, to_sql};
use serde_json::json;

fn schema() -> QuerySchema {
    QuerySchema::new()
}

#[test]
fn test_count() {
    let query = define_select(&schema(), r#"q => q.from("users")"#)
        .unwrap()
        .count()
        .unwrap();
    let rendered = to_sql(&query.finalize(Default::default()), Dialect::PostgreSQL).unwrap();
    assert_eq!(rendered.sql, "SELECT COUNT(*) FROM \"users\"");
}

#[test]
fn test_count_with_predicate() {
    let query = define_select(&schema(), r#"q => q.from("users")"#)
        .unwrap()
        .count_where("u => u.isActive")
        .unwrap();
    let rendered = to_sql(&query.finalize(Default::default()), Dialect::PostgreSQL).unwrap();
    assert_eq!(rendered.sql, "SELECT COUNT(*) FROM \"users\" WHERE \"isActive\"");
}

#[test]
fn test_sum_and_avg() {
    let sum = define_select(&schema(), r#"q => q.from("orders")"#)
        .unwrap()
        .sum("o => o.amount")
        .unwrap();
    assert_eq!(
        to_sql(&sum.finalize(Default::default()), Dialect::PostgreSQL)
            .unwrap()
            .sql,
        "SELECT SUM(\"amount\") FROM \"orders\""
    );

    let avg = define_select(&schema(), r#"q => q.from("orders")"#)
        .unwrap()
        .avg("o => o.amount")
        .unwrap();
    assert_eq!(
        to_sql(&avg.finalize(Default::default()), Dialect::PostgreSQL)
            .unwrap()
            .sql,
        "SELECT AVG(\"amount\") FROM \"orders\""
    );
}

#[test]
fn test_any_renders_exists() {
    let query = define_select(&schema(), r#"(q, p) => q.from("users").where(u => u.age > p.min)"#)
        .unwrap()
        .any()
        .unwrap();
    let rendered = to_sql(
        &query.finalize(params_from_json(json!({ "min": 18 }))),
        Dialect::PostgreSQL,
    )
    .unwrap();
    assert_eq!(
        rendered.sql,
        "SELECT EXISTS(SELECT 1 FROM \"users\" WHERE \"age\" > @min)"
    );
}

#[test]
fn test_all_renders_negated_exists() {
    let query = define_select(&schema(), r#"q => q.from("users")"#)
        .unwrap()
        .all("u => u.verified")
        .unwrap();
    let rendered = to_sql(&query.finalize(Default::default()), Dialect::PostgreSQL).unwrap();
    assert_eq!(
        rendered.sql,
        "SELECT NOT EXISTS(SELECT 1 FROM \"users\" WHERE NOT (\"verified\"))"
    );
}

#[test]
fn test_first_and_single_limits() {
    let first = define_select(&schema(), r#"q => q.from("users").orderBy(u => u.id)"#)
        .unwrap()
        .first()
        .unwrap();
    assert!(
        to_sql(&first.finalize(Default::default()), Dialect::PostgreSQL)
            .unwrap()
            .sql
            .ends_with("LIMIT 1")
    );

    let single = define_select(&schema(), r#"(q, p) => q.from("users").where(u => u.id === p.id)"#)
        .unwrap()
        .single()
        .unwrap();
    assert!(
        to_sql(
            &single.finalize(params_from_json(json!({ "id": 3 }))),
            Dialect::PostgreSQL
        )
        .unwrap()
        .sql
        .ends_with("LIMIT 2")
    );
}

#[test]
fn test_last_flips_order() {
    let query = define_select(&schema(), r#"q => q.from("users").orderBy(u => u.name)"#)
        .unwrap()
        .last()
        .unwrap();
    let rendered = to_sql(&query.finalize(Default::default()), Dialect::PostgreSQL).unwrap();
    assert_eq!(
        rendered.sql,
        "SELECT * FROM \"users\" ORDER BY \"name\" DESC LIMIT 1"
    );
}

#[test]
fn test_last_without_order_is_an_error() {
    let query = define_select(&schema(), r#"q => q.from("users")"#)
        .unwrap()
        .last()
        .unwrap();
    let err = to_sql(&query.finalize(Default::default()), Dialect::PostgreSQL).unwrap_err();
    assert_eq!(err.to_string(), "last() requires an ORDER BY clause");
}

#[test]
fn test_contains_compares_the_projected_column() {
    let query = define_select(&schema(), r#"q => q.from("users").select(u => u.id)"#)
        .unwrap()
        .contains(json!(5))
        .unwrap();
    let rendered = to_sql(&query.finalize(Default::default()), Dialect::PostgreSQL).unwrap();
    assert_eq!(
        rendered.sql,
        "SELECT EXISTS(SELECT 1 FROM \"users\" WHERE \"id\" = @__p1)"
    );
    assert_eq!(rendered.params["__p1"], json!(5));
}

#[test]
fn test_take_while_is_rejected_by_both_dialects() {
    let query = define_select(
        &schema(),
        r#"q => q.from("events").takeWhile(e => e.open)"#,
    )
    .unwrap();
    let plan = query.finalize(Default::default());

    let err = to_sql(&plan, Dialect::PostgreSQL).unwrap_err();
    assert_eq!(
        err.to_string(),
        "takeWhile()/skipWhile() is not supported by the PostgreSQL dialect"
    );
    let err = to_sql(&plan, Dialect::Sqlite).unwrap_err();
    assert_eq!(
        err.to_string(),
        "takeWhile()/skipWhile() is not supported by the SQLite dialect"
    );
}
