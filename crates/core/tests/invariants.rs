// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Planner-wide invariants and round-trip laws

use arrowql::{Dialect, QuerySchema, define_select, params_from_json, to_sql};
use serde_json::json;

/// Every `@name` token in the SQL text, in order of appearance
fn tokens(sql: &str) -> Vec<String> {
    let mut out = Vec::new();
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'@' {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len()
                && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
            {
                end += 1;
            }
            if end > start {
                out.push(sql[start..end].to_string());
            }
            i = end;
        } else {
            i += 1;
        }
    }
    out
}

#[test]
fn test_every_token_is_a_param_key() {
    let schema = QuerySchema::new();
    let query = define_select(
        &schema,
        r#"(q, p) => q.from("users")
            .where(u => u.age >= p.minAge && u.score > 7 && p.roles.includes(u.role))
            .orderBy(u => u.name)
            .take(25)"#,
    )
    .unwrap();

    let plan = query.finalize(params_from_json(
        json!({ "minAge": 21, "roles": ["admin", "staff"] }),
    ));
    // The plan params are a superset of the auto-params
    assert!(plan.params.contains_key("__p1"));
    assert!(plan.params.contains_key("__p2"));

    for dialect in [Dialect::PostgreSQL, Dialect::Sqlite] {
        let rendered = to_sql(&plan, dialect).unwrap();
        for token in tokens(&rendered.sql) {
            assert!(
                rendered.params.contains_key(&token),
                "token @{token} missing from params in: {}",
                rendered.sql
            );
        }
    }
}

#[test]
fn test_simple_select_has_no_join_and_each_column_once() {
    let schema = QuerySchema::new();
    let query = define_select(
        &schema,
        r#"(q, p) => q.from("users")
            .where(u => u.age >= p.minAge)
            .select(u => ({ id: u.id, email: u.email }))"#,
    )
    .unwrap();

    let rendered = to_sql(&query.finalize(Default::default()), Dialect::PostgreSQL).unwrap();
    assert!(!rendered.sql.contains("JOIN"));
    assert_eq!(rendered.sql.matches("\"id\"").count(), 2); // expr + alias
    assert_eq!(rendered.sql.matches("\"email\"").count(), 2);
}

#[test]
fn test_auto_param_names_are_dense_and_monotone() {
    let schema = QuerySchema::new();
    let query = define_select(
        &schema,
        r#"q => q.from("t").where(x => x.a > 1 && x.b > 2 && x.c > 3).take(4)"#,
    )
    .unwrap();

    let plan = query.finalize(Default::default());
    let mut suffixes: Vec<usize> = plan
        .params
        .keys()
        .filter_map(|key| key.strip_prefix("__p"))
        .map(|n| n.parse().unwrap())
        .collect();
    suffixes.sort_unstable();
    assert_eq!(suffixes, vec![1, 2, 3, 4]);
}

#[test]
fn test_cache_hit_params_are_isolated() {
    let schema = QuerySchema::new();
    let source = r#"q => q.from("cache_iso").where(x => x.n > 5)"#;

    let first = define_select(&schema, source).unwrap();
    let mut first_plan = first.finalize(Default::default());
    // Mutate the caller's copy of the params
    first_plan.params.insert("__p1".to_string(), json!(999));

    let second = define_select(&schema, source).unwrap();
    let second_plan = second.finalize(Default::default());
    assert_eq!(second_plan.params["__p1"], json!(5));
}

#[test]
fn test_cache_hit_shares_the_frozen_operation_tree() {
    let schema = QuerySchema::new();
    let source = r#"q => q.from("cache_shared").where(x => x.n > 5)"#;

    let first = define_select(&schema, source).unwrap().finalize(Default::default());
    let second = define_select(&schema, source).unwrap().finalize(Default::default());
    assert!(std::sync::Arc::ptr_eq(&first.operation, &second.operation));
}

#[test]
fn test_order_is_stable_across_intervening_wheres() {
    let schema = QuerySchema::new();

    let direct = define_select(&schema, r#"q => q.from("t")"#)
        .unwrap()
        .order_by("x => x.a")
        .unwrap()
        .then_by("x => x.b")
        .unwrap();
    let direct_sql = to_sql(&direct.finalize(Default::default()), Dialect::PostgreSQL)
        .unwrap()
        .sql;

    let interleaved = define_select(&schema, r#"q => q.from("t")"#)
        .unwrap()
        .order_by("x => x.a")
        .unwrap()
        .where_("x => x.flag")
        .unwrap()
        .where_("x => x.other")
        .unwrap()
        .then_by("x => x.b")
        .unwrap();
    let interleaved_sql = to_sql(&interleaved.finalize(Default::default()), Dialect::PostgreSQL)
        .unwrap()
        .sql;

    let order_of = |sql: &str| {
        let at = sql.find("ORDER BY").unwrap();
        sql[at..].to_string()
    };
    assert_eq!(order_of(&direct_sql), order_of(&interleaved_sql));
    assert_eq!(order_of(&direct_sql), "ORDER BY \"a\" ASC, \"b\" ASC");
}

#[test]
fn test_null_comparison_is_symmetric() {
    let schema = QuerySchema::new();
    let left = define_select(&schema, r#"q => q.from("t").where(x => x.col == null)"#).unwrap();
    let right = define_select(&schema, r#"q => q.from("t").where(x => null == x.col)"#).unwrap();

    let left_sql = to_sql(&left.finalize(Default::default()), Dialect::PostgreSQL)
        .unwrap()
        .sql;
    let right_sql = to_sql(&right.finalize(Default::default()), Dialect::PostgreSQL)
        .unwrap()
        .sql;
    assert_eq!(left_sql, right_sql);
    assert!(left_sql.ends_with("WHERE \"col\" IS NULL"));
}

#[test]
fn test_double_negation_renders_like_the_bare_column() {
    let schema = QuerySchema::new();
    let bare = define_select(&schema, r#"q => q.from("t").where(x => x.active)"#).unwrap();
    let doubled = define_select(&schema, r#"q => q.from("t").where(x => !!x.active)"#).unwrap();

    assert_eq!(
        to_sql(&bare.finalize(Default::default()), Dialect::PostgreSQL)
            .unwrap()
            .sql,
        to_sql(&doubled.finalize(Default::default()), Dialect::PostgreSQL)
            .unwrap()
            .sql
    );
}

#[test]
fn test_conjunction_associativity() {
    let schema = QuerySchema::new();
    let left = define_select(
        &schema,
        r#"q => q.from("t").where(x => (x.a > 1 && x.b > 2) && x.c > 3)"#,
    )
    .unwrap();
    let right = define_select(
        &schema,
        r#"q => q.from("t").where(x => x.a > 1 && (x.b > 2 && x.c > 3))"#,
    )
    .unwrap();

    let left_sql = to_sql(&left.finalize(Default::default()), Dialect::PostgreSQL)
        .unwrap()
        .sql;
    let right_sql = to_sql(&right.finalize(Default::default()), Dialect::PostgreSQL)
        .unwrap()
        .sql;
    assert_eq!(left_sql, right_sql);
    assert!(left_sql.contains("(\"a\" > @__p1 AND \"b\" > @__p2 AND \"c\" > @__p3)"));
}

#[test]
fn test_take_zero_still_binds_a_parameter() {
    let schema = QuerySchema::new();
    let query = define_select(&schema, r#"q => q.from("t")"#)
        .unwrap()
        .take(0)
        .unwrap();
    let rendered = to_sql(&query.finalize(Default::default()), Dialect::PostgreSQL).unwrap();
    assert!(rendered.sql.ends_with("LIMIT @__p1"));
    assert_eq!(rendered.params["__p1"], json!(0));
}

#[test]
fn test_empty_in_list_renders_always_false() {
    let schema = QuerySchema::new();
    let query = define_select(
        &schema,
        r#"(q, p) => q.from("users").where(u => p.roles.includes(u.role))"#,
    )
    .unwrap();

    let plan = query.finalize(params_from_json(json!({ "roles": [] })));
    assert!(
        to_sql(&plan, Dialect::PostgreSQL)
            .unwrap()
            .sql
            .ends_with("WHERE FALSE")
    );
    assert!(to_sql(&plan, Dialect::Sqlite).unwrap().sql.ends_with("WHERE 0"));
}

#[test]
fn test_non_empty_in_list_expands_to_bound_elements() {
    let schema = QuerySchema::new();
    let query = define_select(
        &schema,
        r#"(q, p) => q.from("users").where(u => p.roles.includes(u.role))"#,
    )
    .unwrap();

    let plan = query.finalize(params_from_json(json!({ "roles": ["admin", "staff"] })));
    let rendered = to_sql(&plan, Dialect::PostgreSQL).unwrap();
    assert!(
        rendered
            .sql
            .ends_with("WHERE \"role\" IN (@roles__0, @roles__1)")
    );
    assert_eq!(rendered.params["roles__0"], json!("admin"));
    assert_eq!(rendered.params["roles__1"], json!("staff"));
}

#[test]
fn test_composition_keeps_auto_param_numbering_dense() {
    let schema = QuerySchema::new();
    let query = define_select(&schema, r#"q => q.from("t").where(x => x.a > 10)"#)
        .unwrap()
        .where_("x => x.b > 20")
        .unwrap()
        .take(5)
        .unwrap();

    let plan = query.finalize(Default::default());
    assert_eq!(plan.params["__p1"], json!(10));
    assert_eq!(plan.params["__p2"], json!(20));
    assert_eq!(plan.params["__p3"], json!(5));
}

#[test]
fn test_missing_referenced_param_binds_null() {
    let schema = QuerySchema::new();
    let query = define_select(
        &schema,
        r#"(q, p) => q.from("users").where(u => u.role === p.role)"#,
    )
    .unwrap();

    let rendered = to_sql(&query.finalize(Default::default()), Dialect::PostgreSQL).unwrap();
    assert_eq!(rendered.params["role"], json!(null));
}
