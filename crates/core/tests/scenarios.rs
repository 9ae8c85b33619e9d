// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! End-to-end renderings: builder lambda in, exact SQL and params out

use arrowql::{Dialect, QuerySchema, define_select, params_from_json, to_sql};
use serde_json::json;

#[test]
fn test_parameterized_select_with_and_and_limit() {
    let schema = QuerySchema::new();
    let query = define_select(
        &schema,
        r#"(q, p) => q.from("users")
            .where(u => u.age >= p.minAge && u.isActive)
            .select(u => ({ id: u.id, name: u.name }))
            .orderBy(u => u.name)
            .take(10)"#,
    )
    .unwrap();

    let plan = query.finalize(params_from_json(json!({ "minAge": 18 })));
    let rendered = to_sql(&plan, Dialect::PostgreSQL).unwrap();

    assert_eq!(
        rendered.sql,
        "SELECT \"id\" AS \"id\", \"name\" AS \"name\" FROM \"users\" \
         WHERE (\"age\" >= @minAge AND \"isActive\") ORDER BY \"name\" ASC LIMIT @__p1"
    );
    assert_eq!(rendered.params["minAge"], json!(18));
    assert_eq!(rendered.params["__p1"], json!(10));
    assert_eq!(rendered.params.len(), 2);
}

#[test]
fn test_pagination_arithmetic() {
    let schema = QuerySchema::new();
    let query = define_select(
        &schema,
        r#"(q, p) => q.from("products")
            .orderBy(x => x.name)
            .skip(p.page * p.pageSize)
            .take(p.pageSize)"#,
    )
    .unwrap();

    let plan = query.finalize(params_from_json(json!({ "page": 2, "pageSize": 20 })));
    let rendered = to_sql(&plan, Dialect::PostgreSQL).unwrap();

    assert_eq!(
        rendered.sql,
        "SELECT * FROM \"products\" ORDER BY \"name\" ASC LIMIT @pageSize OFFSET (@page * @pageSize)"
    );
    assert_eq!(rendered.params["page"], json!(2));
    assert_eq!(rendered.params["pageSize"], json!(20));
}

#[test]
fn test_null_handling() {
    let schema = QuerySchema::new();
    let query = define_select(
        &schema,
        r#"q => q.from("users").where(u => u.email != null && u.phone == null)"#,
    )
    .unwrap();

    let plan = query.finalize(Default::default());
    let rendered = to_sql(&plan, Dialect::PostgreSQL).unwrap();

    assert_eq!(
        rendered.sql,
        "SELECT * FROM \"users\" WHERE (\"email\" IS NOT NULL AND \"phone\" IS NULL)"
    );
    assert!(rendered.params.is_empty());
}

#[test]
fn test_optional_filter_guard_via_undefined() {
    let schema = QuerySchema::new();
    let query = define_select(
        &schema,
        r#"(q, p) => q.from("users")
            .where(u => (p.role === undefined || u.role === p.role)
                     && (p.city === undefined || u.city === p.city))"#,
    )
    .unwrap();

    let plan = query.finalize(params_from_json(json!({ "role": null, "city": "Portland" })));
    let rendered = to_sql(&plan, Dialect::PostgreSQL).unwrap();

    assert_eq!(
        rendered.sql,
        "SELECT * FROM \"users\" WHERE ((@role IS NULL OR \"role\" = @role) \
         AND (@city IS NULL OR \"city\" = @city))"
    );
    assert_eq!(rendered.params["role"], json!(null));
    assert_eq!(rendered.params["city"], json!("Portland"));
}

#[test]
fn test_case_insensitive_contains_sqlite() {
    let schema = QuerySchema::new();
    let query = define_select(
        &schema,
        r#"(q, p, h) => q.from("users").where(u => h.functions.icontains(u.bio, "dev"))"#,
    )
    .unwrap();

    let plan = query.finalize(Default::default());
    let rendered = to_sql(&plan, Dialect::Sqlite).unwrap();

    assert_eq!(
        rendered.sql,
        "SELECT * FROM \"users\" WHERE LOWER(\"bio\") LIKE '%' || LOWER(@__p1) || '%'"
    );
    assert_eq!(rendered.params["__p1"], json!("dev"));
}

#[test]
fn test_window_rank_and_dense_rank() {
    let schema = QuerySchema::new();
    let rank = define_select(
        &schema,
        r#"(q, p, h) => q.from("employees")
            .select(u => ({
                name: u.name,
                rank: h.window(u).partitionBy(r => r.department_id).orderByDescending(r => r.salary).rank()
            }))"#,
    )
    .unwrap();
    let rendered = to_sql(&rank.finalize(Default::default()), Dialect::PostgreSQL).unwrap();
    assert_eq!(
        rendered.sql,
        "SELECT \"name\" AS \"name\", \
         RANK() OVER (PARTITION BY \"department_id\" ORDER BY \"salary\" DESC) AS \"rank\" \
         FROM \"employees\""
    );

    let dense = define_select(
        &schema,
        r#"(q, p, h) => q.from("employees")
            .select(u => ({
                name: u.name,
                rank: h.window(u).partitionBy(r => r.department_id).orderByDescending(r => r.salary).denseRank()
            }))"#,
    )
    .unwrap();
    let rendered = to_sql(&dense.finalize(Default::default()), Dialect::PostgreSQL).unwrap();
    assert!(rendered.sql.contains("DENSE_RANK() OVER (PARTITION BY"));
}

#[test]
fn test_string_methods_render_as_like_patterns() {
    let schema = QuerySchema::new();
    let query = define_select(
        &schema,
        r#"(q, p) => q.from("users")
            .where(u => u.name.startsWith(p.prefix) && u.email.endsWith("@example.com"))"#,
    )
    .unwrap();

    let rendered = to_sql(
        &query.finalize(params_from_json(json!({ "prefix": "A" }))),
        Dialect::PostgreSQL,
    )
    .unwrap();

    assert_eq!(
        rendered.sql,
        "SELECT * FROM \"users\" WHERE (\"name\" LIKE @prefix || '%' \
         AND \"email\" LIKE '%' || @__p1)"
    );
    assert_eq!(rendered.params["__p1"], json!("@example.com"));
}

#[test]
fn test_coalesce_and_conditional() {
    let schema = QuerySchema::new();
    let query = define_select(
        &schema,
        r#"q => q.from("users").select(u => ({
            display: u.nickname ?? u.name,
            bucket: u.age >= 18 ? "adult" : "minor"
        }))"#,
    )
    .unwrap();

    let rendered = to_sql(&query.finalize(Default::default()), Dialect::PostgreSQL).unwrap();
    assert_eq!(
        rendered.sql,
        "SELECT COALESCE(\"nickname\", \"name\") AS \"display\", \
         CASE WHEN \"age\" >= @__p1 THEN @__p2 ELSE @__p3 END AS \"bucket\" FROM \"users\""
    );
    assert_eq!(rendered.params["__p1"], json!(18));
    assert_eq!(rendered.params["__p2"], json!("adult"));
    assert_eq!(rendered.params["__p3"], json!("minor"));
}

#[test]
fn test_distinct_and_schema_qualified_table() {
    let schema = QuerySchema::new();
    let query = define_select(
        &schema,
        r#"q => q.from("public.users").select(u => ({ city: u.city })).distinct()"#,
    )
    .unwrap();

    let rendered = to_sql(&query.finalize(Default::default()), Dialect::PostgreSQL).unwrap();
    assert_eq!(
        rendered.sql,
        "SELECT DISTINCT \"city\" AS \"city\" FROM \"public\".\"users\""
    );
}

#[test]
fn test_sqlite_offset_without_limit() {
    let schema = QuerySchema::new();
    let query = define_select(
        &schema,
        r#"(q, p) => q.from("logs").orderBy(l => l.id).skip(p.offset)"#,
    )
    .unwrap();

    let rendered = to_sql(
        &query.finalize(params_from_json(json!({ "offset": 50 }))),
        Dialect::Sqlite,
    )
    .unwrap();
    assert_eq!(
        rendered.sql,
        "SELECT * FROM \"logs\" ORDER BY \"id\" ASC LIMIT -1 OFFSET @offset"
    );

    let pg = to_sql(
        &query.finalize(params_from_json(json!({ "offset": 50 }))),
        Dialect::PostgreSQL,
    )
    .unwrap();
    assert_eq!(
        pg.sql,
        "SELECT * FROM \"logs\" ORDER BY \"id\" ASC OFFSET @offset"
    );
}
