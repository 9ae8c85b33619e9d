// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Whole-lambda lowering: parsed source in, operation trees out

use arrowql_ast::{EsExpr, normalize_joins, parse_lambda};
use arrowql_ir::{
    BoolExpr, GroupKey, JoinKind, QueryOp, ShapeNode, TerminalAggregate, ValueExpr,
};
use arrowql_lowering::{LoweringContext, LoweringError, lower_builder};
use serde_json::json;

fn lower(source: &str) -> (QueryOp, LoweringContext) {
    let parsed = normalize_joins(parse_lambda(source).unwrap());
    let EsExpr::Arrow(arrow) = parsed else {
        panic!("expected arrow");
    };
    let mut ctx = LoweringContext::new();
    let op = lower_builder(&mut ctx, &arrow).unwrap();
    (op, ctx)
}

fn lower_err(source: &str) -> LoweringError {
    let parsed = normalize_joins(parse_lambda(source).unwrap());
    let EsExpr::Arrow(arrow) = parsed else {
        panic!("expected arrow");
    };
    let mut ctx = LoweringContext::new();
    lower_builder(&mut ctx, &arrow).unwrap_err()
}

#[test]
fn test_from_where_select_spine() {
    let (op, ctx) = lower(
        r#"(q, p) => q.from("users").where(u => u.age >= p.minAge).select(u => ({ id: u.id }))"#,
    );
    let QueryOp::Select { source, .. } = op else {
        panic!("expected select on top");
    };
    let QueryOp::Where { source, .. } = *source else {
        panic!("expected where below select");
    };
    assert!(matches!(*source, QueryOp::From { .. }));
    assert!(ctx.auto_params().is_empty());
}

#[test]
fn test_literals_lift_in_visitation_order() {
    let (_, ctx) = lower(r#"q => q.from("t").where(x => x.a > 5 && x.b > 6).take(7)"#);
    assert_eq!(ctx.auto_params()["__p1"], json!(5));
    assert_eq!(ctx.auto_params()["__p2"], json!(6));
    assert_eq!(ctx.auto_params()["__p3"], json!(7));
    assert_eq!(ctx.auto_param_infos()["__p3"].field_name.as_deref(), Some("LIMIT"));
}

#[test]
fn test_skip_records_offset_field_info() {
    let (_, ctx) = lower(r#"q => q.from("t").skip(40)"#);
    assert_eq!(
        ctx.auto_param_infos()["__p1"].field_name.as_deref(),
        Some("OFFSET")
    );
}

#[test]
fn test_join_shape_is_persisted() {
    let (op, _) = lower(
        r#"q => q.from("users")
            .join(q.from("orders"), u => u.id, o => o.userId, (u, o) => ({ user: u, total: o.total }))"#,
    );
    let QueryOp::Join {
        kind,
        outer_key,
        inner_key,
        shape,
        ..
    } = op
    else {
        panic!("expected join");
    };
    assert_eq!(kind, JoinKind::Inner);
    assert_eq!(outer_key, "id");
    assert_eq!(inner_key, "userId");
    assert_eq!(
        shape,
        ShapeNode::Object(vec![
            ("user".to_string(), ShapeNode::Reference { slot: 0 }),
            (
                "total".to_string(),
                ShapeNode::Column {
                    slot: 1,
                    name: "total".to_string()
                }
            ),
        ])
    );
}

#[test]
fn test_normalized_predicate_join_keys() {
    let (op, _) = lower(
        r#"q => q.from("users").join(q.from("orders"), (u, o) => o.userId === u.id)"#,
    );
    let QueryOp::Join {
        outer_key,
        inner_key,
        ..
    } = op
    else {
        panic!("expected join");
    };
    // Reoriented so the outer side owns the outer key
    assert_eq!(outer_key, "id");
    assert_eq!(inner_key, "userId");
}

#[test]
fn test_group_by_key_forms() {
    let (op, _) = lower(r#"q => q.from("orders").groupBy(o => o.customerId)"#);
    let QueryOp::GroupBy { key, .. } = op else {
        panic!("expected group by");
    };
    assert_eq!(key, GroupKey::Column("customerId".to_string()));

    let (op, _) = lower(r#"q => q.from("orders").groupBy(o => ({ c: o.customerId, y: o.year }))"#);
    let QueryOp::GroupBy { key, .. } = op else {
        panic!("expected group by");
    };
    assert!(matches!(key, GroupKey::Object(props) if props.len() == 2));
}

#[test]
fn test_terminal_aggregates() {
    let (op, _) = lower(r#"q => q.from("orders").sum(o => o.amount)"#);
    let QueryOp::Aggregate { terminal, .. } = op else {
        panic!("expected aggregate");
    };
    assert_eq!(
        terminal,
        TerminalAggregate::Sum {
            selector: ValueExpr::column("amount")
        }
    );

    let (op, _) = lower(r#"q => q.from("orders").any(o => o.paid)"#);
    let QueryOp::Aggregate { terminal, .. } = op else {
        panic!("expected aggregate");
    };
    assert!(matches!(terminal, TerminalAggregate::Any { predicate: Some(_) }));
}

#[test]
fn test_where_merges_into_mutation_roots() {
    let (op, _) = lower(
        r#"(q, p) => q.deleteFrom("users").where(u => u.id === p.id).where(u => u.archived)"#,
    );
    let QueryOp::Delete { predicate, .. } = op else {
        panic!("expected delete");
    };
    assert!(matches!(
        predicate,
        Some(BoolExpr::Logical { .. })
    ));
}

#[test]
fn test_insert_values_filter_undefined() {
    let (op, _) = lower(
        r#"(q, p) => q.insertInto("users").values({ name: p.name, nickname: undefined })"#,
    );
    let QueryOp::Insert { assignments, .. } = op else {
        panic!("expected insert");
    };
    assert_eq!(assignments.properties.len(), 1);
    assert_eq!(assignments.properties[0].0, "name");
}

#[test]
fn test_returning_attaches() {
    let (op, _) = lower(
        r#"(q, p) => q.updateTable("users").set(u => ({ name: p.name }))
            .where(u => u.id === p.id).returning(u => ({ id: u.id }))"#,
    );
    let QueryOp::Update {
        returning,
        predicate,
        allow_full_table,
        ..
    } = op
    else {
        panic!("expected update");
    };
    assert!(returning.is_some());
    assert!(predicate.is_some());
    assert!(!allow_full_table);
}

#[test]
fn test_unknown_chain_method_is_unsupported() {
    let err = lower_err(r#"q => q.from("users").pivot(u => u.id)"#);
    assert_eq!(err.to_string(), "Unsupported call expression");
}

#[test]
fn test_select_without_columns_message() {
    let err = lower_err(r#"q => q.from("users").select(u => ({ mixed: "a" + "b" }))"#);
    assert_eq!(
        err.to_string(),
        "Expressions in SELECT must reference table columns."
    );
}

#[test]
fn test_join_key_must_be_a_column() {
    let err = lower_err(
        r#"q => q.from("users").join(q.from("orders"), u => u.id + 1, o => o.userId, (u, o) => ({ u: u, o: o }))"#,
    );
    assert!(matches!(err, LoweringError::JoinKeyNotColumn { .. }));
}
