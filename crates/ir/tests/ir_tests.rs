// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! IR construction and serde round-trips

use arrowql_ir::{
    BoolExpr, ColumnOrigin, ComparisonOp, Dialect, DialectFeature, Expr, ObjectExpr, QueryOp,
    ShapeNode, TableName, ValueExpr,
};

#[test]
fn test_operation_tree_serializes() {
    let op = QueryOp::Where {
        source: Box::new(QueryOp::From {
            table: TableName::parse("users"),
        }),
        predicate: BoolExpr::Comparison {
            op: ComparisonOp::Eq,
            left: Box::new(ValueExpr::column("id")),
            right: Box::new(ValueExpr::param("id")),
        },
    };
    let json = serde_json::to_string(&op).unwrap();
    let back: QueryOp = serde_json::from_str(&json).unwrap();
    assert_eq!(op, back);
}

#[test]
fn test_slot_tagged_columns() {
    let col = ValueExpr::column_in_slot("total", 1);
    let ValueExpr::Column { source, .. } = &col else {
        panic!("expected column");
    };
    assert_eq!(*source, Some(ColumnOrigin::Slot(1)));
}

#[test]
fn test_projection_column_detection() {
    let mut object = ObjectExpr::new();
    object.push("tag", Expr::Value(ValueExpr::param("tag")));
    assert!(!Expr::Object(object.clone()).references_column());

    object.push("id", Expr::Value(ValueExpr::column("id")));
    assert!(Expr::Object(object).references_column());

    assert!(Expr::AllColumns { slot: None }.references_column());
    assert!(Expr::Reference { slot: 0 }.references_column());
}

#[test]
fn test_shape_round_trip_through_serde() {
    let shape = ShapeNode::Object(vec![
        ("user".to_string(), ShapeNode::Reference { slot: 0 }),
        (
            "total".to_string(),
            ShapeNode::Column {
                slot: 1,
                name: "total".to_string(),
            },
        ),
    ]);
    let json = serde_json::to_string(&shape).unwrap();
    let back: ShapeNode = serde_json::from_str(&json).unwrap();
    assert_eq!(shape, back);
}

#[test]
fn test_dialect_capabilities() {
    assert!(Dialect::PostgreSQL.supports(DialectFeature::BareOffset));
    assert!(!Dialect::Sqlite.supports(DialectFeature::BareOffset));
    assert!(Dialect::Sqlite.supports(DialectFeature::WindowFunctions));
}
