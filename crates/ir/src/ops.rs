// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Query operations
//!
//! This module represents query operations in the IR.
//!
//! ## Design
//!
//! Each operation holds a `source` pointer to its predecessor, forming a
//! linear-with-branching tree: the chain `from -> where -> select` is a spine,
//! and a JOIN introduces a sibling source tree owned by the JOIN itself.
//!
//! ```text
//! Select
//!   └── Where
//!         └── Join ── inner: From("orders")
//!               └── From("users")
//! ```
//!
//! Mutations (`Insert`, `Update`, `Delete`) are roots of their own trees and
//! carry their assignments, predicates and safety waivers inline. Terminal
//! aggregates (`count`, `any`, `first`, ...) wrap the spine they terminate.

use serde::{Deserialize, Serialize};

use crate::expr::{BoolExpr, Expr, ObjectExpr, ValueExpr};
use crate::shape::ShapeNode;

/// A table name with an optional database schema prefix
///
/// Written `"schema.table"` at the API surface; rendered
/// `"schema"."table"` by the generators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableName {
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    /// Split a possibly dotted table reference
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('.') {
            Some((schema, name)) => Self {
                schema: Some(schema.to_string()),
                name: name.to_string(),
            },
            None => Self {
                schema: None,
                name: raw.to_string(),
            },
        }
    }
}

/// JOIN flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Cross,
}

/// GROUP BY key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GroupKey {
    /// Simple single-column key
    Column(String),
    /// Computed key
    Expr(ValueExpr),
    /// Multi-column key from an object selector; preserves order
    Object(Vec<(String, ValueExpr)>),
}

/// Terminal aggregate operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TerminalAggregate {
    Count { predicate: Option<BoolExpr> },
    Sum { selector: ValueExpr },
    Avg { selector: ValueExpr },
    Min { selector: ValueExpr },
    Max { selector: ValueExpr },
    Any { predicate: Option<BoolExpr> },
    All { predicate: BoolExpr },
    First { predicate: Option<BoolExpr> },
    Single { predicate: Option<BoolExpr> },
    Last { predicate: Option<BoolExpr> },
    Contains { value: ValueExpr },
}

/// One operation of a query tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryOp {
    /// Root source of a SELECT chain
    From { table: TableName },

    /// Row filter
    Where {
        source: Box<QueryOp>,
        predicate: BoolExpr,
    },

    /// Projection
    Select {
        source: Box<QueryOp>,
        projection: Expr,
    },

    /// Equi-join against a sibling source tree
    Join {
        source: Box<QueryOp>,
        inner: Box<QueryOp>,
        kind: JoinKind,
        outer_key: String,
        /// Slot the outer key column resolves to when the outer side is
        /// itself JOIN-shaped
        outer_key_slot: Option<usize>,
        inner_key: String,
        /// Result shape persisted for downstream member resolution
        shape: ShapeNode,
    },

    /// Flattening join from a collection selector
    SelectMany {
        source: Box<QueryOp>,
        inner: Box<QueryOp>,
        kind: JoinKind,
        /// Correlation predicate; absent for a pure cross join
        on: Option<BoolExpr>,
        shape: ShapeNode,
    },

    /// Grouping; a following Select switches to grouped projection mode
    GroupBy {
        source: Box<QueryOp>,
        key: GroupKey,
    },

    /// Primary sort key
    OrderBy {
        source: Box<QueryOp>,
        key: ValueExpr,
        descending: bool,
    },

    /// Secondary sort key, only valid above an OrderBy
    ThenBy {
        source: Box<QueryOp>,
        key: ValueExpr,
        descending: bool,
    },

    /// LIMIT; the count is a param or auto-param reference
    Take {
        source: Box<QueryOp>,
        count: ValueExpr,
    },

    /// OFFSET
    Skip {
        source: Box<QueryOp>,
        count: ValueExpr,
    },

    /// Present in the IR for completeness; no SQL equivalent exists and the
    /// generators reject it
    TakeWhile {
        source: Box<QueryOp>,
        predicate: BoolExpr,
    },

    /// See `TakeWhile`
    SkipWhile {
        source: Box<QueryOp>,
        predicate: BoolExpr,
    },

    /// SELECT DISTINCT marker
    Distinct { source: Box<QueryOp> },

    /// INSERT root
    Insert {
        table: TableName,
        assignments: ObjectExpr,
        returning: Option<Expr>,
    },

    /// UPDATE root
    Update {
        table: TableName,
        assignments: ObjectExpr,
        predicate: Option<BoolExpr>,
        allow_full_table: bool,
        returning: Option<Expr>,
    },

    /// DELETE root
    Delete {
        table: TableName,
        predicate: Option<BoolExpr>,
        allow_full_table: bool,
    },

    /// Terminal aggregate wrapping the spine it terminates
    Aggregate {
        source: Box<QueryOp>,
        terminal: TerminalAggregate,
    },
}

impl QueryOp {
    /// The predecessor operation, if any
    pub fn source(&self) -> Option<&QueryOp> {
        match self {
            QueryOp::From { .. }
            | QueryOp::Insert { .. }
            | QueryOp::Update { .. }
            | QueryOp::Delete { .. } => None,
            QueryOp::Where { source, .. }
            | QueryOp::Select { source, .. }
            | QueryOp::Join { source, .. }
            | QueryOp::SelectMany { source, .. }
            | QueryOp::GroupBy { source, .. }
            | QueryOp::OrderBy { source, .. }
            | QueryOp::ThenBy { source, .. }
            | QueryOp::Take { source, .. }
            | QueryOp::Skip { source, .. }
            | QueryOp::TakeWhile { source, .. }
            | QueryOp::SkipWhile { source, .. }
            | QueryOp::Distinct { source }
            | QueryOp::Aggregate { source, .. } => Some(source),
        }
    }

    /// Number of table slots this tree exposes
    ///
    /// One for a plain chain; each JOIN adds the slots of its inner tree.
    pub fn slot_count(&self) -> usize {
        match self {
            QueryOp::From { .. } => 1,
            QueryOp::Insert { .. } | QueryOp::Update { .. } | QueryOp::Delete { .. } => 1,
            QueryOp::Join { source, inner, .. } | QueryOp::SelectMany { source, inner, .. } => {
                source.slot_count() + inner.slot_count()
            }
            other => other.source().map_or(1, QueryOp::slot_count),
        }
    }

    /// Root table of this tree, walking the spine down to its From/mutation
    pub fn root_table(&self) -> Option<&TableName> {
        match self {
            QueryOp::From { table }
            | QueryOp::Insert { table, .. }
            | QueryOp::Update { table, .. }
            | QueryOp::Delete { table, .. } => Some(table),
            other => other.source().and_then(QueryOp::root_table),
        }
    }

    /// The result shape of the nearest JOIN below this operation, if the
    /// current row is JOIN-shaped
    pub fn current_shape(&self) -> Option<&ShapeNode> {
        match self {
            QueryOp::Join { shape, .. } | QueryOp::SelectMany { shape, .. } => Some(shape),
            // A Select re-shapes the row; anything past it is column-named
            QueryOp::Select { .. } => None,
            other => other.source().and_then(QueryOp::current_shape),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ComparisonOp;

    fn users() -> QueryOp {
        QueryOp::From {
            table: TableName::parse("users"),
        }
    }

    #[test]
    fn test_table_name_parse() {
        let plain = TableName::parse("users");
        assert_eq!(plain.schema, None);
        assert_eq!(plain.name, "users");

        let dotted = TableName::parse("public.users");
        assert_eq!(dotted.schema.as_deref(), Some("public"));
        assert_eq!(dotted.name, "users");
    }

    #[test]
    fn test_source_chain() {
        let op = QueryOp::Where {
            source: Box::new(users()),
            predicate: BoolExpr::Comparison {
                op: ComparisonOp::Eq,
                left: Box::new(ValueExpr::column("id")),
                right: Box::new(ValueExpr::param("id")),
            },
        };
        assert!(matches!(op.source(), Some(QueryOp::From { .. })));
        assert_eq!(op.root_table().unwrap().name, "users");
    }

    #[test]
    fn test_slot_count_through_join() {
        let join = QueryOp::Join {
            source: Box::new(users()),
            inner: Box::new(QueryOp::From {
                table: TableName::parse("orders"),
            }),
            kind: JoinKind::Inner,
            outer_key: "id".to_string(),
            outer_key_slot: None,
            inner_key: "userId".to_string(),
            shape: ShapeNode::Object(vec![]),
        };
        assert_eq!(join.slot_count(), 2);
        assert_eq!(users().slot_count(), 1);
    }
}
