// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! JOIN result shape construction
//!
//! A JOIN result selector is lowered as a projection first; this module
//! rewrites that projection into the [`ShapeNode`] tree persisted on the
//! JOIN operation. Every leaf must be a slot-tagged column or a whole-slot
//! reference; anything else cannot be resolved by later stages.

use arrowql_ir::{BoolExpr, ColumnOrigin, Expr, ShapeNode, ValueExpr};

use crate::error::{LoweringError, LoweringResult};

/// Build the persisted shape from a lowered result-selector projection
pub(crate) fn shape_from_projection(expr: &Expr) -> LoweringResult<ShapeNode> {
    match expr {
        Expr::Object(object) => {
            let mut props = Vec::with_capacity(object.properties.len());
            for (name, value) in &object.properties {
                props.push((name.clone(), shape_from_projection(value)?));
            }
            Ok(ShapeNode::Object(props))
        }
        Expr::Reference { slot } => Ok(ShapeNode::Reference { slot: *slot }),
        Expr::Value(ValueExpr::Column {
            name,
            source: Some(ColumnOrigin::Slot(slot)),
        }) => Ok(ShapeNode::Column {
            slot: *slot,
            name: name.clone(),
        }),
        Expr::Bool(BoolExpr::BooleanColumn {
            name,
            source: Some(ColumnOrigin::Slot(slot)),
        }) => Ok(ShapeNode::Column {
            slot: *slot,
            name: name.clone(),
        }),
        _ => Err(LoweringError::JoinSelectorShape),
    }
}
