// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Projection visitor
//!
//! Lowers SELECT / RETURNING selector bodies and JOIN result selectors into
//! [`Expr`]. Identity projections become the all-columns marker; object
//! literals become ordered object expressions; a property bound to a whole
//! JOIN slot becomes a reference node that the generators expand.

use arrowql_ast::EsExpr;
use arrowql_ir::{ColumnOrigin, Expr, ObjectExpr, ShapeNode, ValueExpr};

use crate::context::LoweringContext;
use crate::error::{LoweringError, LoweringResult};
use crate::predicate::lower_predicate;
use crate::value::{Resolved, is_predicate_shaped, lower_value, try_resolve};

/// Lower a selector body into a projection expression
///
/// Rejects projections with zero column references; callers lowering
/// assignment objects (INSERT values, UPDATE set) must not use this entry.
pub fn lower_projection(ctx: &mut LoweringContext, body: &EsExpr) -> LoweringResult<Expr> {
    let expr = lower_projection_entry(ctx, body)?;
    if !expr.references_column() {
        return Err(LoweringError::SelectWithoutColumns);
    }
    Ok(expr)
}

/// Lower one projection position without the column-reference check
pub(crate) fn lower_projection_entry(
    ctx: &mut LoweringContext,
    body: &EsExpr,
) -> LoweringResult<Expr> {
    if let EsExpr::Object(props) = body {
        let mut object = ObjectExpr::new();
        for (name, value) in props {
            object.push(name.clone(), lower_projection_entry(ctx, value)?);
        }
        return Ok(Expr::Object(object));
    }

    if let Some(resolved) = try_resolve(ctx, body) {
        match resolved? {
            Resolved::WholeRow => return Ok(Expr::AllColumns { slot: None }),
            Resolved::SlotRow(slot) => return Ok(Expr::Reference { slot }),
            Resolved::ShapeRow(shape) => return Ok(expand_shape(&shape)),
            Resolved::KeyObject(props) => {
                let mut object = ObjectExpr::new();
                for (name, value) in props {
                    object.push(name, Expr::Value(value));
                }
                return Ok(Expr::Object(object));
            }
            Resolved::Value(value) => return Ok(Expr::Value(value)),
        }
    }

    if is_predicate_shaped(body) {
        return Ok(Expr::Bool(lower_predicate(ctx, body)?));
    }

    Ok(Expr::Value(lower_value(ctx, body)?))
}

/// Expand a JOIN result shape into concrete projection expressions
fn expand_shape(shape: &ShapeNode) -> Expr {
    match shape {
        ShapeNode::Object(props) => {
            let mut object = ObjectExpr::new();
            for (name, node) in props {
                object.push(name.clone(), expand_shape(node));
            }
            Expr::Object(object)
        }
        ShapeNode::Column { slot, name } => Expr::Value(ValueExpr::Column {
            name: name.clone(),
            source: Some(ColumnOrigin::Slot(*slot)),
        }),
        ShapeNode::Reference { slot } => Expr::Reference { slot: *slot },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RowBinding;
    use arrowql_ast::parse_lambda;

    fn body(source: &str) -> EsExpr {
        let EsExpr::Arrow(arrow) = parse_lambda(source).unwrap() else {
            panic!("expected arrow");
        };
        arrow.body
    }

    fn ctx_with_row() -> LoweringContext {
        let mut ctx = LoweringContext::new();
        ctx.set_current_table(Some("users".to_string()));
        ctx.bind_row_param("u", RowBinding::Table);
        ctx.add_query_param("p");
        ctx
    }

    #[test]
    fn test_identity_projection() {
        let mut ctx = ctx_with_row();
        let expr = lower_projection(&mut ctx, &body("u => u")).unwrap();
        assert_eq!(expr, Expr::AllColumns { slot: None });
    }

    #[test]
    fn test_object_projection_keeps_order() {
        let mut ctx = ctx_with_row();
        let expr =
            lower_projection(&mut ctx, &body("u => ({ id: u.id, name: u.name })")).unwrap();
        let Expr::Object(object) = expr else {
            panic!("expected object");
        };
        let keys: Vec<_> = object.properties.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["id", "name"]);
    }

    #[test]
    fn test_single_column_projection() {
        let mut ctx = ctx_with_row();
        let expr = lower_projection(&mut ctx, &body("u => u.email")).unwrap();
        assert_eq!(expr, Expr::Value(ValueExpr::column("email")));
    }

    #[test]
    fn test_projection_without_columns_is_rejected() {
        let mut ctx = ctx_with_row();
        let err = lower_projection(&mut ctx, &body(r#"u => ({ mixed: "a" + "b" })"#)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Expressions in SELECT must reference table columns."
        );
    }

    #[test]
    fn test_boolean_property() {
        let mut ctx = ctx_with_row();
        let expr =
            lower_projection(&mut ctx, &body("u => ({ adult: u.age >= 18 })")).unwrap();
        let Expr::Object(object) = expr else {
            panic!("expected object");
        };
        assert!(matches!(object.properties[0].1, Expr::Bool(_)));
    }

    #[test]
    fn test_slot_row_becomes_reference() {
        let mut ctx = LoweringContext::new();
        ctx.bind_row_param("u", RowBinding::Slot(0));
        ctx.bind_row_param("o", RowBinding::Slot(1));
        let expr = lower_projection(
            &mut ctx,
            &body("u => ({ user: u, total: o.total })"),
        )
        .unwrap();
        let Expr::Object(object) = expr else {
            panic!("expected object");
        };
        assert_eq!(object.properties[0].1, Expr::Reference { slot: 0 });
        assert_eq!(
            object.properties[1].1,
            Expr::Value(ValueExpr::column_in_slot("total", 1))
        );
    }
}
