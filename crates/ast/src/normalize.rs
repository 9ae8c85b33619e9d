// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Join normalization pre-pass
//!
//! Two call shapes are accepted for `join`:
//!
//! ```text
//! .join(inner, outerKey, innerKey, resultSelector)     // 4-argument form
//! .join(inner, (o, i) => o.x === i.y)                  // 2-argument form
//! ```
//!
//! This pass rewrites the 2-argument predicate form into the 4-argument
//! key-selector form so the visitors only ever see one shape. The synthetic
//! result selector exposes both rows under the predicate's parameter names:
//! `join(orders, (u, o) => u.id === o.userId)` lets downstream stages write
//! `r.u.name` and `r.o.total`.

use crate::ast::{EsArrow, EsBinaryOp, EsExpr};

/// Rewrite every 2-argument predicate `join` in the tree
pub fn normalize_joins(expr: EsExpr) -> EsExpr {
    match expr {
        EsExpr::Call { callee, args } => {
            let callee = Box::new(normalize_joins(*callee));
            let mut args: Vec<EsExpr> = args.into_iter().map(normalize_joins).collect();

            if is_join_callee(&callee) && args.len() == 2 {
                if let Some((outer_sel, inner_sel, result_sel)) =
                    split_predicate_join(args[1].clone())
                {
                    let inner = args.swap_remove(0);
                    return EsExpr::Call {
                        callee,
                        args: vec![inner, outer_sel, inner_sel, result_sel],
                    };
                }
                // Leave unrecognized 2-argument joins alone; the visitor
                // reports them with full context
            }

            EsExpr::Call { callee, args }
        }
        EsExpr::Arrow(arrow) => EsExpr::Arrow(Box::new(EsArrow {
            params: arrow.params,
            body: normalize_joins(arrow.body),
        })),
        EsExpr::Member { object, property } => EsExpr::Member {
            object: Box::new(normalize_joins(*object)),
            property,
        },
        EsExpr::Index { object, index } => EsExpr::Index {
            object: Box::new(normalize_joins(*object)),
            index: Box::new(normalize_joins(*index)),
        },
        EsExpr::Object(props) => EsExpr::Object(
            props
                .into_iter()
                .map(|(key, value)| (key, normalize_joins(value)))
                .collect(),
        ),
        EsExpr::Array(items) => EsExpr::Array(items.into_iter().map(normalize_joins).collect()),
        EsExpr::Binary { op, left, right } => EsExpr::Binary {
            op,
            left: Box::new(normalize_joins(*left)),
            right: Box::new(normalize_joins(*right)),
        },
        EsExpr::Unary { op, argument } => EsExpr::Unary {
            op,
            argument: Box::new(normalize_joins(*argument)),
        },
        EsExpr::Conditional {
            test,
            consequent,
            alternate,
        } => EsExpr::Conditional {
            test: Box::new(normalize_joins(*test)),
            consequent: Box::new(normalize_joins(*consequent)),
            alternate: Box::new(normalize_joins(*alternate)),
        },
        leaf => leaf,
    }
}

fn is_join_callee(callee: &EsExpr) -> bool {
    matches!(callee, EsExpr::Member { property, .. } if property == "join")
}

/// Split `(o, i) => o.x === i.y` into key selectors plus a pair selector
///
/// Returns None when the predicate is not a single equality between the two
/// lambda parameters.
fn split_predicate_join(predicate: EsExpr) -> Option<(EsExpr, EsExpr, EsExpr)> {
    let EsExpr::Arrow(arrow) = predicate else {
        return None;
    };
    let [outer_param, inner_param] = arrow.params.as_slice() else {
        return None;
    };
    let EsExpr::Binary {
        op: EsBinaryOp::Eq,
        left,
        right,
    } = arrow.body
    else {
        return None;
    };

    // Orientation: whichever side names the first parameter is the outer key
    let (outer_side, inner_side) = match (left.root_identifier(), right.root_identifier()) {
        (Some(l), Some(r)) if l == outer_param && r == inner_param => (*left, *right),
        (Some(l), Some(r)) if l == inner_param && r == outer_param => (*right, *left),
        _ => return None,
    };

    let outer_sel = EsExpr::Arrow(Box::new(EsArrow {
        params: vec![outer_param.clone()],
        body: outer_side,
    }));
    let inner_sel = EsExpr::Arrow(Box::new(EsArrow {
        params: vec![inner_param.clone()],
        body: inner_side,
    }));
    let result_sel = EsExpr::Arrow(Box::new(EsArrow {
        params: vec![outer_param.clone(), inner_param.clone()],
        body: EsExpr::Object(vec![
            (outer_param.clone(), EsExpr::Identifier(outer_param.clone())),
            (inner_param.clone(), EsExpr::Identifier(inner_param.clone())),
        ]),
    }));

    Some((outer_sel, inner_sel, result_sel))
}
