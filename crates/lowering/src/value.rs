// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Value-expression visitor
//!
//! Lowers AST nodes into [`ValueExpr`]. Origin tracking happens here: a
//! member path is resolved against the row bindings in the context, yielding
//! a column (possibly slot-tagged through a JOIN shape), a parameter
//! reference, or a whole-row reference for the projection visitor to expand.
//! Inline literals are lifted to auto-parameters; `null` alone survives as a
//! constant so the generators can collapse comparisons to `IS [NOT] NULL`.

use arrowql_ast::{EsArrow, EsBinaryOp, EsExpr, EsUnaryOp};
use arrowql_ir::{
    AggregateFunction, AutoParamInfo, CaseBranch, ColumnOrigin, Literal, ParamRef, ParamValue,
    ShapeNode, StringMethod, ValueExpr, WindowExpr, WindowFunction, WindowOrder,
};
use serde_json::json;

use crate::context::{LoweringContext, RowBinding};
use crate::error::{LoweringError, LoweringResult};
use crate::predicate::lower_predicate;

/// Outcome of resolving an identifier or member path
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Resolved {
    /// A scalar: column, parameter, or group-key expression
    Value(ValueExpr),
    /// The whole row of the single table in scope
    WholeRow,
    /// The whole row of one JOIN slot
    SlotRow(usize),
    /// An object-shaped (sub)record of a JOIN result
    ShapeRow(ShapeNode),
    /// A multi-column group key
    KeyObject(Vec<(String, ValueExpr)>),
}

/// Resolve an identifier / member / index path against the context
///
/// Returns `None` when the expression is not a path at all.
pub(crate) fn try_resolve(
    ctx: &LoweringContext,
    expr: &EsExpr,
) -> Option<LoweringResult<Resolved>> {
    if let EsExpr::Index { object, index } = expr {
        return Some(resolve_index(ctx, object, index));
    }
    let (root, path) = expr.member_path()?;
    Some(resolve_path(ctx, root, &path))
}

fn resolve_path(ctx: &LoweringContext, root: &str, path: &[&str]) -> LoweringResult<Resolved> {
    if let Some(binding) = ctx.row_binding(root) {
        return resolve_row_path(ctx, binding.clone(), root, path);
    }

    if ctx.is_query_param(root) {
        return match path {
            [] => Err(LoweringError::unknown("parameter object")),
            [name] => Ok(Resolved::Value(ValueExpr::Param(ParamRef::new(*name)))),
            [name, property] => Ok(Resolved::Value(ValueExpr::Param(
                ParamRef::new(*name).with_property(*property),
            ))),
            _ => Err(LoweringError::UnresolvedMember {
                path: format!("{root}.{}", path.join(".")),
            }),
        };
    }

    if ctx.is_helpers_param(root) || ctx.is_builder_param(root) {
        return Err(LoweringError::unsupported_call(format!(
            "{root}.{}",
            path.join(".")
        )));
    }

    // Covers well-known globals too: lower_value lifts those before it
    // consults the resolver
    Err(LoweringError::ExternalVariable {
        name: root.to_string(),
    })
}

fn resolve_row_path(
    ctx: &LoweringContext,
    binding: RowBinding,
    root: &str,
    path: &[&str],
) -> LoweringResult<Resolved> {
    match binding {
        RowBinding::Table => match path {
            [] => Ok(Resolved::WholeRow),
            [column] => Ok(Resolved::Value(ValueExpr::Column {
                name: (*column).to_string(),
                source: None,
            })),
            _ => Err(LoweringError::UnresolvedMember {
                path: format!("{root}.{}", path.join(".")),
            }),
        },
        RowBinding::Slot(slot) => match path {
            [] => Ok(Resolved::SlotRow(slot)),
            [column] => Ok(Resolved::Value(ValueExpr::Column {
                name: (*column).to_string(),
                source: Some(ColumnOrigin::Slot(slot)),
            })),
            _ => Err(LoweringError::UnresolvedMember {
                path: format!("{root}.{}", path.join(".")),
            }),
        },
        RowBinding::Shape => {
            let shape = ctx
                .current_shape()
                .ok_or_else(|| LoweringError::UnresolvedMember {
                    path: root.to_string(),
                })?;
            if path.is_empty() {
                return Ok(Resolved::ShapeRow(shape.clone()));
            }
            match shape.resolve(path) {
                Some(arrowql_ir::shape::ResolvedShape::Column { slot, name }) => {
                    Ok(Resolved::Value(ValueExpr::Column {
                        name,
                        source: Some(ColumnOrigin::Slot(slot)),
                    }))
                }
                Some(arrowql_ir::shape::ResolvedShape::Row { slot }) => {
                    Ok(Resolved::SlotRow(slot))
                }
                Some(arrowql_ir::shape::ResolvedShape::Shape(sub)) => Ok(Resolved::ShapeRow(sub)),
                None => Err(LoweringError::UnresolvedMember {
                    path: format!("{root}.{}", path.join(".")),
                }),
            }
        }
        RowBinding::Group => resolve_group_path(ctx, root, path),
    }
}

fn resolve_group_path(
    ctx: &LoweringContext,
    root: &str,
    path: &[&str],
) -> LoweringResult<Resolved> {
    let key = ctx
        .group_key()
        .ok_or_else(|| LoweringError::UnresolvedMember {
            path: root.to_string(),
        })?;
    match path {
        [] => Err(LoweringError::InvalidGroupAccess {
            property: String::new(),
        }),
        ["key", rest @ ..] => match (key, rest) {
            (arrowql_ir::GroupKey::Column(name), []) => Ok(Resolved::Value(ValueExpr::Column {
                name: name.clone(),
                source: None,
            })),
            (arrowql_ir::GroupKey::Expr(expr), []) => Ok(Resolved::Value(expr.clone())),
            (arrowql_ir::GroupKey::Object(props), []) => Ok(Resolved::KeyObject(props.clone())),
            (arrowql_ir::GroupKey::Object(props), [sub]) => props
                .iter()
                .find(|(name, _)| name == sub)
                .map(|(_, expr)| Resolved::Value(expr.clone()))
                .ok_or_else(|| LoweringError::InvalidGroupAccess {
                    property: (*sub).to_string(),
                }),
            _ => Err(LoweringError::UnresolvedMember {
                path: format!("{root}.{}", path.join(".")),
            }),
        },
        [property, ..] => Err(LoweringError::InvalidGroupAccess {
            property: (*property).to_string(),
        }),
    }
}

fn resolve_index(
    ctx: &LoweringContext,
    object: &EsExpr,
    index: &EsExpr,
) -> LoweringResult<Resolved> {
    let EsExpr::Number(n) = index else {
        return Err(LoweringError::unknown("computed member access"));
    };
    let Some((root, path)) = object.member_path() else {
        return Err(LoweringError::unknown("computed member access"));
    };
    if !ctx.is_query_param(root) {
        return Err(LoweringError::unknown("computed member access"));
    }
    match path.as_slice() {
        [name] => Ok(Resolved::Value(ValueExpr::Param(
            ParamRef::new(*name).with_index(*n as usize),
        ))),
        _ => Err(LoweringError::UnresolvedMember {
            path: format!("{root}.{}[..]", path.join(".")),
        }),
    }
}

/// Extract the JSON value of a literal expression, if it is one
///
/// Arrays of literals count: they lift to a single array-valued parameter.
pub(crate) fn literal_json(expr: &EsExpr) -> Option<ParamValue> {
    match expr {
        EsExpr::String(s) => Some(json!(s)),
        EsExpr::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 9.3e18 {
                Some(json!(*n as i64))
            } else {
                Some(json!(*n))
            }
        }
        EsExpr::Bool(b) => Some(json!(*b)),
        EsExpr::Unary {
            op: EsUnaryOp::Neg,
            argument,
        } => match argument.as_ref() {
            EsExpr::Number(n) => literal_json(&EsExpr::Number(-n)),
            _ => None,
        },
        EsExpr::Array(items) => {
            let values: Option<Vec<_>> = items.iter().map(literal_json).collect();
            values.map(ParamValue::Array)
        }
        _ => None,
    }
}

/// Field info harvested from the column side of a comparison
pub(crate) fn peek_field_info(ctx: &LoweringContext, expr: &EsExpr) -> Option<AutoParamInfo> {
    let resolved = try_resolve(ctx, expr)?.ok()?;
    let Resolved::Value(ValueExpr::Column { name, source }) = resolved else {
        return None;
    };
    let source_slot = match source {
        Some(ColumnOrigin::Slot(slot)) => Some(slot),
        _ => None,
    };
    Some(AutoParamInfo {
        value: ParamValue::Null,
        field_name: Some(name),
        table_name: ctx.current_table().map(str::to_string),
        source_slot,
    })
}

/// Lower one comparison operand, harvesting field info from the other side
pub(crate) fn lower_operand(
    ctx: &mut LoweringContext,
    expr: &EsExpr,
    other: &EsExpr,
) -> LoweringResult<ValueExpr> {
    if let Some(value) = literal_json(expr) {
        let info = peek_field_info(ctx, other).unwrap_or_default();
        return Ok(ValueExpr::Param(ctx.add_auto_param(value, info)));
    }
    lower_value(ctx, expr)
}

/// Lower an AST node into a scalar value expression
pub fn lower_value(ctx: &mut LoweringContext, expr: &EsExpr) -> LoweringResult<ValueExpr> {
    match expr {
        EsExpr::Null | EsExpr::Undefined => Ok(ValueExpr::Constant(Literal::Null)),

        EsExpr::String(_) | EsExpr::Number(_) | EsExpr::Bool(_) | EsExpr::Array(_) => {
            let value = literal_json(expr).ok_or_else(|| LoweringError::unknown("array"))?;
            Ok(ValueExpr::Param(
                ctx.add_auto_param(value, AutoParamInfo::default()),
            ))
        }

        EsExpr::Identifier(_) | EsExpr::Member { .. } | EsExpr::Index { .. } => {
            // Well-known globals need the mutable counter, so they are
            // handled here rather than in try_resolve
            if let Some(value) = global_constant(expr) {
                return Ok(ValueExpr::Param(
                    ctx.add_auto_param(value, AutoParamInfo::default()),
                ));
            }
            // Member access over a non-path object (e.g. a call result) has
            // no resolvable root
            let resolved = try_resolve(ctx, expr)
                .ok_or_else(|| LoweringError::unknown("member access"))??;
            match resolved {
                Resolved::Value(value) => Ok(value),
                Resolved::WholeRow
                | Resolved::SlotRow(_)
                | Resolved::ShapeRow(_)
                | Resolved::KeyObject(_) => Err(LoweringError::UnresolvedMember {
                    path: "row used where a scalar value is required".to_string(),
                }),
            }
        }

        EsExpr::Unary {
            op: EsUnaryOp::Neg,
            ..
        } => {
            let value = literal_json(expr).ok_or_else(|| LoweringError::unknown("negation"))?;
            Ok(ValueExpr::Param(
                ctx.add_auto_param(value, AutoParamInfo::default()),
            ))
        }

        EsExpr::Unary {
            op: EsUnaryOp::Not, ..
        } => Ok(ValueExpr::Boolean(Box::new(lower_predicate(ctx, expr)?))),

        EsExpr::Binary { op, left, right } => lower_binary_value(ctx, *op, left, right),

        EsExpr::Conditional { .. } => lower_conditional(ctx, expr),

        EsExpr::Call { .. } => lower_value_call(ctx, expr),

        EsExpr::Object(_) => Err(LoweringError::unknown("object literal")),
        EsExpr::Arrow(_) => Err(LoweringError::unknown("arrow function")),
    }
}

fn global_constant(expr: &EsExpr) -> Option<ParamValue> {
    let (root, path) = expr.member_path()?;
    if root != "Number" {
        return None;
    }
    match path.as_slice() {
        ["MAX_SAFE_INTEGER"] => Some(json!(9_007_199_254_740_991_i64)),
        ["MIN_SAFE_INTEGER"] => Some(json!(-9_007_199_254_740_991_i64)),
        _ => None,
    }
}

fn lower_binary_value(
    ctx: &mut LoweringContext,
    op: EsBinaryOp,
    left: &EsExpr,
    right: &EsExpr,
) -> LoweringResult<ValueExpr> {
    match op {
        EsBinaryOp::Add if is_stringy(left) || is_stringy(right) => Ok(ValueExpr::Concat {
            left: Box::new(lower_operand(ctx, left, right)?),
            right: Box::new(lower_operand(ctx, right, left)?),
        }),
        EsBinaryOp::Add | EsBinaryOp::Sub | EsBinaryOp::Mul | EsBinaryOp::Div | EsBinaryOp::Mod => {
            let arith_op = match op {
                EsBinaryOp::Add => arrowql_ir::ArithmeticOp::Add,
                EsBinaryOp::Sub => arrowql_ir::ArithmeticOp::Sub,
                EsBinaryOp::Mul => arrowql_ir::ArithmeticOp::Mul,
                EsBinaryOp::Div => arrowql_ir::ArithmeticOp::Div,
                EsBinaryOp::Mod => arrowql_ir::ArithmeticOp::Mod,
                _ => unreachable!(),
            };
            Ok(ValueExpr::Arithmetic {
                op: arith_op,
                left: Box::new(lower_operand(ctx, left, right)?),
                right: Box::new(lower_operand(ctx, right, left)?),
            })
        }
        EsBinaryOp::NullishCoalesce => {
            let mut items = Vec::new();
            flatten_coalesce(ctx, left, &mut items)?;
            flatten_coalesce(ctx, right, &mut items)?;
            Ok(ValueExpr::Coalesce(items))
        }
        // `||` over non-boolean operands is a null-coalescing idiom
        EsBinaryOp::Or if !(is_predicate_shaped(left) && is_predicate_shaped(right)) => {
            let mut items = Vec::new();
            flatten_coalesce(ctx, left, &mut items)?;
            flatten_coalesce(ctx, right, &mut items)?;
            Ok(ValueExpr::Coalesce(items))
        }
        EsBinaryOp::And
        | EsBinaryOp::Or
        | EsBinaryOp::Eq
        | EsBinaryOp::Ne
        | EsBinaryOp::Gt
        | EsBinaryOp::Ge
        | EsBinaryOp::Lt
        | EsBinaryOp::Le => {
            let predicate = lower_predicate(
                ctx,
                &EsExpr::Binary {
                    op,
                    left: Box::new(left.clone()),
                    right: Box::new(right.clone()),
                },
            )?;
            Ok(ValueExpr::Boolean(Box::new(predicate)))
        }
    }
}

fn flatten_coalesce(
    ctx: &mut LoweringContext,
    expr: &EsExpr,
    out: &mut Vec<ValueExpr>,
) -> LoweringResult<()> {
    match expr {
        EsExpr::Binary {
            op: EsBinaryOp::NullishCoalesce,
            left,
            right,
        } => {
            flatten_coalesce(ctx, left, out)?;
            flatten_coalesce(ctx, right, out)?;
        }
        _ => out.push(lower_value(ctx, expr)?),
    }
    Ok(())
}

/// Syntactic check: does this expression look like it produces a string?
fn is_stringy(expr: &EsExpr) -> bool {
    match expr {
        EsExpr::String(_) => true,
        EsExpr::Binary {
            op: EsBinaryOp::Add,
            left,
            right,
        } => is_stringy(left) || is_stringy(right),
        EsExpr::Call { callee, .. } => matches!(
            callee.as_ref(),
            EsExpr::Member { property, .. } if property == "toLowerCase" || property == "toUpperCase"
        ),
        _ => false,
    }
}

/// Syntactic check: does this expression produce a truth value?
pub(crate) fn is_predicate_shaped(expr: &EsExpr) -> bool {
    match expr {
        EsExpr::Bool(_) => true,
        EsExpr::Unary {
            op: EsUnaryOp::Not, ..
        } => true,
        EsExpr::Binary { op, .. } => matches!(
            op,
            EsBinaryOp::And
                | EsBinaryOp::Or
                | EsBinaryOp::Eq
                | EsBinaryOp::Ne
                | EsBinaryOp::Gt
                | EsBinaryOp::Ge
                | EsBinaryOp::Lt
                | EsBinaryOp::Le
        ),
        EsExpr::Call { callee, .. } => matches!(
            callee.as_ref(),
            EsExpr::Member { property, .. }
                if matches!(
                    property.as_str(),
                    "startsWith" | "endsWith" | "includes" | "contains"
                        | "iequals" | "istartsWith" | "iendsWith" | "icontains"
                )
        ),
        _ => false,
    }
}

fn lower_conditional(ctx: &mut LoweringContext, expr: &EsExpr) -> LoweringResult<ValueExpr> {
    let mut branches = Vec::new();
    let mut current = expr;
    loop {
        let EsExpr::Conditional {
            test,
            consequent,
            alternate,
        } = current
        else {
            break;
        };
        branches.push(CaseBranch {
            when: lower_predicate(ctx, test)?,
            then: lower_value(ctx, consequent)?,
        });
        current = alternate;
    }
    let otherwise = lower_value(ctx, current)?;

    if branches.len() == 1 {
        let branch = branches.pop().expect("one branch");
        return Ok(ValueExpr::Conditional {
            condition: Box::new(branch.when),
            then: Box::new(branch.then),
            otherwise: Box::new(otherwise),
        });
    }
    Ok(ValueExpr::Case {
        branches,
        otherwise: Some(Box::new(otherwise)),
    })
}

fn lower_value_call(ctx: &mut LoweringContext, expr: &EsExpr) -> LoweringResult<ValueExpr> {
    let EsExpr::Call { callee, args } = expr else {
        return Err(LoweringError::unsupported_call("non-call"));
    };
    let EsExpr::Member { object, property } = callee.as_ref() else {
        return Err(LoweringError::unsupported_call("free function call"));
    };

    match property.as_str() {
        "toLowerCase" | "toUpperCase" if args.is_empty() => {
            let method = if property == "toLowerCase" {
                StringMethod::Lower
            } else {
                StringMethod::Upper
            };
            Ok(ValueExpr::StringMethod {
                method,
                object: Box::new(lower_value(ctx, object)?),
            })
        }

        // Grouping aggregates: g.count(), g.sum(x => x.amount), ...
        "count" | "sum" | "avg" | "min" | "max" if is_group_object(ctx, object) => {
            lower_group_aggregate(ctx, property, args)
        }

        // Window chains terminate in rank() / denseRank() / rowNumber()
        "rank" | "denseRank" | "rowNumber" if args.is_empty() => {
            lower_window_chain(ctx, property, object)
        }

        _ => Err(LoweringError::unsupported_call(format!(
            "{property}(..)"
        ))),
    }
}

fn is_group_object(ctx: &LoweringContext, object: &EsExpr) -> bool {
    matches!(
        object.root_identifier().and_then(|name| ctx.row_binding(name)),
        Some(RowBinding::Group)
    )
}

fn lower_group_aggregate(
    ctx: &mut LoweringContext,
    function: &str,
    args: &[EsExpr],
) -> LoweringResult<ValueExpr> {
    let function = match function {
        "count" => AggregateFunction::Count,
        "sum" => AggregateFunction::Sum,
        "avg" => AggregateFunction::Avg,
        "min" => AggregateFunction::Min,
        "max" => AggregateFunction::Max,
        _ => unreachable!("caller matched the function name"),
    };

    let selector = match args {
        [] => None,
        [EsExpr::Arrow(arrow)] => Some(lower_row_selector(ctx, arrow)?),
        _ => {
            return Err(LoweringError::BadLambdaArity {
                expected: "a row selector".to_string(),
                context: "aggregate call".to_string(),
            });
        }
    };

    if selector.is_none() && function != AggregateFunction::Count {
        return Err(LoweringError::BadLambdaArity {
            expected: "a row selector".to_string(),
            context: "aggregate call".to_string(),
        });
    }

    Ok(ValueExpr::Aggregate {
        function,
        expr: selector.map(Box::new),
    })
}

/// Lower a `row => row.col`-style selector, binding its parameter to the
/// underlying (pre-grouping) row
pub(crate) fn lower_row_selector(
    ctx: &mut LoweringContext,
    arrow: &EsArrow,
) -> LoweringResult<ValueExpr> {
    let [param] = arrow.params.as_slice() else {
        return Err(LoweringError::BadLambdaArity {
            expected: "one row parameter".to_string(),
            context: "selector".to_string(),
        });
    };
    let binding = if ctx.current_shape().is_some() {
        RowBinding::Shape
    } else {
        RowBinding::Table
    };
    ctx.bind_row_param(param.clone(), binding);
    let value = lower_value(ctx, &arrow.body);
    ctx.unbind_row_param(param);
    value
}

fn lower_window_chain(
    ctx: &mut LoweringContext,
    terminal: &str,
    chain: &EsExpr,
) -> LoweringResult<ValueExpr> {
    let function = match terminal {
        "rank" => WindowFunction::Rank,
        "denseRank" => WindowFunction::DenseRank,
        "rowNumber" => WindowFunction::RowNumber,
        _ => unreachable!("caller matched the terminal name"),
    };

    // Walk back to the `h.window(row)` root, collecting stages
    let mut stages: Vec<(String, &EsArrow)> = Vec::new();
    let mut current = chain;
    loop {
        match current {
            EsExpr::Call { callee, args } => {
                let EsExpr::Member { object, property } = callee.as_ref() else {
                    return Err(LoweringError::unsupported_call("window chain"));
                };
                if property == "window" {
                    let is_helpers = object
                        .root_identifier()
                        .is_some_and(|name| ctx.is_helpers_param(name));
                    if !is_helpers || args.len() != 1 {
                        return Err(LoweringError::unsupported_call("window chain"));
                    }
                    break;
                }
                let [EsExpr::Arrow(selector)] = args.as_slice() else {
                    return Err(LoweringError::unsupported_call(format!(
                        "window stage {property}"
                    )));
                };
                stages.push((property.clone(), selector.as_ref()));
                current = object;
            }
            _ => return Err(LoweringError::unsupported_call("window chain")),
        }
    }
    stages.reverse();

    let mut partition_by = Vec::new();
    let mut order_by = Vec::new();
    for (stage, selector) in stages {
        let expr = lower_row_selector(ctx, selector)?;
        match stage.as_str() {
            "partitionBy" => partition_by.push(expr),
            "orderBy" | "thenBy" => order_by.push(WindowOrder {
                expr,
                descending: false,
            }),
            "orderByDescending" | "thenByDescending" => order_by.push(WindowOrder {
                expr,
                descending: true,
            }),
            other => {
                return Err(LoweringError::unsupported_call(format!(
                    "window stage {other}"
                )));
            }
        }
    }

    Ok(ValueExpr::Window(WindowExpr {
        function,
        partition_by,
        order_by,
    }))
}
