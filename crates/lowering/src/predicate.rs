// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Predicate visitor
//!
//! Lowers AST nodes into [`BoolExpr`]. The NULL rules live here: comparisons
//! against `null` or `undefined` collapse to `IS [NOT] NULL` regardless of
//! which side holds the literal, which is what keeps the
//! `(p.x === undefined || u.x === p.x)` optional-filter idiom working. A bare
//! column in boolean position is promoted to a boolean column exactly once;
//! `!!x` collapses back to `x`.

use arrowql_ast::{EsBinaryOp, EsExpr, EsUnaryOp};
use arrowql_ir::{
    BoolExpr, BooleanMethod, CaseInsensitiveFunction, ComparisonOp, InList, Literal, LogicalOp,
    ValueExpr,
};

use crate::context::LoweringContext;
use crate::error::{LoweringError, LoweringResult};
use crate::value::{Resolved, literal_json, lower_operand, lower_value, peek_field_info, try_resolve};

/// Lower an AST node into a truth-valued expression
pub fn lower_predicate(ctx: &mut LoweringContext, expr: &EsExpr) -> LoweringResult<BoolExpr> {
    match expr {
        EsExpr::Bool(b) => Ok(BoolExpr::BooleanConstant(*b)),

        EsExpr::Identifier(_) | EsExpr::Member { .. } | EsExpr::Index { .. } => {
            promote_to_bool(ctx, expr)
        }

        EsExpr::Unary {
            op: EsUnaryOp::Not,
            argument,
        } => match lower_predicate(ctx, argument)? {
            // Double negation is the JS boolean-coercion idiom
            BoolExpr::Not(inner) => Ok(*inner),
            inner => Ok(BoolExpr::Not(Box::new(inner))),
        },

        EsExpr::Binary { op, left, right } => match op {
            EsBinaryOp::And => Ok(BoolExpr::Logical {
                op: LogicalOp::And,
                left: Box::new(lower_predicate(ctx, left)?),
                right: Box::new(lower_predicate(ctx, right)?),
            }),
            EsBinaryOp::Or => Ok(BoolExpr::Logical {
                op: LogicalOp::Or,
                left: Box::new(lower_predicate(ctx, left)?),
                right: Box::new(lower_predicate(ctx, right)?),
            }),
            EsBinaryOp::Eq => lower_equality(ctx, left, right, false),
            EsBinaryOp::Ne => lower_equality(ctx, left, right, true),
            EsBinaryOp::Gt => lower_comparison(ctx, ComparisonOp::Gt, left, right),
            EsBinaryOp::Ge => lower_comparison(ctx, ComparisonOp::Ge, left, right),
            EsBinaryOp::Lt => lower_comparison(ctx, ComparisonOp::Lt, left, right),
            EsBinaryOp::Le => lower_comparison(ctx, ComparisonOp::Le, left, right),
            _ => Err(LoweringError::unknown("arithmetic in boolean position")),
        },

        EsExpr::Call { .. } => lower_boolean_call(ctx, expr),

        _ => Err(LoweringError::unknown("expression in boolean position")),
    }
}

/// A column or parameter standing alone where a boolean is required
fn promote_to_bool(ctx: &mut LoweringContext, expr: &EsExpr) -> LoweringResult<BoolExpr> {
    let resolved = try_resolve(ctx, expr)
        .ok_or_else(|| LoweringError::unknown("expression in boolean position"))??;
    match resolved {
        Resolved::Value(ValueExpr::Column { name, source }) => {
            Ok(BoolExpr::BooleanColumn { name, source })
        }
        Resolved::Value(ValueExpr::Boolean(inner)) => Ok(*inner),
        Resolved::Value(param @ ValueExpr::Param(_)) => Ok(BoolExpr::Comparison {
            op: ComparisonOp::Eq,
            left: Box::new(param),
            right: Box::new(ValueExpr::Constant(Literal::Boolean(true))),
        }),
        _ => Err(LoweringError::unknown("expression in boolean position")),
    }
}

fn is_nullish(expr: &EsExpr) -> bool {
    matches!(expr, EsExpr::Null | EsExpr::Undefined)
}

fn lower_equality(
    ctx: &mut LoweringContext,
    left: &EsExpr,
    right: &EsExpr,
    negated: bool,
) -> LoweringResult<BoolExpr> {
    match (is_nullish(left), is_nullish(right)) {
        (true, true) => Ok(BoolExpr::BooleanConstant(!negated)),
        (false, true) => Ok(BoolExpr::IsNull {
            expr: Box::new(lower_value(ctx, left)?),
            negated,
        }),
        (true, false) => Ok(BoolExpr::IsNull {
            expr: Box::new(lower_value(ctx, right)?),
            negated,
        }),
        (false, false) => lower_comparison(
            ctx,
            if negated {
                ComparisonOp::Ne
            } else {
                ComparisonOp::Eq
            },
            left,
            right,
        ),
    }
}

fn lower_comparison(
    ctx: &mut LoweringContext,
    op: ComparisonOp,
    left: &EsExpr,
    right: &EsExpr,
) -> LoweringResult<BoolExpr> {
    Ok(BoolExpr::Comparison {
        op,
        left: Box::new(lower_comparison_side(ctx, left, right)?),
        right: Box::new(lower_comparison_side(ctx, right, left)?),
    })
}

/// One comparison side; a boolean sub-expression is allowed and treated as a
/// 0/1 value
fn lower_comparison_side(
    ctx: &mut LoweringContext,
    expr: &EsExpr,
    other: &EsExpr,
) -> LoweringResult<ValueExpr> {
    if crate::value::is_predicate_shaped(expr) {
        return Ok(ValueExpr::Boolean(Box::new(lower_predicate(ctx, expr)?)));
    }
    lower_operand(ctx, expr, other)
}

fn lower_boolean_call(ctx: &mut LoweringContext, expr: &EsExpr) -> LoweringResult<BoolExpr> {
    let EsExpr::Call { callee, args } = expr else {
        return Err(LoweringError::unsupported_call("non-call"));
    };
    let EsExpr::Member { object, property } = callee.as_ref() else {
        return Err(LoweringError::unsupported_call("free function call"));
    };

    // helpers.functions.iequals(a, b) and friends
    if let Some(function) = case_insensitive_function(ctx, object, property) {
        let [left, right] = args.as_slice() else {
            return Err(LoweringError::BadLambdaArity {
                expected: "two arguments".to_string(),
                context: format!("{property}(..)"),
            });
        };
        return Ok(BoolExpr::CaseInsensitive {
            function,
            left: Box::new(lower_operand(ctx, left, right)?),
            right: Box::new(lower_operand(ctx, right, left)?),
        });
    }

    match property.as_str() {
        "startsWith" | "endsWith" => {
            let [argument] = args.as_slice() else {
                return Err(LoweringError::BadLambdaArity {
                    expected: "one argument".to_string(),
                    context: format!("{property}(..)"),
                });
            };
            let method = if property == "startsWith" {
                BooleanMethod::StartsWith
            } else {
                BooleanMethod::EndsWith
            };
            Ok(BoolExpr::BooleanMethod {
                method,
                object: Box::new(lower_value(ctx, object)?),
                argument: Box::new(lower_operand(ctx, argument, object)?),
            })
        }

        "includes" | "contains" => {
            let [argument] = args.as_slice() else {
                return Err(LoweringError::BadLambdaArity {
                    expected: "one argument".to_string(),
                    context: format!("{property}(..)"),
                });
            };
            lower_includes(ctx, object, argument)
        }

        _ => Err(LoweringError::unsupported_call(format!("{property}(..)"))),
    }
}

/// `xs.includes(v)`: membership test when `xs` is array-valued, substring
/// test when it is a string column
fn lower_includes(
    ctx: &mut LoweringContext,
    object: &EsExpr,
    argument: &EsExpr,
) -> LoweringResult<BoolExpr> {
    // Array literal: lift the whole array to one bound parameter
    if let EsExpr::Array(_) = object {
        let values = literal_json(object)
            .ok_or_else(|| LoweringError::unknown("array with non-literal elements"))?;
        let info = peek_field_info(ctx, argument).unwrap_or_default();
        let list = InList::Param(ctx.add_auto_param(values, info));
        return Ok(BoolExpr::In {
            value: Box::new(lower_value(ctx, argument)?),
            list,
        });
    }

    // Array-valued parameter: p.roles.includes(u.role)
    if let Some(Ok(Resolved::Value(ValueExpr::Param(param)))) = try_resolve(ctx, object) {
        return Ok(BoolExpr::In {
            value: Box::new(lower_value(ctx, argument)?),
            list: InList::Param(param),
        });
    }

    // Otherwise a substring test on a string column
    Ok(BoolExpr::BooleanMethod {
        method: BooleanMethod::Includes,
        object: Box::new(lower_value(ctx, object)?),
        argument: Box::new(lower_operand(ctx, argument, object)?),
    })
}

fn case_insensitive_function(
    ctx: &LoweringContext,
    object: &EsExpr,
    property: &str,
) -> Option<CaseInsensitiveFunction> {
    let EsExpr::Member {
        object: root,
        property: namespace,
    } = object
    else {
        return None;
    };
    if namespace != "functions" {
        return None;
    }
    let helpers = root.root_identifier()?;
    if !ctx.is_helpers_param(helpers) {
        return None;
    }
    match property {
        "iequals" => Some(CaseInsensitiveFunction::IEquals),
        "istartsWith" => Some(CaseInsensitiveFunction::IStartsWith),
        "iendsWith" => Some(CaseInsensitiveFunction::IEndsWith),
        "icontains" => Some(CaseInsensitiveFunction::IContains),
        _ => None,
    }
}
