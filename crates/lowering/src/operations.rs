// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Operation visitors
//!
//! Walks a builder-lambda call chain root-first and produces the query
//! operation tree. The chain starts at a root call (`q.from("users")`,
//! `q.insertInto(..)`, `q.updateTable(..)`, `q.deleteFrom(..)`); every later
//! method call is dispatched by name through [`apply_method`], which the plan
//! handles also reuse to compose fragments onto an existing tree.

use arrowql_ast::{EsArrow, EsExpr};
use arrowql_ir::{
    AutoParamInfo, BoolExpr, ColumnOrigin, Expr, GroupKey, JoinKind, ObjectExpr, QueryOp,
    ShapeNode, TableName, TerminalAggregate, ValueExpr,
};
use serde_json::json;
use tracing::debug;

use crate::context::{LoweringContext, RowBinding};
use crate::error::{LoweringError, LoweringResult};
use crate::predicate::lower_predicate;
use crate::projection::{lower_projection, lower_projection_entry};
use crate::shape::shape_from_projection;
use crate::value::{literal_json, lower_value};

/// Lower a whole builder lambda `(q, p?, h?) => q.from("users")...`
pub fn lower_builder(ctx: &mut LoweringContext, arrow: &EsArrow) -> LoweringResult<QueryOp> {
    let mut params = arrow.params.iter();
    let builder = params.next().ok_or_else(|| LoweringError::BadLambdaArity {
        expected: "a query builder parameter".to_string(),
        context: "builder lambda".to_string(),
    })?;
    ctx.set_builder_param(builder.clone());
    if let Some(query_params) = params.next() {
        ctx.add_query_param(query_params.clone());
    }
    if let Some(helpers) = params.next() {
        ctx.set_helpers_param(helpers.clone());
    }
    debug!(builder = %builder, "lowering builder lambda");
    lower_chain(ctx, &arrow.body)
}

/// Lower one call chain into an operation tree
pub fn lower_chain(ctx: &mut LoweringContext, expr: &EsExpr) -> LoweringResult<QueryOp> {
    let EsExpr::Call { callee, args } = expr else {
        return Err(LoweringError::unsupported_call("query chain"));
    };
    let EsExpr::Member { object, property } = callee.as_ref() else {
        return Err(LoweringError::unsupported_call("query chain"));
    };

    // Root calls hang directly off the builder parameter
    if let EsExpr::Identifier(name) = object.as_ref() {
        if ctx.is_builder_param(name) {
            return lower_root(ctx, property, args);
        }
    }

    let source = lower_chain(ctx, object)?;
    apply_method(ctx, source, property, args)
}

fn lower_root(
    ctx: &mut LoweringContext,
    method: &str,
    args: &[EsExpr],
) -> LoweringResult<QueryOp> {
    let [EsExpr::String(table)] = args else {
        return Err(LoweringError::unsupported_call(format!("{method}(..)")));
    };
    let table = TableName::parse(table);
    ctx.set_current_table(Some(table.name.clone()));
    ctx.set_current_shape(None);
    ctx.set_group_key(None);

    match method {
        "from" => Ok(QueryOp::From { table }),
        "insertInto" => Ok(QueryOp::Insert {
            table,
            assignments: ObjectExpr::new(),
            returning: None,
        }),
        "updateTable" => Ok(QueryOp::Update {
            table,
            assignments: ObjectExpr::new(),
            predicate: None,
            allow_full_table: false,
            returning: None,
        }),
        "deleteFrom" => Ok(QueryOp::Delete {
            table,
            predicate: None,
            allow_full_table: false,
        }),
        _ => Err(LoweringError::unsupported_call(format!("{method}(..)"))),
    }
}

/// Attach one method call onto an existing operation tree
///
/// This is the dispatch table shared by the chain walk and by plan-handle
/// composition.
pub fn apply_method(
    ctx: &mut LoweringContext,
    source: QueryOp,
    method: &str,
    args: &[EsExpr],
) -> LoweringResult<QueryOp> {
    match method {
        "where" => {
            let arrow = expect_arrow(args, 0, method)?;
            let predicate = lower_bound_predicate(ctx, &source, arrow)?;
            attach_predicate(source, predicate)
        }

        "select" => {
            let arrow = expect_arrow(args, 0, method)?;
            let bound = bind_lambda(ctx, &source, arrow);
            let projection = lower_projection(ctx, &arrow.body);
            unbind(ctx, bound);
            // A projection re-shapes the row for everything above it
            ctx.set_current_shape(None);
            ctx.set_group_key(None);
            Ok(QueryOp::Select {
                source: Box::new(source),
                projection: projection?,
            })
        }

        "join" => lower_join(ctx, source, args),

        "selectMany" => lower_select_many(ctx, source, args),

        "groupBy" => {
            let arrow = expect_arrow(args, 0, method)?;
            let key = lower_group_key(ctx, &source, arrow)?;
            ctx.set_group_key(Some(key.clone()));
            Ok(QueryOp::GroupBy {
                source: Box::new(source),
                key,
            })
        }

        "orderBy" | "orderByDescending" | "thenBy" | "thenByDescending" => {
            let arrow = expect_arrow(args, 0, method)?;
            let bound = bind_lambda(ctx, &source, arrow);
            let key = lower_value(ctx, &arrow.body);
            unbind(ctx, bound);
            let key = key?;
            let descending = method.ends_with("Descending");
            if method.starts_with("orderBy") {
                Ok(QueryOp::OrderBy {
                    source: Box::new(source),
                    key,
                    descending,
                })
            } else {
                Ok(QueryOp::ThenBy {
                    source: Box::new(source),
                    key,
                    descending,
                })
            }
        }

        "take" | "skip" => {
            let arg = args
                .first()
                .ok_or_else(|| LoweringError::unsupported_call(format!("{method}()")))?;
            let marker = if method == "take" { "LIMIT" } else { "OFFSET" };
            let count = lower_count(ctx, arg, marker)?;
            if method == "take" {
                Ok(QueryOp::Take {
                    source: Box::new(source),
                    count,
                })
            } else {
                Ok(QueryOp::Skip {
                    source: Box::new(source),
                    count,
                })
            }
        }

        "takeWhile" | "skipWhile" => {
            let arrow = expect_arrow(args, 0, method)?;
            let predicate = lower_bound_predicate(ctx, &source, arrow)?;
            if method == "takeWhile" {
                Ok(QueryOp::TakeWhile {
                    source: Box::new(source),
                    predicate,
                })
            } else {
                Ok(QueryOp::SkipWhile {
                    source: Box::new(source),
                    predicate,
                })
            }
        }

        "distinct" => Ok(QueryOp::Distinct {
            source: Box::new(source),
        }),

        "values" => {
            let arg = args
                .first()
                .ok_or_else(|| LoweringError::unsupported_call("values()"))?;
            let assignments = lower_assignments(ctx, &source, arg, false)?;
            match source {
                QueryOp::Insert {
                    table, returning, ..
                } => Ok(QueryOp::Insert {
                    table,
                    assignments,
                    returning,
                }),
                _ => Err(LoweringError::unsupported_call("values(..)")),
            }
        }

        "set" => {
            let arg = args
                .first()
                .ok_or_else(|| LoweringError::unsupported_call("set()"))?;
            let assignments = lower_assignments(ctx, &source, arg, true)?;
            match source {
                QueryOp::Update {
                    table,
                    predicate,
                    allow_full_table,
                    returning,
                    ..
                } => Ok(QueryOp::Update {
                    table,
                    assignments,
                    predicate,
                    allow_full_table,
                    returning,
                }),
                _ => Err(LoweringError::unsupported_call("set(..)")),
            }
        }

        "returning" => {
            let arrow = expect_arrow(args, 0, method)?;
            let bound = bind_lambda(ctx, &source, arrow);
            let projection = lower_projection(ctx, &arrow.body);
            unbind(ctx, bound);
            let projection = projection?;
            match source {
                QueryOp::Insert {
                    table, assignments, ..
                } => Ok(QueryOp::Insert {
                    table,
                    assignments,
                    returning: Some(projection),
                }),
                QueryOp::Update {
                    table,
                    assignments,
                    predicate,
                    allow_full_table,
                    ..
                } => Ok(QueryOp::Update {
                    table,
                    assignments,
                    predicate,
                    allow_full_table,
                    returning: Some(projection),
                }),
                _ => Err(LoweringError::unsupported_call("returning(..)")),
            }
        }

        "allowFullTableUpdate" => match source {
            QueryOp::Update {
                table,
                assignments,
                predicate,
                returning,
                ..
            } => Ok(QueryOp::Update {
                table,
                assignments,
                predicate,
                allow_full_table: true,
                returning,
            }),
            _ => Err(LoweringError::unsupported_call("allowFullTableUpdate()")),
        },

        "allowFullTableDelete" => match source {
            QueryOp::Delete {
                table, predicate, ..
            } => Ok(QueryOp::Delete {
                table,
                predicate,
                allow_full_table: true,
            }),
            _ => Err(LoweringError::unsupported_call("allowFullTableDelete()")),
        },

        "count" | "any" | "first" | "single" | "last" => {
            let predicate = lower_optional_predicate(ctx, &source, args)?;
            let terminal = match method {
                "count" => TerminalAggregate::Count { predicate },
                "any" => TerminalAggregate::Any { predicate },
                "first" => TerminalAggregate::First { predicate },
                "single" => TerminalAggregate::Single { predicate },
                "last" => TerminalAggregate::Last { predicate },
                _ => unreachable!(),
            };
            Ok(QueryOp::Aggregate {
                source: Box::new(source),
                terminal,
            })
        }

        "all" => {
            let arrow = expect_arrow(args, 0, method)?;
            let predicate = lower_bound_predicate(ctx, &source, arrow)?;
            Ok(QueryOp::Aggregate {
                source: Box::new(source),
                terminal: TerminalAggregate::All { predicate },
            })
        }

        "sum" | "avg" | "min" | "max" => {
            let arrow = expect_arrow(args, 0, method)?;
            let bound = bind_lambda(ctx, &source, arrow);
            let selector = lower_value(ctx, &arrow.body);
            unbind(ctx, bound);
            let selector = selector?;
            let terminal = match method {
                "sum" => TerminalAggregate::Sum { selector },
                "avg" => TerminalAggregate::Avg { selector },
                "min" => TerminalAggregate::Min { selector },
                "max" => TerminalAggregate::Max { selector },
                _ => unreachable!(),
            };
            Ok(QueryOp::Aggregate {
                source: Box::new(source),
                terminal,
            })
        }

        "contains" => {
            let arg = args
                .first()
                .ok_or_else(|| LoweringError::unsupported_call("contains()"))?;
            let value = if let Some(value) = literal_json(arg) {
                ValueExpr::Param(ctx.add_auto_param(value, AutoParamInfo::default()))
            } else {
                lower_value(ctx, arg)?
            };
            Ok(QueryOp::Aggregate {
                source: Box::new(source),
                terminal: TerminalAggregate::Contains { value },
            })
        }

        "defaultIfEmpty" => Err(LoweringError::unsupported_call(
            "defaultIfEmpty() outside selectMany",
        )),

        other => Err(LoweringError::unsupported_call(format!("{other}(..)"))),
    }
}

/// LIMIT / OFFSET count: numeric literals lift with the marker as field info
fn lower_count(
    ctx: &mut LoweringContext,
    arg: &EsExpr,
    marker: &str,
) -> LoweringResult<ValueExpr> {
    if let Some(value) = literal_json(arg) {
        let info = AutoParamInfo {
            value: json!(null),
            field_name: Some(marker.to_string()),
            table_name: None,
            source_slot: None,
        };
        return Ok(ValueExpr::Param(ctx.add_auto_param(value, info)));
    }
    lower_value(ctx, arg)
}

fn expect_arrow<'a>(
    args: &'a [EsExpr],
    index: usize,
    method: &str,
) -> LoweringResult<&'a EsArrow> {
    match args.get(index) {
        Some(EsExpr::Arrow(arrow)) => Ok(arrow),
        _ => Err(LoweringError::BadLambdaArity {
            expected: "a lambda argument".to_string(),
            context: format!("{method}(..)"),
        }),
    }
}

/// Determine how a fragment lambda's row parameter binds, updating the
/// context's table / shape / group state from the source tree
fn row_binding_from_source(ctx: &mut LoweringContext, source: &QueryOp) -> RowBinding {
    let mut op = source;
    loop {
        match op {
            QueryOp::Select { .. } => return RowBinding::Table,
            QueryOp::GroupBy { key, .. } => {
                ctx.set_group_key(Some(key.clone()));
                return RowBinding::Group;
            }
            QueryOp::Join { shape, .. } | QueryOp::SelectMany { shape, .. } => {
                ctx.set_current_shape(Some(shape.clone()));
                return RowBinding::Shape;
            }
            QueryOp::From { table }
            | QueryOp::Insert { table, .. }
            | QueryOp::Update { table, .. }
            | QueryOp::Delete { table, .. } => {
                ctx.set_current_table(Some(table.name.clone()));
                return RowBinding::Table;
            }
            other => match other.source() {
                Some(inner) => op = inner,
                None => return RowBinding::Table,
            },
        }
    }
}

/// Bind a fragment lambda's parameters: row, then params, then helpers
fn bind_lambda(ctx: &mut LoweringContext, source: &QueryOp, arrow: &EsArrow) -> Vec<String> {
    let mut bound = Vec::new();
    let mut params = arrow.params.iter();
    if let Some(row) = params.next() {
        let binding = row_binding_from_source(ctx, source);
        ctx.bind_row_param(row.clone(), binding);
        bound.push(row.clone());
    }
    if let Some(query_params) = params.next() {
        ctx.add_query_param(query_params.clone());
    }
    if let Some(helpers) = params.next() {
        ctx.set_helpers_param(helpers.clone());
    }
    bound
}

fn unbind(ctx: &mut LoweringContext, names: Vec<String>) {
    for name in names {
        ctx.unbind_row_param(&name);
    }
}

fn lower_bound_predicate(
    ctx: &mut LoweringContext,
    source: &QueryOp,
    arrow: &EsArrow,
) -> LoweringResult<BoolExpr> {
    let bound = bind_lambda(ctx, source, arrow);
    let predicate = lower_predicate(ctx, &arrow.body);
    unbind(ctx, bound);
    predicate
}

fn lower_optional_predicate(
    ctx: &mut LoweringContext,
    source: &QueryOp,
    args: &[EsExpr],
) -> LoweringResult<Option<BoolExpr>> {
    match args.first() {
        None => Ok(None),
        Some(EsExpr::Arrow(arrow)) => Ok(Some(lower_bound_predicate(ctx, source, arrow)?)),
        Some(_) => Err(LoweringError::BadLambdaArity {
            expected: "a predicate lambda".to_string(),
            context: "aggregate".to_string(),
        }),
    }
}

/// WHERE goes onto a mutation root directly; SELECT chains get a Where op
fn attach_predicate(source: QueryOp, predicate: BoolExpr) -> LoweringResult<QueryOp> {
    match source {
        QueryOp::Update {
            table,
            assignments,
            predicate: existing,
            allow_full_table,
            returning,
        } => Ok(QueryOp::Update {
            table,
            assignments,
            predicate: Some(merge_predicates(existing, predicate)),
            allow_full_table,
            returning,
        }),
        QueryOp::Delete {
            table,
            predicate: existing,
            allow_full_table,
        } => Ok(QueryOp::Delete {
            table,
            predicate: Some(merge_predicates(existing, predicate)),
            allow_full_table,
        }),
        other => Ok(QueryOp::Where {
            source: Box::new(other),
            predicate,
        }),
    }
}

fn merge_predicates(existing: Option<BoolExpr>, new: BoolExpr) -> BoolExpr {
    match existing {
        Some(left) => BoolExpr::and(left, new),
        None => new,
    }
}

fn lower_group_key(
    ctx: &mut LoweringContext,
    source: &QueryOp,
    arrow: &EsArrow,
) -> LoweringResult<GroupKey> {
    let bound = bind_lambda(ctx, source, arrow);
    let key = (|| match &arrow.body {
        EsExpr::Object(props) => {
            let mut entries = Vec::with_capacity(props.len());
            for (name, value) in props {
                entries.push((name.clone(), lower_value(ctx, value)?));
            }
            Ok(GroupKey::Object(entries))
        }
        body => match lower_value(ctx, body)? {
            ValueExpr::Column { name, source: None } => Ok(GroupKey::Column(name)),
            expr => Ok(GroupKey::Expr(expr)),
        },
    })();
    unbind(ctx, bound);
    key
}

fn lower_assignments(
    ctx: &mut LoweringContext,
    source: &QueryOp,
    arg: &EsExpr,
    with_row: bool,
) -> LoweringResult<ObjectExpr> {
    let mut bound = Vec::new();
    let body = match arg {
        EsExpr::Arrow(arrow) => {
            let mut params = arrow.params.iter();
            if with_row {
                if let Some(row) = params.next() {
                    let binding = row_binding_from_source(ctx, source);
                    ctx.bind_row_param(row.clone(), binding);
                    bound.push(row.clone());
                }
                if let Some(query_params) = params.next() {
                    ctx.add_query_param(query_params.clone());
                }
            } else {
                // INSERT values lambdas receive the params object only
                if let Some(query_params) = params.next() {
                    ctx.add_query_param(query_params.clone());
                }
            }
            &arrow.body
        }
        other => other,
    };

    let result = (|| {
        let EsExpr::Object(props) = body else {
            return Err(LoweringError::unknown("assignment object"));
        };
        let mut assignments = ObjectExpr::new();
        for (name, value) in props {
            // undefined assignments are filtered out entirely
            if matches!(value, EsExpr::Undefined) {
                continue;
            }
            assignments.push(name.clone(), Expr::Value(lower_value(ctx, value)?));
        }
        Ok(assignments)
    })();
    unbind(ctx, bound);
    result
}

fn lower_join(
    ctx: &mut LoweringContext,
    source: QueryOp,
    args: &[EsExpr],
) -> LoweringResult<QueryOp> {
    let [inner_expr, outer_sel, inner_sel, result_sel] = args else {
        return Err(LoweringError::unsupported_call("join(..)"));
    };

    let saved_table = ctx.current_table().map(str::to_string);
    let saved_shape = ctx.current_shape().cloned();

    // The inner source is a full chain sharing this context's counter
    ctx.set_current_shape(None);
    let inner_op = lower_chain(ctx, inner_expr)?;

    ctx.set_current_table(saved_table.clone());
    ctx.set_current_shape(saved_shape.clone());

    let outer_slots = source.slot_count();
    let inner_base = outer_slots;

    // Outer key selector
    let outer_arrow = as_arrow(outer_sel)?;
    let outer_binding = if saved_shape.is_some() {
        RowBinding::Shape
    } else {
        RowBinding::Table
    };
    let (outer_key, outer_key_slot) =
        lower_key_selector(ctx, outer_arrow, outer_binding, outer_sel)?;

    // Inner key selector: the inner row occupies the next slot
    let inner_arrow = as_arrow(inner_sel)?;
    let (inner_key, _) =
        lower_key_selector(ctx, inner_arrow, RowBinding::Slot(inner_base), inner_sel)?;

    // Result selector: two parameters with synthetic slot bindings
    let result_arrow = as_arrow(result_sel)?;
    let [outer_param, inner_param] = result_arrow.params.as_slice() else {
        return Err(LoweringError::BadLambdaArity {
            expected: "two parameters".to_string(),
            context: "join result selector".to_string(),
        });
    };
    let outer_result_binding = if saved_shape.is_some() {
        RowBinding::Shape
    } else {
        RowBinding::Slot(0)
    };
    ctx.bind_row_param(outer_param.clone(), outer_result_binding);
    ctx.bind_row_param(inner_param.clone(), RowBinding::Slot(inner_base));
    let projection = lower_projection_entry(ctx, &result_arrow.body);
    ctx.unbind_row_param(outer_param);
    ctx.unbind_row_param(inner_param);

    let shape = shape_from_projection(&projection?)?;

    ctx.set_current_shape(Some(shape.clone()));
    ctx.set_group_key(None);
    ctx.set_current_table(saved_table);

    Ok(QueryOp::Join {
        source: Box::new(source),
        inner: Box::new(inner_op),
        kind: JoinKind::Inner,
        outer_key,
        outer_key_slot,
        inner_key,
        shape,
    })
}

fn as_arrow(expr: &EsExpr) -> LoweringResult<&EsArrow> {
    match expr {
        EsExpr::Arrow(arrow) => Ok(arrow),
        _ => Err(LoweringError::BadLambdaArity {
            expected: "a lambda argument".to_string(),
            context: "join".to_string(),
        }),
    }
}

/// A key selector must resolve to exactly one column
fn lower_key_selector(
    ctx: &mut LoweringContext,
    arrow: &EsArrow,
    binding: RowBinding,
    original: &EsExpr,
) -> LoweringResult<(String, Option<usize>)> {
    let [param] = arrow.params.as_slice() else {
        return Err(LoweringError::BadLambdaArity {
            expected: "one parameter".to_string(),
            context: "join key selector".to_string(),
        });
    };
    ctx.bind_row_param(param.clone(), binding);
    let key = lower_value(ctx, &arrow.body);
    ctx.unbind_row_param(param);

    match key? {
        ValueExpr::Column {
            name,
            source: Some(ColumnOrigin::Slot(slot)),
        } => Ok((name, Some(slot))),
        ValueExpr::Column { name, source: _ } => Ok((name, None)),
        _ => Err(LoweringError::JoinKeyNotColumn {
            context: format!("{original:?}"),
        }),
    }
}

fn lower_select_many(
    ctx: &mut LoweringContext,
    source: QueryOp,
    args: &[EsExpr],
) -> LoweringResult<QueryOp> {
    let collection_arrow = expect_arrow(args, 0, "selectMany")?;
    let [outer_param, ..] = collection_arrow.params.as_slice() else {
        return Err(LoweringError::BadLambdaArity {
            expected: "one parameter".to_string(),
            context: "selectMany collection selector".to_string(),
        });
    };

    let saved_table = ctx.current_table().map(str::to_string);
    let saved_shape = ctx.current_shape().cloned();
    let outer_slots = source.slot_count();
    let inner_base = outer_slots;

    // defaultIfEmpty() wrapping flips the join to LEFT
    let (collection_body, mut kind) = match &collection_arrow.body {
        EsExpr::Call { callee, args } if args.is_empty() => match callee.as_ref() {
            EsExpr::Member { object, property } if property == "defaultIfEmpty" => {
                (object.as_ref(), JoinKind::Left)
            }
            _ => (&collection_arrow.body, JoinKind::Inner),
        },
        body => (body, JoinKind::Inner),
    };

    let (inner_op, on) = if let Some((root, path)) = collection_body.member_path() {
        // Property-path collection: no relation metadata, so this is a
        // cross join against the table named by the property
        if root != outer_param || path.len() != 1 {
            return Err(LoweringError::UnresolvedMember {
                path: format!("{root}.{}", path.join(".")),
            });
        }
        if kind == JoinKind::Inner {
            kind = JoinKind::Cross;
        }
        let inner = QueryOp::From {
            table: TableName::parse(path[0]),
        };
        (inner, None)
    } else {
        // Nested-query collection: the outer row stays in scope so its
        // columns resolve through slot 0; the nested WHERE becomes the ON
        let outer_binding = if saved_shape.is_some() {
            RowBinding::Shape
        } else {
            RowBinding::Slot(0)
        };
        ctx.bind_row_param(outer_param.clone(), outer_binding);
        let lowered = lower_chain(ctx, collection_body);
        ctx.unbind_row_param(outer_param);
        let lowered = lowered?;

        let (stripped, on) = strip_where(lowered);
        let on = on.map(|pred| tag_untagged_columns(pred, inner_base));
        if kind == JoinKind::Inner && on.is_none() {
            kind = JoinKind::Cross;
        }
        (stripped, on)
    };

    ctx.set_current_table(saved_table.clone());
    ctx.set_current_shape(saved_shape.clone());

    // Result selector defaults to the inner rows, matching flattening
    // semantics when no selector is given
    let shape = match args.get(1) {
        Some(EsExpr::Arrow(result_arrow)) => {
            let [outer_p, inner_p] = result_arrow.params.as_slice() else {
                return Err(LoweringError::BadLambdaArity {
                    expected: "two parameters".to_string(),
                    context: "selectMany result selector".to_string(),
                });
            };
            let outer_binding = if saved_shape.is_some() {
                RowBinding::Shape
            } else {
                RowBinding::Slot(0)
            };
            ctx.bind_row_param(outer_p.clone(), outer_binding);
            ctx.bind_row_param(inner_p.clone(), RowBinding::Slot(inner_base));
            let projection = lower_projection_entry(ctx, &result_arrow.body);
            ctx.unbind_row_param(outer_p);
            ctx.unbind_row_param(inner_p);
            shape_from_projection(&projection?)?
        }
        None => ShapeNode::Reference { slot: inner_base },
        Some(_) => {
            return Err(LoweringError::BadLambdaArity {
                expected: "a lambda argument".to_string(),
                context: "selectMany result selector".to_string(),
            });
        }
    };

    ctx.set_current_shape(Some(shape.clone()));
    ctx.set_group_key(None);
    ctx.set_current_table(saved_table);

    Ok(QueryOp::SelectMany {
        source: Box::new(source),
        inner: Box::new(inner_op),
        kind,
        on,
        shape,
    })
}

/// Remove the Where ops from the top of a nested collection chain,
/// returning the stripped tree and the combined predicate
fn strip_where(op: QueryOp) -> (QueryOp, Option<BoolExpr>) {
    match op {
        QueryOp::Where { source, predicate } => {
            let (inner, rest) = strip_where(*source);
            let combined = match rest {
                Some(existing) => BoolExpr::and(existing, predicate),
                None => predicate,
            };
            (inner, Some(combined))
        }
        other => (other, None),
    }
}

/// Columns lowered inside the nested collection carry no origin; they belong
/// to the inner table and get its slot here
fn tag_untagged_columns(expr: BoolExpr, slot: usize) -> BoolExpr {
    fn tag_value(expr: ValueExpr, slot: usize) -> ValueExpr {
        match expr {
            ValueExpr::Column { name, source: None } => ValueExpr::Column {
                name,
                source: Some(ColumnOrigin::Slot(slot)),
            },
            ValueExpr::Arithmetic { op, left, right } => ValueExpr::Arithmetic {
                op,
                left: Box::new(tag_value(*left, slot)),
                right: Box::new(tag_value(*right, slot)),
            },
            ValueExpr::Concat { left, right } => ValueExpr::Concat {
                left: Box::new(tag_value(*left, slot)),
                right: Box::new(tag_value(*right, slot)),
            },
            ValueExpr::StringMethod { method, object } => ValueExpr::StringMethod {
                method,
                object: Box::new(tag_value(*object, slot)),
            },
            ValueExpr::Boolean(inner) => {
                ValueExpr::Boolean(Box::new(tag_untagged_columns(*inner, slot)))
            }
            other => other,
        }
    }

    match expr {
        BoolExpr::Comparison { op, left, right } => BoolExpr::Comparison {
            op,
            left: Box::new(tag_value(*left, slot)),
            right: Box::new(tag_value(*right, slot)),
        },
        BoolExpr::Logical { op, left, right } => BoolExpr::Logical {
            op,
            left: Box::new(tag_untagged_columns(*left, slot)),
            right: Box::new(tag_untagged_columns(*right, slot)),
        },
        BoolExpr::Not(inner) => BoolExpr::Not(Box::new(tag_untagged_columns(*inner, slot))),
        BoolExpr::BooleanColumn { name, source: None } => BoolExpr::BooleanColumn {
            name,
            source: Some(ColumnOrigin::Slot(slot)),
        },
        BoolExpr::BooleanMethod {
            method,
            object,
            argument,
        } => BoolExpr::BooleanMethod {
            method,
            object: Box::new(tag_value(*object, slot)),
            argument: Box::new(tag_value(*argument, slot)),
        },
        BoolExpr::In { value, list } => BoolExpr::In {
            value: Box::new(tag_value(*value, slot)),
            list,
        },
        BoolExpr::CaseInsensitive {
            function,
            left,
            right,
        } => BoolExpr::CaseInsensitive {
            function,
            left: Box::new(tag_value(*left, slot)),
            right: Box::new(tag_value(*right, slot)),
        },
        BoolExpr::IsNull { expr, negated } => BoolExpr::IsNull {
            expr: Box::new(tag_value(*expr, slot)),
            negated,
        },
        other => other,
    }
}
