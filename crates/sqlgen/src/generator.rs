// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Shared SQL renderer
//!
//! Walks the operation tree bottom-up, composing SQL fragments. Identifier
//! quoting is uniform double quotes; columns are qualified with `"tN"`
//! aliases only when the query has more than one source slot. Parameters
//! render as `@name` tokens; every token emitted is guaranteed to be a key
//! of the returned parameter map (missing externals bind as NULL, nested
//! accesses and IN-list elements materialize flattened `name__x` entries).

use std::collections::HashMap;

use arrowql_ir::{
    BoolExpr, BooleanMethod, CaseInsensitiveFunction, ColumnOrigin, ComparisonOp, Dialect, Expr,
    GroupKey, InList, JoinKind, Literal, LogicalOp, ObjectExpr, ParamRef, ParamValue, QueryOp,
    TableName, TerminalAggregate, ValueExpr, WindowExpr,
};
use tracing::debug;

use crate::dialect::{SqlDialect, dialect_impl};
use crate::error::{SqlGenError, SqlGenResult};

/// A rendered statement: the SQL text plus the full parameter map
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub sql: String,
    pub params: HashMap<String, ParamValue>,
}

/// Render an operation tree against a merged parameter bag
pub fn render(
    op: &QueryOp,
    params: &HashMap<String, ParamValue>,
    dialect: Dialect,
) -> SqlGenResult<Rendered> {
    let mut generator = Generator {
        dialect: dialect_impl(dialect),
        input: params,
        output: params.clone(),
    };
    let sql = match op {
        QueryOp::Insert {
            table,
            assignments,
            returning,
        } => generator.render_insert(table, assignments, returning.as_ref())?,
        QueryOp::Update {
            table,
            assignments,
            predicate,
            allow_full_table,
            returning,
        } => generator.render_update(
            table,
            assignments,
            predicate.as_ref(),
            *allow_full_table,
            returning.as_ref(),
        )?,
        QueryOp::Delete {
            table,
            predicate,
            allow_full_table,
        } => generator.render_delete(table, predicate.as_ref(), *allow_full_table)?,
        _ => generator.render_select(op)?,
    };
    debug!(dialect = %dialect, sql_len = sql.len(), "rendered statement");
    Ok(Rendered {
        sql,
        params: generator.output,
    })
}

struct Generator<'a> {
    dialect: &'a dyn SqlDialect,
    input: &'a HashMap<String, ParamValue>,
    output: HashMap<String, ParamValue>,
}

/// Clauses gathered from one SELECT spine
#[derive(Default)]
struct SelectParts<'a> {
    root: Option<&'a TableName>,
    /// Joins bottom-up: `joins[0]` is closest to the root FROM
    joins: Vec<&'a QueryOp>,
    /// Predicates below the GROUP BY (or all of them when there is none)
    wheres: Vec<&'a BoolExpr>,
    /// Predicates above the GROUP BY, rendered as HAVING
    havings: Vec<&'a BoolExpr>,
    projection: Option<&'a Expr>,
    group: Option<&'a GroupKey>,
    /// Primary key first
    order: Vec<(&'a ValueExpr, bool)>,
    take: Option<&'a ValueExpr>,
    skip: Option<&'a ValueExpr>,
    distinct: bool,
    terminal: Option<&'a TerminalAggregate>,
}

fn decompose<'a>(op: &'a QueryOp, dialect: &str) -> SqlGenResult<SelectParts<'a>> {
    let mut parts = SelectParts::default();
    let mut pre_group: Vec<&BoolExpr> = Vec::new();
    let mut post_group: Vec<&BoolExpr> = Vec::new();
    let mut order_locked = false;
    let mut passed_group = false;
    let mut current = op;

    loop {
        match current {
            QueryOp::Aggregate { source, terminal } => {
                if parts.terminal.is_none() {
                    parts.terminal = Some(terminal);
                }
                current = source;
            }
            QueryOp::Take { source, count } => {
                parts.take.get_or_insert(count);
                current = source;
            }
            QueryOp::Skip { source, count } => {
                parts.skip.get_or_insert(count);
                current = source;
            }
            QueryOp::TakeWhile { .. } | QueryOp::SkipWhile { .. } => {
                // Present in the IR, but no SQL equivalent exists
                return Err(SqlGenError::UnsupportedDialect {
                    feature: "takeWhile()/skipWhile()".to_string(),
                    dialect: dialect.to_string(),
                });
            }
            QueryOp::Distinct { source } => {
                parts.distinct = true;
                current = source;
            }
            QueryOp::Where { source, predicate } => {
                if passed_group {
                    pre_group.push(predicate);
                } else {
                    post_group.push(predicate);
                }
                current = source;
            }
            QueryOp::Select { source, projection } => {
                parts.projection.get_or_insert(projection);
                current = source;
            }
            QueryOp::GroupBy { source, key } => {
                parts.group.get_or_insert(key);
                passed_group = true;
                current = source;
            }
            QueryOp::OrderBy {
                source,
                key,
                descending,
            } => {
                if !order_locked {
                    parts.order.push((key, *descending));
                    order_locked = true;
                }
                current = source;
            }
            QueryOp::ThenBy {
                source,
                key,
                descending,
            } => {
                if !order_locked {
                    parts.order.push((key, *descending));
                }
                current = source;
            }
            QueryOp::Join { source, .. } | QueryOp::SelectMany { source, .. } => {
                parts.joins.push(current);
                current = source;
            }
            QueryOp::From { table } => {
                parts.root = Some(table);
                break;
            }
            QueryOp::Insert { .. } | QueryOp::Update { .. } | QueryOp::Delete { .. } => {
                return Err(SqlGenError::UnknownExpression {
                    kind: "mutation inside a SELECT chain".to_string(),
                });
            }
        }
    }

    // Walk order is top-down; SQL wants bottom-up
    pre_group.reverse();
    post_group.reverse();
    parts.joins.reverse();
    parts.order.reverse();
    if parts.group.is_some() {
        parts.wheres = pre_group;
        parts.havings = post_group;
    } else {
        parts.wheres = post_group;
    }
    Ok(parts)
}

impl Generator<'_> {
    fn quote(&self, name: &str) -> String {
        self.dialect.quote_ident(name)
    }

    fn table_sql(&self, table: &TableName) -> String {
        match &table.schema {
            Some(schema) => format!("{}.{}", self.quote(schema), self.quote(&table.name)),
            None => self.quote(&table.name),
        }
    }

    fn alias(&self, slot: usize) -> String {
        self.quote(&format!("t{slot}"))
    }

    fn column_sql(&self, name: &str, source: Option<&ColumnOrigin>, multi: bool) -> String {
        if !multi {
            return self.quote(name);
        }
        let qualifier = match source {
            Some(ColumnOrigin::Slot(slot)) => self.alias(*slot),
            Some(ColumnOrigin::Table(table)) => self.quote(table),
            None => self.alias(0),
        };
        format!("{qualifier}.{}", self.quote(name))
    }

    /// Resolve a parameter reference to a token, recording its value
    ///
    /// Plain names pass through; property / index accesses materialize a
    /// flattened `name__x` entry. Referenced externals missing from the bag
    /// bind as NULL.
    fn param_sql(&mut self, param: &ParamRef) -> String {
        let root = self
            .input
            .get(&param.name)
            .cloned()
            .unwrap_or(ParamValue::Null);
        let (token, value) = if let Some(property) = &param.property {
            let value = root.get(property).cloned().unwrap_or(ParamValue::Null);
            (format!("{}__{property}", param.name), value)
        } else if let Some(index) = param.index {
            let value = root.get(index).cloned().unwrap_or(ParamValue::Null);
            (format!("{}__{index}", param.name), value)
        } else {
            (param.name.clone(), root)
        };
        self.output.insert(token.clone(), value);
        self.dialect.param_token(&token)
    }

    fn literal_sql(&self, literal: &Literal) -> String {
        match literal {
            Literal::Null => "NULL".to_string(),
            Literal::Boolean(true) => self.dialect.true_literal().to_string(),
            Literal::Boolean(false) => self.dialect.false_literal().to_string(),
            Literal::Integer(n) => n.to_string(),
            Literal::Float(f) => f.to_string(),
            Literal::String(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }

    fn render_value(&mut self, expr: &ValueExpr, multi: bool) -> SqlGenResult<String> {
        match expr {
            ValueExpr::Column { name, source } => Ok(self.column_sql(name, source.as_ref(), multi)),
            ValueExpr::Constant(literal) => Ok(self.literal_sql(literal)),
            ValueExpr::Param(param) => Ok(self.param_sql(param)),
            ValueExpr::Arithmetic { op, left, right } => {
                let op = match op {
                    arrowql_ir::ArithmeticOp::Add => "+",
                    arrowql_ir::ArithmeticOp::Sub => "-",
                    arrowql_ir::ArithmeticOp::Mul => "*",
                    arrowql_ir::ArithmeticOp::Div => "/",
                    arrowql_ir::ArithmeticOp::Mod => "%",
                };
                Ok(format!(
                    "({} {op} {})",
                    self.render_value(left, multi)?,
                    self.render_value(right, multi)?
                ))
            }
            ValueExpr::Concat { left, right } => Ok(format!(
                "{} || {}",
                self.render_value(left, multi)?,
                self.render_value(right, multi)?
            )),
            ValueExpr::StringMethod { method, object } => {
                let function = match method {
                    arrowql_ir::StringMethod::Lower => "LOWER",
                    arrowql_ir::StringMethod::Upper => "UPPER",
                };
                Ok(format!("{function}({})", self.render_value(object, multi)?))
            }
            ValueExpr::Aggregate { function, expr } => {
                let function = match function {
                    arrowql_ir::AggregateFunction::Count => "COUNT",
                    arrowql_ir::AggregateFunction::Sum => "SUM",
                    arrowql_ir::AggregateFunction::Avg => "AVG",
                    arrowql_ir::AggregateFunction::Min => "MIN",
                    arrowql_ir::AggregateFunction::Max => "MAX",
                };
                match expr {
                    Some(inner) => Ok(format!(
                        "{function}({})",
                        self.render_value(inner, multi)?
                    )),
                    None => Ok(format!("{function}(*)")),
                }
            }
            ValueExpr::Coalesce(items) => {
                let rendered: SqlGenResult<Vec<_>> = items
                    .iter()
                    .map(|item| self.render_value(item, multi))
                    .collect();
                Ok(format!("COALESCE({})", rendered?.join(", ")))
            }
            ValueExpr::Conditional {
                condition,
                then,
                otherwise,
            } => Ok(format!(
                "CASE WHEN {} THEN {} ELSE {} END",
                self.render_bool(condition, multi)?,
                self.render_value(then, multi)?,
                self.render_value(otherwise, multi)?
            )),
            ValueExpr::Case {
                branches,
                otherwise,
            } => {
                let mut sql = String::from("CASE");
                for branch in branches {
                    sql.push_str(&format!(
                        " WHEN {} THEN {}",
                        self.render_bool(&branch.when, multi)?,
                        self.render_value(&branch.then, multi)?
                    ));
                }
                if let Some(otherwise) = otherwise {
                    sql.push_str(&format!(" ELSE {}", self.render_value(otherwise, multi)?));
                }
                sql.push_str(" END");
                Ok(sql)
            }
            ValueExpr::Window(window) => self.render_window(window, multi),
            ValueExpr::Boolean(inner) => Ok(format!("({})", self.render_bool(inner, multi)?)),
        }
    }

    fn render_window(&mut self, window: &WindowExpr, multi: bool) -> SqlGenResult<String> {
        let function = match window.function {
            arrowql_ir::WindowFunction::RowNumber => "ROW_NUMBER",
            arrowql_ir::WindowFunction::Rank => "RANK",
            arrowql_ir::WindowFunction::DenseRank => "DENSE_RANK",
        };
        let mut over = Vec::new();
        if !window.partition_by.is_empty() {
            let cols: SqlGenResult<Vec<_>> = window
                .partition_by
                .iter()
                .map(|expr| self.render_value(expr, multi))
                .collect();
            over.push(format!("PARTITION BY {}", cols?.join(", ")));
        }
        if !window.order_by.is_empty() {
            let keys: SqlGenResult<Vec<_>> = window
                .order_by
                .iter()
                .map(|order| {
                    let rendered = self.render_value(&order.expr, multi)?;
                    Ok(format!(
                        "{rendered} {}",
                        if order.descending { "DESC" } else { "ASC" }
                    ))
                })
                .collect();
            over.push(format!("ORDER BY {}", keys?.join(", ")));
        }
        Ok(format!("{function}() OVER ({})", over.join(" ")))
    }

    fn render_bool(&mut self, expr: &BoolExpr, multi: bool) -> SqlGenResult<String> {
        match expr {
            BoolExpr::Comparison { op, left, right } => {
                // Defensive collapse; lowering normally produces IsNull
                if right.is_null_constant() || left.is_null_constant() {
                    let operand = if right.is_null_constant() { left } else { right };
                    let negated = matches!(op, ComparisonOp::Ne);
                    return self.render_is_null(operand, negated, multi);
                }
                let op = match op {
                    ComparisonOp::Eq => "=",
                    ComparisonOp::Ne => "!=",
                    ComparisonOp::Gt => ">",
                    ComparisonOp::Ge => ">=",
                    ComparisonOp::Lt => "<",
                    ComparisonOp::Le => "<=",
                };
                Ok(format!(
                    "{} {op} {}",
                    self.render_value(left, multi)?,
                    self.render_value(right, multi)?
                ))
            }
            BoolExpr::Logical { op, .. } => {
                let mut operands = Vec::new();
                flatten_logical(*op, expr, &mut operands);
                let keyword = match op {
                    LogicalOp::And => " AND ",
                    LogicalOp::Or => " OR ",
                };
                let rendered: SqlGenResult<Vec<_>> = operands
                    .iter()
                    .map(|operand| self.render_bool(operand, multi))
                    .collect();
                Ok(format!("({})", rendered?.join(keyword)))
            }
            BoolExpr::Not(inner) => Ok(format!("NOT ({})", self.render_bool(inner, multi)?)),
            BoolExpr::BooleanColumn { name, source } => {
                Ok(self.column_sql(name, source.as_ref(), multi))
            }
            BoolExpr::BooleanConstant(true) => Ok(self.dialect.true_literal().to_string()),
            BoolExpr::BooleanConstant(false) => Ok(self.dialect.false_literal().to_string()),
            BoolExpr::BooleanMethod {
                method,
                object,
                argument,
            } => {
                let object = self.render_value(object, multi)?;
                let argument = self.render_value(argument, multi)?;
                Ok(match method {
                    BooleanMethod::StartsWith => format!("{object} LIKE {argument} || '%'"),
                    BooleanMethod::EndsWith => format!("{object} LIKE '%' || {argument}"),
                    BooleanMethod::Includes => {
                        format!("{object} LIKE '%' || {argument} || '%'")
                    }
                })
            }
            BoolExpr::In { value, list } => self.render_in(value, list, multi),
            BoolExpr::CaseInsensitive {
                function,
                left,
                right,
            } => {
                let left = format!("LOWER({})", self.render_value(left, multi)?);
                let right = format!("LOWER({})", self.render_value(right, multi)?);
                Ok(match function {
                    CaseInsensitiveFunction::IEquals => format!("{left} = {right}"),
                    CaseInsensitiveFunction::IStartsWith => {
                        format!("{left} LIKE {right} || '%'")
                    }
                    CaseInsensitiveFunction::IEndsWith => format!("{left} LIKE '%' || {right}"),
                    CaseInsensitiveFunction::IContains => {
                        format!("{left} LIKE '%' || {right} || '%'")
                    }
                })
            }
            BoolExpr::IsNull { expr, negated } => self.render_is_null(expr, *negated, multi),
        }
    }

    fn render_is_null(
        &mut self,
        expr: &ValueExpr,
        negated: bool,
        multi: bool,
    ) -> SqlGenResult<String> {
        Ok(format!(
            "{} IS {}NULL",
            self.render_value(expr, multi)?,
            if negated { "NOT " } else { "" }
        ))
    }

    /// IN lists: array-valued bindings expand to `name__i` tokens; empty
    /// arrays collapse to the dialect's always-false literal
    fn render_in(
        &mut self,
        value: &ValueExpr,
        list: &InList,
        multi: bool,
    ) -> SqlGenResult<String> {
        let value_sql = self.render_value(value, multi)?;
        match list {
            InList::Param(param) => {
                let bound = self
                    .input
                    .get(&param.name)
                    .cloned()
                    .unwrap_or(ParamValue::Null);
                let items = match bound {
                    ParamValue::Array(items) => items,
                    ParamValue::Null => Vec::new(),
                    other => vec![other],
                };
                if items.is_empty() {
                    return Ok(self.dialect.false_literal().to_string());
                }
                let mut tokens = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    let token = format!("{}__{i}", param.name);
                    self.output.insert(token.clone(), item);
                    tokens.push(self.dialect.param_token(&token));
                }
                // The original array binding is replaced by its elements
                self.output.remove(&param.name);
                Ok(format!("{value_sql} IN ({})", tokens.join(", ")))
            }
            InList::Values(items) => {
                if items.is_empty() {
                    return Ok(self.dialect.false_literal().to_string());
                }
                let rendered: SqlGenResult<Vec<_>> = items
                    .iter()
                    .map(|item| self.render_value(item, multi))
                    .collect();
                Ok(format!("{value_sql} IN ({})", rendered?.join(", ")))
            }
        }
    }

    /// Flatten a projection into `expr AS "alias"` items
    fn projection_items(
        &mut self,
        expr: &Expr,
        prefix: Option<&str>,
        multi: bool,
        out: &mut Vec<String>,
    ) -> SqlGenResult<()> {
        match expr {
            Expr::AllColumns { slot: None } => out.push("*".to_string()),
            Expr::AllColumns { slot: Some(slot) } | Expr::Reference { slot } => {
                if multi {
                    out.push(format!("{}.*", self.alias(*slot)));
                } else {
                    out.push("*".to_string());
                }
            }
            Expr::Object(object) => {
                for (name, value) in &object.properties {
                    let alias = match prefix {
                        Some(prefix) => format!("{prefix}_{name}"),
                        None => name.clone(),
                    };
                    match value {
                        Expr::Object(_) => {
                            self.projection_items(value, Some(&alias), multi, out)?;
                        }
                        Expr::Reference { slot } => {
                            // A whole-slot property flattens to a qualified
                            // wildcard; the alias cannot survive in SQL
                            if multi {
                                out.push(format!("{}.*", self.alias(*slot)));
                            } else {
                                out.push("*".to_string());
                            }
                        }
                        Expr::Value(v) => {
                            let rendered = self.render_value(v, multi)?;
                            out.push(format!("{rendered} AS {}", self.quote(&alias)));
                        }
                        Expr::Bool(b) => {
                            let rendered = self.render_bool(b, multi)?;
                            out.push(format!("{rendered} AS {}", self.quote(&alias)));
                        }
                        Expr::AllColumns { .. } => {
                            return Err(SqlGenError::UnknownExpression {
                                kind: "all-columns marker inside an object projection"
                                    .to_string(),
                            });
                        }
                    }
                }
            }
            Expr::Value(v) => out.push(self.render_value(v, multi)?),
            Expr::Bool(b) => out.push(self.render_bool(b, multi)?),
        }
        Ok(())
    }

    fn render_projection(&mut self, expr: Option<&Expr>, multi: bool) -> SqlGenResult<String> {
        let Some(expr) = expr else {
            return Ok("*".to_string());
        };
        if !expr.references_column() {
            return Err(SqlGenError::SelectWithoutColumns);
        }
        let mut items = Vec::new();
        self.projection_items(expr, None, multi, &mut items)?;
        Ok(items.join(", "))
    }

    fn render_group_key(&mut self, key: &GroupKey, multi: bool) -> SqlGenResult<String> {
        match key {
            GroupKey::Column(name) => Ok(self.column_sql(name, None, multi)),
            GroupKey::Expr(expr) => self.render_value(expr, multi),
            GroupKey::Object(props) => {
                let rendered: SqlGenResult<Vec<_>> = props
                    .iter()
                    .map(|(_, expr)| self.render_value(expr, multi))
                    .collect();
                Ok(rendered?.join(", "))
            }
        }
    }

    fn render_join_clause(
        &mut self,
        join: &QueryOp,
        inner_slot: usize,
        multi: bool,
    ) -> SqlGenResult<String> {
        match join {
            QueryOp::Join {
                inner,
                kind,
                outer_key,
                outer_key_slot,
                inner_key,
                ..
            } => {
                let inner_sql = self.render_join_source(inner)?;
                let keyword = match kind {
                    JoinKind::Inner => "INNER JOIN",
                    JoinKind::Left => "LEFT JOIN",
                    JoinKind::Cross => "CROSS JOIN",
                };
                let outer = self.column_sql(
                    outer_key,
                    Some(&ColumnOrigin::Slot(outer_key_slot.unwrap_or(0))),
                    true,
                );
                let inner_col =
                    self.column_sql(inner_key, Some(&ColumnOrigin::Slot(inner_slot)), true);
                Ok(format!(
                    "{keyword} {inner_sql} AS {} ON {outer} = {inner_col}",
                    self.alias(inner_slot)
                ))
            }
            QueryOp::SelectMany {
                inner, kind, on, ..
            } => {
                let inner_sql = self.render_join_source(inner)?;
                let alias = self.alias(inner_slot);
                match kind {
                    JoinKind::Cross => Ok(format!("CROSS JOIN {inner_sql} AS {alias}")),
                    JoinKind::Inner | JoinKind::Left => {
                        let keyword = if *kind == JoinKind::Left {
                            "LEFT JOIN"
                        } else {
                            "INNER JOIN"
                        };
                        let condition = match on {
                            Some(pred) => self.render_bool(pred, multi)?,
                            None => self.dialect.true_literal().to_string(),
                        };
                        Ok(format!("{keyword} {inner_sql} AS {alias} ON {condition}"))
                    }
                }
            }
            _ => Err(SqlGenError::UnknownExpression {
                kind: "non-join operation in join position".to_string(),
            }),
        }
    }

    /// A join source is a plain table, or a parenthesized subquery when the
    /// inner chain carries its own operations
    fn render_join_source(&mut self, inner: &QueryOp) -> SqlGenResult<String> {
        match inner {
            QueryOp::From { table } => Ok(self.table_sql(table)),
            other => Ok(format!("({})", self.render_select(other)?)),
        }
    }

    fn render_select(&mut self, op: &QueryOp) -> SqlGenResult<String> {
        let parts = decompose(op, &self.dialect.dialect().to_string())?;
        let root = parts.root.ok_or_else(|| SqlGenError::UnknownExpression {
            kind: "query without a FROM source".to_string(),
        })?;
        let multi = !parts.joins.is_empty();

        // FROM clause plus join clauses, assigning slots left-to-right
        let mut from_sql = if multi {
            format!("{} AS {}", self.table_sql(root), self.alias(0))
        } else {
            self.table_sql(root)
        };
        let mut next_slot = 1;
        for join in &parts.joins {
            let clause = self.render_join_clause(join, next_slot, multi)?;
            from_sql.push(' ');
            from_sql.push_str(&clause);
            next_slot += match join {
                QueryOp::Join { inner, .. } | QueryOp::SelectMany { inner, .. } => {
                    inner.slot_count()
                }
                _ => 1,
            };
        }

        // WHERE fragments, bottom-most first
        let mut where_items = Vec::new();
        for predicate in &parts.wheres {
            where_items.push(self.render_bool(predicate, multi)?);
        }

        match parts.terminal {
            Some(terminal) => {
                self.render_terminal(terminal, &parts, &from_sql, where_items, multi)
            }
            None => {
                let select_list = self.render_projection(parts.projection, multi)?;
                self.assemble_select(
                    &parts,
                    &from_sql,
                    &select_list,
                    where_items,
                    multi,
                    None,
                    false,
                )
            }
        }
    }

    /// Compose the final SELECT statement from rendered pieces
    #[allow(clippy::too_many_arguments)]
    fn assemble_select(
        &mut self,
        parts: &SelectParts<'_>,
        from_sql: &str,
        select_list: &str,
        where_items: Vec<String>,
        multi: bool,
        limit_override: Option<&str>,
        flip_order: bool,
    ) -> SqlGenResult<String> {
        let mut sql = String::from("SELECT ");
        if parts.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(select_list);
        sql.push_str(" FROM ");
        sql.push_str(from_sql);

        if !where_items.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_items.join(" AND "));
        }

        if let Some(key) = parts.group {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.render_group_key(key, multi)?);
        }

        if !parts.havings.is_empty() {
            let rendered: SqlGenResult<Vec<_>> = parts
                .havings
                .iter()
                .map(|predicate| self.render_bool(predicate, multi))
                .collect();
            sql.push_str(" HAVING ");
            sql.push_str(&rendered?.join(" AND "));
        }

        if !parts.order.is_empty() {
            let keys: SqlGenResult<Vec<_>> = parts
                .order
                .iter()
                .map(|(key, descending)| {
                    let rendered = self.render_value(key, multi)?;
                    let descending = *descending != flip_order;
                    Ok(format!(
                        "{rendered} {}",
                        if descending { "DESC" } else { "ASC" }
                    ))
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys?.join(", "));
        }

        let take_sql = match limit_override {
            Some(literal) => Some(literal.to_string()),
            None => match parts.take {
                Some(count) => Some(self.render_value(count, multi)?),
                None => None,
            },
        };
        let skip_sql = match parts.skip {
            Some(count) => Some(self.render_value(count, multi)?),
            None => None,
        };

        match (take_sql, skip_sql) {
            (Some(take), Some(skip)) => {
                sql.push_str(&format!(" LIMIT {take} OFFSET {skip}"));
            }
            (Some(take), None) => sql.push_str(&format!(" LIMIT {take}")),
            (None, Some(skip)) => {
                if self.dialect.requires_limit_for_offset() {
                    sql.push_str(&format!(" LIMIT -1 OFFSET {skip}"));
                } else {
                    sql.push_str(&format!(" OFFSET {skip}"));
                }
            }
            (None, None) => {}
        }

        Ok(sql)
    }

    fn render_terminal(
        &mut self,
        terminal: &TerminalAggregate,
        parts: &SelectParts<'_>,
        from_sql: &str,
        mut where_items: Vec<String>,
        multi: bool,
    ) -> SqlGenResult<String> {
        match terminal {
            TerminalAggregate::Count { predicate } => {
                if let Some(predicate) = predicate {
                    where_items.push(self.render_bool(predicate, multi)?);
                }
                self.assemble_select(parts, from_sql, "COUNT(*)", where_items, multi, None, false)
            }

            TerminalAggregate::Sum { selector }
            | TerminalAggregate::Avg { selector }
            | TerminalAggregate::Min { selector }
            | TerminalAggregate::Max { selector } => {
                let function = match terminal {
                    TerminalAggregate::Sum { .. } => "SUM",
                    TerminalAggregate::Avg { .. } => "AVG",
                    TerminalAggregate::Min { .. } => "MIN",
                    _ => "MAX",
                };
                let inner = self.render_value(selector, multi)?;
                self.assemble_select(
                    parts,
                    from_sql,
                    &format!("{function}({inner})"),
                    where_items,
                    multi,
                    None,
                    false,
                )
            }

            TerminalAggregate::Any { predicate } => {
                if let Some(predicate) = predicate {
                    where_items.push(self.render_bool(predicate, multi)?);
                }
                let inner = self.exists_subquery(from_sql, &where_items);
                Ok(format!("SELECT EXISTS({inner})"))
            }

            TerminalAggregate::All { predicate } => {
                let negated = BoolExpr::Not(Box::new(predicate.clone()));
                where_items.push(self.render_bool(&negated, multi)?);
                let inner = self.exists_subquery(from_sql, &where_items);
                Ok(format!("SELECT NOT EXISTS({inner})"))
            }

            TerminalAggregate::Contains { value } => {
                let projected = single_projected_column(parts.projection)
                    .ok_or(SqlGenError::ContainsWithoutProjection)?;
                let left = self.render_value(projected, multi)?;
                let right = self.render_value(value, multi)?;
                where_items.push(format!("{left} = {right}"));
                let inner = self.exists_subquery(from_sql, &where_items);
                Ok(format!("SELECT EXISTS({inner})"))
            }

            TerminalAggregate::First { predicate } | TerminalAggregate::Single { predicate } => {
                if let Some(predicate) = predicate {
                    where_items.push(self.render_bool(predicate, multi)?);
                }
                let limit = if matches!(terminal, TerminalAggregate::First { .. }) {
                    "1"
                } else {
                    // LIMIT 2 lets the driver layer detect multiplicity
                    "2"
                };
                let select_list = self.render_projection(parts.projection, multi)?;
                self.assemble_select(
                    parts,
                    from_sql,
                    &select_list,
                    where_items,
                    multi,
                    Some(limit),
                    false,
                )
            }

            TerminalAggregate::Last { predicate } => {
                if parts.order.is_empty() {
                    return Err(SqlGenError::LastWithoutOrderBy);
                }
                if let Some(predicate) = predicate {
                    where_items.push(self.render_bool(predicate, multi)?);
                }
                let select_list = self.render_projection(parts.projection, multi)?;
                self.assemble_select(
                    parts,
                    from_sql,
                    &select_list,
                    where_items,
                    multi,
                    Some("1"),
                    true,
                )
            }
        }
    }

    fn exists_subquery(&self, from_sql: &str, where_items: &[String]) -> String {
        let mut inner = format!("SELECT 1 FROM {from_sql}");
        if !where_items.is_empty() {
            inner.push_str(" WHERE ");
            inner.push_str(&where_items.join(" AND "));
        }
        inner
    }

    /// An assignment whose value is a parameter with no binding is the JS
    /// `undefined` analog and is dropped
    fn is_unbound_assignment(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Value(ValueExpr::Param(param))
                if param.property.is_none() && param.index.is_none() =>
            {
                !param.name.starts_with("__p") && !self.input.contains_key(&param.name)
            }
            Expr::Value(ValueExpr::Param(param)) => !self.input.contains_key(&param.name),
            _ => false,
        }
    }

    fn render_assignment_value(&mut self, expr: &Expr) -> SqlGenResult<String> {
        match expr {
            Expr::Value(value) => self.render_value(value, false),
            Expr::Bool(value) => self.render_bool(value, false),
            _ => Err(SqlGenError::UnknownExpression {
                kind: "non-scalar assignment".to_string(),
            }),
        }
    }

    fn render_insert(
        &mut self,
        table: &TableName,
        assignments: &ObjectExpr,
        returning: Option<&Expr>,
    ) -> SqlGenResult<String> {
        let mut columns = Vec::new();
        let mut values = Vec::new();
        for (name, value) in &assignments.properties {
            if self.is_unbound_assignment(value) {
                continue;
            }
            columns.push(self.quote(name));
            values.push(self.render_assignment_value(value)?);
        }
        if columns.is_empty() {
            return Err(SqlGenError::AllValuesUndefined);
        }

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table_sql(table),
            columns.join(", "),
            values.join(", ")
        );
        if let Some(returning) = returning {
            sql.push_str(" RETURNING ");
            sql.push_str(&self.render_projection(Some(returning), false)?);
        }
        Ok(sql)
    }

    fn render_update(
        &mut self,
        table: &TableName,
        assignments: &ObjectExpr,
        predicate: Option<&BoolExpr>,
        allow_full_table: bool,
        returning: Option<&Expr>,
    ) -> SqlGenResult<String> {
        if predicate.is_none() && !allow_full_table {
            return Err(SqlGenError::UpdateWithoutWhere);
        }

        let mut sets = Vec::new();
        for (name, value) in &assignments.properties {
            if self.is_unbound_assignment(value) {
                continue;
            }
            let rendered = self.render_assignment_value(value)?;
            sets.push(format!("{} = {rendered}", self.quote(name)));
        }
        if sets.is_empty() {
            return Err(SqlGenError::AllValuesUndefined);
        }

        let mut sql = format!("UPDATE {} SET {}", self.table_sql(table), sets.join(", "));
        if let Some(predicate) = predicate {
            sql.push_str(" WHERE ");
            sql.push_str(&self.render_bool(predicate, false)?);
        }
        if let Some(returning) = returning {
            sql.push_str(" RETURNING ");
            sql.push_str(&self.render_projection(Some(returning), false)?);
        }
        Ok(sql)
    }

    fn render_delete(
        &mut self,
        table: &TableName,
        predicate: Option<&BoolExpr>,
        allow_full_table: bool,
    ) -> SqlGenResult<String> {
        if predicate.is_none() && !allow_full_table {
            return Err(SqlGenError::DeleteWithoutWhere);
        }
        let mut sql = format!("DELETE FROM {}", self.table_sql(table));
        if let Some(predicate) = predicate {
            sql.push_str(" WHERE ");
            sql.push_str(&self.render_bool(predicate, false)?);
        }
        Ok(sql)
    }
}

fn flatten_logical<'a>(op: LogicalOp, expr: &'a BoolExpr, out: &mut Vec<&'a BoolExpr>) {
    match expr {
        BoolExpr::Logical {
            op: inner_op,
            left,
            right,
        } if *inner_op == op => {
            flatten_logical(op, left, out);
            flatten_logical(op, right, out);
        }
        other => out.push(other),
    }
}

/// The single projected column a `contains()` terminal compares against
fn single_projected_column(projection: Option<&Expr>) -> Option<&ValueExpr> {
    match projection? {
        Expr::Value(value) => Some(value),
        Expr::Object(object) if object.properties.len() == 1 => {
            match &object.properties[0].1 {
                Expr::Value(value) => Some(value),
                _ => None,
            }
        }
        _ => None,
    }
}
