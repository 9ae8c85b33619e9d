// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Stage-typed plan handles
//!
//! `define_select` parses a builder lambda through the plan cache and hands
//! back a [`SelectQuery`] in the `Queryable` stage; `order_by` moves it to
//! `Ordered`, which is the only stage exposing `then_by`. Every composition
//! call parses its fragment through the fragment cache, restores the prior
//! context snapshot, runs the visitor, and returns a fresh handle over a new
//! operation tree — handles themselves are immutable.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use arrowql_ast::{EsExpr, ParseError, normalize_joins, parse_lambda};
use arrowql_ir::{AutoParamInfo, ObjectExpr, ParamValue, QueryOp, TableName};
use arrowql_lowering::{ContextSnapshot, LoweringContext, apply_method, lower_builder};
use tracing::debug;

use crate::config::{CachedPlan, FRAGMENT_CACHE, PLAN_CACHE, QueryOptions};
use crate::error::{Error, Result};
use crate::plan::Plan;
use crate::schema::QuerySchema;

/// Stage marker: filtering / projecting / joining are all legal
#[derive(Debug)]
pub struct Queryable;

/// Stage marker: an ORDER BY exists, so `then_by` is legal
#[derive(Debug)]
pub struct Ordered;

/// Shared innards of every handle
#[derive(Debug, Clone)]
struct PlanState {
    op: Arc<QueryOp>,
    auto_params: HashMap<String, ParamValue>,
    auto_param_infos: HashMap<String, AutoParamInfo>,
    snapshot: ContextSnapshot,
    cache: bool,
}

impl PlanState {
    fn apply_with(
        mut self,
        method: &str,
        args: Vec<EsExpr>,
        prepare: impl FnOnce(&mut LoweringContext),
    ) -> Result<PlanState> {
        let mut ctx = LoweringContext::restore(&self.snapshot);
        prepare(&mut ctx);
        let op = apply_method(&mut ctx, (*self.op).clone(), method, &args)?;
        self.auto_params
            .extend(ctx.auto_params().iter().map(|(k, v)| (k.clone(), v.clone())));
        self.auto_param_infos.extend(
            ctx.auto_param_infos()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        self.snapshot = ctx.snapshot();
        self.op = Arc::new(op);
        Ok(self)
    }

    fn apply(self, method: &str, args: Vec<EsExpr>) -> Result<PlanState> {
        self.apply_with(method, args, |_| {})
    }

    fn apply_fragment(self, method: &str, source: &str) -> Result<PlanState> {
        let fragment = parse_fragment(source, self.cache)?;
        self.apply(method, vec![(*fragment).clone()])
    }

    fn finalize(&self, user_params: HashMap<String, ParamValue>) -> Plan {
        let mut params = self.auto_params.clone();
        // User-supplied values win on key collision
        params.extend(user_params);
        Plan {
            operation: Arc::clone(&self.op),
            params,
        }
    }
}

/// Parse one fragment through the fragment cache
fn parse_fragment(source: &str, use_cache: bool) -> Result<Arc<EsExpr>> {
    FRAGMENT_CACHE.get_or_try_insert_with(source, use_cache, || {
        let parsed = parse_lambda(source)?;
        Ok::<_, Error>(normalize_joins(parsed))
    })
}

/// A stage-typed SELECT handle
#[derive(Debug)]
pub struct SelectQuery<S = Queryable> {
    state: PlanState,
    _stage: PhantomData<S>,
}

/// A terminal aggregate; only finalization remains
pub struct AggregateQuery {
    state: PlanState,
}

/// Define a SELECT plan from builder-lambda source text
///
/// ```
/// use arrowql::{QuerySchema, define_select};
///
/// let schema = QuerySchema::new();
/// let q = define_select(&schema, r#"(q, p) => q.from("users").where(u => u.age >= p.minAge)"#);
/// assert!(q.is_ok());
/// ```
pub fn define_select<T>(schema: &QuerySchema<T>, source: &str) -> Result<SelectQuery<Queryable>> {
    define_select_with(schema, source, QueryOptions::default())
}

/// `define_select` with per-call options
pub fn define_select_with<T>(
    _schema: &QuerySchema<T>,
    source: &str,
    options: QueryOptions,
) -> Result<SelectQuery<Queryable>> {
    let cached = PLAN_CACHE.get_or_try_insert_with(source, options.cache, || {
        let parsed = normalize_joins(parse_lambda(source)?);
        let EsExpr::Arrow(arrow) = parsed else {
            return Err(Error::Parse(ParseError::NotAnArrow {
                found: "expression".to_string(),
            }));
        };
        let mut ctx = LoweringContext::new();
        let op = lower_builder(&mut ctx, &arrow)?;
        debug!(source_len = source.len(), "lowered builder lambda");
        Ok(CachedPlan {
            op: Arc::new(op),
            auto_params: ctx.auto_params().clone(),
            auto_param_infos: ctx.auto_param_infos().clone(),
            snapshot: ctx.snapshot(),
        })
    })?;

    Ok(SelectQuery {
        state: PlanState {
            // The frozen tree is shared; the auto-param maps are cloned so
            // this handle owns its copies
            op: Arc::clone(&cached.op),
            auto_params: cached.auto_params.clone(),
            auto_param_infos: cached.auto_param_infos.clone(),
            snapshot: cached.snapshot.clone(),
            cache: options.cache,
        },
        _stage: PhantomData,
    })
}

impl<S> SelectQuery<S> {
    fn next<S2>(state: PlanState) -> SelectQuery<S2> {
        SelectQuery {
            state,
            _stage: PhantomData,
        }
    }

    pub fn where_(self, predicate: &str) -> Result<SelectQuery<S>> {
        Ok(Self::next(self.state.apply_fragment("where", predicate)?))
    }

    pub fn select(self, projection: &str) -> Result<SelectQuery<S>> {
        Ok(Self::next(self.state.apply_fragment("select", projection)?))
    }

    pub fn group_by(self, key: &str) -> Result<SelectQuery<S>> {
        Ok(Self::next(self.state.apply_fragment("groupBy", key)?))
    }

    pub fn distinct(self) -> Result<SelectQuery<S>> {
        Ok(Self::next(self.state.apply("distinct", Vec::new())?))
    }

    pub fn take(self, count: i64) -> Result<SelectQuery<S>> {
        Ok(Self::next(
            self.state.apply("take", vec![EsExpr::Number(count as f64)])?,
        ))
    }

    pub fn skip(self, count: i64) -> Result<SelectQuery<S>> {
        Ok(Self::next(
            self.state.apply("skip", vec![EsExpr::Number(count as f64)])?,
        ))
    }

    /// Join another table: `join("orders", "u => u.id", "o => o.userId",
    /// "(u, o) => ({ u: u, o: o })")`
    pub fn join(
        self,
        table: &str,
        outer_key: &str,
        inner_key: &str,
        result_selector: &str,
    ) -> Result<SelectQuery<S>> {
        let cache = self.state.cache;
        let outer = parse_fragment(outer_key, cache)?;
        let inner = parse_fragment(inner_key, cache)?;
        let result = parse_fragment(result_selector, cache)?;
        let chain = EsExpr::call(
            EsExpr::member(EsExpr::ident("__q"), "from"),
            vec![EsExpr::String(table.to_string())],
        );
        let state = self.state.apply_with(
            "join",
            vec![
                chain,
                (*outer).clone(),
                (*inner).clone(),
                (*result).clone(),
            ],
            |ctx| ctx.set_builder_param("__q"),
        )?;
        Ok(Self::next(state))
    }

    pub fn order_by(self, key: &str) -> Result<SelectQuery<Ordered>> {
        Ok(Self::next(self.state.apply_fragment("orderBy", key)?))
    }

    pub fn order_by_descending(self, key: &str) -> Result<SelectQuery<Ordered>> {
        Ok(Self::next(
            self.state.apply_fragment("orderByDescending", key)?,
        ))
    }

    fn terminal(self, method: &str, args: Vec<EsExpr>) -> Result<AggregateQuery> {
        Ok(AggregateQuery {
            state: self.state.apply(method, args)?,
        })
    }

    fn terminal_fragment(self, method: &str, source: &str) -> Result<AggregateQuery> {
        Ok(AggregateQuery {
            state: self.state.apply_fragment(method, source)?,
        })
    }

    pub fn count(self) -> Result<AggregateQuery> {
        self.terminal("count", Vec::new())
    }

    pub fn count_where(self, predicate: &str) -> Result<AggregateQuery> {
        self.terminal_fragment("count", predicate)
    }

    pub fn sum(self, selector: &str) -> Result<AggregateQuery> {
        self.terminal_fragment("sum", selector)
    }

    pub fn avg(self, selector: &str) -> Result<AggregateQuery> {
        self.terminal_fragment("avg", selector)
    }

    pub fn min(self, selector: &str) -> Result<AggregateQuery> {
        self.terminal_fragment("min", selector)
    }

    pub fn max(self, selector: &str) -> Result<AggregateQuery> {
        self.terminal_fragment("max", selector)
    }

    pub fn any(self) -> Result<AggregateQuery> {
        self.terminal("any", Vec::new())
    }

    pub fn any_where(self, predicate: &str) -> Result<AggregateQuery> {
        self.terminal_fragment("any", predicate)
    }

    pub fn all(self, predicate: &str) -> Result<AggregateQuery> {
        self.terminal_fragment("all", predicate)
    }

    pub fn first(self) -> Result<AggregateQuery> {
        self.terminal("first", Vec::new())
    }

    pub fn first_where(self, predicate: &str) -> Result<AggregateQuery> {
        self.terminal_fragment("first", predicate)
    }

    pub fn single(self) -> Result<AggregateQuery> {
        self.terminal("single", Vec::new())
    }

    pub fn last(self) -> Result<AggregateQuery> {
        self.terminal("last", Vec::new())
    }

    pub fn contains(self, value: ParamValue) -> Result<AggregateQuery> {
        let literal = match value {
            ParamValue::String(s) => EsExpr::String(s),
            ParamValue::Number(n) => EsExpr::Number(n.as_f64().unwrap_or(0.0)),
            ParamValue::Bool(b) => EsExpr::Bool(b),
            ParamValue::Null => EsExpr::Null,
            other => {
                return Err(Error::Lowering(
                    arrowql_lowering::LoweringError::UnknownExpression {
                        kind: format!("contains() argument {other}"),
                    },
                ));
            }
        };
        self.terminal("contains", vec![literal])
    }

    /// Merge auto-params with user params (user wins) into a [`Plan`]
    pub fn finalize(&self, params: HashMap<String, ParamValue>) -> Plan {
        self.state.finalize(params)
    }
}

impl SelectQuery<Ordered> {
    pub fn then_by(self, key: &str) -> Result<SelectQuery<Ordered>> {
        Ok(Self::next(self.state.apply_fragment("thenBy", key)?))
    }

    pub fn then_by_descending(self, key: &str) -> Result<SelectQuery<Ordered>> {
        Ok(Self::next(
            self.state.apply_fragment("thenByDescending", key)?,
        ))
    }
}

impl AggregateQuery {
    pub fn finalize(&self, params: HashMap<String, ParamValue>) -> Plan {
        self.state.finalize(params)
    }
}

/// Build the shared state for a mutation root
fn mutation_state(op: QueryOp, table: &TableName) -> PlanState {
    let mut ctx = LoweringContext::new();
    ctx.set_current_table(Some(table.name.clone()));
    PlanState {
        op: Arc::new(op),
        auto_params: HashMap::new(),
        auto_param_infos: HashMap::new(),
        snapshot: ctx.snapshot(),
        cache: true,
    }
}

/// An INSERT handle
pub struct InsertStatement {
    state: PlanState,
}

pub fn define_insert<T>(_schema: &QuerySchema<T>, table: &str) -> InsertStatement {
    let table = TableName::parse(table);
    let op = QueryOp::Insert {
        table: table.clone(),
        assignments: ObjectExpr::new(),
        returning: None,
    };
    InsertStatement {
        state: mutation_state(op, &table),
    }
}

impl InsertStatement {
    pub fn values(self, assignments: &str) -> Result<InsertStatement> {
        Ok(InsertStatement {
            state: self.state.apply_fragment("values", assignments)?,
        })
    }

    pub fn returning(self, projection: &str) -> Result<InsertStatement> {
        Ok(InsertStatement {
            state: self.state.apply_fragment("returning", projection)?,
        })
    }

    pub fn finalize(&self, params: HashMap<String, ParamValue>) -> Plan {
        self.state.finalize(params)
    }
}

/// An UPDATE handle
pub struct UpdateStatement {
    state: PlanState,
}

pub fn define_update<T>(_schema: &QuerySchema<T>, table: &str) -> UpdateStatement {
    let table = TableName::parse(table);
    let op = QueryOp::Update {
        table: table.clone(),
        assignments: ObjectExpr::new(),
        predicate: None,
        allow_full_table: false,
        returning: None,
    };
    UpdateStatement {
        state: mutation_state(op, &table),
    }
}

impl UpdateStatement {
    pub fn set(self, assignments: &str) -> Result<UpdateStatement> {
        Ok(UpdateStatement {
            state: self.state.apply_fragment("set", assignments)?,
        })
    }

    pub fn where_(self, predicate: &str) -> Result<UpdateStatement> {
        Ok(UpdateStatement {
            state: self.state.apply_fragment("where", predicate)?,
        })
    }

    pub fn allow_full_table_update(self) -> Result<UpdateStatement> {
        Ok(UpdateStatement {
            state: self.state.apply("allowFullTableUpdate", Vec::new())?,
        })
    }

    pub fn returning(self, projection: &str) -> Result<UpdateStatement> {
        Ok(UpdateStatement {
            state: self.state.apply_fragment("returning", projection)?,
        })
    }

    pub fn finalize(&self, params: HashMap<String, ParamValue>) -> Plan {
        self.state.finalize(params)
    }
}

/// A DELETE handle
pub struct DeleteStatement {
    state: PlanState,
}

pub fn define_delete<T>(_schema: &QuerySchema<T>, table: &str) -> DeleteStatement {
    let table = TableName::parse(table);
    let op = QueryOp::Delete {
        table: table.clone(),
        predicate: None,
        allow_full_table: false,
    };
    DeleteStatement {
        state: mutation_state(op, &table),
    }
}

impl DeleteStatement {
    pub fn where_(self, predicate: &str) -> Result<DeleteStatement> {
        Ok(DeleteStatement {
            state: self.state.apply_fragment("where", predicate)?,
        })
    }

    pub fn allow_full_table_delete(self) -> Result<DeleteStatement> {
        Ok(DeleteStatement {
            state: self.state.apply("allowFullTableDelete", Vec::new())?,
        })
    }

    pub fn finalize(&self, params: HashMap<String, ParamValue>) -> Plan {
        self.state.finalize(params)
    }
}
