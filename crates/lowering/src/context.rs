// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Lowering context threaded through the visitors
//!
//! The context tracks which lambda parameter names mean what (row variables,
//! the external params object, the helpers object), the auto-parameter
//! registry, the table currently in scope, and the active JOIN result shape.
//! Composition snapshots the context after each stage and restores it before
//! lowering the next fragment, so auto-parameter numbering stays dense across
//! chained calls.

use std::collections::HashMap;

use arrowql_ir::{AutoParamInfo, GroupKey, ParamRef, ParamValue, ShapeNode, auto_param_name};

/// What a row-position lambda parameter is bound to
#[derive(Debug, Clone, PartialEq)]
pub enum RowBinding {
    /// A plain row of the single table in scope
    Table,
    /// One concrete JOIN slot
    Slot(usize),
    /// The active JOIN result shape
    Shape,
    /// A grouping produced by `groupBy`
    Group,
}

/// Context for tracking state during lambda -> IR lowering
#[derive(Debug, Default)]
pub struct LoweringContext {
    /// Row-position parameter names and their bindings
    row_params: HashMap<String, RowBinding>,

    /// Names bound to the external parameters object
    query_params: Vec<String>,

    /// Name bound to the helpers object, when present
    helpers_param: Option<String>,

    /// Name bound to the query builder in a builder lambda
    builder_param: Option<String>,

    /// Values of lifted literals, keyed by `__pN`
    auto_params: HashMap<String, ParamValue>,

    /// Field info for lifted literals, keyed by `__pN`
    auto_param_infos: HashMap<String, AutoParamInfo>,

    /// Next auto-parameter suffix (1-based)
    auto_param_counter: usize,

    /// Table whose columns are currently in scope
    current_table: Option<String>,

    /// Active JOIN result shape, if the current row is JOIN-shaped
    current_shape: Option<ShapeNode>,

    /// Group key recorded by a preceding `groupBy`
    group_key: Option<GroupKey>,
}

/// Restorable snapshot of the non-fragment-local context state
#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    query_params: Vec<String>,
    helpers_param: Option<String>,
    auto_param_counter: usize,
    current_table: Option<String>,
    current_shape: Option<ShapeNode>,
    group_key: Option<GroupKey>,
}

impl LoweringContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a row-position parameter for the duration of one lambda
    pub fn bind_row_param(&mut self, name: impl Into<String>, binding: RowBinding) {
        self.row_params.insert(name.into(), binding);
    }

    pub fn unbind_row_param(&mut self, name: &str) {
        self.row_params.remove(name);
    }

    pub fn clear_row_params(&mut self) {
        self.row_params.clear();
    }

    pub fn row_binding(&self, name: &str) -> Option<&RowBinding> {
        self.row_params.get(name)
    }

    pub fn add_query_param(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.query_params.contains(&name) {
            self.query_params.push(name);
        }
    }

    pub fn is_query_param(&self, name: &str) -> bool {
        self.query_params.iter().any(|p| p == name)
    }

    pub fn set_helpers_param(&mut self, name: impl Into<String>) {
        self.helpers_param = Some(name.into());
    }

    pub fn is_helpers_param(&self, name: &str) -> bool {
        self.helpers_param.as_deref() == Some(name)
    }

    pub fn set_builder_param(&mut self, name: impl Into<String>) {
        self.builder_param = Some(name.into());
    }

    pub fn is_builder_param(&self, name: &str) -> bool {
        self.builder_param.as_deref() == Some(name)
    }

    pub fn current_table(&self) -> Option<&str> {
        self.current_table.as_deref()
    }

    pub fn set_current_table(&mut self, table: Option<String>) {
        self.current_table = table;
    }

    pub fn current_shape(&self) -> Option<&ShapeNode> {
        self.current_shape.as_ref()
    }

    pub fn set_current_shape(&mut self, shape: Option<ShapeNode>) {
        self.current_shape = shape;
    }

    pub fn group_key(&self) -> Option<&GroupKey> {
        self.group_key.as_ref()
    }

    pub fn set_group_key(&mut self, key: Option<GroupKey>) {
        self.group_key = key;
    }

    /// Lift a literal into a fresh `__pN` auto-parameter
    ///
    /// Names are assigned in visitation order, so they are dense and
    /// monotone within one plan.
    pub fn add_auto_param(&mut self, value: ParamValue, info: AutoParamInfo) -> ParamRef {
        self.auto_param_counter += 1;
        let name = auto_param_name(self.auto_param_counter);
        self.auto_params.insert(name.clone(), value.clone());
        self.auto_param_infos
            .insert(name.clone(), AutoParamInfo { value, ..info });
        ParamRef::new(name)
    }

    pub fn auto_params(&self) -> &HashMap<String, ParamValue> {
        &self.auto_params
    }

    pub fn auto_param_infos(&self) -> &HashMap<String, AutoParamInfo> {
        &self.auto_param_infos
    }

    pub fn auto_param_counter(&self) -> usize {
        self.auto_param_counter
    }

    /// Capture the state that must survive across composition stages
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            query_params: self.query_params.clone(),
            helpers_param: self.helpers_param.clone(),
            auto_param_counter: self.auto_param_counter,
            current_table: self.current_table.clone(),
            current_shape: self.current_shape.clone(),
            group_key: self.group_key.clone(),
        }
    }

    /// Rebuild a context from a snapshot, with empty fragment-local state
    pub fn restore(snapshot: &ContextSnapshot) -> Self {
        Self {
            row_params: HashMap::new(),
            query_params: snapshot.query_params.clone(),
            helpers_param: snapshot.helpers_param.clone(),
            builder_param: None,
            auto_params: HashMap::new(),
            auto_param_infos: HashMap::new(),
            auto_param_counter: snapshot.auto_param_counter,
            current_table: snapshot.current_table.clone(),
            current_shape: snapshot.current_shape.clone(),
            group_key: snapshot.group_key.clone(),
        }
    }
}
