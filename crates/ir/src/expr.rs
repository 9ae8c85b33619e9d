// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Expressions
//!
//! This module represents the expressions of the query IR.
//!
//! ## Design
//!
//! Expressions live in three disjoint universes, each with its own sum type:
//!
//! - **[`ValueExpr`]** yields a scalar SQL value: column references, lifted
//!   parameters, arithmetic, string functions, aggregates, CASE forms and
//!   window functions.
//! - **[`BoolExpr`]** yields a truth value: comparisons, logical connectives,
//!   LIKE-style methods, IN tests and NULL tests.
//! - **[`ObjectExpr`]** describes a record and appears only in SELECT /
//!   RETURNING projections and JOIN result selectors.
//!
//! The universes are mutually recursive: a comparison holds value operands,
//! a CASE branch holds a boolean condition, and a boolean may be coerced into
//! a 0/1 value with [`ValueExpr::Boolean`].
//!
//! ## Origins
//!
//! A column knows where it came from via [`ColumnOrigin`]: either a named
//! table alias or a JOIN slot index assigned left-to-right across a JOIN
//! chain. Downstream operations use the origin to qualify identifiers when a
//! query has more than one source slot.
//!
//! ## Literals and parameters
//!
//! Literals written inline in a lambda are lifted to auto-parameters during
//! lowering; only NULL survives as a [`Literal`] so the generators can emit
//! `IS [NOT] NULL`. External parameters are referenced with [`ParamRef`],
//! optionally selecting an object property or an array element.

use serde::{Deserialize, Serialize};

/// Where a column reference originates
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnOrigin {
    /// A named table alias
    Table(String),
    /// A JOIN table slot, assigned left-to-right across the chain
    Slot(usize),
}

/// Reference to an external or auto parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamRef {
    /// Parameter name as bound by the caller (or `__pN` for auto-params)
    pub name: String,
    /// Selects a field of a parameter object (`p.range.min`)
    pub property: Option<String>,
    /// Selects an element of a parameter array (`p.ids[0]`)
    pub index: Option<usize>,
}

impl ParamRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            property: None,
            index: None,
        }
    }

    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

/// Literal value preserved in the IR
///
/// Only NULL-bearing literals normally survive lowering; everything else is
/// lifted to an auto-parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

/// Arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// Comparison operators (both `==`/`===` spellings normalize to `Eq`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

/// Logical connectives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
}

/// Case-transforming string methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StringMethod {
    /// `toLowerCase()` -> `LOWER(..)`
    Lower,
    /// `toUpperCase()` -> `UPPER(..)`
    Upper,
}

/// Substring-test string methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BooleanMethod {
    StartsWith,
    EndsWith,
    Includes,
}

/// Case-insensitive helper functions exposed through the helpers parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaseInsensitiveFunction {
    IEquals,
    IStartsWith,
    IEndsWith,
    IContains,
}

/// Aggregate functions usable inside grouped projections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// Window functions built via `h.window(row)` chains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindowFunction {
    RowNumber,
    Rank,
    DenseRank,
}

/// One ordering term of a window specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowOrder {
    pub expr: ValueExpr,
    pub descending: bool,
}

/// A window function with its OVER specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowExpr {
    pub function: WindowFunction,
    pub partition_by: Vec<ValueExpr>,
    pub order_by: Vec<WindowOrder>,
}

/// One WHEN/THEN branch of a CASE expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseBranch {
    pub when: BoolExpr,
    pub then: ValueExpr,
}

/// A scalar-valued expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueExpr {
    /// Column reference
    Column {
        name: String,
        source: Option<ColumnOrigin>,
    },

    /// NULL-preserving literal
    Constant(Literal),

    /// External or auto parameter reference
    Param(ParamRef),

    /// Binary arithmetic (`a + b`, `price * qty`)
    Arithmetic {
        op: ArithmeticOp,
        left: Box<ValueExpr>,
        right: Box<ValueExpr>,
    },

    /// Textual concatenation, `||` in both target dialects
    Concat {
        left: Box<ValueExpr>,
        right: Box<ValueExpr>,
    },

    /// `LOWER(..)` / `UPPER(..)`
    StringMethod {
        method: StringMethod,
        object: Box<ValueExpr>,
    },

    /// Aggregate call; `expr` is absent for `COUNT(*)`
    Aggregate {
        function: AggregateFunction,
        expr: Option<Box<ValueExpr>>,
    },

    /// `COALESCE(v1, v2, ...)`
    Coalesce(Vec<ValueExpr>),

    /// Two-way conditional, lowered to SQL CASE
    Conditional {
        condition: Box<BoolExpr>,
        then: Box<ValueExpr>,
        otherwise: Box<ValueExpr>,
    },

    /// Multi-branch CASE
    Case {
        branches: Vec<CaseBranch>,
        otherwise: Option<Box<ValueExpr>>,
    },

    /// Window function with its OVER clause
    Window(WindowExpr),

    /// A boolean used where a 0/1 value is required
    Boolean(Box<BoolExpr>),
}

impl ValueExpr {
    pub fn column(name: impl Into<String>) -> Self {
        ValueExpr::Column {
            name: name.into(),
            source: None,
        }
    }

    pub fn column_in_slot(name: impl Into<String>, slot: usize) -> Self {
        ValueExpr::Column {
            name: name.into(),
            source: Some(ColumnOrigin::Slot(slot)),
        }
    }

    pub fn param(name: impl Into<String>) -> Self {
        ValueExpr::Param(ParamRef::new(name))
    }

    pub fn null() -> Self {
        ValueExpr::Constant(Literal::Null)
    }

    /// True when this expression is the NULL constant
    pub fn is_null_constant(&self) -> bool {
        matches!(self, ValueExpr::Constant(Literal::Null))
    }

    /// True when any column reference occurs somewhere in this expression
    pub fn references_column(&self) -> bool {
        match self {
            ValueExpr::Column { .. } => true,
            ValueExpr::Constant(_) | ValueExpr::Param(_) => false,
            ValueExpr::Arithmetic { left, right, .. } | ValueExpr::Concat { left, right } => {
                left.references_column() || right.references_column()
            }
            ValueExpr::StringMethod { object, .. } => object.references_column(),
            ValueExpr::Aggregate { expr, .. } => {
                expr.as_ref().is_some_and(|e| e.references_column())
            }
            ValueExpr::Coalesce(items) => items.iter().any(ValueExpr::references_column),
            ValueExpr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                condition.references_column()
                    || then.references_column()
                    || otherwise.references_column()
            }
            ValueExpr::Case {
                branches,
                otherwise,
            } => {
                branches
                    .iter()
                    .any(|b| b.when.references_column() || b.then.references_column())
                    || otherwise.as_ref().is_some_and(|e| e.references_column())
            }
            ValueExpr::Window(w) => {
                w.partition_by.iter().any(ValueExpr::references_column)
                    || w.order_by.iter().any(|o| o.expr.references_column())
            }
            ValueExpr::Boolean(b) => b.references_column(),
        }
    }
}

/// The list side of an IN test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InList {
    /// A parameter bound to an array; never inlined into the SQL text
    Param(ParamRef),
    /// An explicit list of values
    Values(Vec<ValueExpr>),
}

/// A truth-valued expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoolExpr {
    /// Binary comparison between value operands
    Comparison {
        op: ComparisonOp,
        left: Box<ValueExpr>,
        right: Box<ValueExpr>,
    },

    /// `AND` / `OR`
    Logical {
        op: LogicalOp,
        left: Box<BoolExpr>,
        right: Box<BoolExpr>,
    },

    /// Negation
    Not(Box<BoolExpr>),

    /// A boolean-typed column used as a standalone predicate
    BooleanColumn {
        name: String,
        source: Option<ColumnOrigin>,
    },

    /// `TRUE` / `FALSE`
    BooleanConstant(bool),

    /// `startsWith` / `endsWith` / `includes`, rendered as LIKE patterns
    BooleanMethod {
        method: BooleanMethod,
        object: Box<ValueExpr>,
        argument: Box<ValueExpr>,
    },

    /// Membership test
    In { value: Box<ValueExpr>, list: InList },

    /// Helper-provided case-insensitive comparison
    CaseInsensitive {
        function: CaseInsensitiveFunction,
        left: Box<ValueExpr>,
        right: Box<ValueExpr>,
    },

    /// `IS NULL` / `IS NOT NULL`
    IsNull { expr: Box<ValueExpr>, negated: bool },
}

impl BoolExpr {
    pub fn and(left: BoolExpr, right: BoolExpr) -> Self {
        BoolExpr::Logical {
            op: LogicalOp::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn or(left: BoolExpr, right: BoolExpr) -> Self {
        BoolExpr::Logical {
            op: LogicalOp::Or,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn references_column(&self) -> bool {
        match self {
            BoolExpr::Comparison { left, right, .. } => {
                left.references_column() || right.references_column()
            }
            BoolExpr::Logical { left, right, .. } => {
                left.references_column() || right.references_column()
            }
            BoolExpr::Not(inner) => inner.references_column(),
            BoolExpr::BooleanColumn { .. } => true,
            BoolExpr::BooleanConstant(_) => false,
            BoolExpr::BooleanMethod {
                object, argument, ..
            } => object.references_column() || argument.references_column(),
            BoolExpr::In { value, list } => {
                value.references_column()
                    || match list {
                        InList::Param(_) => false,
                        InList::Values(items) => items.iter().any(ValueExpr::references_column),
                    }
            }
            BoolExpr::CaseInsensitive { left, right, .. } => {
                left.references_column() || right.references_column()
            }
            BoolExpr::IsNull { expr, .. } => expr.references_column(),
        }
    }
}

/// A record expression; preserves property insertion order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectExpr {
    pub properties: Vec<(String, Expr)>,
}

impl ObjectExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, expr: Expr) {
        self.properties.push((name.into(), expr));
    }

    pub fn get(&self, name: &str) -> Option<&Expr> {
        self.properties
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, expr)| expr)
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// An expression in a projection or assignment position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Value(ValueExpr),
    Bool(BoolExpr),
    Object(ObjectExpr),

    /// The whole row of one JOIN slot participating as a nested record
    Reference { slot: usize },

    /// Identity projection, rendered `*` (or slot-qualified for JOINs)
    AllColumns { slot: Option<usize> },
}

impl Expr {
    /// True when any column reference occurs somewhere in this expression
    ///
    /// `Reference` and `AllColumns` count: both expand to concrete columns.
    pub fn references_column(&self) -> bool {
        match self {
            Expr::Value(v) => v.references_column(),
            Expr::Bool(b) => b.references_column(),
            Expr::Object(obj) => obj.properties.iter().any(|(_, e)| e.references_column()),
            Expr::Reference { .. } | Expr::AllColumns { .. } => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_ref_builders() {
        let p = ParamRef::new("filter").with_property("min");
        assert_eq!(p.name, "filter");
        assert_eq!(p.property.as_deref(), Some("min"));
        assert!(p.index.is_none());
    }

    #[test]
    fn test_references_column() {
        let cmp = BoolExpr::Comparison {
            op: ComparisonOp::Ge,
            left: Box::new(ValueExpr::column("age")),
            right: Box::new(ValueExpr::param("minAge")),
        };
        assert!(cmp.references_column());

        let params_only = BoolExpr::Comparison {
            op: ComparisonOp::Eq,
            left: Box::new(ValueExpr::param("a")),
            right: Box::new(ValueExpr::param("b")),
        };
        assert!(!params_only.references_column());
    }

    #[test]
    fn test_object_expr_preserves_order() {
        let mut obj = ObjectExpr::new();
        obj.push("id", Expr::Value(ValueExpr::column("id")));
        obj.push("name", Expr::Value(ValueExpr::column("name")));
        let keys: Vec<_> = obj.properties.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["id", "name"]);
        assert!(obj.get("name").is_some());
    }
}
