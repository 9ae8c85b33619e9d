// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # arrowql - Lowering layer
//!
//! This crate converts the ECMAScript lambda AST into the dialect-neutral
//! query IR.
//!
//! ## Lowering process
//!
//! ```text
//! EsExpr (normalized) -> operation visitors -> QueryOp tree + auto-params
//! ```
//!
//! The [`LoweringContext`] is the mutable bag threaded through the visitors:
//! it tracks row/params/helpers bindings, the auto-parameter registry, the
//! table in scope, and the active JOIN result shape. Plan composition
//! snapshots and restores the context between fragments so auto-parameter
//! numbering stays dense across chained calls.
//!
//! ## Error handling
//!
//! Every lowering error is fatal for the current plan. The contract error
//! strings (`"Unsupported call expression"`, `"Expressions in SELECT must
//! reference table columns."`) are matched by callers and tests and are
//! preserved byte-for-byte.

pub mod cache;
pub mod context;
pub mod error;
pub mod operations;
pub mod predicate;
pub mod projection;
mod shape;
pub mod value;

pub use cache::{CacheConfig, ParseCache};
pub use context::{ContextSnapshot, LoweringContext, RowBinding};
pub use error::{LoweringError, LoweringResult};
pub use operations::{apply_method, lower_builder, lower_chain};
pub use predicate::lower_predicate;
pub use projection::lower_projection;
pub use value::lower_value;
