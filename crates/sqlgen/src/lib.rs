// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # arrowql - SQL generation layer
//!
//! This crate renders the dialect-neutral query IR to a SQL string plus a
//! parameter map for a concrete dialect (PostgreSQL or SQLite).
//!
//! ## Guarantees
//!
//! - Identifiers are double-quoted uniformly; columns are alias-qualified
//!   only when a query exposes more than one table slot.
//! - Every `@name` token in the emitted SQL is a key of the returned
//!   parameter map.
//! - Safety checks reject UPDATE / DELETE without a predicate unless the
//!   full-table waiver was set, and projections with zero column references.
//! - Empty IN lists collapse to the dialect's always-false literal instead
//!   of producing a syntax error.

pub mod dialect;
pub mod error;
pub mod generator;

pub use dialect::{PostgresDialect, SqlDialect, SqliteDialect};
pub use error::{SqlGenError, SqlGenResult};
pub use generator::{Rendered, render};
