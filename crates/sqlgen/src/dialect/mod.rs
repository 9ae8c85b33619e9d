// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Dialect abstraction for the generator
//!
//! Both target dialects quote identifiers with double quotes and bind
//! parameters with `@name` tokens; the trait captures what actually varies:
//! boolean literals, the always-false literal for empty IN lists, and the
//! LIMIT/OFFSET coupling.

pub mod postgres;
pub mod sqlite;

use arrowql_ir::Dialect;

pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

/// Rendering knobs that differ between target dialects
pub trait SqlDialect {
    fn dialect(&self) -> Dialect;

    /// Double-quoted identifier, embedded quotes doubled
    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Named parameter token
    fn param_token(&self, name: &str) -> String {
        format!("@{name}")
    }

    /// Always-false literal, used for empty IN lists
    fn false_literal(&self) -> &'static str;

    /// Always-true literal, used for uncorrelated LEFT JOIN conditions
    fn true_literal(&self) -> &'static str;

    /// Whether OFFSET must be accompanied by a LIMIT clause
    fn requires_limit_for_offset(&self) -> bool;
}

/// Dialect selector to implementation
pub fn dialect_impl(dialect: Dialect) -> &'static dyn SqlDialect {
    match dialect {
        Dialect::PostgreSQL => &PostgresDialect,
        Dialect::Sqlite => &SqliteDialect,
        _ => unreachable!("unknown dialect variant"),
    }
}
