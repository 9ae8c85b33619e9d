// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! SQLite rendering target
//!
//! RETURNING is emitted when requested, but execution adapters may decline
//! to surface the returned rows; callers get the row count either way. This
//! is a documented dialect limitation, not a silent strip of the clause.

use arrowql_ir::Dialect;

use super::SqlDialect;

/// SQLite: integer booleans, OFFSET requires a LIMIT (`LIMIT -1` is emitted
/// when only a skip is present)
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn false_literal(&self) -> &'static str {
        "0"
    }

    fn true_literal(&self) -> &'static str {
        "1"
    }

    fn requires_limit_for_offset(&self) -> bool {
        true
    }
}
