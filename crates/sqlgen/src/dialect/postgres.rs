// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! PostgreSQL rendering target

use arrowql_ir::Dialect;

use super::SqlDialect;

/// PostgreSQL: boolean literals, bare OFFSET allowed, RETURNING rows are
/// executed by the driver
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn dialect(&self) -> Dialect {
        Dialect::PostgreSQL
    }

    fn false_literal(&self) -> &'static str {
        "FALSE"
    }

    fn true_literal(&self) -> &'static str {
        "TRUE"
    }

    fn requires_limit_for_offset(&self) -> bool {
        false
    }
}
