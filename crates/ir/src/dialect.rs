// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Dialect support
//!
//! The IR itself is dialect-neutral; this module names the rendering targets
//! and the capability differences the generators care about.
//!
//! - **PostgreSQL**: boolean literals, `FALSE` for empty IN lists, RETURNING
//!   rows are executed by drivers.
//! - **SQLite**: integer booleans, `0` for empty IN lists, RETURNING is
//!   emitted on request but the driver layer may decline to return rows —
//!   a documented dialect limitation, not a silent strip.

use serde::{Deserialize, Serialize};

/// Supported SQL rendering targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Dialect {
    PostgreSQL,
    Sqlite,
}

/// Capabilities that vary across dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DialectFeature {
    /// Window functions (`RANK() OVER ...`)
    WindowFunctions,
    /// RETURNING rows observable through the driver
    ReturningRows,
    /// OFFSET without an accompanying LIMIT
    BareOffset,
}

impl Dialect {
    /// Check whether this dialect supports a feature
    pub fn supports(&self, feature: DialectFeature) -> bool {
        match (self, feature) {
            (_, DialectFeature::WindowFunctions) => true,
            (Dialect::PostgreSQL, DialectFeature::ReturningRows) => true,
            (Dialect::Sqlite, DialectFeature::ReturningRows) => false,
            (Dialect::PostgreSQL, DialectFeature::BareOffset) => true,
            (Dialect::Sqlite, DialectFeature::BareOffset) => false,
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::PostgreSQL => write!(f, "PostgreSQL"),
            Dialect::Sqlite => write!(f, "SQLite"),
        }
    }
}
