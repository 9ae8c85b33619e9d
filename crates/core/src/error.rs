// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Facade error type
//!
//! Planner errors are fatal for the current plan and never retried. Driver
//! errors pass through the execution wrappers unchanged.

use arrowql_ast::ParseError;
use arrowql_lowering::LoweringError;
use arrowql_sqlgen::SqlGenError;

use crate::driver::DriverError;

/// Result type alias for planner operations
pub type Result<T> = std::result::Result<T, Error>;

/// Any failure surfaced by the planner or the driver layer
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Lambda source text could not be parsed
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The AST is valid but semantically forbidden
    #[error(transparent)]
    Lowering(#[from] LoweringError),

    /// Rendering failed a safety check or hit a dialect limitation
    #[error(transparent)]
    SqlGen(#[from] SqlGenError),

    /// Surfaced by the driver; rethrown unchanged
    #[error(transparent)]
    Driver(#[from] DriverError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_pass_through() {
        let err: Error = SqlGenError::UpdateWithoutWhere.into();
        assert_eq!(
            err.to_string(),
            "UPDATE requires a WHERE clause or explicit allowFullTableUpdate()."
        );

        let err: Error = ParseError::Syntax.into();
        assert_eq!(err.to_string(), "Failed to parse query");
    }
}
