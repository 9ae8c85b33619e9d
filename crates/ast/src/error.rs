// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Error types for lambda parsing

use serde::Serialize;

/// Result type alias for parse operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Errors raised while turning lambda source text into an [`crate::EsExpr`]
///
/// The display strings of `Syntax` and `UnknownExpression` are part of the
/// caller-facing contract and must not be reworded.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq, Serialize)]
pub enum ParseError {
    /// The source text is not parseable JavaScript
    #[error("Failed to parse query")]
    Syntax,

    /// A syntactically valid node kind the lambda subset does not admit
    #[error("Unknown expression type: {kind}")]
    UnknownExpression { kind: String },

    /// The top-level construct is not an arrow function
    #[error("Expected an arrow function, found '{found}'")]
    NotAnArrow { found: String },

    /// An arrow parameter that is not a plain identifier (destructuring etc.)
    #[error("Unsupported lambda parameter in '{context}'")]
    UnsupportedParameter { context: String },

    /// A block-bodied arrow without a single trailing return
    #[error("Lambda bodies must be a single expression")]
    BlockBody,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_strings() {
        assert_eq!(ParseError::Syntax.to_string(), "Failed to parse query");
        assert_eq!(
            ParseError::UnknownExpression {
                kind: "yield_expression".to_string()
            }
            .to_string(),
            "Unknown expression type: yield_expression"
        );
    }
}
