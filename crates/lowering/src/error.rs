// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Error types for the lowering layer

use serde::Serialize;

/// Result type alias for lowering operations
pub type LoweringResult<T> = Result<T, LoweringError>;

/// Errors raised while lowering the lambda AST into the query IR
///
/// All lowering errors are fatal for the current plan; none are retried.
/// The display strings of `UnsupportedCall` and `SelectWithoutColumns` are
/// part of the caller-facing contract and must not be reworded.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Serialize)]
pub enum LoweringError {
    /// A method or function call the query subset does not recognize
    #[error("Unsupported call expression")]
    UnsupportedCall { context: String },

    /// A projection with zero column references
    #[error("Expressions in SELECT must reference table columns.")]
    SelectWithoutColumns,

    /// A syntactically valid node the lowering cannot map to the IR
    #[error("Unknown expression type: {kind}")]
    UnknownExpression { kind: String },

    /// A free identifier that is neither a row, params, nor helpers binding
    #[error("External variable '{name}' is not supported; pass values through the parameters object")]
    ExternalVariable { name: String },

    /// A JOIN key selector that does not resolve to a single column
    #[error("JOIN key selectors must resolve to a single column")]
    JoinKeyNotColumn { context: String },

    /// A JOIN result selector projecting something other than columns or rows
    #[error("JOIN result selectors must project columns or whole rows")]
    JoinSelectorShape,

    /// Access on a grouping parameter that is neither `key` nor an aggregate
    #[error("Property '{property}' of a grouping must be 'key' or an aggregate call")]
    InvalidGroupAccess { property: String },

    /// A member path that cannot be resolved against the row in scope
    #[error("Cannot resolve '{path}' against the current row")]
    UnresolvedMember { path: String },

    /// A lambda with the wrong number of parameters for its position
    #[error("Expected a lambda taking {expected} in {context}")]
    BadLambdaArity { expected: String, context: String },
}

impl LoweringError {
    pub fn unsupported_call(context: impl Into<String>) -> Self {
        LoweringError::UnsupportedCall {
            context: context.into(),
        }
    }

    pub fn unknown(kind: impl Into<String>) -> Self {
        LoweringError::UnknownExpression { kind: kind.into() }
    }
}
