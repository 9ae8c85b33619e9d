// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Error types for SQL generation

use serde::Serialize;

/// Result type alias for generation operations
pub type SqlGenResult<T> = Result<T, SqlGenError>;

/// Errors raised while rendering the IR to SQL
///
/// The display strings of the safety checks and `AllValuesUndefined` are
/// part of the caller-facing contract and must not be reworded.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq, Serialize)]
pub enum SqlGenError {
    /// UPDATE with no predicate and no explicit waiver
    #[error("UPDATE requires a WHERE clause or explicit allowFullTableUpdate().")]
    UpdateWithoutWhere,

    /// DELETE with no predicate and no explicit waiver
    #[error("DELETE requires a WHERE clause or explicit allowFullTableDelete().")]
    DeleteWithoutWhere,

    /// A projection with zero column references reached the generator
    #[error("Expressions in SELECT must reference table columns.")]
    SelectWithoutColumns,

    /// Every INSERT / UPDATE assignment was filtered out as undefined
    #[error("All provided values were undefined")]
    AllValuesUndefined,

    /// A known construct the target dialect cannot express
    #[error("{feature} is not supported by the {dialect} dialect")]
    UnsupportedDialect { feature: String, dialect: String },

    /// `last()` needs an ordering to flip
    #[error("last() requires an ORDER BY clause")]
    LastWithoutOrderBy,

    /// `contains()` needs a single projected column to compare against
    #[error("contains() requires a single-column projection")]
    ContainsWithoutProjection,

    /// Unreachable by construction; signals a corrupt IR
    #[error("Unknown expression type: {kind}")]
    UnknownExpression { kind: String },
}

impl SqlGenError {
    pub fn unsupported(feature: impl Into<String>, dialect: impl std::fmt::Display) -> Self {
        SqlGenError::UnsupportedDialect {
            feature: feature.into(),
            dialect: dialect.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_strings() {
        assert_eq!(
            SqlGenError::UpdateWithoutWhere.to_string(),
            "UPDATE requires a WHERE clause or explicit allowFullTableUpdate()."
        );
        assert_eq!(
            SqlGenError::DeleteWithoutWhere.to_string(),
            "DELETE requires a WHERE clause or explicit allowFullTableDelete()."
        );
        assert_eq!(
            SqlGenError::AllValuesUndefined.to_string(),
            "All provided values were undefined"
        );
    }
}
