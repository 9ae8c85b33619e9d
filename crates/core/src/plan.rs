// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Finalized plans and the top-level renderer

use std::collections::HashMap;
use std::sync::Arc;

use arrowql_ir::{Dialect, ParamValue, QueryOp};
use arrowql_sqlgen::{Rendered, render};

use crate::error::Result;

/// An immutable pending query: its operation tree plus merged parameters
///
/// The operation tree is shared; a plan can be rendered any number of times
/// against any dialect.
#[derive(Debug, Clone)]
pub struct Plan {
    pub operation: Arc<QueryOp>,
    pub params: HashMap<String, ParamValue>,
}

/// Render a finalized plan for one dialect
pub fn to_sql(plan: &Plan, dialect: Dialect) -> Result<Rendered> {
    Ok(render(&plan.operation, &plan.params, dialect)?)
}

/// Convenience: turn a JSON object into a parameter bag
///
/// ```
/// use serde_json::json;
///
/// let params = arrowql::params_from_json(json!({ "minAge": 18 }));
/// assert_eq!(params["minAge"], json!(18));
/// ```
pub fn params_from_json(value: ParamValue) -> HashMap<String, ParamValue> {
    match value {
        ParamValue::Object(map) => map.into_iter().collect(),
        _ => HashMap::new(),
    }
}
