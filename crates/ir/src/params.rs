// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Auto-parameter registry types
//!
//! Every literal lifted out of a lambda gets a synthetic `__p{N}` binding.
//! Names are dense and monotone within one plan: if `__p4` exists then
//! `__p1..__p3` do too. When a literal sits opposite a column in a
//! comparison, field info harvested from that column is recorded alongside
//! the value so generators can consult it for coercions.

use serde::{Deserialize, Serialize};

/// Runtime value of a parameter (external or lifted)
pub type ParamValue = serde_json::Value;

/// Synthetic parameter name for the N-th lifted literal (1-based)
pub fn auto_param_name(n: usize) -> String {
    format!("__p{n}")
}

/// Enriched record for one lifted literal
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AutoParamInfo {
    pub value: ParamValue,
    /// Column name from the other side of the comparison, or the synthetic
    /// `LIMIT` / `OFFSET` markers for take/skip lifts
    pub field_name: Option<String>,
    pub table_name: Option<String>,
    pub source_slot: Option<usize>,
}
