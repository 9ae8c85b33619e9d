// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Process-wide parse cache configuration
//!
//! Two caches share one configuration: the plan cache keyed by builder-lambda
//! source (holding frozen operation trees plus auto-param state) and the
//! fragment cache keyed by fragment source (holding parsed AST fragments for
//! composition). Defaults: enabled, capacity 1024. A per-call
//! [`QueryOptions`] with `cache: false` bypasses both reads and writes for
//! that call only.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use arrowql_ast::EsExpr;
use arrowql_ir::{AutoParamInfo, ParamValue, QueryOp};
use arrowql_lowering::{CacheConfig, ContextSnapshot, ParseCache};

/// Per-call planner options
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct QueryOptions {
    /// `false` bypasses parse-cache reads and writes for this call
    pub cache: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { cache: true }
    }
}

/// A fully lowered builder lambda, frozen in the plan cache
///
/// The operation tree is shared by reference on every hit; the auto-param
/// maps are cloned out so callers can mutate their copy freely.
#[derive(Debug)]
pub(crate) struct CachedPlan {
    pub op: Arc<QueryOp>,
    pub auto_params: HashMap<String, ParamValue>,
    pub auto_param_infos: HashMap<String, AutoParamInfo>,
    pub snapshot: ContextSnapshot,
}

pub(crate) static PLAN_CACHE: LazyLock<ParseCache<CachedPlan>> =
    LazyLock::new(ParseCache::default);

pub(crate) static FRAGMENT_CACHE: LazyLock<ParseCache<EsExpr>> =
    LazyLock::new(ParseCache::default);

/// Replace the process-wide cache configuration
///
/// Shrinking the capacity evicts oldest entries immediately; disabling
/// clears both caches.
pub fn set_parse_cache_config(config: CacheConfig) {
    PLAN_CACHE.configure(config);
    FRAGMENT_CACHE.configure(config);
}

/// The current process-wide cache configuration
pub fn parse_cache_config() -> CacheConfig {
    PLAN_CACHE.config()
}

/// Drop every cached entry, keeping the configuration
pub fn reset_parse_cache() {
    PLAN_CACHE.clear();
    FRAGMENT_CACHE.clear();
}
