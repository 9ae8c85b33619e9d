// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # arrowql
//!
//! A LINQ-style, strongly typed query planner: application code expresses
//! SELECT / INSERT / UPDATE / DELETE statements as JavaScript arrow-function
//! lambdas over a declared schema, and gets back a parameterized SQL string
//! plus a parameter bag for PostgreSQL or SQLite.
//!
//! ## Pipeline
//!
//! ```text
//! lambda source -> ES AST -> normalize-joins -> lowering -> QueryOp tree
//!              -> (composition stages) -> SQL generator -> { sql, params }
//! ```
//!
//! ## Example
//!
//! ```
//! use arrowql::{Dialect, QuerySchema, define_select, params_from_json, to_sql};
//! use serde_json::json;
//!
//! let schema = QuerySchema::new();
//! let query = define_select(
//!     &schema,
//!     r#"(q, p) => q.from("users")
//!         .where(u => u.age >= p.minAge && u.isActive)
//!         .select(u => ({ id: u.id, name: u.name }))
//!         .orderBy(u => u.name)
//!         .take(10)"#,
//! )
//! .unwrap();
//!
//! let plan = query.finalize(params_from_json(json!({ "minAge": 18 })));
//! let rendered = to_sql(&plan, Dialect::PostgreSQL).unwrap();
//! assert!(rendered.sql.starts_with("SELECT"));
//! ```
//!
//! ## Concurrency
//!
//! Plans are built and rendered on the caller's thread; the parse caches are
//! the only shared mutable state and are safe to use from many threads.
//! Cached operation trees are immutable after insertion and read without
//! locking.

pub mod config;
pub mod driver;
pub mod error;
pub mod plan;
pub mod query;
pub mod schema;

pub use arrowql_ir::{Dialect, ParamValue};
pub use arrowql_lowering::CacheConfig;
pub use arrowql_sqlgen::Rendered;

pub use config::{QueryOptions, parse_cache_config, reset_parse_cache, set_parse_cache_config};
pub use driver::{
    Driver, DriverError, ExecResult, Statement, execute_delete, execute_insert, execute_select,
    execute_update,
};
pub use error::{Error, Result};
pub use plan::{Plan, params_from_json, to_sql};
pub use schema::QuerySchema;
pub use query::{
    AggregateQuery, DeleteStatement, InsertStatement, Ordered, Queryable, SelectQuery,
    UpdateStatement, define_delete, define_insert, define_select, define_select_with,
    define_update,
};
