// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Database driver contract
//!
//! The planner needs very little from a driver: prepare a statement, run it
//! with named `@name` bindings, get rows and a row count back. Connection
//! management, transactions, retries and cancellation all live on the driver
//! side of this boundary.
//!
//! SQLite adapters may decline to surface RETURNING rows; the execution
//! wrappers still report the row count, and the emitted SQL keeps the clause.

use std::collections::HashMap;

use arrowql_ir::{Dialect, ParamValue};

use crate::error::Result;
use crate::plan::{Plan, to_sql};

/// Error surfaced by a driver; rethrown unchanged by the wrappers
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct DriverError {
    pub message: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result of running one statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecResult {
    /// Returned rows as JSON objects; may be empty for adapters that do not
    /// execute RETURNING
    pub rows: Vec<ParamValue>,
    pub row_count: u64,
}

/// A prepared statement bound to named parameters
pub trait Statement {
    fn run(&mut self, params: &HashMap<String, ParamValue>)
    -> std::result::Result<ExecResult, DriverError>;
}

/// Minimal driver contract
pub trait Driver {
    type Statement: Statement;

    fn prepare(&self, sql: &str) -> std::result::Result<Self::Statement, DriverError>;
}

fn execute<D: Driver>(driver: &D, plan: &Plan, dialect: Dialect) -> Result<ExecResult> {
    let rendered = to_sql(plan, dialect)?;
    let mut statement = driver.prepare(&rendered.sql)?;
    Ok(statement.run(&rendered.params)?)
}

/// Render and run a SELECT plan
pub fn execute_select<D: Driver>(driver: &D, plan: &Plan, dialect: Dialect) -> Result<ExecResult> {
    execute(driver, plan, dialect)
}

/// Render and run an INSERT plan
pub fn execute_insert<D: Driver>(driver: &D, plan: &Plan, dialect: Dialect) -> Result<ExecResult> {
    execute(driver, plan, dialect)
}

/// Render and run an UPDATE plan
pub fn execute_update<D: Driver>(driver: &D, plan: &Plan, dialect: Dialect) -> Result<ExecResult> {
    execute(driver, plan, dialect)
}

/// Render and run a DELETE plan
pub fn execute_delete<D: Driver>(driver: &D, plan: &Plan, dialect: Dialect) -> Result<ExecResult> {
    execute(driver, plan, dialect)
}
