// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Documented error strings surfaced through the facade

use arrowql::{QuerySchema, define_select};

#[test]
fn test_unparseable_lambda() {
    let schema = QuerySchema::new();
    let err = define_select(&schema, r#"q => q.from("users").where(u => u."#).unwrap_err();
    assert_eq!(err.to_string(), "Failed to parse query");
}

#[test]
fn test_unsupported_method() {
    let schema = QuerySchema::new();
    let err = define_select(
        &schema,
        r#"q => q.from("users").where(u => u.name.match(u.other))"#,
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "Unsupported call expression");
}

#[test]
fn test_projection_without_columns() {
    let schema = QuerySchema::new();
    let err = define_select(
        &schema,
        r#"q => q.from("users").select(u => ({ mixed: "a" + "b" }))"#,
    )
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Expressions in SELECT must reference table columns."
    );
}

#[test]
fn test_free_variable() {
    let schema = QuerySchema::new();
    let err = define_select(
        &schema,
        r#"q => q.from("users").where(u => u.age > limit)"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("External variable 'limit'"));
}

#[test]
fn test_group_access_that_is_not_key_or_aggregate() {
    let schema = QuerySchema::new();
    let err = define_select(
        &schema,
        r#"q => q.from("orders").groupBy(o => o.customerId).select(g => ({ x: g.foo }))"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("'foo'"));
}

#[test]
fn test_composition_fragment_errors_surface() {
    let schema = QuerySchema::new();
    let err = define_select(&schema, r#"q => q.from("users")"#)
        .unwrap()
        .where_("u => u.name.trim() === u.other")
        .unwrap_err();
    assert_eq!(err.to_string(), "Unsupported call expression");
}

mod driver_contract {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use arrowql::{
        Dialect, Driver, DriverError, ExecResult, QuerySchema, Statement, define_select,
        execute_select,
    };
    use serde_json::json;

    /// Records what the planner hands to the driver
    struct RecordingDriver {
        seen: Arc<Mutex<Vec<(String, HashMap<String, arrowql::ParamValue>)>>>,
    }

    struct RecordingStatement {
        sql: String,
        seen: Arc<Mutex<Vec<(String, HashMap<String, arrowql::ParamValue>)>>>,
    }

    impl Statement for RecordingStatement {
        fn run(
            &mut self,
            params: &HashMap<String, arrowql::ParamValue>,
        ) -> Result<ExecResult, DriverError> {
            self.seen
                .lock()
                .unwrap()
                .push((self.sql.clone(), params.clone()));
            Ok(ExecResult {
                rows: vec![json!({ "id": 1 })],
                row_count: 1,
            })
        }
    }

    impl Driver for RecordingDriver {
        type Statement = RecordingStatement;

        fn prepare(&self, sql: &str) -> Result<RecordingStatement, DriverError> {
            Ok(RecordingStatement {
                sql: sql.to_string(),
                seen: Arc::clone(&self.seen),
            })
        }
    }

    #[test]
    fn test_execute_select_round_trip() -> anyhow::Result<()> {
        let schema = QuerySchema::new();
        let query = define_select(
            &schema,
            r#"(q, p) => q.from("users").where(u => u.id === p.id)"#,
        )?;
        let plan = query.finalize(arrowql::params_from_json(json!({ "id": 7 })));

        let driver = RecordingDriver {
            seen: Arc::new(Mutex::new(Vec::new())),
        };
        let result = execute_select(&driver, &plan, Dialect::PostgreSQL)?;
        assert_eq!(result.row_count, 1);

        let seen = driver.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "SELECT * FROM \"users\" WHERE \"id\" = @id");
        assert_eq!(seen[0].1["id"], json!(7));
        Ok(())
    }

    #[test]
    fn test_driver_errors_pass_through_unchanged() {
        struct FailingDriver;
        struct NeverStatement;

        impl Statement for NeverStatement {
            fn run(
                &mut self,
                _params: &HashMap<String, arrowql::ParamValue>,
            ) -> Result<ExecResult, DriverError> {
                unreachable!()
            }
        }

        impl Driver for FailingDriver {
            type Statement = NeverStatement;

            fn prepare(&self, _sql: &str) -> Result<NeverStatement, DriverError> {
                Err(DriverError::new("duplicate key value violates unique constraint"))
            }
        }

        let schema = QuerySchema::new();
        let plan = define_select(&schema, r#"q => q.from("users")"#)
            .unwrap()
            .finalize(Default::default());
        let err = execute_select(&FailingDriver, &plan, Dialect::PostgreSQL).unwrap_err();
        assert_eq!(
            err.to_string(),
            "duplicate key value violates unique constraint"
        );
    }
}
