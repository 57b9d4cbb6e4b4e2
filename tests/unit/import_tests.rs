//! Source schema import tests

use std::sync::Arc;

use pretty_assertions::assert_eq;

use rust_spanner_schema::model::SYNTHETIC_KEY_NAME;
use rust_spanner_schema::types::{BaseType, Length};
use rust_spanner_schema::{
    BasicTypeResolver, ColumnType, Driver, IssueKind, ResolveError, SchemaError, Session,
    SessionOptions,
};

use crate::common::*;

// ============================================================================
// Identifiers and cross-references
// ============================================================================

#[test]
fn test_source_and_target_share_identifiers() {
    let session = session(&singers_albums());
    let graph = session.snapshot();
    let singers = table_id(&graph, "singers");

    let source = &graph.source_tables[&singers];
    let target = &graph.tables[&singers];
    assert_eq!(source.column_order, target.column_order);
    assert_eq!(source.primary_key, target.primary_key);
    for id in &target.column_order {
        assert_eq!(source.columns[id].name, target.columns[id].name);
    }
    assert_eq!(graph.xref.source_name(&singers, "name"), Some("name"));
    assert_eq!(graph.xref.target_name(&singers, "name"), Some("name"));
    graph.check_invariants().unwrap();
}

#[test]
fn test_identifiers_are_unique_across_kinds() {
    let session = session(&singers_albums());
    let graph = session.snapshot();

    let mut ids: Vec<String> = graph.tables.keys().map(|t| t.to_string()).collect();
    for table in graph.tables.values() {
        ids.extend(table.column_order.iter().map(|c| c.to_string()));
        ids.extend(table.foreign_keys.iter().map(|f| f.id.to_string()));
        ids.extend(table.indexes.iter().map(|i| i.id.to_string()));
    }
    let total = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), total);
}

// ============================================================================
// Conversion issues
// ============================================================================

#[test]
fn test_conversion_issues_are_recorded() {
    let mut counter = col_not_null("counter", "int");
    counter.auto_increment = true;
    let mut status = varchar("status", 10);
    status.default_value = Some("'new'".to_string());
    let tasks = table(
        "tasks",
        vec![counter, status, col("due", "datetime")],
        &["counter"],
    );
    let session = session(&[tasks]);
    let graph = session.snapshot();
    let tasks = table_id(&graph, "tasks");
    let counter = column_id(&graph, "tasks", "counter");
    let status = column_id(&graph, "tasks", "status");
    let due = column_id(&graph, "tasks", "due");

    let issues = &graph.issues;
    assert!(issues.has_issue(&tasks, Some(&counter), IssueKind::TypeWidened));
    assert!(issues.has_issue(&tasks, Some(&counter), IssueKind::AutoIncrementDropped));
    assert!(issues.has_issue(&tasks, Some(&counter), IssueKind::HotspotAutoIncrement));
    assert!(issues.has_issue(&tasks, Some(&status), IssueKind::DefaultValueDropped));
    assert!(issues.has_issue(&tasks, Some(&due), IssueKind::TimezoneAssumed));

    let column = graph.column(&tasks, &counter).unwrap();
    assert_eq!(column.column_type, ColumnType::scalar(BaseType::Int64));
    assert_eq!(column.options.get("source_type").map(String::as_str), Some("int"));
}

#[test]
fn test_index_on_key_column_is_flagged_on_import() {
    let mut singers = singers_albums();
    singers[0].indexes.push(index("idx_singers_id", &["singer_id"]));
    let session = session(&singers);
    let graph = session.snapshot();
    let singers = table_id(&graph, "singers");
    let singer_id = column_id(&graph, "singers", "singer_id");

    assert!(graph
        .issues
        .has_issue(&singers, Some(&singer_id), IssueKind::RedundantIndex));
}

#[test]
fn test_interleave_candidates_are_flagged_on_import() {
    let session = session(&singers_albums());
    let graph = session.snapshot();
    let albums = table_id(&graph, "albums");
    let singer_id = column_id(&graph, "albums", "singer_id");

    assert_eq!(
        graph.issues.column_issues(&albums, &singer_id),
        vec![IssueKind::InterleaveEligible]
    );
}

// ============================================================================
// Synthetic keys
// ============================================================================

#[test]
fn test_table_without_key_gets_synthetic_key() {
    let notes = table("notes", vec![col("body", "text")], &[]);
    let session = session(&[notes]);
    let graph = session.snapshot();
    let notes = table_id(&graph, "notes");
    let synth = column_id(&graph, "notes", SYNTHETIC_KEY_NAME);

    let column = graph.column(&notes, &synth).unwrap();
    assert_eq!(column.column_type, ColumnType::string(Length::Limited(50)));
    assert!(column.not_null);
    assert_eq!(key_names(&graph, "notes"), vec![SYNTHETIC_KEY_NAME]);
    assert_eq!(graph.synthetic_keys.get(&notes), Some(&synth));
    assert!(graph
        .issues
        .has_issue(&notes, None, IssueKind::MissingPrimaryKey));
    assert!(graph.source_column(&notes, &synth).is_none());
    assert_eq!(graph.xref.source_name(&notes, SYNTHETIC_KEY_NAME), None);
}

#[test]
fn test_synthetic_key_name_avoids_existing_column() {
    let notes = table(
        "notes",
        vec![col("synth_id", "int"), col("body", "text")],
        &[],
    );
    let session = session(&[notes]);
    let graph = session.snapshot();

    assert_eq!(key_names(&graph, "notes"), vec!["synth_id_1"]);
    assert_eq!(
        column_names(&graph, "notes"),
        vec!["synth_id", "body", "synth_id_1"]
    );
}

// ============================================================================
// Import errors
// ============================================================================

#[test]
fn test_duplicate_table_names_are_rejected() {
    let tables = vec![
        table("Users", vec![col_not_null("id", "bigint")], &["id"]),
        table("users", vec![col_not_null("id", "bigint")], &["id"]),
    ];
    let err = Session::import(
        &tables,
        Arc::new(BasicTypeResolver::new()),
        SessionOptions::default(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, SchemaError::DuplicateName { .. }));
}

#[test]
fn test_index_and_foreign_key_names_must_not_match_any_table() {
    // Index named after a table imported later
    let mut aa = table("aa", vec![col_not_null("id", "bigint")], &["id"]);
    aa.indexes.push(index("bb", &["id"]));
    let bb = table("bb", vec![col_not_null("id", "bigint")], &["id"]);

    // Index named after a table imported earlier
    let mut cc = table("cc", vec![col_not_null("id", "bigint")], &["id"]);
    cc.indexes.push(index("dd", &["id"]));
    let dd = table("dd", vec![col_not_null("id", "bigint")], &["id"]);

    let mut orders = table("orders", vec![col_not_null("id", "bigint")], &["id"]);
    orders
        .foreign_keys
        .push(foreign_key("Users", &["id"], "users", &["id"]));
    let users = table("users", vec![col_not_null("id", "bigint")], &["id"]);

    for (tables, taken) in [
        (vec![aa, bb], "bb"),
        (vec![dd, cc], "dd"),
        (vec![orders, users], "Users"),
    ] {
        let err = Session::import(
            &tables,
            Arc::new(BasicTypeResolver::new()),
            SessionOptions::default(),
        )
        .err()
        .unwrap();
        assert_eq!(
            err,
            SchemaError::DuplicateName {
                name: taken.to_string()
            }
        );
    }
}

#[test]
fn test_key_and_foreign_key_columns_match_case_insensitively() {
    let users = table("users", vec![col_not_null("id", "bigint")], &["ID"]);
    let mut orders = table(
        "orders",
        vec![col_not_null("order_id", "bigint"), col_not_null("user_id", "bigint")],
        &["Order_Id"],
    );
    orders
        .foreign_keys
        .push(foreign_key("fk_orders_users", &["USER_ID"], "Users", &["Id"]));
    orders.indexes.push(index("idx_orders_user", &["User_Id"]));

    let session = session(&[users, orders]);
    let graph = session.snapshot();

    assert_eq!(key_names(&graph, "users"), vec!["id"]);
    assert_eq!(key_names(&graph, "orders"), vec!["order_id"]);
    let orders = table_id(&graph, "orders");
    let fk = &graph.tables[&orders].foreign_keys[0];
    assert_eq!(fk.columns, vec![column_id(&graph, "orders", "user_id")]);
    assert_eq!(fk.referenced_columns, vec![column_id(&graph, "users", "id")]);
}

#[test]
fn test_unknown_key_column_is_rejected() {
    let tables = vec![table("users", vec![col_not_null("id", "bigint")], &["uid"])];
    let err = Session::import(
        &tables,
        Arc::new(BasicTypeResolver::new()),
        SessionOptions::default(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, SchemaError::UnknownColumn { .. }));
}

#[test]
fn test_unknown_referenced_table_is_rejected() {
    let mut orders = table("orders", vec![col_not_null("user_id", "bigint")], &["user_id"]);
    orders
        .foreign_keys
        .push(foreign_key("fk_orders_users", &["user_id"], "users", &["id"]));
    let err = Session::import(
        &[orders],
        Arc::new(BasicTypeResolver::new()),
        SessionOptions::default(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, SchemaError::UnknownTable(_)));
}

#[test]
fn test_unsupported_driver_is_rejected() {
    let options = SessionOptions {
        source_driver: Driver::Oracle,
        ..SessionOptions::default()
    };
    let err = Session::import(
        &singers_albums(),
        Arc::new(BasicTypeResolver::new()),
        options,
    )
    .err()
    .unwrap();
    assert_eq!(
        err,
        SchemaError::Resolution(ResolveError::UnsupportedDriver(Driver::Oracle))
    );
}
