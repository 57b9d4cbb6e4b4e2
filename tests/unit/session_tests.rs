//! Session-level tests: scripted edits, publication, concurrency and the
//! file-based import/apply entry points

use std::fs;
use std::sync::Arc;
use std::thread;

use pretty_assertions::assert_eq;
use serde_json::json;

use rust_spanner_schema::snapshot::load_snapshot;
use rust_spanner_schema::{
    apply_edit_script, describe_graph, import_schema, ApplyOptions, BasicTypeResolver, Driver,
    EditOperation, ImportOptions, IssueKind, KeySpec, SchemaGraph, Session, SessionOptions,
    TargetDialect,
};

use crate::common::*;

// ============================================================================
// Edit operations
// ============================================================================

#[test]
fn test_edit_operation_from_json() {
    let session = session(&singers_albums());
    let graph = session.snapshot();
    let singers = table_id(&graph, "singers");
    let name = column_id(&graph, "singers", "name");

    let operation: EditOperation = serde_json::from_value(json!({
        "op": "rename_column",
        "table": singers,
        "column": name,
        "new_name": "full_name"
    }))
    .unwrap();
    assert_eq!(
        operation,
        EditOperation::RenameColumn {
            table: singers.clone(),
            column: name.clone(),
            new_name: "full_name".to_string(),
        }
    );

    let graph = session.apply(&operation).unwrap();
    assert_eq!(graph.column(&singers, &name).unwrap().name, "full_name");
}

#[test]
fn test_edit_operation_defaults() {
    let operation: EditOperation = serde_json::from_value(json!({
        "op": "add_index",
        "table": "t1",
        "name": "idx_name",
        "keys": [{ "column_id": "c3" }]
    }))
    .unwrap();

    match operation {
        EditOperation::AddIndex { unique, keys, .. } => {
            assert!(!unique);
            assert!(!keys[0].desc);
        }
        other => panic!("unexpected operation: {other:?}"),
    }

    let unknown = serde_json::from_value::<EditOperation>(json!({ "op": "truncate", "table": "t1" }));
    assert!(unknown.is_err());
}

#[test]
fn test_every_edit_keeps_invariants() {
    let session = session(&parent_child());
    let graph = session.snapshot();
    let t1 = table_id(&graph, "t1");
    let t2 = table_id(&graph, "t2");
    let t1_a = column_id(&graph, "t1", "a");
    let t1_b = column_id(&graph, "t1", "b");
    let t1_c = column_id(&graph, "t1", "c");

    let script = vec![
        EditOperation::SetParent {
            table: t1.clone(),
            parent: t2.clone(),
        },
        EditOperation::RenameColumn {
            table: t1.clone(),
            column: t1_a.clone(),
            new_name: "id".to_string(),
        },
        EditOperation::AddColumn {
            table: t1.clone(),
            name: "created_at".to_string(),
            column_type: "TIMESTAMP".to_string(),
            not_null: true,
        },
        EditOperation::ChangeColumnType {
            table: t1.clone(),
            column: t1_c.clone(),
            column_type: "STRING(MAX)".to_string(),
        },
        EditOperation::ReplacePrimaryKey {
            table: t1.clone(),
            keys: vec![KeySpec::new(t1_a.clone(), 1), KeySpec::new(t1_b, 2)],
        },
        EditOperation::RemoveParent { table: t1.clone() },
        EditOperation::RemoveColumn {
            table: t1.clone(),
            column: t1_c,
        },
    ];

    for operation in &script {
        let graph = session.apply(operation).unwrap();
        graph
            .check_invariants()
            .unwrap_or_else(|e| panic!("{operation:?} broke invariants: {e}"));
    }

    let graph = session.snapshot();
    assert_eq!(column_names(&graph, "t1"), vec!["id", "b", "created_at"]);
    assert_eq!(column_names(&graph, "t2")[0], "id");
    assert_eq!(graph.tables[&t1].parent_id, None);
    assert_eq!(graph.tables[&t1].foreign_keys.len(), 1);
    assert!(graph
        .issues
        .has_issue(&t1, Some(&t1_a), IssueKind::InterleaveEligible));
}

#[test]
fn test_rejected_edit_keeps_published_graph() {
    let session = interleaved_session();
    let before = session.snapshot();
    let t2 = table_id(&before, "t2");
    let t2_a = column_id(&before, "t2", "a");

    let operation = EditOperation::ChangeColumnType {
        table: t2,
        column: t2_a,
        column_type: "STRING(MAX)".to_string(),
    };
    assert!(session.apply(&operation).is_err());
    assert!(Arc::ptr_eq(&before, &session.snapshot()));
}

#[test]
fn test_edits_without_invariant_checks() {
    let options = SessionOptions {
        verify_invariants: false,
        ..SessionOptions::default()
    };
    let session = Session::import(
        &singers_albums(),
        Arc::new(BasicTypeResolver::new()),
        options,
    )
    .unwrap();
    let graph = session.snapshot();
    let singers = table_id(&graph, "singers");
    let name = column_id(&graph, "singers", "name");

    let graph = session.rename_column(&singers, &name, "label").unwrap().graph;
    graph.check_invariants().unwrap();
}

// ============================================================================
// Publication and concurrency
// ============================================================================

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn test_session_is_shareable_across_threads() {
    assert_send_sync::<Session>();
}

#[test]
fn test_readers_see_consistent_snapshots_during_writes() {
    let session = Arc::new(session(&singers_albums()));
    let graph = session.snapshot();
    let singers = table_id(&graph, "singers");
    let name = column_id(&graph, "singers", "name");

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let session = Arc::clone(&session);
            let singers = singers.clone();
            let name = name.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let graph = session.snapshot();
                    graph.check_invariants().unwrap();
                    let column = graph.column(&singers, &name).unwrap();
                    assert!(column.name == "name" || column.name == "display_name");
                    assert_eq!(
                        graph.xref.source_name(&singers, &column.name),
                        Some("name")
                    );
                }
            })
        })
        .collect();

    for round in 0..100 {
        let new_name = if round % 2 == 0 { "display_name" } else { "name" };
        session.rename_column(&singers, &name, new_name).unwrap();
    }
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(
        session.snapshot().column(&singers, &name).unwrap().name,
        "name"
    );
}

#[test]
fn test_old_snapshots_are_unaffected_by_later_edits() {
    let session = session(&singers_albums());
    let before = session.snapshot();
    let singers = table_id(&before, "singers");
    let name = column_id(&before, "singers", "name");

    session.rename_column(&singers, &name, "label").unwrap();

    assert_eq!(before.column(&singers, &name).unwrap().name, "name");
    assert_eq!(
        session.snapshot().column(&singers, &name).unwrap().name,
        "label"
    );
}

#[test]
fn test_restore_and_load_source() {
    let session = session(&singers_albums());
    let original = session.snapshot();
    let singers = table_id(&original, "singers");
    let name = column_id(&original, "singers", "name");
    session.rename_column(&singers, &name, "label").unwrap();

    let restored = session
        .restore(SchemaGraph::clone(&original))
        .unwrap();
    assert_eq!(*restored, *original);

    let reloaded = session.load_source(&parent_child()).unwrap();
    assert!(reloaded.table_by_name("singers").is_none());
    assert_eq!(reloaded.tables.keys().next().map(|t| t.as_str()), Some("t1"));
}

// ============================================================================
// File-based entry points
// ============================================================================

#[test]
fn test_import_and_apply_edit_script() {
    let ctx = TestContext::new();
    let source_path = ctx.path("source.json");
    fs::write(
        &source_path,
        serde_json::to_string_pretty(&singers_albums()).unwrap(),
    )
    .unwrap();

    let snapshot_path = import_schema(ImportOptions {
        source_path,
        output_path: ctx.path("session.json"),
        driver: Driver::Postgres,
        dialect: TargetDialect::Postgres,
    })
    .unwrap();
    let graph = load_snapshot(&snapshot_path).unwrap().graph;
    assert_eq!(graph.source_driver, Driver::Postgres);
    let albums = table_id(&graph, "albums");
    let singers = table_id(&graph, "singers");
    let title = column_id(&graph, "albums", "title");

    let script = json!([
        { "op": "set_parent", "table": albums, "parent": singers },
        { "op": "rename_column", "table": albums, "column": title, "new_name": "album_title" }
    ]);
    let script_path = ctx.path("script.json");
    fs::write(&script_path, script.to_string()).unwrap();

    let output = apply_edit_script(ApplyOptions {
        snapshot_path: snapshot_path.clone(),
        script_path,
        output_path: Some(ctx.path("edited.json")),
        verbose: false,
    })
    .unwrap();

    let edited = load_snapshot(&output).unwrap().graph;
    assert_eq!(edited.tables[&albums].parent_id, Some(singers));
    assert!(column_names(&edited, "albums").contains(&"album_title".to_string()));
    // Input snapshot untouched
    assert_eq!(load_snapshot(&snapshot_path).unwrap().graph, graph);
}

#[test]
fn test_failed_edit_script_writes_nothing() {
    let ctx = TestContext::new();
    let snapshot_path = ctx.path("session.json");
    let session = session(&singers_albums());
    session.save(&snapshot_path).unwrap();
    let graph = session.snapshot();
    let singers = table_id(&graph, "singers");
    let name = column_id(&graph, "singers", "name");

    let script = json!([
        { "op": "rename_column", "table": singers, "column": name, "new_name": "label" },
        { "op": "rename_column", "table": singers, "column": name, "new_name": "albums" }
    ]);
    let script_path = ctx.path("script.json");
    fs::write(&script_path, script.to_string()).unwrap();
    let output_path = ctx.path("edited.json");

    let err = apply_edit_script(ApplyOptions {
        snapshot_path,
        script_path,
        output_path: Some(output_path.clone()),
        verbose: false,
    })
    .unwrap_err();

    assert!(err.to_string().contains("Edit 2 of 2 failed"));
    assert!(!output_path.exists());
}

#[test]
fn test_describe_graph() {
    let session = interleaved_session();
    let graph = session.snapshot();

    let text = describe_graph(&graph, None);
    assert!(text.contains("TABLE t1"));
    assert!(text.contains("INTERLEAVE IN PARENT t2"));
    assert!(text.contains("PRIMARY KEY (a, b)"));
    assert!(text.contains("a INT64 NOT NULL"));

    let only_parent = describe_graph(&graph, Some("T2"));
    assert!(only_parent.contains("TABLE t2"));
    assert!(!only_parent.contains("TABLE t1"));
}
