//! Secondary index tests

use std::sync::Arc;

use rust_spanner_schema::model::IndexKey;
use rust_spanner_schema::{ColumnId, IndexSpec, IssueKind, SchemaError};

use crate::common::*;

fn spec(name: &str, columns: &[&ColumnId]) -> IndexSpec {
    IndexSpec {
        name: name.to_string(),
        unique: false,
        keys: columns
            .iter()
            .map(|c| IndexKey {
                column_id: (*c).clone(),
                desc: false,
            })
            .collect(),
    }
}

#[test]
fn test_add_and_drop_index() {
    let session = session(&singers_albums());
    let graph = session.snapshot();
    let singers = table_id(&graph, "singers");
    let name = column_id(&graph, "singers", "name");

    let applied = session
        .add_index(&singers, spec("idx_singers_name", &[&name]))
        .unwrap();
    let index = applied.graph.tables[&singers].index(&applied.value).unwrap();
    assert_eq!(index.name, "idx_singers_name");
    assert_eq!(index.keys[0].column_id, name);

    let graph = session.drop_index(&singers, &applied.value).unwrap().graph;
    assert!(graph.tables[&singers].indexes.is_empty());
}

#[test]
fn test_index_on_key_column_is_redundant() {
    let session = session(&singers_albums());
    let graph = session.snapshot();
    let singers = table_id(&graph, "singers");
    let singer_id = column_id(&graph, "singers", "singer_id");
    let name = column_id(&graph, "singers", "name");

    let applied = session
        .add_index(&singers, spec("idx_singers_id_name", &[&singer_id, &name]))
        .unwrap();
    let issues = &applied.graph.issues;
    assert!(issues.has_issue(&singers, Some(&singer_id), IssueKind::RedundantIndex));
    assert!(!issues.has_issue(&singers, Some(&name), IssueKind::RedundantIndex));

    let graph = session.drop_index(&singers, &applied.value).unwrap().graph;
    assert!(!graph
        .issues
        .has_issue(&singers, Some(&singer_id), IssueKind::RedundantIndex));
}

#[test]
fn test_index_names_share_the_global_namespace() {
    let session = session(&singers_albums());
    let before = session.snapshot();
    let singers = table_id(&before, "singers");
    let name = column_id(&before, "singers", "name");

    for taken in ["ALBUMS", "fk_albums_singers"] {
        let err = session
            .add_index(&singers, spec(taken, &[&name]))
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateName { .. }), "{taken}");
    }
    assert!(Arc::ptr_eq(&before, &session.snapshot()));
}

#[test]
fn test_index_validation_errors() {
    let session = session(&singers_albums());
    let graph = session.snapshot();
    let singers = table_id(&graph, "singers");
    let name = column_id(&graph, "singers", "name");

    let err = session.add_index(&singers, spec("idx_empty", &[])).unwrap_err();
    assert!(matches!(err, SchemaError::EmptyIndex { .. }));

    let err = session
        .add_index(&singers, spec("idx_twice", &[&name, &name]))
        .unwrap_err();
    assert!(matches!(err, SchemaError::DuplicateKeyColumn { .. }));

    let err = session
        .add_index(&singers, spec("idx_missing", &[&ColumnId::new("c404")]))
        .unwrap_err();
    assert!(matches!(err, SchemaError::UnknownColumn { .. }));

    let err = session
        .add_index(&singers, spec("idx bad", &[&name]))
        .unwrap_err();
    assert!(matches!(err, SchemaError::InvalidName { .. }));
}

#[test]
fn test_index_on_json_column_is_rejected() {
    let events = table(
        "events",
        vec![col_not_null("event_id", "bigint"), col("payload", "jsonb")],
        &["event_id"],
    );
    let session = session(&[events]);
    let graph = session.snapshot();
    let events = table_id(&graph, "events");
    let payload = column_id(&graph, "events", "payload");

    let err = session
        .add_index(&events, spec("idx_payload", &[&payload]))
        .unwrap_err();
    assert!(matches!(err, SchemaError::UnkeyableColumn { .. }));
}

#[test]
fn test_drop_unknown_index() {
    let session = session(&singers_albums());
    let singers = table_id(&session.snapshot(), "singers");

    let err = session.drop_index(&singers, &"i404".into()).unwrap_err();
    assert!(matches!(err, SchemaError::UnknownIndex { .. }));
}
