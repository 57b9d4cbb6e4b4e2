//! Common test utilities for rust-spanner-schema tests

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use rust_spanner_schema::model::{SourceColumnDef, SourceForeignKeyDef, SourceIndexDef};
use rust_spanner_schema::{
    BasicTypeResolver, ColumnId, SchemaGraph, Session, SessionOptions, SourceTableDef, TableId,
};

/// Test context with a temporary directory for snapshot files
pub struct TestContext {
    /// Kept to prevent temp directory cleanup until TestContext is dropped
    _temp_dir: TempDir,
    pub dir: PathBuf,
}

impl TestContext {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = temp_dir.path().to_path_buf();
        Self {
            _temp_dir: temp_dir,
            dir,
        }
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }
}

// ============================================================================
// Source schema builders
// ============================================================================

pub fn col(name: &str, type_name: &str) -> SourceColumnDef {
    SourceColumnDef::new(name, type_name)
}

pub fn col_not_null(name: &str, type_name: &str) -> SourceColumnDef {
    let mut column = SourceColumnDef::new(name, type_name);
    column.not_null = true;
    column
}

pub fn varchar(name: &str, length: i64) -> SourceColumnDef {
    let mut column = SourceColumnDef::new(name, "varchar");
    column.mods = vec![length];
    column
}

pub fn table(name: &str, columns: Vec<SourceColumnDef>, primary_key: &[&str]) -> SourceTableDef {
    SourceTableDef {
        name: name.to_string(),
        schema: String::new(),
        columns,
        primary_key: primary_key.iter().map(|s| s.to_string()).collect(),
        indexes: Vec::new(),
        foreign_keys: Vec::new(),
    }
}

pub fn foreign_key(
    name: &str,
    columns: &[&str],
    referenced_table: &str,
    referenced_columns: &[&str],
) -> SourceForeignKeyDef {
    SourceForeignKeyDef {
        name: name.to_string(),
        columns: columns.iter().map(|s| s.to_string()).collect(),
        referenced_table: referenced_table.to_string(),
        referenced_columns: referenced_columns.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn index(name: &str, columns: &[&str]) -> SourceIndexDef {
    SourceIndexDef {
        name: name.to_string(),
        unique: false,
        columns: columns.iter().map(|s| s.to_string()).collect(),
        descending: Vec::new(),
    }
}

// ============================================================================
// Canonical schemas
// ============================================================================

/// `singers (singer_id, name, created_at)` keyed on `singer_id`, and
/// `albums (singer_id, album_id, title)` keyed on `(singer_id, album_id)` with
/// a foreign key `albums.singer_id -> singers.singer_id`.
pub fn singers_albums() -> Vec<SourceTableDef> {
    let singers = table(
        "singers",
        vec![
            col_not_null("singer_id", "bigint"),
            varchar("name", 100),
            col("created_at", "timestamp"),
        ],
        &["singer_id"],
    );
    let mut albums = table(
        "albums",
        vec![
            col_not_null("singer_id", "bigint"),
            col_not_null("album_id", "bigint"),
            varchar("title", 200),
        ],
        &["singer_id", "album_id"],
    );
    albums.foreign_keys.push(foreign_key(
        "fk_albums_singers",
        &["singer_id"],
        "singers",
        &["singer_id"],
    ));
    vec![singers, albums]
}

/// Parent `t2 (a, b, c)` keyed on `a` and child `t1 (a, b, c)` keyed on
/// `(a, b)` with a foreign key `t1.a -> t2.a`.
pub fn parent_child() -> Vec<SourceTableDef> {
    let parent = table(
        "t2",
        vec![
            col_not_null("a", "bigint"),
            varchar("b", 50),
            varchar("c", 50),
        ],
        &["a"],
    );
    let mut child = table(
        "t1",
        vec![
            col_not_null("a", "bigint"),
            col_not_null("b", "bigint"),
            varchar("c", 50),
        ],
        &["a", "b"],
    );
    child
        .foreign_keys
        .push(foreign_key("fk_t1_t2", &["a"], "t2", &["a"]));
    vec![parent, child]
}

// ============================================================================
// Session helpers
// ============================================================================

pub fn session(tables: &[SourceTableDef]) -> Session {
    Session::import(
        tables,
        Arc::new(BasicTypeResolver::new()),
        SessionOptions::default(),
    )
    .expect("import should succeed")
}

/// Session over [`parent_child`] with `t1` already interleaved in `t2`
pub fn interleaved_session() -> Session {
    let session = session(&parent_child());
    let graph = session.snapshot();
    let child = table_id(&graph, "t1");
    let parent = table_id(&graph, "t2");
    session
        .set_parent(&child, &parent)
        .expect("t1 should interleave in t2");
    session
}

pub fn table_id(graph: &SchemaGraph, name: &str) -> TableId {
    graph
        .table_by_name(name)
        .unwrap_or_else(|| panic!("table {} not found", name))
        .id
        .clone()
}

pub fn column_id(graph: &SchemaGraph, table: &str, column: &str) -> ColumnId {
    graph
        .table_by_name(table)
        .and_then(|t| t.column_by_name(column))
        .unwrap_or_else(|| panic!("column {}.{} not found", table, column))
        .id
        .clone()
}

/// Names of a table's columns in display order
pub fn column_names(graph: &SchemaGraph, table: &str) -> Vec<String> {
    graph
        .table_by_name(table)
        .map(|t| t.columns_in_order().map(|c| c.name.clone()).collect())
        .unwrap_or_default()
}

/// Names of a table's primary key columns in key order
pub fn key_names(graph: &SchemaGraph, table: &str) -> Vec<String> {
    let Some(table) = graph.table_by_name(table) else {
        return Vec::new();
    };
    table
        .primary_key
        .iter()
        .filter_map(|pk| table.columns.get(&pk.column_id).map(|c| c.name.clone()))
        .collect()
}
