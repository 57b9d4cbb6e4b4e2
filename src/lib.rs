//! rust-spanner-schema: schema-consistency engine for relational-to-Spanner conversions
//!
//! This library keeps a converted target schema (tables, columns, primary
//! keys, interleaving, indexes, foreign keys) consistent with its source
//! schema and with itself while a user edits it.

pub mod engine;
pub mod error;
pub mod ids;
pub mod issues;
pub mod model;
pub mod snapshot;
pub mod types;
pub mod util;

use std::fmt::Write as _;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

pub use engine::{
    analyze_interleave, Applied, EditOperation, ForeignKeySpec, IndexSpec, InterleaveReport,
    InterleaveState, KeySpec, NewColumn, Session,
};
pub use error::{ErrorClass, ResolveError, SchemaError, SnapshotError};
pub use ids::{ColumnId, ForeignKeyId, IndexId, TableId};
pub use issues::{IssueKind, IssueRegistry};
pub use model::{SchemaGraph, SourceTableDef};
pub use snapshot::SnapshotDocument;
pub use types::{BasicTypeResolver, ColumnType, Driver, TargetDialect, TypeResolver};

/// Per-session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    pub source_driver: Driver,
    pub target_dialect: TargetDialect,
    /// Check every structural invariant on the staged graph before publishing it
    #[serde(default = "default_verify_invariants")]
    pub verify_invariants: bool,
}

fn default_verify_invariants() -> bool {
    true
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            source_driver: Driver::MySql,
            target_dialect: TargetDialect::GoogleSql,
            verify_invariants: true,
        }
    }
}

/// Options for importing a source schema into a new snapshot
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// JSON file holding an array of source table definitions
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub driver: Driver,
    pub dialect: TargetDialect,
}

/// Options for applying an edit script to a snapshot
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    pub snapshot_path: PathBuf,
    /// JSON file holding an array of edit operations
    pub script_path: PathBuf,
    /// Where to write the edited snapshot (defaults to the input snapshot)
    pub output_path: Option<PathBuf>,
    pub verbose: bool,
}

/// Import a source schema file and save the resulting session as a snapshot
pub fn import_schema(options: ImportOptions) -> Result<PathBuf> {
    let file = File::open(&options.source_path)
        .with_context(|| format!("Failed to open {}", options.source_path.display()))?;
    let tables: Vec<SourceTableDef> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", options.source_path.display()))?;

    let session_options = SessionOptions {
        source_driver: options.driver,
        target_dialect: options.dialect,
        ..SessionOptions::default()
    };
    let session = Session::import(&tables, Arc::new(BasicTypeResolver::new()), session_options)?;
    session.save(&options.output_path)?;

    info!(
        "Imported {} tables into {}",
        tables.len(),
        options.output_path.display()
    );
    Ok(options.output_path)
}

/// Replay an edit script against a snapshot and save the result.
///
/// The script stops at the first rejected edit; edits before it are kept
/// in memory but nothing is written.
pub fn apply_edit_script(options: ApplyOptions) -> Result<PathBuf> {
    let session = Session::from_snapshot(
        &options.snapshot_path,
        Arc::new(BasicTypeResolver::new()),
        SessionOptions::default(),
    )?;

    let file = File::open(&options.script_path)
        .with_context(|| format!("Failed to open {}", options.script_path.display()))?;
    let script: Vec<EditOperation> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", options.script_path.display()))?;

    for (step, operation) in script.iter().enumerate() {
        session
            .apply(operation)
            .with_context(|| format!("Edit {} of {} failed", step + 1, script.len()))?;
        if options.verbose {
            println!("Applied edit {}: {:?}", step + 1, operation);
        }
    }

    let output_path = options.output_path.unwrap_or(options.snapshot_path);
    session.save(&output_path)?;

    if options.verbose {
        println!("Wrote snapshot: {}", output_path.display());
    }
    Ok(output_path)
}

/// Human-readable listing of a graph: tables, columns, keys, parents and issues
pub fn describe_graph(graph: &SchemaGraph, only_table: Option<&str>) -> String {
    let mut out = String::new();
    let dialect = graph.target_dialect;
    for table in graph.tables.values() {
        if only_table.is_some_and(|name| !util::eq_ci(name, &table.name)) {
            continue;
        }
        let _ = write!(out, "TABLE {} ({})", table.name, table.id);
        if let Some(parent) = table.parent_id.as_ref().and_then(|p| graph.tables.get(p)) {
            let _ = write!(out, " INTERLEAVE IN PARENT {}", parent.name);
        }
        out.push('\n');

        for column in table.columns_in_order() {
            let _ = write!(
                out,
                "  {} {}{}",
                column.name,
                column.column_type.render(dialect),
                if column.not_null { " NOT NULL" } else { "" }
            );
            let issues = graph.issues.column_issues(&table.id, &column.id);
            if !issues.is_empty() {
                let names: Vec<String> = issues.iter().map(|i| format!("{:?}", i)).collect();
                let _ = write!(out, "  -- {}", names.join(", "));
            }
            out.push('\n');
        }

        let key: Vec<String> = table
            .primary_key
            .iter()
            .filter_map(|pk| {
                table
                    .columns
                    .get(&pk.column_id)
                    .map(|c| format!("{}{}", c.name, if pk.desc { " DESC" } else { "" }))
            })
            .collect();
        let _ = writeln!(out, "  PRIMARY KEY ({})", key.join(", "));

        for index in &table.indexes {
            let columns: Vec<&str> = index
                .keys
                .iter()
                .filter_map(|k| table.columns.get(&k.column_id).map(|c| c.name.as_str()))
                .collect();
            let _ = writeln!(
                out,
                "  {}INDEX {} ({})",
                if index.unique { "UNIQUE " } else { "" },
                index.name,
                columns.join(", ")
            );
        }
        for fk in &table.foreign_keys {
            let referenced = graph
                .tables
                .get(&fk.referenced_table)
                .map(|t| t.name.as_str())
                .unwrap_or("?");
            let _ = writeln!(out, "  FOREIGN KEY {} REFERENCES {}", fk.name, referenced);
        }
        for issue in graph.issues.table_issues(&table.id) {
            let _ = writeln!(out, "  -- {:?}: {}", issue, issue.description());
        }
    }
    out
}
