//! Mutation engine
//!
//! A [`Session`] owns the live [`SchemaGraph`] of one conversion session.
//! Every edit runs under the session's write lock against a staged copy of
//! the graph: the operation validates, applies its full cascade, derived
//! issues are refreshed, invariants are checked, and only then is the copy
//! published. A rejected edit leaves the published graph untouched.

mod column;
mod foreign_key;
mod index;
mod interleave;
mod primary_key;

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, SchemaError};
use crate::ids::{ColumnId, ForeignKeyId, IndexId, TableId};
use crate::issues::{detect_hotspots, detect_redundant_indexes};
use crate::model::{IndexKey, SchemaGraph, SourceTableDef};
use crate::types::{ResolveRequest, Resolution, TypeResolver};
use crate::SessionOptions;

pub use column::NewColumn;
pub use foreign_key::ForeignKeySpec;
pub use index::IndexSpec;
pub use interleave::{analyze_interleave, InterleaveReport, InterleaveState};
pub use primary_key::KeySpec;

/// Result of an applied edit: the operation's value and the published graph
#[derive(Debug, Clone)]
pub struct Applied<T> {
    pub value: T,
    pub graph: Arc<SchemaGraph>,
}

/// Staged state of one edit.
pub(crate) struct Mutation<'a> {
    pub graph: &'a mut SchemaGraph,
    pub resolver: &'a dyn TypeResolver,
    touched: BTreeSet<TableId>,
}

impl<'a> Mutation<'a> {
    fn new(graph: &'a mut SchemaGraph, resolver: &'a dyn TypeResolver) -> Self {
        Self {
            graph,
            resolver,
            touched: BTreeSet::new(),
        }
    }

    /// Mark a table as changed so its derived issues are refreshed
    pub fn touch(&mut self, table: &TableId) {
        self.touched.insert(table.clone());
    }

    /// Resolve a type for a column of `table`, using its source column when it has one
    pub fn resolve(
        &self,
        table: &TableId,
        column: Option<&ColumnId>,
        requested: Option<&str>,
    ) -> Result<Resolution> {
        let source = column
            .and_then(|c| self.graph.source_column(table, c))
            .map(|c| &c.source_type);
        let resolution = self.resolver.resolve(ResolveRequest {
            source,
            requested,
            driver: self.graph.source_driver,
            dialect: self.graph.target_dialect,
        })?;
        Ok(resolution)
    }
}

/// Recompute hotspot, redundant-index and interleave issues for `tables`
/// and their foreign-key and interleave neighbours.
pub(crate) fn refresh_derived_issues(graph: &mut SchemaGraph, tables: &[TableId]) {
    let mut scope: BTreeSet<TableId> = BTreeSet::new();
    for id in tables {
        let Some(table) = graph.tables.get(id) else {
            continue;
        };
        scope.insert(id.clone());
        scope.extend(table.parent_id.iter().cloned());
        scope.extend(table.foreign_keys.iter().map(|fk| fk.referenced_table.clone()));
        for other in graph.tables.values() {
            let linked = other.parent_id.as_ref() == Some(id)
                || other.foreign_keys.iter().any(|fk| &fk.referenced_table == id);
            if linked {
                scope.insert(other.id.clone());
            }
        }
    }

    for id in &scope {
        graph.issues.clear_derived(id);
        let Some(table) = graph.tables.get(id) else {
            continue;
        };
        detect_hotspots(table, graph.source_tables.get(id), &mut graph.issues);
        detect_redundant_indexes(table, &mut graph.issues);
        let suggestions = interleave::suggestions(graph, id);
        for (column, issue) in suggestions {
            graph.issues.add_issue(id, Some(&column), issue);
        }
    }
}

/// An edit, as stored in edit scripts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditOperation {
    AddColumn {
        table: TableId,
        name: String,
        column_type: String,
        #[serde(default)]
        not_null: bool,
    },
    RemoveColumn {
        table: TableId,
        column: ColumnId,
    },
    RenameColumn {
        table: TableId,
        column: ColumnId,
        new_name: String,
    },
    ChangeColumnType {
        table: TableId,
        column: ColumnId,
        column_type: String,
    },
    SetColumnNullability {
        table: TableId,
        column: ColumnId,
        not_null: bool,
    },
    ReplacePrimaryKey {
        table: TableId,
        keys: Vec<KeySpec>,
    },
    SetParent {
        table: TableId,
        parent: TableId,
    },
    RemoveParent {
        table: TableId,
    },
    AddIndex {
        table: TableId,
        name: String,
        #[serde(default)]
        unique: bool,
        keys: Vec<IndexKey>,
    },
    DropIndex {
        table: TableId,
        index: IndexId,
    },
    AddForeignKey {
        table: TableId,
        foreign_key: ForeignKeySpec,
    },
    RenameForeignKey {
        table: TableId,
        foreign_key: ForeignKeyId,
        new_name: String,
    },
    DropForeignKey {
        table: TableId,
        foreign_key: ForeignKeyId,
    },
}

/// One conversion session: the live graph, its lock and its type resolver.
pub struct Session {
    id: Uuid,
    options: SessionOptions,
    resolver: Arc<dyn TypeResolver>,
    graph: RwLock<Arc<SchemaGraph>>,
}

impl Session {
    /// Start a session over an existing graph
    pub fn new(
        graph: SchemaGraph,
        resolver: Arc<dyn TypeResolver>,
        options: SessionOptions,
    ) -> Result<Self> {
        graph.check_invariants().map_err(SchemaError::Internal)?;
        Ok(Self {
            id: Uuid::new_v4(),
            options,
            resolver,
            graph: RwLock::new(Arc::new(graph)),
        })
    }

    /// Import a source schema and start a session over it
    pub fn import(
        tables: &[SourceTableDef],
        resolver: Arc<dyn TypeResolver>,
        options: SessionOptions,
    ) -> Result<Self> {
        let graph = SchemaGraph::from_source(
            tables,
            resolver.as_ref(),
            options.source_driver,
            options.target_dialect,
        )?;
        Self::new(graph, resolver, options)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Consistent snapshot of the current graph
    pub fn snapshot(&self) -> Arc<SchemaGraph> {
        Arc::clone(&self.graph.read())
    }

    /// Replace the whole graph, e.g. from a restored snapshot
    pub fn restore(&self, graph: SchemaGraph) -> Result<Arc<SchemaGraph>> {
        graph.check_invariants().map_err(SchemaError::Internal)?;
        let graph = Arc::new(graph);
        *self.graph.write() = Arc::clone(&graph);
        info!("Session {} restored ({} tables)", self.id, graph.tables.len());
        Ok(graph)
    }

    /// Load a new source schema, replacing the graph and restarting identifiers
    pub fn load_source(&self, tables: &[SourceTableDef]) -> Result<Arc<SchemaGraph>> {
        let graph = SchemaGraph::from_source(
            tables,
            self.resolver.as_ref(),
            self.options.source_driver,
            self.options.target_dialect,
        )?;
        let graph = Arc::new(graph);
        *self.graph.write() = Arc::clone(&graph);
        info!("Session {} reset with a new source schema", self.id);
        Ok(graph)
    }

    /// Run one edit against a staged copy and publish it if everything holds
    fn mutate<T>(
        &self,
        operation: &str,
        edit: impl FnOnce(&mut Mutation<'_>) -> Result<T>,
    ) -> Result<Applied<T>> {
        let mut guard = self.graph.write();
        let mut staged = SchemaGraph::clone(&guard);

        let (value, touched) = {
            let mut mutation = Mutation::new(&mut staged, self.resolver.as_ref());
            match edit(&mut mutation) {
                Ok(value) => (value, mutation.touched),
                Err(err) => {
                    warn!("{} rejected ({:?}): {}", operation, err.class(), err);
                    return Err(err);
                }
            }
        };

        if touched.is_empty() {
            debug!("{} made no changes", operation);
            return Ok(Applied {
                value,
                graph: Arc::clone(&guard),
            });
        }

        let touched: Vec<TableId> = touched.into_iter().collect();
        refresh_derived_issues(&mut staged, &touched);

        if self.options.verify_invariants {
            if let Err(violation) = staged.check_invariants() {
                warn!("{} discarded: {}", operation, violation);
                return Err(SchemaError::Internal(format!("{}: {}", operation, violation)));
            }
        }

        let graph = Arc::new(staged);
        *guard = Arc::clone(&graph);
        debug!("{} applied to {} table(s)", operation, touched.len());
        Ok(Applied { value, graph })
    }

    pub fn add_column(&self, table: &TableId, column: NewColumn) -> Result<Applied<ColumnId>> {
        self.mutate("add_column", |m| column::add_column(m, table, &column))
    }

    pub fn remove_column(&self, table: &TableId, column: &ColumnId) -> Result<Applied<()>> {
        self.mutate("remove_column", |m| column::remove_column(m, table, column))
    }

    pub fn rename_column(
        &self,
        table: &TableId,
        column: &ColumnId,
        new_name: &str,
    ) -> Result<Applied<()>> {
        self.mutate("rename_column", |m| {
            column::rename_column(m, table, column, new_name)
        })
    }

    pub fn change_column_type(
        &self,
        table: &TableId,
        column: &ColumnId,
        requested_type: &str,
    ) -> Result<Applied<()>> {
        self.mutate("change_column_type", |m| {
            column::change_column_type(m, table, column, requested_type)
        })
    }

    pub fn set_column_nullability(
        &self,
        table: &TableId,
        column: &ColumnId,
        not_null: bool,
    ) -> Result<Applied<()>> {
        self.mutate("set_column_nullability", |m| {
            column::set_nullability(m, table, column, not_null)
        })
    }

    pub fn replace_primary_key(&self, table: &TableId, keys: &[KeySpec]) -> Result<Applied<()>> {
        self.mutate("replace_primary_key", |m| {
            primary_key::replace_primary_key(m, table, keys)
        })
    }

    pub fn set_parent(&self, table: &TableId, parent: &TableId) -> Result<Applied<InterleaveState>> {
        self.mutate("set_parent", |m| interleave::set_parent(m, table, parent))
    }

    pub fn remove_parent(&self, table: &TableId) -> Result<Applied<ForeignKeyId>> {
        self.mutate("remove_parent", |m| interleave::remove_parent(m, table))
    }

    /// Read-only interleave analysis of `table` under `candidate_parent`
    pub fn interleave_status(
        &self,
        table: &TableId,
        candidate_parent: &TableId,
    ) -> Result<InterleaveReport> {
        let graph = self.snapshot();
        analyze_interleave(&graph, table, candidate_parent)
    }

    pub fn add_index(&self, table: &TableId, index: IndexSpec) -> Result<Applied<IndexId>> {
        self.mutate("add_index", |m| index::add_index(m, table, &index))
    }

    pub fn drop_index(&self, table: &TableId, index: &IndexId) -> Result<Applied<()>> {
        self.mutate("drop_index", |m| index::drop_index(m, table, index))
    }

    pub fn add_foreign_key(
        &self,
        table: &TableId,
        foreign_key: ForeignKeySpec,
    ) -> Result<Applied<ForeignKeyId>> {
        self.mutate("add_foreign_key", |m| {
            foreign_key::add_foreign_key(m, table, &foreign_key)
        })
    }

    pub fn rename_foreign_key(
        &self,
        table: &TableId,
        foreign_key: &ForeignKeyId,
        new_name: &str,
    ) -> Result<Applied<()>> {
        self.mutate("rename_foreign_key", |m| {
            foreign_key::rename_foreign_key(m, table, foreign_key, new_name)
        })
    }

    pub fn drop_foreign_key(
        &self,
        table: &TableId,
        foreign_key: &ForeignKeyId,
    ) -> Result<Applied<()>> {
        self.mutate("drop_foreign_key", |m| {
            foreign_key::drop_foreign_key(m, table, foreign_key)
        })
    }

    /// Apply a scripted edit
    pub fn apply(&self, operation: &EditOperation) -> Result<Arc<SchemaGraph>> {
        let graph = match operation {
            EditOperation::AddColumn {
                table,
                name,
                column_type,
                not_null,
            } => {
                let column = NewColumn {
                    name: name.clone(),
                    column_type: column_type.clone(),
                    not_null: *not_null,
                };
                self.add_column(table, column)?.graph
            }
            EditOperation::RemoveColumn { table, column } => {
                self.remove_column(table, column)?.graph
            }
            EditOperation::RenameColumn {
                table,
                column,
                new_name,
            } => self.rename_column(table, column, new_name)?.graph,
            EditOperation::ChangeColumnType {
                table,
                column,
                column_type,
            } => self.change_column_type(table, column, column_type)?.graph,
            EditOperation::SetColumnNullability {
                table,
                column,
                not_null,
            } => self.set_column_nullability(table, column, *not_null)?.graph,
            EditOperation::ReplacePrimaryKey { table, keys } => {
                self.replace_primary_key(table, keys)?.graph
            }
            EditOperation::SetParent { table, parent } => self.set_parent(table, parent)?.graph,
            EditOperation::RemoveParent { table } => self.remove_parent(table)?.graph,
            EditOperation::AddIndex {
                table,
                name,
                unique,
                keys,
            } => {
                let index = IndexSpec {
                    name: name.clone(),
                    unique: *unique,
                    keys: keys.clone(),
                };
                self.add_index(table, index)?.graph
            }
            EditOperation::DropIndex { table, index } => self.drop_index(table, index)?.graph,
            EditOperation::AddForeignKey { table, foreign_key } => {
                self.add_foreign_key(table, foreign_key.clone())?.graph
            }
            EditOperation::RenameForeignKey {
                table,
                foreign_key,
                new_name,
            } => self.rename_foreign_key(table, foreign_key, new_name)?.graph,
            EditOperation::DropForeignKey { table, foreign_key } => {
                self.drop_foreign_key(table, foreign_key)?.graph
            }
        };
        Ok(graph)
    }
}
