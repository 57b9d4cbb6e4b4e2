//! The schema graph aggregate
//!
//! Holds the source mirror, the editable target tables, the name
//! cross-reference maps between them, the synthetic-key registry and the
//! issue registry. Lookups return typed errors so engine operations can
//! validate with `?` before touching anything.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::ids::{ColumnId, IdAllocator, TableId};
use crate::issues::IssueRegistry;
use crate::types::{Driver, TargetDialect};
use crate::util::{eq_ci, name_key};

use super::{Column, SourceColumn, SourceTable, Table};

/// Target → source names for one table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLink {
    pub source_table: String,
    /// Target column name → source column name (`None` for columns with no source)
    pub columns: BTreeMap<String, Option<String>>,
}

/// Source → target names for one table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetLink {
    pub target_table: String,
    /// Source column name → target column name
    pub columns: BTreeMap<String, String>,
}

/// Bidirectional name maps between source and target, keyed by table id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossReference {
    pub to_source: BTreeMap<TableId, SourceLink>,
    pub to_target: BTreeMap<TableId, TargetLink>,
}

impl CrossReference {
    pub fn link_table(&mut self, table: &TableId, source_name: &str, target_name: &str) {
        self.to_source.insert(
            table.clone(),
            SourceLink {
                source_table: source_name.to_string(),
                columns: BTreeMap::new(),
            },
        );
        self.to_target.insert(
            table.clone(),
            TargetLink {
                target_table: target_name.to_string(),
                columns: BTreeMap::new(),
            },
        );
    }

    pub fn link_column(&mut self, table: &TableId, target_name: &str, source_name: Option<&str>) {
        self.to_source
            .entry(table.clone())
            .or_default()
            .columns
            .insert(target_name.to_string(), source_name.map(str::to_string));
        if let Some(source_name) = source_name {
            self.to_target
                .entry(table.clone())
                .or_default()
                .columns
                .insert(source_name.to_string(), target_name.to_string());
        }
    }

    /// Move the entry for a renamed target column, both directions in one step
    pub fn rename_target_column(&mut self, table: &TableId, old_name: &str, new_name: &str) {
        let Some(link) = self.to_source.get_mut(table) else {
            return;
        };
        let Some(source_name) = link.columns.remove(old_name) else {
            return;
        };
        link.columns
            .insert(new_name.to_string(), source_name.clone());
        if let Some(source_name) = source_name {
            if let Some(back) = self.to_target.get_mut(table) {
                back.columns.insert(source_name, new_name.to_string());
            }
        }
    }

    pub fn unlink_target_column(&mut self, table: &TableId, target_name: &str) {
        let source_name = self
            .to_source
            .get_mut(table)
            .and_then(|link| link.columns.remove(target_name))
            .flatten();
        if let Some(source_name) = source_name {
            if let Some(back) = self.to_target.get_mut(table) {
                back.columns.remove(&source_name);
            }
        }
    }

    /// Source column name a target column was derived from
    pub fn source_name(&self, table: &TableId, target_name: &str) -> Option<&str> {
        self.to_source
            .get(table)
            .and_then(|link| link.columns.get(target_name))
            .and_then(|name| name.as_deref())
    }

    /// Target column name a source column maps to
    pub fn target_name(&self, table: &TableId, source_name: &str) -> Option<&str> {
        self.to_target
            .get(table)
            .and_then(|link| link.columns.get(source_name))
            .map(String::as_str)
    }
}

/// The whole editable schema of one conversion session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaGraph {
    pub source_driver: Driver,
    pub target_dialect: TargetDialect,
    pub ids: IdAllocator,
    pub source_tables: BTreeMap<TableId, SourceTable>,
    pub tables: BTreeMap<TableId, Table>,
    pub xref: CrossReference,
    /// Tables whose primary key was generated, with the generated column
    #[serde(default)]
    pub synthetic_keys: BTreeMap<TableId, ColumnId>,
    #[serde(default)]
    pub issues: IssueRegistry,
}

impl SchemaGraph {
    pub fn new(source_driver: Driver, target_dialect: TargetDialect) -> Self {
        Self {
            source_driver,
            target_dialect,
            ids: IdAllocator::new(),
            source_tables: BTreeMap::new(),
            tables: BTreeMap::new(),
            xref: CrossReference::default(),
            synthetic_keys: BTreeMap::new(),
            issues: IssueRegistry::new(),
        }
    }

    pub fn table(&self, id: &TableId) -> Result<&Table> {
        self.tables
            .get(id)
            .ok_or_else(|| SchemaError::UnknownTable(id.clone()))
    }

    pub fn table_mut(&mut self, id: &TableId) -> Result<&mut Table> {
        self.tables
            .get_mut(id)
            .ok_or_else(|| SchemaError::UnknownTable(id.clone()))
    }

    pub fn table_by_name(&self, name: &str) -> Option<&Table> {
        self.tables.values().find(|t| eq_ci(&t.name, name))
    }

    pub fn column(&self, table: &TableId, column: &ColumnId) -> Result<&Column> {
        self.table(table)?
            .columns
            .get(column)
            .ok_or_else(|| SchemaError::UnknownColumn {
                table: table.clone(),
                column: column.clone(),
            })
    }

    pub fn column_mut(&mut self, table: &TableId, column: &ColumnId) -> Result<&mut Column> {
        self.table_mut(table)?
            .columns
            .get_mut(column)
            .ok_or_else(|| SchemaError::UnknownColumn {
                table: table.clone(),
                column: column.clone(),
            })
    }

    /// The source column a target column was derived from, if any
    pub fn source_column(&self, table: &TableId, column: &ColumnId) -> Option<&SourceColumn> {
        self.source_tables
            .get(table)
            .and_then(|source| source.columns.get(column))
    }

    /// Tables interleaved directly in `parent`
    pub fn children_of(&self, parent: &TableId) -> Vec<&Table> {
        self.tables
            .values()
            .filter(|t| t.parent_id.as_ref() == Some(parent))
            .collect()
    }

    /// Ancestors of a table, nearest first
    pub fn ancestors(&self, table: &TableId) -> Vec<TableId> {
        let mut chain = Vec::new();
        let mut current = self.tables.get(table).and_then(|t| t.parent_id.clone());
        while let Some(id) = current {
            if chain.contains(&id) {
                break;
            }
            current = self.tables.get(&id).and_then(|t| t.parent_id.clone());
            chain.push(id);
        }
        chain
    }

    /// Whether `name` is taken by any table, index or foreign key
    pub fn is_global_name_used(&self, name: &str) -> bool {
        self.tables.values().any(|t| {
            eq_ci(&t.name, name)
                || t.indexes.iter().any(|i| eq_ci(&i.name, name))
                || t.foreign_keys.iter().any(|fk| eq_ci(&fk.name, name))
        })
    }

    /// Whether `name` is taken by a column of `table` other than `except`
    pub fn is_column_name_used(&self, table: &Table, name: &str, except: Option<&ColumnId>) -> bool {
        table
            .columns
            .values()
            .any(|c| Some(&c.id) != except && eq_ci(&c.name, name))
    }

    /// Derive a name that is free in the global namespace from `base`
    pub fn unique_global_name(&self, base: &str) -> String {
        if !self.is_global_name_used(base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| !self.is_global_name_used(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Check every structural invariant of the graph.
    ///
    /// Returns a description of the first violation found.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        for (id, table) in &self.tables {
            if &table.id != id {
                return Err(format!("table {} is stored under key {}", table.id, id));
            }
            self.check_table(table)?;
        }

        for table in self.issues.entries().map(|(t, _)| t) {
            if !self.tables.contains_key(table) {
                return Err(format!("issue registry references unknown table {}", table));
            }
        }
        for (table, issues) in self.issues.entries() {
            for column in issues.columns.keys() {
                if self.column(table, column).is_err() {
                    return Err(format!(
                        "issue registry references unknown column {} in {}",
                        column, table
                    ));
                }
            }
        }

        for (table, column) in &self.synthetic_keys {
            if self.column(table, column).is_err() {
                return Err(format!(
                    "synthetic key {} of table {} does not exist",
                    column, table
                ));
            }
        }

        self.check_cross_reference()
    }

    fn check_table(&self, table: &Table) -> std::result::Result<(), String> {
        let ordered: HashSet<&ColumnId> = table.column_order.iter().collect();
        if ordered.len() != table.column_order.len() {
            return Err(format!("table {} lists a column twice", table.name));
        }
        if ordered.len() != table.columns.len()
            || table.columns.keys().any(|id| !ordered.contains(id))
        {
            return Err(format!(
                "column order of table {} does not match its columns",
                table.name
            ));
        }
        for (id, column) in &table.columns {
            if &column.id != id {
                return Err(format!("column {} is stored under key {}", column.id, id));
            }
        }
        let mut names = HashSet::new();
        for column in table.columns.values() {
            if !names.insert(name_key(&column.name)) {
                return Err(format!(
                    "table {} has two columns named {}",
                    table.name, column.name
                ));
            }
        }

        let mut orders = HashSet::new();
        for pk in &table.primary_key {
            if !table.columns.contains_key(&pk.column_id) {
                return Err(format!(
                    "primary key of {} references unknown column {}",
                    table.name, pk.column_id
                ));
            }
            if !orders.insert(pk.order) {
                return Err(format!(
                    "primary key of {} repeats order {}",
                    table.name, pk.order
                ));
            }
        }

        for index in &table.indexes {
            if index.keys.is_empty() {
                return Err(format!("index {} has no key columns", index.name));
            }
            if let Some(key) = index
                .keys
                .iter()
                .find(|k| !table.columns.contains_key(&k.column_id))
            {
                return Err(format!(
                    "index {} references unknown column {}",
                    index.name, key.column_id
                ));
            }
        }

        for fk in &table.foreign_keys {
            if fk.columns.is_empty() || fk.columns.len() != fk.referenced_columns.len() {
                return Err(format!("foreign key {} has mismatched arity", fk.name));
            }
            if let Some(column) = fk
                .columns
                .iter()
                .find(|c| !table.columns.contains_key(*c))
            {
                return Err(format!(
                    "foreign key {} references unknown local column {}",
                    fk.name, column
                ));
            }
            let referenced = self.tables.get(&fk.referenced_table).ok_or_else(|| {
                format!(
                    "foreign key {} references unknown table {}",
                    fk.name, fk.referenced_table
                )
            })?;
            if let Some(column) = fk
                .referenced_columns
                .iter()
                .find(|c| !referenced.columns.contains_key(*c))
            {
                return Err(format!(
                    "foreign key {} references unknown column {} of {}",
                    fk.name, column, referenced.name
                ));
            }
        }

        if let Some(parent_id) = &table.parent_id {
            let parent = self
                .tables
                .get(parent_id)
                .ok_or_else(|| format!("table {} has unknown parent {}", table.name, parent_id))?;
            if self.ancestors(&table.id).contains(&table.id) {
                return Err(format!("table {} is its own ancestor", table.name));
            }
            check_interleave_prefix(parent, table)?;
        }
        Ok(())
    }

    fn check_cross_reference(&self) -> std::result::Result<(), String> {
        for (id, table) in &self.tables {
            let link = self
                .xref
                .to_source
                .get(id)
                .ok_or_else(|| format!("table {} has no cross-reference entry", table.name))?;
            if link.columns.len() != table.columns.len() {
                return Err(format!(
                    "cross-reference of {} has {} entries for {} columns",
                    table.name,
                    link.columns.len(),
                    table.columns.len()
                ));
            }
            for column in table.columns.values() {
                let source_name = link.columns.get(&column.name).ok_or_else(|| {
                    format!(
                        "column {}.{} has no cross-reference entry",
                        table.name, column.name
                    )
                })?;
                if let Some(source_name) = source_name {
                    let source_exists = self
                        .source_tables
                        .get(id)
                        .and_then(|s| s.column_by_name(source_name))
                        .is_some();
                    if !source_exists {
                        return Err(format!(
                            "column {}.{} maps to unknown source column {}",
                            table.name, column.name, source_name
                        ));
                    }
                    if self.xref.target_name(id, source_name) != Some(column.name.as_str()) {
                        return Err(format!(
                            "cross-reference maps for {}.{} are not inverses",
                            table.name, column.name
                        ));
                    }
                }
            }
        }

        for (id, back) in &self.xref.to_target {
            for (source_name, target_name) in &back.columns {
                if self.xref.source_name(id, target_name) != Some(source_name.as_str()) {
                    return Err(format!(
                        "source column {} maps to {} which does not map back",
                        source_name, target_name
                    ));
                }
            }
        }
        for id in self.xref.to_source.keys() {
            if !self.tables.contains_key(id) {
                return Err(format!("cross-reference names unknown table {}", id));
            }
        }
        Ok(())
    }
}

/// The leading key columns of parent and child must agree in name, base type and length.
fn check_interleave_prefix(parent: &Table, child: &Table) -> std::result::Result<(), String> {
    let parent_key = parent
        .first_key_column()
        .and_then(|pk| parent.columns.get(&pk.column_id))
        .ok_or_else(|| format!("parent {} has no primary key", parent.name))?;
    let child_key = child
        .first_key_column()
        .and_then(|pk| child.columns.get(&pk.column_id))
        .ok_or_else(|| format!("child {} has no primary key", child.name))?;
    if !eq_ci(&parent_key.name, &child_key.name) || parent_key.column_type != child_key.column_type
    {
        return Err(format!(
            "leading key {}.{} ({}) does not match {}.{} ({})",
            child.name,
            child_key.name,
            child_key.column_type,
            parent.name,
            parent_key.name,
            parent_key.column_type
        ));
    }
    Ok(())
}
