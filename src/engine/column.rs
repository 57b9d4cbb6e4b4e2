//! Column edits: add, remove, rename, retype, nullability
//!
//! Renames cascade through interleaved parents and children so the shared key
//! columns keep matching names. Type changes cascade through foreign keys so
//! linked columns keep matching types; a type or nullability change on a
//! shared interleave key is refused until the relationship is removed.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::ids::{ColumnId, TableId};
use crate::issues::IssueKind;
use crate::model::{Column, SchemaGraph, Table};
use crate::types::ColumnType;
use crate::util::{check_identifier, eq_ci};

use super::Mutation;

/// Parameters of a new column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewColumn {
    pub name: String,
    pub column_type: String,
    #[serde(default)]
    pub not_null: bool,
}

pub(crate) fn add_column(m: &mut Mutation<'_>, table_id: &TableId, spec: &NewColumn) -> Result<ColumnId> {
    let table = m.graph.table(table_id)?;
    validate_new_name(m.graph, table_id, None, &spec.name)?;
    let resolution = m.resolve(table_id, None, Some(&spec.column_type))?;
    let table_name = table.name.clone();

    let column_id = m.graph.ids.column_id();
    let column = Column {
        id: column_id.clone(),
        name: spec.name.clone(),
        column_type: resolution.column_type,
        not_null: spec.not_null,
        comment: String::new(),
        options: Default::default(),
    };
    let table = m.graph.table_mut(table_id)?;
    table.column_order.push(column_id.clone());
    table.columns.insert(column_id.clone(), column);
    m.graph.xref.link_column(table_id, &spec.name, None);
    m.graph
        .issues
        .replace_type_issues(table_id, &column_id, &resolution.issues);
    m.touch(table_id);

    debug!("Added column {}.{} ({})", table_name, spec.name, column_id);
    Ok(column_id)
}

pub(crate) fn remove_column(m: &mut Mutation<'_>, table_id: &TableId, column_id: &ColumnId) -> Result<()> {
    let column = m.graph.column(table_id, column_id)?;
    let table = m.graph.table(table_id)?;
    let column_name = column.name.clone();

    if let Some(link) = interleave_link(m.graph, table_id, column_id) {
        return Err(link.conflict(m.graph, "remove", table_id, &column_name));
    }
    if table.is_key_column(column_id) && table.primary_key.len() == 1 {
        return Err(SchemaError::LastPrimaryKeyColumn {
            table: table.name.clone(),
            column: column_name,
        });
    }

    let table = m.graph.table_mut(table_id)?;
    table.column_order.retain(|id| id != column_id);
    table.columns.remove(column_id);
    table.primary_key.retain(|pk| &pk.column_id != column_id);
    for index in &mut table.indexes {
        index.keys.retain(|key| &key.column_id != column_id);
    }
    table.indexes.retain(|index| !index.keys.is_empty());

    // Foreign keys anywhere that use the column, locally or as referenced column
    let mut linked_tables = Vec::new();
    for table in m.graph.tables.values_mut() {
        let owner = table.id.clone();
        let mut changed = false;
        table.foreign_keys.retain_mut(|fk| {
            let referenced_here = &fk.referenced_table == table_id;
            let local_here = &owner == table_id;
            let touches = (local_here && fk.columns.contains(column_id))
                || (referenced_here && fk.referenced_columns.contains(column_id));
            if !touches {
                return true;
            }
            changed = true;
            let empty = fk.remove_pairs(|local, referenced| {
                (local_here && local == column_id) || (referenced_here && referenced == column_id)
            });
            !empty
        });
        if changed {
            linked_tables.push(owner);
        }
    }

    m.graph.xref.unlink_target_column(table_id, &column_name);
    m.graph.issues.remove_column(table_id, column_id);
    if m.graph.synthetic_keys.get(table_id) == Some(column_id) {
        m.graph.synthetic_keys.remove(table_id);
        m.graph
            .issues
            .remove_issue(table_id, None, IssueKind::MissingPrimaryKey);
    }

    m.touch(table_id);
    for id in &linked_tables {
        m.touch(id);
    }
    debug!(
        "Removed column {} from {} ({} linked table(s))",
        column_name,
        table_id,
        linked_tables.len()
    );
    Ok(())
}

pub(crate) fn rename_column(
    m: &mut Mutation<'_>,
    table_id: &TableId,
    column_id: &ColumnId,
    new_name: &str,
) -> Result<()> {
    let column = m.graph.column(table_id, column_id)?;
    if column.name == new_name {
        return Ok(());
    }

    let cascade = interleave_cascade(m.graph, table_id, column_id);
    for (table, column) in &cascade {
        validate_new_name(m.graph, table, Some(column), new_name)?;
    }

    for (table, column) in &cascade {
        let column = m.graph.column_mut(table, column)?;
        let old_name = std::mem::replace(&mut column.name, new_name.to_string());
        m.graph.xref.rename_target_column(table, &old_name, new_name);
        m.touch(table);
    }
    debug!(
        "Renamed column {} of {} to {} ({} column(s) in cascade)",
        column_id,
        table_id,
        new_name,
        cascade.len()
    );
    Ok(())
}

pub(crate) fn change_column_type(
    m: &mut Mutation<'_>,
    table_id: &TableId,
    column_id: &ColumnId,
    requested: &str,
) -> Result<()> {
    let column = m.graph.column(table_id, column_id)?;
    let column_name = column.name.clone();
    let current = column.column_type;
    let resolution = m.resolve(table_id, Some(column_id), Some(requested))?;
    if resolution.column_type == current {
        return Ok(());
    }

    let cascade = foreign_key_cascade(m.graph, table_id, column_id);
    let mut updates = Vec::with_capacity(cascade.len());
    for (table, column) in &cascade {
        let resolution = if table == table_id && column == column_id {
            resolution.clone()
        } else {
            m.resolve(table, Some(column), Some(requested))?
        };
        let existing = m.graph.column(table, column)?;
        if resolution.column_type == existing.column_type {
            continue;
        }
        if let Some(link) = interleave_link(m.graph, table, column) {
            let name = existing.name.clone();
            return Err(link.conflict(m.graph, "change the type of", table, &name));
        }
        check_keyable(m.graph, table, column, &resolution.column_type, "change the type of")?;
        updates.push((table.clone(), column.clone(), resolution));
    }

    for (table, column, resolution) in &updates {
        m.graph.column_mut(table, column)?.column_type = resolution.column_type;
        m.graph
            .issues
            .replace_type_issues(table, column, &resolution.issues);
        m.touch(table);
    }
    debug!(
        "Changed type of {}.{} from {} to {} ({} column(s) updated)",
        table_id,
        column_name,
        current,
        resolution.column_type,
        updates.len()
    );
    Ok(())
}

pub(crate) fn set_nullability(
    m: &mut Mutation<'_>,
    table_id: &TableId,
    column_id: &ColumnId,
    not_null: bool,
) -> Result<()> {
    let column = m.graph.column(table_id, column_id)?;
    if column.not_null == not_null {
        return Ok(());
    }
    if let Some(link) = interleave_link(m.graph, table_id, column_id) {
        let name = column.name.clone();
        return Err(link.conflict(m.graph, "change the nullability of", table_id, &name));
    }
    m.graph.column_mut(table_id, column_id)?.not_null = not_null;
    m.touch(table_id);
    Ok(())
}

/// A new column name must be a valid identifier, free among the table's other
/// columns and free in the table/index/foreign-key namespace. A column may
/// always take back the name it was imported with.
fn validate_new_name(
    graph: &SchemaGraph,
    table_id: &TableId,
    column: Option<&ColumnId>,
    name: &str,
) -> Result<()> {
    check_identifier(name).map_err(|reason| SchemaError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    })?;
    let table = graph.table(table_id)?;
    let own_source_name = column
        .and_then(|id| graph.source_tables.get(table_id)?.columns.get(id))
        .is_some_and(|source| eq_ci(&source.name, name));
    if graph.is_column_name_used(table, name, column)
        || (!own_source_name && graph.is_global_name_used(name))
    {
        return Err(SchemaError::DuplicateName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// JSON and array types cannot stay in a primary key or index
pub(crate) fn check_keyable(
    graph: &SchemaGraph,
    table_id: &TableId,
    column_id: &ColumnId,
    column_type: &ColumnType,
    action: &str,
) -> Result<()> {
    if column_type.is_keyable() {
        return Ok(());
    }
    let table = graph.table(table_id)?;
    let column = graph.column(table_id, column_id)?;
    let relationship = if table.is_key_column(column_id) {
        Some("the primary key".to_string())
    } else {
        table
            .indexes
            .iter()
            .find(|index| index.keys.iter().any(|k| &k.column_id == column_id))
            .map(|index| format!("index {}", index.name))
    };
    match relationship {
        Some(relationship) => Err(SchemaError::RelationshipConflict {
            action: action.to_string(),
            table: table.name.clone(),
            column: column.name.clone(),
            relationship,
        }),
        None => Ok(()),
    }
}

/// Role of the related table in an interleave relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Relationship {
    Parent,
    Child,
}

impl Relationship {
    pub fn label(self) -> &'static str {
        match self {
            Relationship::Parent => "parent",
            Relationship::Child => "child",
        }
    }
}

/// The interleaved table sharing a key column with the column being edited
pub(crate) struct InterleaveLink {
    pub related: TableId,
    pub relationship: Relationship,
    /// Name of the shared key column on the related table
    pub related_column: String,
}

impl InterleaveLink {
    pub fn conflict(&self, graph: &SchemaGraph, action: &str, table: &TableId, column: &str) -> SchemaError {
        let name_of = |id: &TableId| {
            graph
                .tables
                .get(id)
                .map(|t| t.name.clone())
                .unwrap_or_else(|| id.to_string())
        };
        SchemaError::InterleaveConflict {
            action: action.to_string(),
            table: name_of(table),
            column: column.to_string(),
            relationship: self.relationship.label().to_string(),
            related: name_of(&self.related),
            related_column: self.related_column.clone(),
        }
    }
}

/// Find a parent or child table sharing this key column, children first.
pub(crate) fn interleave_link(
    graph: &SchemaGraph,
    table_id: &TableId,
    column_id: &ColumnId,
) -> Option<InterleaveLink> {
    let table = graph.tables.get(table_id)?;
    let column = table.columns.get(column_id)?;
    if !table.is_key_column(column_id) {
        return None;
    }
    let is_first = table.is_first_key_column(column_id);

    for child in graph.children_of(table_id) {
        if let Some(related_column) = shared_key_column(child, is_first, &column.name) {
            return Some(InterleaveLink {
                related: child.id.clone(),
                relationship: Relationship::Child,
                related_column,
            });
        }
    }
    if let Some(parent_id) = &table.parent_id {
        let parent = graph.tables.get(parent_id)?;
        if let Some(related_column) = shared_key_column(parent, is_first, &column.name) {
            return Some(InterleaveLink {
                related: parent_id.clone(),
                relationship: Relationship::Parent,
                related_column,
            });
        }
    }
    None
}

/// The key column of `other` matching a key column called `name`. A leading
/// key column always pairs with the other table's leading key column.
fn shared_key_column(other: &Table, is_first: bool, name: &str) -> Option<String> {
    if let Some(column) = other.key_column_by_name(name) {
        return Some(column.name.clone());
    }
    if !is_first {
        return None;
    }
    other
        .first_key_column()
        .and_then(|pk| other.columns.get(&pk.column_id))
        .map(|c| c.name.clone())
}

/// The column plus every key column it shares by name with interleaved
/// parents and children, transitively.
pub(crate) fn interleave_cascade(
    graph: &SchemaGraph,
    table_id: &TableId,
    column_id: &ColumnId,
) -> Vec<(TableId, ColumnId)> {
    let mut seen = BTreeSet::new();
    let mut order = Vec::new();
    let mut queue = VecDeque::from([(table_id.clone(), column_id.clone())]);

    while let Some((table_id, column_id)) = queue.pop_front() {
        if !seen.insert((table_id.clone(), column_id.clone())) {
            continue;
        }
        order.push((table_id.clone(), column_id.clone()));

        let Some(table) = graph.tables.get(&table_id) else {
            continue;
        };
        let Some(column) = table.columns.get(&column_id) else {
            continue;
        };
        if !table.is_key_column(&column_id) {
            continue;
        }

        let mut related: Vec<&Table> = graph.children_of(&table_id);
        if let Some(parent) = table.parent_id.as_ref().and_then(|p| graph.tables.get(p)) {
            related.push(parent);
        }
        for other in related {
            if let Some(shared) = other.key_column_by_name(&column.name) {
                queue.push_back((other.id.clone(), shared.id.clone()));
            }
        }
    }
    order
}

/// The column plus every column linked to it through foreign keys, in either
/// direction, transitively.
pub(crate) fn foreign_key_cascade(
    graph: &SchemaGraph,
    table_id: &TableId,
    column_id: &ColumnId,
) -> Vec<(TableId, ColumnId)> {
    let mut seen = BTreeSet::new();
    let mut order = Vec::new();
    let mut queue = VecDeque::from([(table_id.clone(), column_id.clone())]);

    while let Some((table_id, column_id)) = queue.pop_front() {
        if !seen.insert((table_id.clone(), column_id.clone())) {
            continue;
        }
        order.push((table_id.clone(), column_id.clone()));

        for table in graph.tables.values() {
            for fk in &table.foreign_keys {
                for (local, referenced) in fk.columns.iter().zip(&fk.referenced_columns) {
                    if table.id == table_id && local == &column_id {
                        queue.push_back((fk.referenced_table.clone(), referenced.clone()));
                    }
                    if fk.referenced_table == table_id && referenced == &column_id {
                        queue.push_back((table.id.clone(), local.clone()));
                    }
                }
            }
        }
    }
    order
}
