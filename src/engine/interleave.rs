//! Interleave (parent-child) analysis and edits
//!
//! A table can be interleaved in a candidate parent when the parent has a
//! natural primary key, one of the table's foreign keys references the
//! parent's leading key column, and the table's own leading key column is that
//! foreign-key column with the same name, base type and length. Promotion
//! turns the foreign key into the parent pointer; demotion turns the parent
//! pointer back into an equivalent foreign key.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SchemaError};
use crate::ids::{ColumnId, ForeignKeyId, TableId};
use crate::issues::IssueKind;
use crate::model::{ForeignKey, SchemaGraph, Table};
use crate::util::{check_identifier, eq_ci, MAX_IDENTIFIER_LENGTH};

use super::Mutation;

/// Interleave state of a table relative to a candidate parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterleaveState {
    NotInterleaved,
    CandidateParent {
        parent: TableId,
        foreign_key: ForeignKeyId,
    },
    Interleaved {
        parent: TableId,
    },
}

/// Outcome of an interleave analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterleaveReport {
    pub table: TableId,
    pub parent: TableId,
    pub state: InterleaveState,
    /// The table's column that references the parent's leading key column
    pub column: Option<ColumnId>,
    /// Corrective issues that would make the table eligible
    pub issues: Vec<IssueKind>,
    /// Why the table cannot be interleaved, when it cannot
    pub reason: Option<String>,
}

impl InterleaveReport {
    pub fn is_possible(&self) -> bool {
        !matches!(self.state, InterleaveState::NotInterleaved)
    }
}

/// Analyze whether `table_id` can be interleaved in `parent_id`.
pub fn analyze_interleave(
    graph: &SchemaGraph,
    table_id: &TableId,
    parent_id: &TableId,
) -> Result<InterleaveReport> {
    let table = graph.table(table_id)?;
    let parent = graph.table(parent_id)?;

    let mut report = InterleaveReport {
        table: table_id.clone(),
        parent: parent_id.clone(),
        state: InterleaveState::NotInterleaved,
        column: None,
        issues: Vec::new(),
        reason: None,
    };

    if table.parent_id.as_ref() == Some(parent_id) {
        report.state = InterleaveState::Interleaved {
            parent: parent_id.clone(),
        };
        return Ok(report);
    }
    let blocked = |mut report: InterleaveReport, reason: String| {
        report.reason = Some(reason);
        Ok(report)
    };

    if table_id == parent_id {
        return blocked(report, "a table cannot be interleaved in itself".to_string());
    }
    if let Some(current) = &table.parent_id {
        let current = graph
            .tables
            .get(current)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| current.to_string());
        return blocked(report, format!("already interleaved in {}", current));
    }
    if graph.ancestors(parent_id).contains(table_id) {
        return blocked(report, format!("{} is interleaved in {}", parent.name, table.name));
    }
    if graph.synthetic_keys.contains_key(parent_id) {
        return blocked(report, format!("{} has a synthetic primary key", parent.name));
    }

    let Some((fk, local)) = referencing_foreign_key(table, parent) else {
        return blocked(
            report,
            format!(
                "no foreign key references the leading primary key column of {}",
                parent.name
            ),
        );
    };
    report.column = Some(local.clone());

    let issues = prefix_issues(table, parent, &local);
    match issues {
        Ok(issues) if issues.is_empty() => {
            report.state = InterleaveState::CandidateParent {
                parent: parent_id.clone(),
                foreign_key: fk.id.clone(),
            };
            Ok(report)
        }
        Ok(issues) => {
            report.reason = Some(format!(
                "{} needs: {}",
                table.name,
                issues
                    .iter()
                    .map(|i| i.description())
                    .collect::<Vec<_>>()
                    .join("; ")
            ));
            report.issues = issues;
            Ok(report)
        }
        Err(reason) => blocked(report, reason),
    }
}

/// The foreign key of `table` referencing `parent`'s leading key column, and the local column
fn referencing_foreign_key<'t>(table: &'t Table, parent: &Table) -> Option<(&'t ForeignKey, ColumnId)> {
    let parent_first = parent.first_key_column()?;
    table
        .foreign_keys
        .iter()
        .filter(|fk| fk.referenced_table == parent.id)
        .find_map(|fk| {
            fk.referenced_columns
                .iter()
                .position(|c| c == &parent_first.column_id)
                .map(|position| (fk, fk.columns[position].clone()))
        })
}

/// Corrective issues keeping `local` from being a valid interleave prefix.
/// `Err` when the mismatch cannot be fixed by a rename, resize or key change.
fn prefix_issues(table: &Table, parent: &Table, local: &ColumnId) -> std::result::Result<Vec<IssueKind>, String> {
    let parent_key = parent
        .first_key_column()
        .and_then(|pk| parent.columns.get(&pk.column_id))
        .ok_or_else(|| format!("{} has no primary key", parent.name))?;
    let column = table
        .columns
        .get(local)
        .ok_or_else(|| format!("{} has no column {}", table.name, local))?;

    if column.column_type.name != parent_key.column_type.name
        || column.column_type.is_array != parent_key.column_type.is_array
    {
        return Err(format!(
            "{}.{} is {} but {}.{} is {}",
            table.name,
            column.name,
            column.column_type,
            parent.name,
            parent_key.name,
            parent_key.column_type
        ));
    }

    let mut issues = Vec::new();
    if table.is_first_key_column(local) {
        if !eq_ci(&column.name, &parent_key.name) {
            issues.push(IssueKind::InterleaveRenameColumn);
        }
        if column.column_type.len != parent_key.column_type.len {
            issues.push(IssueKind::InterleaveChangeColumnSize);
        }
    } else if table.is_key_column(local) {
        issues.push(IssueKind::InterleaveOrderMismatch);
    } else {
        issues.push(IssueKind::InterleaveAddColumn);
    }
    Ok(issues)
}

/// Interleave suggestions for a table that is not interleaved yet: one entry
/// per foreign-key column referencing a candidate parent's leading key.
pub(crate) fn suggestions(graph: &SchemaGraph, table_id: &TableId) -> Vec<(ColumnId, IssueKind)> {
    let Some(table) = graph.tables.get(table_id) else {
        return Vec::new();
    };
    if table.parent_id.is_some() {
        return Vec::new();
    }

    let mut out = Vec::new();
    let mut parents: Vec<&TableId> = table.foreign_keys.iter().map(|fk| &fk.referenced_table).collect();
    parents.sort();
    parents.dedup();
    for parent_id in parents {
        let Ok(report) = analyze_interleave(graph, table_id, parent_id) else {
            continue;
        };
        let Some(column) = report.column else {
            continue;
        };
        if report.reason.is_some() && report.issues.is_empty() {
            continue;
        }
        if report.issues.is_empty() {
            out.push((column, IssueKind::InterleaveEligible));
        } else {
            out.extend(report.issues.into_iter().map(|issue| (column.clone(), issue)));
        }
    }
    out
}

pub(crate) fn set_parent(m: &mut Mutation<'_>, table_id: &TableId, parent_id: &TableId) -> Result<InterleaveState> {
    let table = m.graph.table(table_id)?;
    let parent = m.graph.table(parent_id)?;
    let invalid = if table_id == parent_id {
        Some("a table cannot be interleaved in itself".to_string())
    } else if m.graph.ancestors(parent_id).contains(table_id) {
        Some(format!("{} is interleaved in {}", parent.name, table.name))
    } else {
        match &table.parent_id {
            Some(current) if current != parent_id => Some(format!("already interleaved in {}", current)),
            _ => None,
        }
    };
    if let Some(reason) = invalid {
        return Err(SchemaError::InvalidParent {
            table: table.name.clone(),
            parent: parent.name.clone(),
            reason,
        });
    }

    let report = analyze_interleave(m.graph, table_id, parent_id)?;
    let foreign_key = match report.state {
        InterleaveState::Interleaved { parent } => return Ok(InterleaveState::Interleaved { parent }),
        InterleaveState::CandidateParent { foreign_key, .. } => foreign_key,
        InterleaveState::NotInterleaved => {
            let table = m.graph.table(table_id)?;
            let parent = m.graph.table(parent_id)?;
            return Err(SchemaError::InterleaveNotPossible {
                table: table.name.clone(),
                parent: parent.name.clone(),
                reason: report.reason.unwrap_or_default(),
            });
        }
    };

    let table = m.graph.table_mut(table_id)?;
    table.foreign_keys.retain(|fk| fk.id != foreign_key);
    table.parent_id = Some(parent_id.clone());
    let table_name = table.name.clone();
    m.touch(table_id);
    m.touch(parent_id);

    info!("Interleaved {} in {}", table_name, parent_id);
    Ok(InterleaveState::Interleaved {
        parent: parent_id.clone(),
    })
}

pub(crate) fn remove_parent(m: &mut Mutation<'_>, table_id: &TableId) -> Result<ForeignKeyId> {
    let table = m.graph.table(table_id)?;
    let parent_id = table
        .parent_id
        .clone()
        .ok_or_else(|| SchemaError::NotInterleaved {
            table: table.name.clone(),
        })?;
    let parent = m.graph.table(&parent_id)?;

    let internal = |what: &str| SchemaError::Internal(format!("{} of {} has no primary key", what, table.name));
    let local = table.first_key_column().ok_or_else(|| internal("table"))?.column_id.clone();
    let referenced = parent
        .first_key_column()
        .ok_or_else(|| internal("parent"))?
        .column_id
        .clone();
    let name = foreign_key_name(m.graph, &table.name, &parent.name);

    let fk_id = m.graph.ids.foreign_key_id();
    let table = m.graph.table_mut(table_id)?;
    table.parent_id = None;
    table.foreign_keys.push(ForeignKey {
        id: fk_id.clone(),
        name,
        columns: vec![local],
        referenced_table: parent_id.clone(),
        referenced_columns: vec![referenced],
    });
    m.touch(table_id);
    m.touch(&parent_id);

    debug!("Removed interleave of {} in {}", table_id, parent_id);
    Ok(fk_id)
}

/// A free, valid name for the foreign key that replaces a parent pointer
fn foreign_key_name(graph: &SchemaGraph, table: &str, parent: &str) -> String {
    let mut base = format!("fk_{}_{}", table, parent);
    // leave room for a numeric suffix
    base.truncate(MAX_IDENTIFIER_LENGTH - 8);
    if check_identifier(&base).is_err() {
        base = "fk_interleave".to_string();
    }
    graph.unique_global_name(&base)
}
