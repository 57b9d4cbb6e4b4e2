//! Primary key replacement
//!
//! The caller sends the complete desired key. Columns only in the request are
//! inserted, columns only in the current key are removed and columns in both
//! take the requested direction and order. Hotspot and interleave issues for
//! inserted and removed columns are recomputed by the derived-issue refresh
//! that follows every edit.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::ids::{ColumnId, TableId};
use crate::issues::IssueKind;
use crate::model::{PrimaryKeyColumn, Table};

use super::column::Relationship;
use super::Mutation;

/// One entry of a requested primary key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpec {
    pub column_id: ColumnId,
    #[serde(default)]
    pub desc: bool,
    pub order: u32,
}

impl KeySpec {
    pub fn new(column_id: impl Into<ColumnId>, order: u32) -> Self {
        Self {
            column_id: column_id.into(),
            desc: false,
            order,
        }
    }

    pub fn descending(mut self) -> Self {
        self.desc = true;
        self
    }
}

pub(crate) fn replace_primary_key(m: &mut Mutation<'_>, table_id: &TableId, keys: &[KeySpec]) -> Result<()> {
    let table = m.graph.table(table_id)?;
    if keys.is_empty() {
        return Err(SchemaError::EmptyPrimaryKey {
            table: table.name.clone(),
        });
    }

    let mut orders = HashSet::new();
    let mut columns = HashSet::new();
    for key in keys {
        let column = m.graph.column(table_id, &key.column_id)?;
        if key.order == 0 {
            return Err(SchemaError::InvalidKeyOrder {
                table: table.name.clone(),
                order: key.order,
            });
        }
        if !orders.insert(key.order) {
            return Err(SchemaError::DuplicateOrder {
                table: table.name.clone(),
                order: key.order,
            });
        }
        if !columns.insert(&key.column_id) {
            return Err(SchemaError::DuplicateKeyColumn {
                table: table.name.clone(),
                column: column.name.clone(),
            });
        }
        if !column.column_type.is_keyable() {
            return Err(SchemaError::UnkeyableColumn {
                table: table.name.clone(),
                column: column.name.clone(),
                column_type: column.column_type.to_string(),
            });
        }
    }

    let mut requested: Vec<PrimaryKeyColumn> = keys
        .iter()
        .map(|key| PrimaryKeyColumn {
            column_id: key.column_id.clone(),
            desc: key.desc,
            order: key.order,
        })
        .collect();
    requested.sort_by_key(|pk| pk.order);

    if table.primary_key == requested {
        return Ok(());
    }
    guard_interleave_prefix(m, table_id, &requested)?;

    let current: HashSet<&ColumnId> = table.primary_key.iter().map(|pk| &pk.column_id).collect();
    let inserted = requested
        .iter()
        .filter(|pk| !current.contains(&pk.column_id))
        .count();
    let removed = current.len() + inserted - requested.len();

    let synthetic_dropped = m
        .graph
        .synthetic_keys
        .get(table_id)
        .is_some_and(|synthetic| !columns.contains(synthetic));

    m.graph.table_mut(table_id)?.primary_key = requested;
    if synthetic_dropped {
        m.graph.synthetic_keys.remove(table_id);
        m.graph
            .issues
            .remove_issue(table_id, None, IssueKind::MissingPrimaryKey);
    }
    m.touch(table_id);
    debug!(
        "Replaced primary key of {}: {} inserted, {} removed",
        table_id, inserted, removed
    );
    Ok(())
}

/// Interleaved children carry their parent's whole key as a prefix, so a
/// parent's key is fixed while it has children. A child may extend its key
/// after the leading column but not replace or reorder that column.
fn guard_interleave_prefix(m: &Mutation<'_>, table_id: &TableId, requested: &[PrimaryKeyColumn]) -> Result<()> {
    let table = m.graph.table(table_id)?;
    let current = &table.primary_key;
    let changed_at = current
        .iter()
        .zip(requested)
        .position(|(now, wanted)| now.column_id != wanted.column_id || now.desc != wanted.desc)
        .unwrap_or_else(|| current.len().min(requested.len()));
    let column_name = current
        .get(changed_at)
        .or_else(|| requested.get(changed_at))
        .and_then(|pk| table.columns.get(&pk.column_id))
        .map(|c| c.name.clone())
        .unwrap_or_default();

    let leading_name = |other: &Table| {
        other
            .first_key_column()
            .and_then(|pk| other.columns.get(&pk.column_id))
            .map(|c| c.name.clone())
            .unwrap_or_default()
    };

    let conflict = if let Some(child) = m.graph.children_of(table_id).first() {
        Some(("change the primary key", Relationship::Child, *child))
    } else if changed_at == 0 {
        table
            .parent_id
            .as_ref()
            .and_then(|p| m.graph.tables.get(p))
            .map(|parent| ("change the leading primary key", Relationship::Parent, parent))
    } else {
        None
    };

    match conflict {
        Some((action, relationship, related)) => Err(SchemaError::InterleaveConflict {
            action: action.to_string(),
            table: table.name.clone(),
            column: column_name,
            relationship: relationship.label().to_string(),
            related: related.name.clone(),
            related_column: leading_name(related),
        }),
        None => Ok(()),
    }
}
