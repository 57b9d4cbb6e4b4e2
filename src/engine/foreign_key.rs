//! Foreign key edits
//!
//! Foreign keys reference columns by identifier, so column renames never need
//! to touch them. Adding one requires matching arity and identical target
//! types on both sides.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::ids::{ColumnId, ForeignKeyId, TableId};
use crate::model::ForeignKey;
use crate::util::{check_identifier, eq_ci};

use super::Mutation;

/// Parameters of a new foreign key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeySpec {
    pub name: String,
    pub columns: Vec<ColumnId>,
    pub referenced_table: TableId,
    pub referenced_columns: Vec<ColumnId>,
}

pub(crate) fn add_foreign_key(
    m: &mut Mutation<'_>,
    table_id: &TableId,
    spec: &ForeignKeySpec,
) -> Result<ForeignKeyId> {
    let table = m.graph.table(table_id)?;
    check_name(m, &spec.name, None)?;
    if spec.columns.is_empty() || spec.columns.len() != spec.referenced_columns.len() {
        return Err(SchemaError::ForeignKeyArity {
            name: spec.name.clone(),
            local: spec.columns.len(),
            referenced: spec.referenced_columns.len(),
        });
    }
    let referenced_table = m.graph.table(&spec.referenced_table)?;

    let mut seen = HashSet::new();
    for (local, referenced) in spec.columns.iter().zip(&spec.referenced_columns) {
        let column = m.graph.column(table_id, local)?;
        let target = m.graph.column(&spec.referenced_table, referenced)?;
        if !seen.insert(local) {
            return Err(SchemaError::DuplicateKeyColumn {
                table: table.name.clone(),
                column: column.name.clone(),
            });
        }
        if column.column_type != target.column_type {
            return Err(SchemaError::ForeignKeyTypeMismatch {
                name: spec.name.clone(),
                column: column.name.clone(),
                local_type: column.column_type.to_string(),
                referenced: format!("{}.{}", referenced_table.name, target.name),
                referenced_type: target.column_type.to_string(),
            });
        }
    }

    let fk_id = m.graph.ids.foreign_key_id();
    m.graph.table_mut(table_id)?.foreign_keys.push(ForeignKey {
        id: fk_id.clone(),
        name: spec.name.clone(),
        columns: spec.columns.clone(),
        referenced_table: spec.referenced_table.clone(),
        referenced_columns: spec.referenced_columns.clone(),
    });
    m.touch(table_id);
    m.touch(&spec.referenced_table);

    debug!(
        "Added foreign key {} ({}) from {} to {}",
        spec.name, fk_id, table_id, spec.referenced_table
    );
    Ok(fk_id)
}

pub(crate) fn rename_foreign_key(
    m: &mut Mutation<'_>,
    table_id: &TableId,
    fk_id: &ForeignKeyId,
    new_name: &str,
) -> Result<()> {
    let table = m.graph.table(table_id)?;
    let fk = table
        .foreign_key(fk_id)
        .ok_or_else(|| SchemaError::UnknownForeignKey {
            table: table_id.clone(),
            foreign_key: fk_id.clone(),
        })?;
    if fk.name == new_name {
        return Ok(());
    }
    check_name(m, new_name, Some(fk_id))?;

    let table = m.graph.table_mut(table_id)?;
    if let Some(fk) = table.foreign_keys.iter_mut().find(|fk| &fk.id == fk_id) {
        fk.name = new_name.to_string();
    }
    m.touch(table_id);
    Ok(())
}

pub(crate) fn drop_foreign_key(m: &mut Mutation<'_>, table_id: &TableId, fk_id: &ForeignKeyId) -> Result<()> {
    let table = m.graph.table_mut(table_id)?;
    let Some(position) = table.foreign_keys.iter().position(|fk| &fk.id == fk_id) else {
        return Err(SchemaError::UnknownForeignKey {
            table: table_id.clone(),
            foreign_key: fk_id.clone(),
        });
    };
    let fk = table.foreign_keys.remove(position);
    m.touch(table_id);
    m.touch(&fk.referenced_table);

    debug!("Dropped foreign key {} from {}", fk.name, table_id);
    Ok(())
}

/// Foreign key names share the global namespace; a key may keep its own name
/// under a different case.
fn check_name(m: &Mutation<'_>, name: &str, own: Option<&ForeignKeyId>) -> Result<()> {
    check_identifier(name).map_err(|reason| SchemaError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    })?;
    let own_name = own.and_then(|id| {
        m.graph
            .tables
            .values()
            .find_map(|t| t.foreign_key(id))
            .map(|fk| fk.name.as_str())
    });
    let is_own = own_name.is_some_and(|n| eq_ci(n, name));
    if !is_own && m.graph.is_global_name_used(name) {
        return Err(SchemaError::DuplicateName {
            name: name.to_string(),
        });
    }
    Ok(())
}
