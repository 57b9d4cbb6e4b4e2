//! Secondary index edits

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::ids::{IndexId, TableId};
use crate::model::{IndexKey, SecondaryIndex};
use crate::util::check_identifier;

use super::Mutation;

/// Parameters of a new secondary index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    #[serde(default)]
    pub unique: bool,
    pub keys: Vec<IndexKey>,
}

pub(crate) fn add_index(m: &mut Mutation<'_>, table_id: &TableId, spec: &IndexSpec) -> Result<IndexId> {
    let table = m.graph.table(table_id)?;
    check_identifier(&spec.name).map_err(|reason| SchemaError::InvalidName {
        name: spec.name.clone(),
        reason: reason.to_string(),
    })?;
    if m.graph.is_global_name_used(&spec.name) {
        return Err(SchemaError::DuplicateName {
            name: spec.name.clone(),
        });
    }
    if spec.keys.is_empty() {
        return Err(SchemaError::EmptyIndex {
            index: spec.name.clone(),
        });
    }

    let mut seen = HashSet::new();
    for key in &spec.keys {
        let column = m.graph.column(table_id, &key.column_id)?;
        if !seen.insert(&key.column_id) {
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

    let index_id = m.graph.ids.index_id();
    let table = m.graph.table_mut(table_id)?;
    table.indexes.push(SecondaryIndex {
        id: index_id.clone(),
        name: spec.name.clone(),
        unique: spec.unique,
        keys: spec.keys.clone(),
    });
    m.touch(table_id);

    debug!("Added index {} ({}) on {}", spec.name, index_id, table_id);
    Ok(index_id)
}

pub(crate) fn drop_index(m: &mut Mutation<'_>, table_id: &TableId, index_id: &IndexId) -> Result<()> {
    let table = m.graph.table_mut(table_id)?;
    let Some(position) = table.indexes.iter().position(|i| &i.id == index_id) else {
        return Err(SchemaError::UnknownIndex {
            table: table_id.clone(),
            index: index_id.clone(),
        });
    };
    let index = table.indexes.remove(position);
    m.touch(table_id);

    debug!("Dropped index {} from {}", index.name, table_id);
    Ok(())
}
