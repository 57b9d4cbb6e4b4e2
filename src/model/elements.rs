//! Schema graph element types
//!
//! Tables keep columns arena-style: an identifier → column map plus an
//! explicit ordered identifier list, which is the display and DDL order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{ColumnId, ForeignKeyId, IndexId, TableId};
use crate::types::{ColumnType, SourceType};
use crate::util::eq_ci;

/// Target column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub name: String,
    pub column_type: ColumnType,
    pub not_null: bool,
    /// Provenance note, e.g. "From: id int(10)"
    #[serde(default)]
    pub comment: String,
    /// Engine-specific options, e.g. a source-type hint the target type cannot express
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// One primary key entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeyColumn {
    pub column_id: ColumnId,
    #[serde(default)]
    pub desc: bool,
    /// 1-based position within the key
    pub order: u32,
}

/// Foreign key; `columns[i]` references `referenced_columns[i]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub id: ForeignKeyId,
    pub name: String,
    pub columns: Vec<ColumnId>,
    pub referenced_table: TableId,
    pub referenced_columns: Vec<ColumnId>,
}

impl ForeignKey {
    /// Remove every (local, referenced) pair matching `drop`; returns true if the key is now empty
    pub fn remove_pairs(&mut self, drop: impl Fn(&ColumnId, &ColumnId) -> bool) -> bool {
        let pairs: Vec<(ColumnId, ColumnId)> = self
            .columns
            .drain(..)
            .zip(self.referenced_columns.drain(..))
            .filter(|(local, referenced)| !drop(local, referenced))
            .collect();
        for (local, referenced) in pairs {
            self.columns.push(local);
            self.referenced_columns.push(referenced);
        }
        self.columns.is_empty()
    }
}

/// Key part of a secondary index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexKey {
    pub column_id: ColumnId,
    #[serde(default)]
    pub desc: bool,
}

/// Secondary index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryIndex {
    pub id: IndexId,
    pub name: String,
    #[serde(default)]
    pub unique: bool,
    pub keys: Vec<IndexKey>,
}

/// Target table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub id: TableId,
    pub name: String,
    /// Column display/DDL order
    pub column_order: Vec<ColumnId>,
    pub columns: BTreeMap<ColumnId, Column>,
    pub primary_key: Vec<PrimaryKeyColumn>,
    #[serde(default)]
    pub indexes: Vec<SecondaryIndex>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    /// Set when this table is interleaved in another table
    #[serde(default)]
    pub parent_id: Option<TableId>,
    #[serde(default)]
    pub comment: String,
}

impl Table {
    /// Columns in display order
    pub fn columns_in_order(&self) -> impl Iterator<Item = &Column> {
        self.column_order
            .iter()
            .filter_map(move |id| self.columns.get(id))
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns_in_order().find(|c| eq_ci(&c.name, name))
    }

    /// The key entry with the lowest order value
    pub fn first_key_column(&self) -> Option<&PrimaryKeyColumn> {
        self.primary_key.iter().min_by_key(|pk| pk.order)
    }

    pub fn is_first_key_column(&self, column: &ColumnId) -> bool {
        self.first_key_column()
            .is_some_and(|pk| &pk.column_id == column)
    }

    pub fn is_key_column(&self, column: &ColumnId) -> bool {
        self.primary_key.iter().any(|pk| &pk.column_id == column)
    }

    pub fn key_column_by_name(&self, name: &str) -> Option<&Column> {
        self.primary_key
            .iter()
            .filter_map(|pk| self.columns.get(&pk.column_id))
            .find(|c| eq_ci(&c.name, name))
    }

    pub fn index(&self, id: &IndexId) -> Option<&SecondaryIndex> {
        self.indexes.iter().find(|i| &i.id == id)
    }

    pub fn foreign_key(&self, id: &ForeignKeyId) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|fk| &fk.id == id)
    }
}

/// Source column, as imported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceColumn {
    pub id: ColumnId,
    pub name: String,
    pub source_type: SourceType,
    #[serde(default)]
    pub not_null: bool,
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default)]
    pub default_value: Option<String>,
}

/// Source table mirror. Never edited after import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTable {
    pub id: TableId,
    pub name: String,
    #[serde(default)]
    pub schema: String,
    pub column_order: Vec<ColumnId>,
    pub columns: BTreeMap<ColumnId, SourceColumn>,
    #[serde(default)]
    pub primary_key: Vec<PrimaryKeyColumn>,
    #[serde(default)]
    pub indexes: Vec<SecondaryIndex>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
}

impl SourceTable {
    pub fn column_by_name(&self, name: &str) -> Option<&SourceColumn> {
        self.column_order
            .iter()
            .filter_map(|id| self.columns.get(id))
            .find(|c| eq_ci(&c.name, name))
    }
}
