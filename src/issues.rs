//! Schema issue registry and detectors
//!
//! Issues are attached either to a whole table or to one of its columns and
//! are keyed by stable identifiers, so renames never move them. Two groups
//! exist:
//!
//! - conversion issues, produced by type resolution and import, owned by the
//!   column and replaced only when its type is re-resolved;
//! - derived issues (hotspots, redundant indexes, interleave suggestions),
//!   recomputed by the engine after every mutation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ids::{ColumnId, TableId};
use crate::model::{SourceTable, Table};

/// A schema issue tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IssueKind {
    // Conversion issues
    TypeWidened,
    PrecisionLoss,
    NoGoodType,
    MultiDimensionalArrayUnsupported,
    TimeUnsupported,
    TimezoneAssumed,
    StringOverflow,
    DefaultValueDropped,
    AutoIncrementDropped,
    MissingPrimaryKey,

    // Derived issues
    HotspotTimestamp,
    HotspotAutoIncrement,
    RedundantIndex,
    InterleaveEligible,
    InterleaveOrderMismatch,
    InterleaveAddColumn,
    InterleaveRenameColumn,
    InterleaveChangeColumnSize,
}

impl IssueKind {
    /// Derived issues are recomputed from the graph after every mutation
    pub fn is_derived(self) -> bool {
        matches!(
            self,
            IssueKind::HotspotTimestamp
                | IssueKind::HotspotAutoIncrement
                | IssueKind::RedundantIndex
                | IssueKind::InterleaveEligible
                | IssueKind::InterleaveOrderMismatch
                | IssueKind::InterleaveAddColumn
                | IssueKind::InterleaveRenameColumn
                | IssueKind::InterleaveChangeColumnSize
        )
    }

    /// Issues reported by the type resolver for a column's current type
    pub fn is_type_conversion(self) -> bool {
        matches!(
            self,
            IssueKind::TypeWidened
                | IssueKind::PrecisionLoss
                | IssueKind::NoGoodType
                | IssueKind::MultiDimensionalArrayUnsupported
                | IssueKind::TimeUnsupported
                | IssueKind::TimezoneAssumed
                | IssueKind::StringOverflow
        )
    }

    pub fn is_interleave_suggestion(self) -> bool {
        matches!(
            self,
            IssueKind::InterleaveEligible
                | IssueKind::InterleaveOrderMismatch
                | IssueKind::InterleaveAddColumn
                | IssueKind::InterleaveRenameColumn
                | IssueKind::InterleaveChangeColumnSize
        )
    }

    pub fn description(self) -> &'static str {
        match self {
            IssueKind::TypeWidened => "type was widened to a larger target type",
            IssueKind::PrecisionLoss => "values may lose precision in the target type",
            IssueKind::NoGoodType => "no good target type; mapped to STRING(MAX)",
            IssueKind::MultiDimensionalArrayUnsupported => {
                "multi-dimensional arrays are not supported; mapped to STRING(MAX)"
            }
            IssueKind::TimeUnsupported => "time types are not supported; mapped to STRING(MAX)",
            IssueKind::TimezoneAssumed => "timestamp without time zone is stored as UTC",
            IssueKind::StringOverflow => "requested length is shorter than the source length",
            IssueKind::DefaultValueDropped => "default value was dropped",
            IssueKind::AutoIncrementDropped => "auto-increment attribute was dropped",
            IssueKind::MissingPrimaryKey => "source table has no primary key; a synthetic key was added",
            IssueKind::HotspotTimestamp => "timestamp leading key column may cause write hotspots",
            IssueKind::HotspotAutoIncrement => {
                "auto-increment leading key column may cause write hotspots"
            }
            IssueKind::RedundantIndex => "index column is already part of the primary key",
            IssueKind::InterleaveEligible => "table can be interleaved in the referenced table",
            IssueKind::InterleaveOrderMismatch => {
                "table can be interleaved if this column becomes the first primary key column"
            }
            IssueKind::InterleaveAddColumn => {
                "table can be interleaved if this column is added to the primary key"
            }
            IssueKind::InterleaveRenameColumn => {
                "table can be interleaved if this column is renamed to match the parent key"
            }
            IssueKind::InterleaveChangeColumnSize => {
                "table can be interleaved if this column's size matches the parent key"
            }
        }
    }
}

/// Issues for one table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableIssues {
    #[serde(default)]
    pub table: BTreeSet<IssueKind>,
    #[serde(default)]
    pub columns: BTreeMap<ColumnId, BTreeSet<IssueKind>>,
}

impl TableIssues {
    fn is_empty(&self) -> bool {
        self.table.is_empty() && self.columns.is_empty()
    }
}

/// Per-table, per-column issue registry.
///
/// Empty entries are pruned so that adding and then removing an issue leaves
/// the registry equal to what it was.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueRegistry {
    tables: BTreeMap<TableId, TableIssues>,
}

impl IssueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `issue` to a column, or to the table when `column` is `None`.
    /// Returns false if it was already present.
    pub fn add_issue(&mut self, table: &TableId, column: Option<&ColumnId>, issue: IssueKind) -> bool {
        let entry = self.tables.entry(table.clone()).or_default();
        match column {
            Some(column) => entry.columns.entry(column.clone()).or_default().insert(issue),
            None => entry.table.insert(issue),
        }
    }

    /// Returns true if the issue was present.
    pub fn remove_issue(&mut self, table: &TableId, column: Option<&ColumnId>, issue: IssueKind) -> bool {
        let removed = self.retain(table, column, |kind| kind != issue);
        removed > 0
    }

    pub fn has_issue(&self, table: &TableId, column: Option<&ColumnId>, issue: IssueKind) -> bool {
        let Some(entry) = self.tables.get(table) else {
            return false;
        };
        match column {
            Some(column) => entry
                .columns
                .get(column)
                .is_some_and(|issues| issues.contains(&issue)),
            None => entry.table.contains(&issue),
        }
    }

    pub fn column_issues(&self, table: &TableId, column: &ColumnId) -> Vec<IssueKind> {
        self.tables
            .get(table)
            .and_then(|entry| entry.columns.get(column))
            .map(|issues| issues.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn table_issues(&self, table: &TableId) -> Vec<IssueKind> {
        self.tables
            .get(table)
            .map(|entry| entry.table.iter().copied().collect())
            .unwrap_or_default()
    }

    /// All table entries, for invariant checks and reporting
    pub fn entries(&self) -> impl Iterator<Item = (&TableId, &TableIssues)> {
        self.tables.iter()
    }

    /// Replace the conversion issues of a column with a fresh resolver report
    pub fn replace_type_issues(&mut self, table: &TableId, column: &ColumnId, issues: &[IssueKind]) {
        self.retain(table, Some(column), |kind| !kind.is_type_conversion());
        for issue in issues {
            self.add_issue(table, Some(column), *issue);
        }
    }

    /// Drop every derived issue of a table, leaving conversion issues in place
    pub fn clear_derived(&mut self, table: &TableId) {
        let Some(entry) = self.tables.get_mut(table) else {
            return;
        };
        entry.table.retain(|kind| !kind.is_derived());
        for issues in entry.columns.values_mut() {
            issues.retain(|kind| !kind.is_derived());
        }
        entry.columns.retain(|_, issues| !issues.is_empty());
        if entry.is_empty() {
            self.tables.remove(table);
        }
    }

    pub fn remove_column(&mut self, table: &TableId, column: &ColumnId) {
        if let Some(entry) = self.tables.get_mut(table) {
            entry.columns.remove(column);
            if entry.is_empty() {
                self.tables.remove(table);
            }
        }
    }

    /// Keep only the issues matching `keep`; returns how many were removed
    fn retain(
        &mut self,
        table: &TableId,
        column: Option<&ColumnId>,
        keep: impl Fn(IssueKind) -> bool,
    ) -> usize {
        let Some(entry) = self.tables.get_mut(table) else {
            return 0;
        };
        let removed = match column {
            Some(column) => match entry.columns.get_mut(column) {
                Some(issues) => {
                    let before = issues.len();
                    issues.retain(|kind| keep(*kind));
                    let removed = before - issues.len();
                    if issues.is_empty() {
                        entry.columns.remove(column);
                    }
                    removed
                }
                None => 0,
            },
            None => {
                let before = entry.table.len();
                entry.table.retain(|kind| keep(*kind));
                before - entry.table.len()
            }
        };
        if entry.is_empty() {
            self.tables.remove(table);
        }
        removed
    }
}

/// Flag a leading primary-key column that would concentrate writes.
pub fn detect_hotspots(table: &Table, source: Option<&SourceTable>, registry: &mut IssueRegistry) {
    let Some(first) = table.first_key_column() else {
        return;
    };
    let Some(column) = table.columns.get(&first.column_id) else {
        return;
    };
    if column.column_type.is_timestamp() {
        registry.add_issue(&table.id, Some(&column.id), IssueKind::HotspotTimestamp);
    }
    let auto_increment = source
        .and_then(|source| source.columns.get(&column.id))
        .is_some_and(|source_column| source_column.auto_increment);
    if auto_increment {
        registry.add_issue(&table.id, Some(&column.id), IssueKind::HotspotAutoIncrement);
    }
}

/// Flag secondary-index columns that are already part of the primary key.
pub fn detect_redundant_indexes(table: &Table, registry: &mut IssueRegistry) {
    for index in &table.indexes {
        for key in &index.keys {
            if table.is_key_column(&key.column_id) {
                registry.add_issue(&table.id, Some(&key.column_id), IssueKind::RedundantIndex);
            }
        }
    }
}
