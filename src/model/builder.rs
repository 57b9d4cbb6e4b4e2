//! Build a schema graph from an imported source schema
//!
//! Each source table becomes a target table with the same identifier; each
//! source column becomes a target column with the same identifier and a type
//! chosen by the type resolver. Tables without a primary key get a
//! synthetic one.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SchemaError};
use crate::ids::{ColumnId, TableId};
use crate::issues::IssueKind;
use crate::types::{ColumnType, Driver, Length, ResolveRequest, SourceType, TargetDialect, TypeResolver};
use crate::util::{check_identifier, name_key};

use super::{
    Column, ForeignKey, IndexKey, PrimaryKeyColumn, SchemaGraph, SecondaryIndex, SourceColumn,
    SourceTable, Table,
};

/// Name of the generated key column for tables without a primary key
pub const SYNTHETIC_KEY_NAME: &str = "synth_id";

/// A source table as delivered by the schema reader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceTableDef {
    pub name: String,
    #[serde(default)]
    pub schema: String,
    pub columns: Vec<SourceColumnDef>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub indexes: Vec<SourceIndexDef>,
    #[serde(default)]
    pub foreign_keys: Vec<SourceForeignKeyDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub mods: Vec<i64>,
    #[serde(default)]
    pub array_bounds: Vec<i64>,
    #[serde(default)]
    pub not_null: bool,
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default)]
    pub default_value: Option<String>,
}

impl SourceColumnDef {
    pub fn new(name: &str, type_name: &str) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            mods: Vec::new(),
            array_bounds: Vec::new(),
            not_null: false,
            auto_increment: false,
            default_value: None,
        }
    }

    fn source_type(&self) -> SourceType {
        SourceType {
            name: self.type_name.clone(),
            mods: self.mods.clone(),
            array_bounds: self.array_bounds.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceIndexDef {
    pub name: String,
    #[serde(default)]
    pub unique: bool,
    pub columns: Vec<String>,
    /// Per-column descending flags; missing entries are ascending
    #[serde(default)]
    pub descending: Vec<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceForeignKeyDef {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
}

impl SchemaGraph {
    /// Import a source schema into a fresh graph
    pub fn from_source(
        tables: &[SourceTableDef],
        resolver: &dyn TypeResolver,
        driver: Driver,
        dialect: TargetDialect,
    ) -> Result<SchemaGraph> {
        let mut graph = SchemaGraph::new(driver, dialect);
        let mut table_ids: HashMap<String, TableId> = HashMap::new();

        // Table names first, so index and foreign key names can be checked
        // against tables imported after them
        let mut table_names = HashSet::new();
        for def in tables {
            check_name(&def.name)?;
            if !table_names.insert(name_key(&def.name)) {
                return Err(SchemaError::DuplicateName {
                    name: def.name.clone(),
                });
            }
        }

        for def in tables {
            let id = graph.ids.table_id();
            table_ids.insert(name_key(&def.name), id.clone());
            import_table(&mut graph, &id, def, &table_names, resolver)?;
        }

        // Foreign keys last, they may point at any table
        for def in tables {
            let id = &table_ids[&name_key(&def.name)];
            for fk_def in &def.foreign_keys {
                check_name(&fk_def.name)?;
                if graph.is_global_name_used(&fk_def.name)
                    || table_names.contains(&name_key(&fk_def.name))
                {
                    return Err(SchemaError::DuplicateName {
                        name: fk_def.name.clone(),
                    });
                }
                let referenced_id = table_ids
                    .get(&name_key(&fk_def.referenced_table))
                    .cloned()
                    .ok_or_else(|| SchemaError::UnknownTable(TableId::new(&fk_def.referenced_table)))?;
                if fk_def.columns.is_empty()
                    || fk_def.columns.len() != fk_def.referenced_columns.len()
                {
                    return Err(SchemaError::ForeignKeyArity {
                        name: fk_def.name.clone(),
                        local: fk_def.columns.len(),
                        referenced: fk_def.referenced_columns.len(),
                    });
                }
                let columns = resolve_source_columns(&graph, id, &fk_def.columns)?;
                let referenced_columns =
                    resolve_source_columns(&graph, &referenced_id, &fk_def.referenced_columns)?;
                let fk = ForeignKey {
                    id: graph.ids.foreign_key_id(),
                    name: fk_def.name.clone(),
                    columns,
                    referenced_table: referenced_id,
                    referenced_columns,
                };
                if let Some(source) = graph.source_tables.get_mut(id) {
                    source.foreign_keys.push(fk.clone());
                }
                graph.table_mut(id)?.foreign_keys.push(fk);
            }
        }

        let all: Vec<TableId> = graph.tables.keys().cloned().collect();
        crate::engine::refresh_derived_issues(&mut graph, &all);

        graph.check_invariants().map_err(SchemaError::Internal)?;
        info!(
            "Imported {} tables from {} source",
            graph.tables.len(),
            driver
        );
        Ok(graph)
    }
}

fn check_name(name: &str) -> Result<()> {
    check_identifier(name).map_err(|reason| SchemaError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}

fn import_table(
    graph: &mut SchemaGraph,
    id: &TableId,
    def: &SourceTableDef,
    table_names: &HashSet<String>,
    resolver: &dyn TypeResolver,
) -> Result<()> {
    let mut source = SourceTable {
        id: id.clone(),
        name: def.name.clone(),
        schema: def.schema.clone(),
        column_order: Vec::new(),
        columns: BTreeMap::new(),
        primary_key: Vec::new(),
        indexes: Vec::new(),
        foreign_keys: Vec::new(),
    };
    let mut table = Table {
        id: id.clone(),
        name: def.name.clone(),
        column_order: Vec::new(),
        columns: BTreeMap::new(),
        primary_key: Vec::new(),
        indexes: Vec::new(),
        foreign_keys: Vec::new(),
        parent_id: None,
        comment: format!("From: {}", def.name),
    };
    graph.xref.link_table(id, &def.name, &def.name);

    let mut seen = HashSet::new();
    for column_def in &def.columns {
        check_name(&column_def.name)?;
        if !seen.insert(name_key(&column_def.name)) {
            return Err(SchemaError::DuplicateName {
                name: format!("{}.{}", def.name, column_def.name),
            });
        }
        let column_id = graph.ids.column_id();
        let source_type = column_def.source_type();
        let resolution = resolver.resolve(ResolveRequest {
            source: Some(&source_type),
            requested: None,
            driver: graph.source_driver,
            dialect: graph.target_dialect,
        })?;

        let mut options = BTreeMap::new();
        if !resolution.issues.is_empty() {
            options.insert("source_type".to_string(), source_type.to_string());
        }
        table.column_order.push(column_id.clone());
        table.columns.insert(
            column_id.clone(),
            Column {
                id: column_id.clone(),
                name: column_def.name.clone(),
                column_type: resolution.column_type,
                not_null: column_def.not_null,
                comment: format!("From: {} {}", column_def.name, source_type),
                options,
            },
        );
        source.column_order.push(column_id.clone());
        source.columns.insert(
            column_id.clone(),
            SourceColumn {
                id: column_id.clone(),
                name: column_def.name.clone(),
                source_type,
                not_null: column_def.not_null,
                auto_increment: column_def.auto_increment,
                default_value: column_def.default_value.clone(),
            },
        );
        graph
            .xref
            .link_column(id, &column_def.name, Some(&column_def.name));

        graph.issues.replace_type_issues(id, &column_id, &resolution.issues);
        if column_def.default_value.is_some() {
            graph
                .issues
                .add_issue(id, Some(&column_id), IssueKind::DefaultValueDropped);
        }
        if column_def.auto_increment {
            graph
                .issues
                .add_issue(id, Some(&column_id), IssueKind::AutoIncrementDropped);
        }
    }

    for (position, name) in def.primary_key.iter().enumerate() {
        let column_id = source
            .column_by_name(name)
            .map(|c| c.id.clone())
            .ok_or_else(|| unknown_source_column(id, name))?;
        let key = PrimaryKeyColumn {
            column_id,
            desc: false,
            order: position as u32 + 1,
        };
        if source.primary_key.iter().any(|pk| pk.column_id == key.column_id) {
            return Err(SchemaError::DuplicateKeyColumn {
                table: def.name.clone(),
                column: name.clone(),
            });
        }
        source.primary_key.push(key.clone());
        table.primary_key.push(key);
    }

    if table.primary_key.is_empty() {
        add_synthetic_key(graph, &mut table);
    }

    for index_def in &def.indexes {
        check_name(&index_def.name)?;
        if graph.is_global_name_used(&index_def.name)
            || table.indexes.iter().any(|i| name_key(&i.name) == name_key(&index_def.name))
            || table_names.contains(&name_key(&index_def.name))
        {
            return Err(SchemaError::DuplicateName {
                name: index_def.name.clone(),
            });
        }
        let mut keys = Vec::with_capacity(index_def.columns.len());
        for (position, name) in index_def.columns.iter().enumerate() {
            let column = source
                .column_by_name(name)
                .ok_or_else(|| unknown_source_column(id, name))?;
            keys.push(IndexKey {
                column_id: column.id.clone(),
                desc: index_def.descending.get(position).copied().unwrap_or(false),
            });
        }
        if keys.is_empty() {
            return Err(SchemaError::EmptyIndex {
                index: index_def.name.clone(),
            });
        }
        let index = SecondaryIndex {
            id: graph.ids.index_id(),
            name: index_def.name.clone(),
            unique: index_def.unique,
            keys,
        };
        source.indexes.push(index.clone());
        table.indexes.push(index);
    }

    debug!(
        "Imported table {} with {} columns",
        table.name,
        table.columns.len()
    );
    graph.source_tables.insert(id.clone(), source);
    graph.tables.insert(id.clone(), table);
    Ok(())
}

fn add_synthetic_key(graph: &mut SchemaGraph, table: &mut Table) {
    let name = if table.column_by_name(SYNTHETIC_KEY_NAME).is_none() {
        SYNTHETIC_KEY_NAME.to_string()
    } else {
        (1..)
            .map(|n| format!("{}_{}", SYNTHETIC_KEY_NAME, n))
            .find(|candidate| table.column_by_name(candidate).is_none())
            .unwrap_or_else(|| SYNTHETIC_KEY_NAME.to_string())
    };
    let column_id = graph.ids.column_id();
    table.column_order.push(column_id.clone());
    table.columns.insert(
        column_id.clone(),
        Column {
            id: column_id.clone(),
            name: name.clone(),
            column_type: ColumnType::string(Length::Limited(50)),
            not_null: true,
            comment: "Generated primary key".to_string(),
            options: BTreeMap::new(),
        },
    );
    table.primary_key.push(PrimaryKeyColumn {
        column_id: column_id.clone(),
        desc: false,
        order: 1,
    });
    graph.xref.link_column(&table.id, &name, None);
    graph.synthetic_keys.insert(table.id.clone(), column_id);
    graph
        .issues
        .add_issue(&table.id, None, IssueKind::MissingPrimaryKey);
}

fn resolve_source_columns(
    graph: &SchemaGraph,
    table: &TableId,
    names: &[String],
) -> Result<Vec<ColumnId>> {
    let source = graph
        .source_tables
        .get(table)
        .ok_or_else(|| SchemaError::UnknownTable(table.clone()))?;
    names
        .iter()
        .map(|name| {
            source
                .column_by_name(name)
                .map(|c| c.id.clone())
                .ok_or_else(|| unknown_source_column(table, name))
        })
        .collect()
}

fn unknown_source_column(table: &TableId, name: &str) -> SchemaError {
    SchemaError::UnknownColumn {
        table: table.clone(),
        column: ColumnId::new(name),
    }
}
