//! Error types for rust-spanner-schema

use std::path::PathBuf;

use thiserror::Error;

use crate::ids::{ColumnId, ForeignKeyId, IndexId, TableId};
use crate::types::Driver;

/// Broad class of a [`SchemaError`], used by callers to decide how to guide the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad identifier, duplicate name, malformed input
    Validation,
    /// The edit needs an existing relationship removed first
    Precondition,
    /// The type resolver rejected the request
    Resolution,
    /// An invariant was broken by the engine itself
    Internal,
}

/// Errors returned by the type resolver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Unsupported source driver: {0}")]
    UnsupportedDriver(Driver),

    #[error("Cannot convert source type {source_type} to {requested}")]
    UnsupportedConversion {
        source_type: String,
        requested: String,
    },

    #[error("Invalid type '{input}': {reason}")]
    InvalidType { input: String, reason: String },
}

/// Errors that can occur while editing a schema graph.
///
/// Every error leaves the graph untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Unknown table: {0}")]
    UnknownTable(TableId),

    #[error("Unknown column {column} in table {table}")]
    UnknownColumn { table: TableId, column: ColumnId },

    #[error("Unknown index {index} in table {table}")]
    UnknownIndex { table: TableId, index: IndexId },

    #[error("Unknown foreign key {foreign_key} in table {table}")]
    UnknownForeignKey {
        table: TableId,
        foreign_key: ForeignKeyId,
    },

    #[error("Name '{name}' is already in use")]
    DuplicateName { name: String },

    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Primary key of table {table} uses order {order} more than once")]
    DuplicateOrder { table: String, order: u32 },

    #[error("Invalid primary key order {order} in table {table}: orders start at 1")]
    InvalidKeyOrder { table: String, order: u32 },

    #[error("Column {column} appears more than once in a key of table {table}")]
    DuplicateKeyColumn { table: String, column: String },

    #[error("Primary key of table {table} must have at least one column")]
    EmptyPrimaryKey { table: String },

    #[error("Column {column} is the last primary key column of table {table}")]
    LastPrimaryKeyColumn { table: String, column: String },

    #[error("Index {index} must have at least one key column")]
    EmptyIndex { index: String },

    #[error("Column {column} of table {table} has type {column_type}, which cannot be used in a key")]
    UnkeyableColumn {
        table: String,
        column: String,
        column_type: String,
    },

    #[error(
        "Foreign key {name} has {local} local column(s) but {referenced} referenced column(s)"
    )]
    ForeignKeyArity {
        name: String,
        local: usize,
        referenced: usize,
    },

    #[error("Foreign key {name}: column {column} ({local_type}) does not match referenced column {referenced} ({referenced_type})")]
    ForeignKeyTypeMismatch {
        name: String,
        column: String,
        local_type: String,
        referenced: String,
        referenced_type: String,
    },

    #[error("Invalid type '{input}': {reason}")]
    InvalidType { input: String, reason: String },

    #[error("Table {table} cannot be interleaved in {parent}: {reason}")]
    InvalidParent {
        table: String,
        parent: String,
        reason: String,
    },

    #[error("Table {table} is not interleaved")]
    NotInterleaved { table: String },

    #[error("Cannot {action} column {column} of table {table}: it is part of the interleave relationship with {relationship} table {related} (shared key {related}.{related_column})")]
    InterleaveConflict {
        action: String,
        table: String,
        column: String,
        relationship: String,
        related: String,
        related_column: String,
    },

    #[error("Cannot {action} column {column} of table {table}: it is used by {relationship}")]
    RelationshipConflict {
        action: String,
        table: String,
        column: String,
        relationship: String,
    },

    #[error("Table {table} cannot be interleaved in {parent}: {reason}")]
    InterleaveNotPossible {
        table: String,
        parent: String,
        reason: String,
    },

    #[error("Type resolution failed: {0}")]
    Resolution(#[from] ResolveError),

    #[error("Internal invariant violated: {0}")]
    Internal(String),
}

impl SchemaError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SchemaError::InterleaveConflict { .. }
            | SchemaError::RelationshipConflict { .. }
            | SchemaError::InterleaveNotPossible { .. } => ErrorClass::Precondition,
            SchemaError::Resolution(_) => ErrorClass::Resolution,
            SchemaError::Internal(_) => ErrorClass::Internal,
            _ => ErrorClass::Validation,
        }
    }
}

/// Errors that can occur while saving or loading a snapshot document
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Failed to read snapshot: {path}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write snapshot: {path}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported snapshot format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Snapshot checksum mismatch: stored {stored}, computed {computed}")]
    ChecksumMismatch { stored: String, computed: String },

    #[error("Snapshot graph is inconsistent: {0}")]
    Inconsistent(String),
}

pub type Result<T> = std::result::Result<T, SchemaError>;
