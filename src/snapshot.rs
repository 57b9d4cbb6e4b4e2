//! Snapshot documents
//!
//! A snapshot is a JSON document wrapping a full [`SchemaGraph`] with a
//! format version, the saving session and a SHA-256 checksum of the graph.
//! Loading rejects documents with another version, a checksum that does not
//! match, or a graph that fails the structural invariants.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::engine::Session;
use crate::error::SnapshotError;
use crate::model::SchemaGraph;
use crate::types::TypeResolver;
use crate::SessionOptions;

/// Current snapshot document format
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Serialized session state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub format_version: u32,
    pub saved_at: DateTime<Utc>,
    pub session_id: Uuid,
    /// Hex SHA-256 of the serialized graph
    pub checksum: String,
    pub graph: SchemaGraph,
}

impl SnapshotDocument {
    pub fn new(session_id: Uuid, graph: SchemaGraph) -> Result<Self, SnapshotError> {
        let checksum = graph_checksum(&graph)?;
        Ok(Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            saved_at: Utc::now(),
            session_id,
            checksum,
            graph,
        })
    }

    /// Check version, checksum and graph invariants
    pub fn verify(&self) -> Result<(), SnapshotError> {
        if self.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: self.format_version,
                expected: SNAPSHOT_FORMAT_VERSION,
            });
        }
        let computed = graph_checksum(&self.graph)?;
        if !computed.eq_ignore_ascii_case(&self.checksum) {
            return Err(SnapshotError::ChecksumMismatch {
                stored: self.checksum.clone(),
                computed,
            });
        }
        self.graph
            .check_invariants()
            .map_err(SnapshotError::Inconsistent)
    }
}

/// SHA-256 of the graph's canonical JSON form, hex encoded
pub fn graph_checksum(graph: &SchemaGraph) -> Result<String, SnapshotError> {
    let bytes = serde_json::to_vec(graph)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

pub fn write_snapshot<W: Write>(writer: W, document: &SnapshotDocument) -> Result<(), SnapshotError> {
    serde_json::to_writer_pretty(writer, document)?;
    Ok(())
}

/// Read and verify a snapshot document
pub fn read_snapshot<R: Read>(reader: R) -> Result<SnapshotDocument, SnapshotError> {
    let document: SnapshotDocument = serde_json::from_reader(reader)?;
    document.verify()?;
    Ok(document)
}

pub fn save_snapshot(path: &Path, document: &SnapshotDocument) -> Result<(), SnapshotError> {
    let write_error = |source| SnapshotError::WriteError {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_error)?;
    }

    let file = File::create(path).map_err(write_error)?;
    let mut writer = BufWriter::new(file);
    write_snapshot(&mut writer, document)?;
    writer.flush().map_err(write_error)?;

    info!(
        "Saved snapshot of session {} ({} tables) to {}",
        document.session_id,
        document.graph.tables.len(),
        path.display()
    );
    Ok(())
}

pub fn load_snapshot(path: &Path) -> Result<SnapshotDocument, SnapshotError> {
    let file = File::open(path).map_err(|source| SnapshotError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    let document = read_snapshot(BufReader::new(file))?;
    info!(
        "Loaded snapshot of session {} saved at {}",
        document.session_id,
        document.saved_at.to_rfc3339()
    );
    Ok(document)
}

impl Session {
    /// Capture the current graph as a snapshot document
    pub fn to_document(&self) -> Result<SnapshotDocument, SnapshotError> {
        let graph: Arc<SchemaGraph> = self.snapshot();
        SnapshotDocument::new(self.id(), SchemaGraph::clone(&graph))
    }

    /// Save the current graph. The graph is captured under the read lock and
    /// written after the lock is released.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let document = self.to_document()?;
        save_snapshot(path, &document)
    }

    /// Start a session over a saved snapshot
    pub fn from_snapshot(
        path: &Path,
        resolver: Arc<dyn TypeResolver>,
        mut options: SessionOptions,
    ) -> Result<Self, SnapshotError> {
        let document = load_snapshot(path)?;
        options.source_driver = document.graph.source_driver;
        options.target_dialect = document.graph.target_dialect;
        Session::new(document.graph, resolver, options)
            .map_err(|e| SnapshotError::Inconsistent(e.to_string()))
    }
}
