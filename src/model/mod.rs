//! Schema graph model

mod builder;
mod elements;
mod schema_graph;

pub use builder::{
    SourceColumnDef, SourceForeignKeyDef, SourceIndexDef, SourceTableDef, SYNTHETIC_KEY_NAME,
};
pub use elements::*;
pub use schema_graph::{CrossReference, SchemaGraph, SourceLink, TargetLink};
