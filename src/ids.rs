//! Stable identifiers for schema entities
//!
//! Every table, column, foreign key and index in a session is addressed by an
//! allocator-issued identifier. Identifiers are a one-letter kind prefix
//! followed by a session-wide counter value (`t1`, `c2`, `f3`, `i4`). The
//! counter only ever moves forward, so an identifier freed by a deletion is
//! never handed out again.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of entity an identifier is issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    Table,
    Column,
    ForeignKey,
    Index,
}

impl IdKind {
    /// Single-letter prefix used in the rendered identifier
    pub fn prefix(self) -> char {
        match self {
            IdKind::Table => 't',
            IdKind::Column => 'c',
            IdKind::ForeignKey => 'f',
            IdKind::Index => 'i',
        }
    }
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

define_id!(
    /// Identifier of a table (shared by the source table and its target counterpart)
    TableId
);
define_id!(
    /// Identifier of a column (shared by a source column and the target column derived from it)
    ColumnId
);
define_id!(
    /// Identifier of a foreign key
    ForeignKeyId
);
define_id!(
    /// Identifier of a secondary index
    IndexId
);

/// Monotonic identifier allocator.
///
/// A single counter is shared by all kinds so identifiers are unique across
/// kinds as well as within them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdAllocator {
    counter: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh identifier string for `kind`
    pub fn next_id(&mut self, kind: IdKind) -> String {
        self.counter += 1;
        format!("{}{}", kind.prefix(), self.counter)
    }

    pub fn table_id(&mut self) -> TableId {
        TableId(self.next_id(IdKind::Table))
    }

    pub fn column_id(&mut self) -> ColumnId {
        ColumnId(self.next_id(IdKind::Column))
    }

    pub fn foreign_key_id(&mut self) -> ForeignKeyId {
        ForeignKeyId(self.next_id(IdKind::ForeignKey))
    }

    pub fn index_id(&mut self) -> IndexId {
        IndexId(self.next_id(IdKind::Index))
    }

    /// Last value handed out (0 when nothing has been allocated)
    pub fn current(&self) -> u64 {
        self.counter
    }

    /// Reinitialize the counter. Only valid when the whole graph is replaced.
    pub fn reset(&mut self) {
        self.counter = 0;
    }
}
