//! Column types and the type resolver seam
//!
//! The target type system is small: a base type, an optional length for
//! STRING/BYTES, and an array flag. Mapping a source type onto it is the job
//! of a [`TypeResolver`]; [`BasicTypeResolver`] is the reference mapping.

mod basic;

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ResolveError;
use crate::issues::IssueKind;

pub use basic::BasicTypeResolver;

/// Largest STRING length the target accepts
pub const MAX_STRING_LENGTH: u32 = 2_621_440;
/// Largest BYTES length the target accepts
pub const MAX_BYTES_LENGTH: u32 = 10_485_760;

/// Source database driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    MySql,
    Postgres,
    SqlServer,
    Oracle,
    Cassandra,
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Driver::MySql => "mysql",
            Driver::Postgres => "postgres",
            Driver::SqlServer => "sqlserver",
            Driver::Oracle => "oracle",
            Driver::Cassandra => "cassandra",
        };
        f.write_str(name)
    }
}

impl FromStr for Driver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" => Ok(Driver::MySql),
            "postgres" | "postgresql" | "pg" => Ok(Driver::Postgres),
            "sqlserver" | "mssql" => Ok(Driver::SqlServer),
            "oracle" => Ok(Driver::Oracle),
            "cassandra" => Ok(Driver::Cassandra),
            other => Err(format!("unknown driver '{}'", other)),
        }
    }
}

/// SQL dialect of the target database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetDialect {
    #[default]
    GoogleSql,
    Postgres,
}

impl FromStr for TargetDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" | "googlesql" | "google_standard_sql" => Ok(TargetDialect::GoogleSql),
            "postgres" | "postgresql" | "pg" => Ok(TargetDialect::Postgres),
            other => Err(format!("unknown dialect '{}'", other)),
        }
    }
}

/// Base target type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BaseType {
    Bool,
    Int64,
    Float32,
    Float64,
    Numeric,
    String,
    Bytes,
    Date,
    Timestamp,
    Json,
}

impl BaseType {
    pub fn google_name(self) -> &'static str {
        match self {
            BaseType::Bool => "BOOL",
            BaseType::Int64 => "INT64",
            BaseType::Float32 => "FLOAT32",
            BaseType::Float64 => "FLOAT64",
            BaseType::Numeric => "NUMERIC",
            BaseType::String => "STRING",
            BaseType::Bytes => "BYTES",
            BaseType::Date => "DATE",
            BaseType::Timestamp => "TIMESTAMP",
            BaseType::Json => "JSON",
        }
    }

    pub fn postgres_name(self) -> &'static str {
        match self {
            BaseType::Bool => "boolean",
            BaseType::Int64 => "bigint",
            BaseType::Float32 => "real",
            BaseType::Float64 => "double precision",
            BaseType::Numeric => "numeric",
            BaseType::String => "varchar",
            BaseType::Bytes => "bytea",
            BaseType::Date => "date",
            BaseType::Timestamp => "timestamptz",
            BaseType::Json => "jsonb",
        }
    }

    /// STRING and BYTES carry a length
    pub fn has_length(self) -> bool {
        matches!(self, BaseType::String | BaseType::Bytes)
    }

    fn from_name(name: &str) -> Option<(Self, Option<Length>)> {
        let normalized = name.split_whitespace().collect::<Vec<_>>().join(" ");
        let base = match normalized.to_ascii_lowercase().as_str() {
            "bool" | "boolean" => BaseType::Bool,
            "int64" | "bigint" | "int8" => BaseType::Int64,
            "float32" | "real" | "float4" => BaseType::Float32,
            "float64" | "double precision" | "float8" => BaseType::Float64,
            "numeric" | "decimal" => BaseType::Numeric,
            "string" | "varchar" | "character varying" => BaseType::String,
            "text" => return Some((BaseType::String, Some(Length::Max))),
            "bytes" | "bytea" => BaseType::Bytes,
            "date" => BaseType::Date,
            "timestamp" | "timestamptz" => BaseType::Timestamp,
            "json" | "jsonb" => BaseType::Json,
            _ => return None,
        };
        Some((base, None))
    }
}

/// Length modifier of a STRING or BYTES column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Length {
    Max,
    Limited(u32),
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Length::Max => f.write_str("MAX"),
            Length::Limited(n) => write!(f, "{}", n),
        }
    }
}

/// A resolved target column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnType {
    pub name: BaseType,
    pub len: Option<Length>,
    pub is_array: bool,
}

static TYPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:(ARRAY)\s*<\s*(?P<inner>[^>]+?)\s*>|(?P<scalar>[^<>\[\]]+?)\s*(?P<brackets>\[\])?)\s*$")
        .expect("valid type regex")
});

static SIZED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?P<base>[a-z][a-z0-9 ]*?)\s*(?:\(\s*(?P<len>MAX|\d+)\s*\))?$")
        .expect("valid sized type regex")
});

impl ColumnType {
    pub fn scalar(name: BaseType) -> Self {
        let len = if name.has_length() {
            Some(Length::Max)
        } else {
            None
        };
        Self {
            name,
            len,
            is_array: false,
        }
    }

    pub fn string(len: Length) -> Self {
        Self {
            name: BaseType::String,
            len: Some(len),
            is_array: false,
        }
    }

    pub fn bytes(len: Length) -> Self {
        Self {
            name: BaseType::Bytes,
            len: Some(len),
            is_array: false,
        }
    }

    pub fn array(self) -> Self {
        Self {
            is_array: true,
            ..self
        }
    }

    /// Parse a requested type such as `STRING(50)`, `ARRAY<INT64>`, `varchar(20)[]` or `text`.
    pub fn parse(input: &str) -> Result<Self, ResolveError> {
        let invalid = |reason: &str| ResolveError::InvalidType {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let caps = TYPE_RE
            .captures(input)
            .ok_or_else(|| invalid("unrecognized type syntax"))?;
        let (body, is_array) = match (caps.name("inner"), caps.name("scalar")) {
            (Some(inner), _) => (inner.as_str(), true),
            (None, Some(scalar)) => (scalar.as_str(), caps.name("brackets").is_some()),
            (None, None) => return Err(invalid("unrecognized type syntax")),
        };

        let sized = SIZED_RE
            .captures(body.trim())
            .ok_or_else(|| invalid("unrecognized type syntax"))?;
        let (name, implied_len) =
            BaseType::from_name(&sized["base"]).ok_or_else(|| invalid("unknown base type"))?;

        let len = match sized.name("len") {
            Some(_) if !name.has_length() => {
                return Err(invalid("only STRING and BYTES take a length"));
            }
            Some(len) if len.as_str().eq_ignore_ascii_case("max") => Some(Length::Max),
            Some(len) => {
                let n: u32 = len
                    .as_str()
                    .parse()
                    .map_err(|_| invalid("length is out of range"))?;
                let limit = if name == BaseType::String {
                    MAX_STRING_LENGTH
                } else {
                    MAX_BYTES_LENGTH
                };
                if n == 0 || n > limit {
                    return Err(invalid("length is out of range"));
                }
                Some(Length::Limited(n))
            }
            None if name.has_length() => Some(implied_len.unwrap_or(Length::Max)),
            None => None,
        };

        Ok(Self {
            name,
            len,
            is_array,
        })
    }

    /// JSON and array columns cannot be used in primary keys or indexes
    pub fn is_keyable(&self) -> bool {
        !self.is_array && self.name != BaseType::Json
    }

    pub fn is_timestamp(&self) -> bool {
        !self.is_array && self.name == BaseType::Timestamp
    }

    /// Render the type in the given target dialect
    pub fn render(&self, dialect: TargetDialect) -> String {
        match dialect {
            TargetDialect::GoogleSql => {
                let scalar = match self.len {
                    Some(len) if self.name.has_length() => {
                        format!("{}({})", self.name.google_name(), len)
                    }
                    _ => self.name.google_name().to_string(),
                };
                if self.is_array {
                    format!("ARRAY<{}>", scalar)
                } else {
                    scalar
                }
            }
            TargetDialect::Postgres => {
                let scalar = match (self.name, self.len) {
                    (BaseType::String, Some(Length::Limited(n))) => format!("varchar({})", n),
                    _ => self.name.postgres_name().to_string(),
                };
                if self.is_array {
                    format!("{}[]", scalar)
                } else {
                    scalar
                }
            }
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(TargetDialect::GoogleSql))
    }
}

/// A column type as declared in the source database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceType {
    /// Type name, e.g. `varchar`, `int`, `numeric`
    pub name: String,
    /// Length/precision modifiers, e.g. `[10, 2]` for `decimal(10,2)`
    #[serde(default)]
    pub mods: Vec<i64>,
    /// One entry per array dimension (-1 when unbounded)
    #[serde(default)]
    pub array_bounds: Vec<i64>,
}

impl SourceType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mods: Vec::new(),
            array_bounds: Vec::new(),
        }
    }

    pub fn with_mods(mut self, mods: &[i64]) -> Self {
        self.mods = mods.to_vec();
        self
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.mods.is_empty() {
            let mods: Vec<String> = self.mods.iter().map(|m| m.to_string()).collect();
            write!(f, "({})", mods.join(","))?;
        }
        for _ in &self.array_bounds {
            f.write_str("[]")?;
        }
        Ok(())
    }
}

/// Inputs to a type resolution
#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest<'a> {
    /// Source column type; `None` for columns with no source counterpart
    pub source: Option<&'a SourceType>,
    /// Requested target type; `None` asks for the default mapping
    pub requested: Option<&'a str>,
    pub driver: Driver,
    pub dialect: TargetDialect,
}

/// Outcome of a type resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub column_type: ColumnType,
    pub issues: Vec<IssueKind>,
}

/// Maps source column types onto target column types.
pub trait TypeResolver: Send + Sync {
    fn resolve(&self, request: ResolveRequest<'_>) -> Result<Resolution, ResolveError>;
}
