//! Reference type mapping for MySQL, PostgreSQL and SQL Server sources.

use crate::error::ResolveError;
use crate::issues::IssueKind;

use super::{
    BaseType, ColumnType, Driver, Length, ResolveRequest, Resolution, SourceType, TypeResolver,
    MAX_STRING_LENGTH,
};

/// Type resolver covering the common relational sources.
///
/// Oracle and Cassandra are rejected with [`ResolveError::UnsupportedDriver`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicTypeResolver;

impl BasicTypeResolver {
    pub fn new() -> Self {
        Self
    }
}

impl TypeResolver for BasicTypeResolver {
    fn resolve(&self, request: ResolveRequest<'_>) -> Result<Resolution, ResolveError> {
        if matches!(request.driver, Driver::Oracle | Driver::Cassandra) {
            return Err(ResolveError::UnsupportedDriver(request.driver));
        }

        let source = match request.source {
            Some(source) => source,
            None => {
                // Columns with no source counterpart take the requested type as-is
                let requested = request.requested.ok_or_else(|| ResolveError::InvalidType {
                    input: String::new(),
                    reason: "a type is required for a column with no source".to_string(),
                })?;
                return Ok(Resolution {
                    column_type: ColumnType::parse(requested)?,
                    issues: Vec::new(),
                });
            }
        };

        let default = default_mapping(request.driver, source);
        match request.requested {
            None => Ok(default),
            Some(requested) => {
                let requested_type = ColumnType::parse(requested)?;
                convert_to_requested(source, default, requested_type, requested)
            }
        }
    }
}

/// Default mapping of a source type.
fn default_mapping(driver: Driver, source: &SourceType) -> Resolution {
    let name = source.name.to_lowercase();
    let name = name
        .trim_end_matches(" unsigned")
        .trim_end_matches(" signed")
        .trim();
    let first_mod = source.mods.first().copied();

    let (scalar, mut issues) = match name {
        // Boolean
        "bool" | "boolean" => (ColumnType::scalar(BaseType::Bool), vec![]),
        "bit" if driver == Driver::SqlServer || first_mod.unwrap_or(1) == 1 => {
            (ColumnType::scalar(BaseType::Bool), vec![])
        }
        "bit" => (ColumnType::bytes(Length::Max), vec![]),

        // Integer types
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "int2" | "int4"
        | "smallserial" | "serial" | "serial4" => {
            (ColumnType::scalar(BaseType::Int64), vec![IssueKind::TypeWidened])
        }
        "bigint" | "int8" | "bigserial" | "serial8" => (ColumnType::scalar(BaseType::Int64), vec![]),
        "year" => (ColumnType::scalar(BaseType::Int64), vec![IssueKind::TypeWidened]),

        // Floating point
        "float" | "real" | "float4" if driver != Driver::SqlServer || name == "real" => {
            (ColumnType::scalar(BaseType::Float64), vec![IssueKind::TypeWidened])
        }
        "float" | "double" | "double precision" | "float8" => {
            (ColumnType::scalar(BaseType::Float64), vec![])
        }

        // Decimal/numeric
        "decimal" | "numeric" | "dec" | "fixed" => {
            let precision = source.mods.first().copied().unwrap_or(0);
            let scale = source.mods.get(1).copied().unwrap_or(0);
            if precision > 38 || scale > 9 {
                (
                    ColumnType::scalar(BaseType::Numeric),
                    vec![IssueKind::PrecisionLoss],
                )
            } else {
                (ColumnType::scalar(BaseType::Numeric), vec![])
            }
        }
        "money" | "smallmoney" => (ColumnType::scalar(BaseType::Numeric), vec![]),

        // String types
        "char" | "varchar" | "nchar" | "nvarchar" | "character" | "character varying"
        | "bpchar" => (ColumnType::string(string_length(first_mod)), vec![]),
        "text" | "tinytext" | "mediumtext" | "longtext" | "ntext" | "citext" | "enum"
        | "set" | "xml" => (ColumnType::string(Length::Max), vec![]),

        // Binary types
        "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" | "bytea"
        | "image" => (ColumnType::bytes(Length::Max), vec![]),

        // Date/time types
        "date" => (ColumnType::scalar(BaseType::Date), vec![]),
        "datetime" | "datetime2" | "smalldatetime" => (
            ColumnType::scalar(BaseType::Timestamp),
            vec![IssueKind::TimezoneAssumed],
        ),
        "timestamp" if driver == Driver::Postgres => (
            ColumnType::scalar(BaseType::Timestamp),
            vec![IssueKind::TimezoneAssumed],
        ),
        "timestamp" | "timestamptz" | "timestamp with time zone" | "datetimeoffset" => {
            (ColumnType::scalar(BaseType::Timestamp), vec![])
        }
        "time" | "timetz" | "time with time zone" | "interval" => (
            ColumnType::string(Length::Max),
            vec![IssueKind::TimeUnsupported],
        ),

        // JSON
        "json" | "jsonb" => (ColumnType::scalar(BaseType::Json), vec![]),

        // GUID
        "uuid" | "uniqueidentifier" => (ColumnType::string(Length::Limited(36)), vec![]),

        // Default fallback
        _ => (ColumnType::string(Length::Max), vec![IssueKind::NoGoodType]),
    };

    let column_type = match source.array_bounds.len() {
        0 => scalar,
        1 => scalar.array(),
        _ => {
            issues.push(IssueKind::MultiDimensionalArrayUnsupported);
            ColumnType::string(Length::Max)
        }
    };

    Resolution {
        column_type,
        issues,
    }
}

fn string_length(declared: Option<i64>) -> Length {
    match declared {
        Some(n) if n > 0 && n <= MAX_STRING_LENGTH as i64 => Length::Limited(n as u32),
        _ => Length::Max,
    }
}

/// Check a requested type against the default mapping and collect the issues it implies.
fn convert_to_requested(
    source: &SourceType,
    default: Resolution,
    requested: ColumnType,
    requested_text: &str,
) -> Result<Resolution, ResolveError> {
    let unsupported = || ResolveError::UnsupportedConversion {
        source_type: source.to_string(),
        requested: requested_text.to_string(),
    };

    let from = default.column_type;
    if from.is_array != requested.is_array {
        return Err(unsupported());
    }

    let issues = match (from.name, requested.name) {
        (a, b) if a == b => {
            let mut issues = default.issues;
            if shorter(requested.len, from.len) {
                issues.push(IssueKind::StringOverflow);
            }
            issues
        }
        (_, BaseType::String) => {
            let mut issues: Vec<IssueKind> = default
                .issues
                .into_iter()
                .filter(|issue| *issue != IssueKind::NoGoodType)
                .collect();
            if !issues.contains(&IssueKind::TypeWidened) {
                issues.push(IssueKind::TypeWidened);
            }
            issues
        }
        (BaseType::Int64, BaseType::Numeric) => vec![],
        (BaseType::Int64, BaseType::Float64)
        | (BaseType::Numeric, BaseType::Float64)
        | (BaseType::Float64, BaseType::Numeric) => vec![IssueKind::PrecisionLoss],
        (BaseType::Float32, BaseType::Float64) | (BaseType::Float64, BaseType::Float32) => {
            vec![IssueKind::PrecisionLoss]
        }
        (BaseType::String, BaseType::Bytes) => vec![],
        (BaseType::Timestamp, BaseType::Date) => vec![IssueKind::PrecisionLoss],
        _ => return Err(unsupported()),
    };

    Ok(Resolution {
        column_type: requested,
        issues,
    })
}

fn shorter(requested: Option<Length>, current: Option<Length>) -> bool {
    match (requested, current) {
        (Some(Length::Limited(_)), Some(Length::Max)) => true,
        (Some(Length::Limited(r)), Some(Length::Limited(c))) => r < c,
        _ => false,
    }
}
