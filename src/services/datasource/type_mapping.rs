//! Native-to-normalized type mapping
//!
//! One static map per source kind. Lookups are longest-prefix and
//! case-insensitive, with parametrization stripped first, so
//! `VARCHAR(255)` lands on `varchar` and `timestamp with time zone` lands
//! on `timestamp`. Unknown natives map to `Unknown`, never silently to
//! `String`.

use crate::models::{NormalizedType, SourceType};

type TypeMap = &'static [(&'static str, NormalizedType)];

pub const MYSQL_TYPE_MAP: TypeMap = &[
    ("char", NormalizedType::String),
    ("varchar", NormalizedType::String),
    ("tinytext", NormalizedType::String),
    ("text", NormalizedType::String),
    ("mediumtext", NormalizedType::String),
    ("longtext", NormalizedType::String),
    ("enum", NormalizedType::String),
    ("set", NormalizedType::String),
    ("tinyint", NormalizedType::Integer),
    ("smallint", NormalizedType::Integer),
    ("mediumint", NormalizedType::Integer),
    ("int", NormalizedType::Integer),
    ("integer", NormalizedType::Integer),
    ("bigint", NormalizedType::Integer),
    ("float", NormalizedType::Float),
    ("double", NormalizedType::Float),
    ("decimal", NormalizedType::Decimal),
    ("numeric", NormalizedType::Decimal),
    ("bool", NormalizedType::Boolean),
    ("boolean", NormalizedType::Boolean),
    ("date", NormalizedType::Date),
    ("datetime", NormalizedType::Datetime),
    ("timestamp", NormalizedType::Timestamp),
    ("time", NormalizedType::Time),
    ("year", NormalizedType::Integer),
    ("binary", NormalizedType::Binary),
    ("varbinary", NormalizedType::Binary),
    ("tinyblob", NormalizedType::Binary),
    ("blob", NormalizedType::Binary),
    ("mediumblob", NormalizedType::Binary),
    ("longblob", NormalizedType::Binary),
    ("json", NormalizedType::Json),
];

pub const SQLITE_TYPE_MAP: TypeMap = &[
    ("text", NormalizedType::String),
    ("char", NormalizedType::String),
    ("varchar", NormalizedType::String),
    ("clob", NormalizedType::String),
    ("int", NormalizedType::Integer),
    ("integer", NormalizedType::Integer),
    ("bigint", NormalizedType::Integer),
    ("smallint", NormalizedType::Integer),
    ("tinyint", NormalizedType::Integer),
    ("real", NormalizedType::Float),
    ("double", NormalizedType::Float),
    ("float", NormalizedType::Float),
    ("decimal", NormalizedType::Decimal),
    ("numeric", NormalizedType::Decimal),
    ("bool", NormalizedType::Boolean),
    ("boolean", NormalizedType::Boolean),
    ("date", NormalizedType::Date),
    ("datetime", NormalizedType::Datetime),
    ("timestamp", NormalizedType::Timestamp),
    ("blob", NormalizedType::Binary),
];

pub const POSTGRESQL_TYPE_MAP: TypeMap = &[
    ("character varying", NormalizedType::String),
    ("character", NormalizedType::String),
    ("varchar", NormalizedType::String),
    ("char", NormalizedType::String),
    ("text", NormalizedType::String),
    ("uuid", NormalizedType::String),
    ("name", NormalizedType::String),
    ("smallint", NormalizedType::Integer),
    ("integer", NormalizedType::Integer),
    ("int2", NormalizedType::Integer),
    ("int4", NormalizedType::Integer),
    ("int8", NormalizedType::Integer),
    ("int", NormalizedType::Integer),
    ("bigint", NormalizedType::Integer),
    ("serial", NormalizedType::Integer),
    ("bigserial", NormalizedType::Integer),
    ("real", NormalizedType::Float),
    ("double precision", NormalizedType::Float),
    ("float4", NormalizedType::Float),
    ("float8", NormalizedType::Float),
    ("numeric", NormalizedType::Decimal),
    ("decimal", NormalizedType::Decimal),
    ("money", NormalizedType::Decimal),
    ("bool", NormalizedType::Boolean),
    ("boolean", NormalizedType::Boolean),
    ("date", NormalizedType::Date),
    ("timestamptz", NormalizedType::Timestamp),
    ("timestamp", NormalizedType::Timestamp),
    ("timetz", NormalizedType::Time),
    ("time", NormalizedType::Time),
    ("interval", NormalizedType::String),
    ("bytea", NormalizedType::Binary),
    ("json", NormalizedType::Json),
    ("jsonb", NormalizedType::Json),
    ("xml", NormalizedType::String),
    ("array", NormalizedType::Array),
    ("hstore", NormalizedType::Map),
    ("inet", NormalizedType::String),
    ("cidr", NormalizedType::String),
];

/// Snowflake-style engines: distinct because of `variant` and friends
pub const SNOWFLAKE_TYPE_MAP: TypeMap = &[
    ("varchar", NormalizedType::String),
    ("char", NormalizedType::String),
    ("string", NormalizedType::String),
    ("text", NormalizedType::String),
    ("number", NormalizedType::Decimal),
    ("numeric", NormalizedType::Decimal),
    ("decimal", NormalizedType::Decimal),
    ("int", NormalizedType::Integer),
    ("integer", NormalizedType::Integer),
    ("bigint", NormalizedType::Integer),
    ("smallint", NormalizedType::Integer),
    ("float", NormalizedType::Float),
    ("double", NormalizedType::Float),
    ("real", NormalizedType::Float),
    ("boolean", NormalizedType::Boolean),
    ("date", NormalizedType::Date),
    ("datetime", NormalizedType::Datetime),
    ("timestamp_ltz", NormalizedType::Timestamp),
    ("timestamp_ntz", NormalizedType::Timestamp),
    ("timestamp_tz", NormalizedType::Timestamp),
    ("timestamp", NormalizedType::Timestamp),
    ("time", NormalizedType::Time),
    ("binary", NormalizedType::Binary),
    ("varbinary", NormalizedType::Binary),
    ("variant", NormalizedType::Json),
    ("object", NormalizedType::Struct),
    ("array", NormalizedType::Array),
];

/// Map used when inferring types from JSON-shaped sources (documents, files)
pub const JSON_TYPE_MAP: TypeMap = &[
    ("string", NormalizedType::String),
    ("integer", NormalizedType::Integer),
    ("number", NormalizedType::Float),
    ("boolean", NormalizedType::Boolean),
    ("object", NormalizedType::Struct),
    ("array", NormalizedType::Array),
    ("null", NormalizedType::Unknown),
];

/// The static map for a source kind. Sources without a dedicated map fall
/// back to the PostgreSQL map, the broadest of the SQL dialects.
pub fn get_type_map(source_type: SourceType) -> TypeMap {
    match source_type {
        SourceType::Mysql => MYSQL_TYPE_MAP,
        SourceType::Sqlite | SourceType::Duckdb => SQLITE_TYPE_MAP,
        SourceType::Snowflake => SNOWFLAKE_TYPE_MAP,
        SourceType::Mongodb | SourceType::Dynamodb => JSON_TYPE_MAP,
        SourceType::LocalFile | SourceType::S3 | SourceType::Gcs => JSON_TYPE_MAP,
        _ => POSTGRESQL_TYPE_MAP,
    }
}

/// Normalize a native type string for a source kind.
///
/// Longest-prefix, case-insensitive match after stripping parametrization;
/// an explicit `[]` suffix wins as `Array`; empty or unmatched input is
/// `Unknown`.
pub fn normalize_type(native: &str, source_type: SourceType) -> NormalizedType {
    let lowered = native.trim().to_lowercase();
    if lowered.is_empty() {
        return NormalizedType::Unknown;
    }
    if lowered.ends_with("[]") {
        return NormalizedType::Array;
    }

    // varchar(255) -> varchar, numeric(10,2) -> numeric
    let stripped = lowered.split('(').next().unwrap_or(&lowered).trim();

    let mut best: Option<(&str, NormalizedType)> = None;
    for (key, normalized) in get_type_map(source_type) {
        if stripped.starts_with(key) {
            match best {
                Some((best_key, _)) if best_key.len() >= key.len() => {}
                _ => best = Some((key, *normalized)),
            }
        }
    }

    best.map(|(_, n)| n).unwrap_or(NormalizedType::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parametrized_types_strip() {
        assert_eq!(normalize_type("varchar(255)", SourceType::Postgresql), NormalizedType::String);
        assert_eq!(normalize_type("numeric(10,2)", SourceType::Postgresql), NormalizedType::Decimal);
        assert_eq!(normalize_type("decimal(18,4)", SourceType::Mysql), NormalizedType::Decimal);
    }

    #[test]
    fn longest_prefix_wins() {
        assert_eq!(normalize_type("datetime", SourceType::Mysql), NormalizedType::Datetime);
        assert_eq!(normalize_type("date", SourceType::Mysql), NormalizedType::Date);
        assert_eq!(
            normalize_type("timestamp with time zone", SourceType::Postgresql),
            NormalizedType::Timestamp
        );
        assert_eq!(normalize_type("timestamptz", SourceType::Postgresql), NormalizedType::Timestamp);
        assert_eq!(normalize_type("timetz", SourceType::Postgresql), NormalizedType::Time);
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(normalize_type("VARCHAR", SourceType::Mysql), NormalizedType::String);
        assert_eq!(normalize_type("BigInt", SourceType::Mysql), NormalizedType::Integer);
        assert_eq!(normalize_type("JSONB", SourceType::Postgresql), NormalizedType::Json);
    }

    #[test]
    fn arrays_and_variants() {
        assert_eq!(normalize_type("integer[]", SourceType::Postgresql), NormalizedType::Array);
        assert_eq!(normalize_type("text[]", SourceType::Postgresql), NormalizedType::Array);
        assert_eq!(normalize_type("variant", SourceType::Snowflake), NormalizedType::Json);
    }

    #[test]
    fn unknown_natives_stay_unknown() {
        assert_eq!(normalize_type("", SourceType::Postgresql), NormalizedType::Unknown);
        assert_eq!(normalize_type("geometry", SourceType::Mysql), NormalizedType::Unknown);
        assert_eq!(normalize_type("frobnicator", SourceType::Sqlite), NormalizedType::Unknown);
    }

    #[test]
    fn every_map_value_is_in_the_closed_set() {
        // The closed set is the enum itself; what we verify is that every
        // key round-trips through normalize_type to its mapped value.
        for source in [
            SourceType::Mysql,
            SourceType::Sqlite,
            SourceType::Postgresql,
            SourceType::Snowflake,
        ] {
            for (key, expected) in get_type_map(source) {
                let got = normalize_type(key, source);
                assert_eq!(got, *expected, "{key} under {source:?}");
            }
        }
    }
}
