//! Unified data-source model
//!
//! Every adapter, whatever the engine underneath, converses with the core
//! through these types: a three-level `Catalog -> Schema -> Table` hierarchy
//! with normalized column types, frozen query results, capability flags and
//! self-describing configuration schemas.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Source identity
// ============================================================================

/// Supported data source kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    // SQL databases
    Postgresql,
    Mysql,
    Sqlite,
    Trino,
    Snowflake,
    Bigquery,
    Redshift,
    Duckdb,
    // Document stores
    Mongodb,
    Dynamodb,
    // APIs
    Salesforce,
    Hubspot,
    // File systems
    S3,
    Gcs,
    LocalFile,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgresql => "postgresql",
            Self::Mysql => "mysql",
            Self::Sqlite => "sqlite",
            Self::Trino => "trino",
            Self::Snowflake => "snowflake",
            Self::Bigquery => "bigquery",
            Self::Redshift => "redshift",
            Self::Duckdb => "duckdb",
            Self::Mongodb => "mongodb",
            Self::Dynamodb => "dynamodb",
            Self::Salesforce => "salesforce",
            Self::Hubspot => "hubspot",
            Self::S3 => "s3",
            Self::Gcs => "gcs",
            Self::LocalFile => "local_file",
        }
    }

    /// Category is derived from the source type, never configured
    pub fn category(&self) -> SourceCategory {
        match self {
            Self::Postgresql
            | Self::Mysql
            | Self::Sqlite
            | Self::Trino
            | Self::Snowflake
            | Self::Bigquery
            | Self::Redshift
            | Self::Duckdb
            | Self::Mongodb
            | Self::Dynamodb => SourceCategory::Database,
            Self::Salesforce | Self::Hubspot => SourceCategory::Api,
            Self::S3 | Self::Gcs | Self::LocalFile => SourceCategory::Filesystem,
        }
    }
}

/// Category of data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    Database,
    Api,
    Filesystem,
}

/// Query language an adapter speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryLanguage {
    Sql,
    Soql,
    Mql,
    ScanOnly,
}

// ============================================================================
// Normalized type system
// ============================================================================

/// Closed cross-source type set used by the core regardless of source kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizedType {
    String,
    Integer,
    Float,
    Decimal,
    Boolean,
    Date,
    Datetime,
    Time,
    Timestamp,
    Binary,
    Json,
    Array,
    Map,
    Struct,
    Unknown,
}

impl NormalizedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Datetime => "datetime",
            Self::Time => "time",
            Self::Timestamp => "timestamp",
            Self::Binary => "binary",
            Self::Json => "json",
            Self::Array => "array",
            Self::Map => "map",
            Self::Struct => "struct",
            Self::Unknown => "unknown",
        }
    }
}

// ============================================================================
// Schema hierarchy
// ============================================================================

/// Statistics for a single column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub null_count: u64,
    pub null_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distinct_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample_values: Vec<String>,
}

/// Unified column representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Normalized type, never a raw engine string
    pub data_type: NormalizedType,
    /// Source-specific type string, kept verbatim
    pub native_type: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_partition_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ColumnStats>,
}

fn default_true() -> bool {
    true
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: NormalizedType, native_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type,
            native_type: native_type.into(),
            nullable: true,
            is_primary_key: false,
            is_partition_key: false,
            description: None,
            stats: None,
        }
    }
}

/// Normalized table kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    Table,
    View,
    External,
    Object,
    Collection,
    File,
}

/// Unified table representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub table_type: TableType,
    /// Source-specific kind string ("BASE TABLE", "collection", ...)
    pub native_type: String,
    /// Fully qualified identifier used verbatim when addressing the table
    pub native_path: String,
    pub columns: Vec<Column>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Schema within a catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub name: String,
    pub tables: Vec<Table>,
}

/// Catalog containing schemas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub name: String,
    pub schemas: Vec<SchemaInfo>,
}

/// Unified schema response from any adapter. Frozen once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaResponse {
    pub source_id: String,
    pub source_type: SourceType,
    pub source_category: SourceCategory,
    pub fetched_at: DateTime<Utc>,
    pub catalogs: Vec<Catalog>,
}

impl SchemaResponse {
    /// Flatten the catalog/schema nesting into a table list
    pub fn all_tables(&self) -> Vec<&Table> {
        self.catalogs
            .iter()
            .flat_map(|c| c.schemas.iter())
            .flat_map(|s| s.tables.iter())
            .collect()
    }

    pub fn table_count(&self) -> usize {
        self.catalogs
            .iter()
            .flat_map(|c| c.schemas.iter())
            .map(|s| s.tables.len())
            .sum()
    }

    /// Fail-fast check used before any hypothesis work starts
    pub fn is_empty(&self) -> bool {
        self.table_count() == 0
    }

    pub fn table_names(&self) -> Vec<String> {
        self.all_tables().iter().map(|t| t.native_path.clone()).collect()
    }

    /// Find a table by native path or short name, case-insensitively
    pub fn find_table(&self, name: &str) -> Option<&Table> {
        let needle = name.to_lowercase();
        self.all_tables()
            .into_iter()
            .find(|t| t.native_path.to_lowercase() == needle || t.name.to_lowercase() == needle)
    }

    /// Format the schema for LLM prompts.
    ///
    /// The wording is deliberate: generated probes must only ever reference
    /// tables and columns the source actually has.
    pub fn to_prompt_string(&self, max_tables: usize, max_columns: usize) -> String {
        let tables = self.all_tables();
        if tables.is_empty() {
            return "No tables available.".to_string();
        }

        let mut lines = vec!["AVAILABLE TABLES AND COLUMNS (USE ONLY THESE):".to_string()];

        for table in tables.iter().take(max_tables) {
            lines.push(format!("\n{}", table.native_path));
            for col in table.columns.iter().take(max_columns) {
                lines.push(format!("   - {} ({})", col.name, col.data_type.as_str()));
            }
            if table.columns.len() > max_columns {
                lines.push(format!("   ... and {} more columns", table.columns.len() - max_columns));
            }
        }

        if tables.len() > max_tables {
            lines.push(format!("\n... and {} more tables", tables.len() - max_tables));
        }

        lines.push("\nCRITICAL: Use ONLY the tables and columns listed above.".to_string());
        lines.push("DO NOT invent tables or columns.".to_string());

        lines.join("\n")
    }
}

/// Filter for schema discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_pattern: Option<String>,
    #[serde(default = "default_true")]
    pub include_views: bool,
    #[serde(default = "default_max_tables")]
    pub max_tables: usize,
}

fn default_max_tables() -> usize {
    1000
}

impl Default for SchemaFilter {
    fn default() -> Self {
        Self {
            table_pattern: None,
            schema_pattern: None,
            catalog_pattern: None,
            include_views: true,
            max_tables: default_max_tables(),
        }
    }
}

impl SchemaFilter {
    pub fn for_table(pattern: impl Into<String>) -> Self {
        Self {
            table_pattern: Some(pattern.into()),
            schema_pattern: None,
            catalog_pattern: None,
            include_views: true,
            max_tables: default_max_tables(),
        }
    }
}

// ============================================================================
// Query results
// ============================================================================

/// Column descriptor in a query result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultColumn {
    pub name: String,
    pub data_type: NormalizedType,
}

/// Result of executing a query. Frozen on construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<ResultColumn>,
    /// Name-keyed records
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub row_count: u64,
    #[serde(default)]
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            truncated: false,
            execution_time_ms: None,
        }
    }

    /// Summarize the result for LLM interpretation
    pub fn to_summary(&self, max_rows: usize) -> String {
        if self.rows.is_empty() {
            return "No rows returned".to_string();
        }

        let col_names: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        let mut lines = vec![format!("Columns: {}", col_names.join(", "))];
        lines.push(format!("Total rows: {}", self.row_count));
        if self.truncated {
            lines.push("(Results truncated)".to_string());
        }
        lines.push("\nSample rows:".to_string());

        for row in self.rows.iter().take(max_rows) {
            let row_str = row
                .iter()
                .map(|(k, v)| format!("{}={}", k, render_value(v)))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("  {}", row_str));
        }

        if self.rows.len() > max_rows {
            lines.push(format!("  ... and {} more rows", self.rows.len() - max_rows));
        }

        lines.join("\n")
    }

    /// Read a numeric cell from the first row, tolerating string-typed engines
    pub fn first_row_f64(&self, column: &str) -> Option<f64> {
        let value = self.rows.first()?.get(column)?;
        match value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

fn render_value(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Result of testing a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

// ============================================================================
// Capabilities and configuration schemas
// ============================================================================

/// Declared feature flags of an adapter.
///
/// The core consults these before invoking optional operations;
/// `supports_write` stays false for every adapter the core loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterCapabilities {
    #[serde(default)]
    pub supports_sql: bool,
    #[serde(default)]
    pub supports_sampling: bool,
    #[serde(default)]
    pub supports_row_count: bool,
    #[serde(default)]
    pub supports_column_stats: bool,
    #[serde(default)]
    pub supports_preview: bool,
    #[serde(default)]
    pub supports_write: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_requests_per_minute: Option<u32>,
    #[serde(default = "default_one")]
    pub max_concurrent_queries: u32,
    pub query_language: QueryLanguage,
}

fn default_one() -> u32 {
    1
}

impl Default for AdapterCapabilities {
    fn default() -> Self {
        Self {
            supports_sql: false,
            supports_sampling: false,
            supports_row_count: false,
            supports_column_stats: false,
            supports_preview: false,
            supports_write: false,
            rate_limit_requests_per_minute: None,
            max_concurrent_queries: 1,
            query_language: QueryLanguage::ScanOnly,
        }
    }
}

/// Kind of a configuration field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigFieldType {
    String,
    Integer,
    Boolean,
    Enum,
    Secret,
    File,
    Json,
}

/// Group of configuration fields for UI forms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldGroup {
    pub id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub collapsed_by_default: bool,
}

/// A single self-describing configuration field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigField {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: ConfigFieldType,
    pub required: bool,
    pub group: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<EnumOption>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Value/label pair for enum fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumOption {
    pub value: String,
    pub label: String,
}

impl ConfigField {
    pub fn required_string(name: &str, label: &str, group: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            field_type: ConfigFieldType::String,
            required: true,
            group: group.to_string(),
            default_value: None,
            placeholder: None,
            options: None,
            description: None,
        }
    }

    pub fn secret(name: &str, label: &str, group: &str) -> Self {
        Self {
            field_type: ConfigFieldType::Secret,
            ..Self::required_string(name, label, group)
        }
    }

    pub fn optional_integer(name: &str, label: &str, group: &str, default: i64) -> Self {
        Self {
            field_type: ConfigFieldType::Integer,
            required: false,
            default_value: Some(serde_json::json!(default)),
            ..Self::required_string(name, label, group)
        }
    }
}

/// Configuration schema for an adapter, rendered by UI forms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSchema {
    pub fields: Vec<ConfigField>,
    pub field_groups: Vec<FieldGroup>,
}

/// Complete registry-facing definition of a source type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceTypeDefinition {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub display_name: String,
    pub category: SourceCategory,
    pub icon: String,
    pub description: String,
    pub capabilities: AdapterCapabilities,
    pub config_schema: ConfigSchema,
}
