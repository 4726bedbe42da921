//! Data-source adapter layer
//!
//! A uniform contract over SQL engines, document stores, REST APIs and file
//! systems. The core only ever talks to these traits; a process-wide
//! registry resolves a `SourceType` plus a config map to a live adapter.
//!
//! Adapters are not required to be concurrency-safe; callers serialize
//! access to one instance or pool several.

pub mod document;
pub mod errors;
pub mod filesystem;
pub mod mock;
pub mod mysql;
pub mod registry;
pub mod sqlite;
pub mod type_mapping;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::models::{
    AdapterCapabilities, Column, ColumnStats, ConnectionTestResult, QueryResult, SchemaFilter,
    SchemaResponse, SourceType,
};
use crate::safety::sanitize_identifier;

pub use errors::{AdapterError, ErrorCode};
pub use registry::{adapter_registry, AdapterInstance, AdapterRegistry};
pub use type_mapping::normalize_type;

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Default timeout for adapter queries, seconds
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Base contract
// ============================================================================

/// Contract shared by every adapter, whatever the source shape.
///
/// Operations gated by a capability flag must be preceded by a capability
/// check; invoking an unsupported operation yields
/// `AdapterError::not_implemented`.
#[async_trait]
pub trait DataSourceAdapter: Send + Sync {
    /// The source kind this adapter speaks to
    fn source_type(&self) -> SourceType;

    /// Declared feature flags. `supports_write` is false for every adapter
    /// the core loads.
    fn capabilities(&self) -> AdapterCapabilities;

    /// Establish the underlying connection
    async fn connect(&self) -> AdapterResult<()>;

    /// Tear down the underlying connection
    async fn disconnect(&self) -> AdapterResult<()>;

    /// Probe connectivity and measure latency
    async fn test_connection(&self) -> AdapterResult<ConnectionTestResult>;

    /// Discover the schema, optionally filtered
    async fn get_schema(&self, filter: Option<&SchemaFilter>) -> AdapterResult<SchemaResponse>;

    /// First `n` rows of a table, in storage order
    async fn preview(&self, table: &str, n: u64) -> AdapterResult<QueryResult>;

    /// `n` randomly sampled rows of a table
    async fn sample(&self, table: &str, n: u64) -> AdapterResult<QueryResult>;

    /// Total row count of a table
    async fn count_rows(&self, table: &str) -> AdapterResult<u64>;
}

// ============================================================================
// SQL shape
// ============================================================================

/// Additional surface of SQL-speaking adapters
#[async_trait]
pub trait SqlAdapter: DataSourceAdapter {
    /// Execute a read-only query. `params` bind to `?` placeholders in
    /// order; `limit` is a final safety net applied to the returned rows.
    async fn execute_query(
        &self,
        sql: &str,
        params: &[serde_json::Value],
        timeout_seconds: u64,
        limit: Option<u64>,
    ) -> AdapterResult<QueryResult>;

    /// Null/distinct/min/max statistics for the given columns
    async fn get_column_stats(
        &self,
        table: &str,
        columns: &[String],
    ) -> AdapterResult<HashMap<String, ColumnStats>>;

    /// Engine-specific sampling SQL. The default leans on `ORDER BY
    /// RANDOM()`; engines with a native sampling primitive override this.
    fn build_sample_query(&self, table: &str, n: u64) -> AdapterResult<String> {
        let table = sanitize_identifier(table)
            .map_err(|e| AdapterError::query_syntax(e.to_string(), table, None))?;
        Ok(format!("SELECT * FROM {table} ORDER BY RANDOM() LIMIT {n}"))
    }
}

/// Shared `count_rows` implementation for SQL adapters
pub async fn sql_count_rows(adapter: &dyn SqlAdapter, table: &str) -> AdapterResult<u64> {
    let table = sanitize_identifier(table)
        .map_err(|e| AdapterError::query_syntax(e.to_string(), table, None))?;
    let sql = format!("SELECT COUNT(*) AS cnt FROM {table}");
    let result = adapter
        .execute_query(&sql, &[], DEFAULT_QUERY_TIMEOUT_SECS, Some(1))
        .await?;
    result
        .first_row_f64("cnt")
        .map(|v| v as u64)
        .ok_or_else(|| AdapterError::internal(format!("COUNT(*) returned no usable row for {table}")))
}

/// Shared `preview` implementation for SQL adapters
pub async fn sql_preview(adapter: &dyn SqlAdapter, table: &str, n: u64) -> AdapterResult<QueryResult> {
    let table = sanitize_identifier(table)
        .map_err(|e| AdapterError::query_syntax(e.to_string(), table, None))?;
    let sql = format!("SELECT * FROM {table} LIMIT {n}");
    adapter.execute_query(&sql, &[], DEFAULT_QUERY_TIMEOUT_SECS, Some(n)).await
}

/// Shared per-column statistics probe: one aggregate scan per column.
pub async fn sql_column_stats(
    adapter: &dyn SqlAdapter,
    table: &str,
    columns: &[String],
) -> AdapterResult<HashMap<String, ColumnStats>> {
    let table = sanitize_identifier(table)
        .map_err(|e| AdapterError::query_syntax(e.to_string(), table, None))?;

    let mut stats = HashMap::new();
    for column in columns {
        let col = sanitize_identifier(column)
            .map_err(|e| AdapterError::query_syntax(e.to_string(), column, None))?;
        let sql = format!(
            "SELECT COUNT(*) AS total, COUNT({col}) AS non_null, \
             COUNT(DISTINCT {col}) AS distinct_cnt, \
             MIN({col}) AS min_value, MAX({col}) AS max_value FROM {table}"
        );
        let result = adapter
            .execute_query(&sql, &[], DEFAULT_QUERY_TIMEOUT_SECS, Some(1))
            .await?;

        let total = result.first_row_f64("total").unwrap_or(0.0);
        let non_null = result.first_row_f64("non_null").unwrap_or(0.0);
        let null_count = (total - non_null).max(0.0) as u64;
        let null_rate = if total > 0.0 { null_count as f64 / total } else { 0.0 };
        let first_row = result.rows.first();
        let as_string = |key: &str| {
            first_row
                .and_then(|row| row.get(key))
                .filter(|v| !v.is_null())
                .map(|v| match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
        };

        stats.insert(
            column.clone(),
            ColumnStats {
                null_count,
                null_rate,
                distinct_count: result.first_row_f64("distinct_cnt").map(|v| v as u64),
                min_value: as_string("min_value"),
                max_value: as_string("max_value"),
                sample_values: Vec::new(),
            },
        );
    }

    Ok(stats)
}

// ============================================================================
// Document shape
// ============================================================================

/// Additional surface of document-store adapters
#[async_trait]
pub trait DocumentAdapter: DataSourceAdapter {
    /// Scan raw documents from a collection
    async fn scan_collection(
        &self,
        collection: &str,
        limit: u64,
    ) -> AdapterResult<Vec<serde_json::Map<String, serde_json::Value>>>;

    /// Count documents in a collection
    async fn count_documents(&self, collection: &str) -> AdapterResult<u64>;

    /// Run a provider-native aggregation pipeline
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &[serde_json::Value],
    ) -> AdapterResult<QueryResult>;

    /// Infer the collection schema by sampling documents and unioning the
    /// observed field types
    async fn infer_schema(&self, collection: &str, sample_size: u64) -> AdapterResult<Vec<Column>>;
}

// ============================================================================
// API shape
// ============================================================================

/// Additional surface of REST-API adapters (CRM-style providers)
#[async_trait]
pub trait ApiAdapter: DataSourceAdapter {
    /// Object kinds the provider exposes ("contacts", "deals", ...)
    async fn list_objects(&self) -> AdapterResult<Vec<String>>;

    /// Provider-native metadata for one object kind, normalized into
    /// `Column` records
    async fn describe_object(&self, object: &str) -> AdapterResult<Vec<Column>>;

    /// Fetch records of one object kind, optionally projected to the
    /// given properties
    async fn query_object(
        &self,
        object: &str,
        limit: u64,
        properties: Option<&[String]>,
    ) -> AdapterResult<QueryResult>;
}

// ============================================================================
// File-system shape
// ============================================================================

/// File formats a file adapter can read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Json,
    Jsonl,
    Parquet,
}

impl FileFormat {
    /// Dispatch on the file extension
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = path.rsplit('.').next()?.to_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            "jsonl" | "ndjson" => Some(Self::Jsonl),
            "parquet" => Some(Self::Parquet),
            _ => None,
        }
    }
}

/// Additional surface of file-system adapters
#[async_trait]
pub trait FileAdapter: DataSourceAdapter {
    /// List files matching a glob-like pattern
    async fn list_files(&self, pattern: &str, recursive: bool) -> AdapterResult<Vec<String>>;

    /// Read up to `limit` records from a file, dispatching on extension
    /// unless `fmt` is given
    async fn read_file(
        &self,
        path: &str,
        fmt: Option<FileFormat>,
        limit: u64,
    ) -> AdapterResult<QueryResult>;

    /// Infer the schema of a file
    async fn infer_schema(&self, path: &str, fmt: Option<FileFormat>) -> AdapterResult<Vec<Column>>;
}
