//! Deterministic mock adapter
//!
//! Canned responses keyed by SQL substring, scripted failures, and a record
//! of every query executed. Used by the test suites and available to
//! consumers who need an investigation run without a live source.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use crate::models::{
    AdapterCapabilities, Catalog, Column, ColumnStats, ConnectionTestResult, NormalizedType,
    QueryLanguage, QueryResult, ResultColumn, SchemaFilter, SchemaInfo, SchemaResponse,
    SourceCategory, SourceType, Table, TableType,
};

use super::{AdapterError, AdapterResult, DataSourceAdapter, SqlAdapter};

const CAPABILITIES: AdapterCapabilities = AdapterCapabilities {
    supports_sql: true,
    supports_sampling: true,
    supports_row_count: true,
    supports_column_stats: true,
    supports_preview: true,
    supports_write: false,
    rate_limit_requests_per_minute: None,
    max_concurrent_queries: 1,
    query_language: QueryLanguage::Sql,
};

/// SQL adapter with scripted behavior
pub struct MockSqlAdapter {
    schema: SchemaResponse,
    /// First matching substring wins, in insertion order
    responses: Vec<(String, QueryResult)>,
    /// Queries matching these substrings fail with the scripted error once
    failures: Mutex<Vec<(String, AdapterError)>>,
    executed: Mutex<Vec<String>>,
    default_response: QueryResult,
}

impl MockSqlAdapter {
    pub fn new(schema: SchemaResponse) -> Self {
        Self {
            schema,
            responses: Vec::new(),
            failures: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
            default_response: QueryResult::empty(),
        }
    }

    /// Build a schema from `(table_name, [(column, native_type)])` pairs.
    /// Native types normalize through the PostgreSQL map.
    pub fn schema_of(tables: &[(&str, &[(&str, &str)])]) -> SchemaResponse {
        let tables = tables
            .iter()
            .map(|(name, cols)| Table {
                name: name.rsplit('.').next().unwrap_or(name).to_string(),
                table_type: TableType::Table,
                native_type: "BASE TABLE".to_string(),
                native_path: name.to_string(),
                columns: cols
                    .iter()
                    .map(|(col, native)| {
                        Column::new(
                            *col,
                            super::normalize_type(native, SourceType::Postgresql),
                            *native,
                        )
                    })
                    .collect(),
                row_count: None,
                size_bytes: None,
                last_modified: None,
                description: None,
            })
            .collect();

        SchemaResponse {
            source_id: "mock://test".to_string(),
            source_type: SourceType::Postgresql,
            source_category: SourceCategory::Database,
            fetched_at: Utc::now(),
            catalogs: vec![Catalog {
                name: "mock".to_string(),
                schemas: vec![SchemaInfo { name: "public".to_string(), tables }],
            }],
        }
    }

    /// Respond to any query containing `needle` with `result`
    pub fn with_response(mut self, needle: &str, result: QueryResult) -> Self {
        self.responses.push((needle.to_string(), result));
        self
    }

    /// Respond with a single-row result, e.g. `{"count": 500}`
    pub fn with_row(self, needle: &str, row: serde_json::Value) -> Self {
        self.with_response(needle, result_with_row(row))
    }

    /// Fail the next query containing `needle` with `error`
    pub fn fail_once(&self, needle: &str, error: AdapterError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push((needle.to_string(), error));
        }
    }

    /// Every query executed so far, in order
    pub fn executed_queries(&self) -> Vec<String> {
        self.executed.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

/// One-row result helper for fixtures
pub fn result_with_row(row: serde_json::Value) -> QueryResult {
    let record = match row {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    let columns = record
        .iter()
        .map(|(name, value)| ResultColumn {
            name: name.clone(),
            data_type: match value {
                serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => NormalizedType::Integer,
                serde_json::Value::Number(_) => NormalizedType::Float,
                serde_json::Value::Bool(_) => NormalizedType::Boolean,
                _ => NormalizedType::String,
            },
        })
        .collect();
    QueryResult {
        columns,
        rows: vec![record],
        row_count: 1,
        truncated: false,
        execution_time_ms: Some(1),
    }
}

#[async_trait]
impl DataSourceAdapter for MockSqlAdapter {
    fn source_type(&self) -> SourceType {
        self.schema.source_type
    }

    fn capabilities(&self) -> AdapterCapabilities {
        CAPABILITIES
    }

    async fn connect(&self) -> AdapterResult<()> {
        Ok(())
    }

    async fn disconnect(&self) -> AdapterResult<()> {
        Ok(())
    }

    async fn test_connection(&self) -> AdapterResult<ConnectionTestResult> {
        let start = Instant::now();
        Ok(ConnectionTestResult {
            success: true,
            latency_ms: Some(start.elapsed().as_millis() as u64),
            server_version: Some("mock-1.0".to_string()),
            message: "Connection successful".to_string(),
            error_code: None,
        })
    }

    async fn get_schema(&self, _filter: Option<&SchemaFilter>) -> AdapterResult<SchemaResponse> {
        Ok(self.schema.clone())
    }

    async fn preview(&self, table: &str, n: u64) -> AdapterResult<QueryResult> {
        self.execute_query(&format!("SELECT * FROM {table} LIMIT {n}"), &[], 30, Some(n))
            .await
    }

    async fn sample(&self, table: &str, n: u64) -> AdapterResult<QueryResult> {
        self.preview(table, n).await
    }

    async fn count_rows(&self, table: &str) -> AdapterResult<u64> {
        let result = self
            .execute_query(&format!("SELECT COUNT(*) AS cnt FROM {table}"), &[], 30, Some(1))
            .await?;
        Ok(result.first_row_f64("cnt").unwrap_or(0.0) as u64)
    }
}

#[async_trait]
impl SqlAdapter for MockSqlAdapter {
    async fn execute_query(
        &self,
        sql: &str,
        _params: &[serde_json::Value],
        _timeout_seconds: u64,
        _limit: Option<u64>,
    ) -> AdapterResult<QueryResult> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(sql.to_string());
        }

        if let Ok(mut failures) = self.failures.lock() {
            if let Some(pos) = failures.iter().position(|(needle, _)| sql.contains(needle.as_str()))
            {
                let (_, error) = failures.remove(pos);
                return Err(error);
            }
        }

        for (needle, result) in &self.responses {
            if sql.contains(needle.as_str()) {
                return Ok(result.clone());
            }
        }
        Ok(self.default_response.clone())
    }

    async fn get_column_stats(
        &self,
        _table: &str,
        columns: &[String],
    ) -> AdapterResult<HashMap<String, ColumnStats>> {
        Ok(columns
            .iter()
            .map(|c| {
                (
                    c.clone(),
                    ColumnStats {
                        null_count: 0,
                        null_rate: 0.0,
                        distinct_count: None,
                        min_value: None,
                        max_value: None,
                        sample_values: Vec::new(),
                    },
                )
            })
            .collect())
    }
}
