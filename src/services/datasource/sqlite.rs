//! SQLite data-source adapter
//!
//! Discovery through `sqlite_master` and `pragma_table_info`, execution
//! through a lazy sqlx pool. Single-file analytical sources and test
//! fixtures both land here.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Column as _, Row as _, SqlitePool};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::models::{
    AdapterCapabilities, Catalog, Column, ColumnStats, ConfigField, ConfigSchema,
    ConnectionTestResult, FieldGroup, NormalizedType, QueryLanguage, QueryResult, ResultColumn,
    SchemaFilter, SchemaInfo, SchemaResponse, SourceType, SourceTypeDefinition, Table, TableType,
};

use super::type_mapping::normalize_type;
use super::{
    sql_column_stats, sql_count_rows, sql_preview, AdapterError, AdapterResult, DataSourceAdapter,
    SqlAdapter,
};

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

/// SQLite adapter over a lazy sqlx pool
pub struct SqliteAdapter {
    pool: SqlitePool,
    source_id: String,
}

impl SqliteAdapter {
    /// Build from a config map: `path` (file path or `:memory:`).
    pub fn from_config(config: &serde_json::Value) -> AdapterResult<Self> {
        let path = config
            .get("path")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AdapterError::missing_required_field("path"))?;

        let (url, max_connections) = if path == ":memory:" {
            // One connection, or every handle would see its own empty database.
            ("sqlite::memory:".to_string(), 1)
        } else {
            (format!("sqlite://{path}?mode=ro"), 4)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_lazy(&url)
            .map_err(|e| AdapterError::invalid_config(format!("bad sqlite url {url}: {e}")))?;

        Ok(Self { pool, source_id: format!("sqlite://{path}") })
    }

    /// Wrap an existing pool; used by tests that seed fixtures first.
    pub fn from_pool(pool: SqlitePool, source_id: impl Into<String>) -> Self {
        Self { pool, source_id: source_id.into() }
    }

    pub fn definition() -> SourceTypeDefinition {
        SourceTypeDefinition {
            source_type: SourceType::Sqlite,
            display_name: "SQLite".to_string(),
            category: SourceType::Sqlite.category(),
            icon: "sqlite".to_string(),
            description: "Query SQLite database files".to_string(),
            capabilities: CAPABILITIES,
            config_schema: ConfigSchema {
                field_groups: vec![FieldGroup {
                    id: "source".to_string(),
                    label: "Data Source".to_string(),
                    description: None,
                    collapsed_by_default: false,
                }],
                fields: vec![ConfigField::required_string("path", "Database file", "source")],
            },
        }
    }

    async fn run(
        &self,
        sql: &str,
        params: &[serde_json::Value],
        timeout_seconds: u64,
    ) -> AdapterResult<Vec<SqliteRow>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                serde_json::Value::Null => query.bind(Option::<String>::None),
                serde_json::Value::Bool(b) => query.bind(*b),
                serde_json::Value::Number(n) if n.is_i64() => query.bind(n.as_i64()),
                serde_json::Value::Number(n) => query.bind(n.as_f64()),
                serde_json::Value::String(s) => query.bind(s.clone()),
                other => query.bind(other.to_string()),
            };
        }

        tokio::time::timeout(Duration::from_secs(timeout_seconds), query.fetch_all(&self.pool))
            .await
            .map_err(|_| AdapterError::query_timeout(timeout_seconds))?
            .map_err(|e| map_sqlx_error(e, sql))
    }
}

#[async_trait]
impl DataSourceAdapter for SqliteAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Sqlite
    }

    fn capabilities(&self) -> AdapterCapabilities {
        CAPABILITIES
    }

    async fn connect(&self) -> AdapterResult<()> {
        self.run("SELECT 1", &[], 10).await.map(|_| ())
    }

    async fn disconnect(&self) -> AdapterResult<()> {
        self.pool.close().await;
        Ok(())
    }

    async fn test_connection(&self) -> AdapterResult<ConnectionTestResult> {
        let start = Instant::now();
        match self.run("SELECT sqlite_version() AS version", &[], 10).await {
            Ok(rows) => Ok(ConnectionTestResult {
                success: true,
                latency_ms: Some(start.elapsed().as_millis() as u64),
                server_version: rows
                    .first()
                    .and_then(|row| row.try_get::<String, _>("version").ok()),
                message: "Connection successful".to_string(),
                error_code: None,
            }),
            Err(e) => Ok(ConnectionTestResult {
                success: false,
                latency_ms: Some(start.elapsed().as_millis() as u64),
                server_version: None,
                message: e.message.clone(),
                error_code: Some(e.code.as_str().to_string()),
            }),
        }
    }

    async fn get_schema(&self, filter: Option<&SchemaFilter>) -> AdapterResult<SchemaResponse> {
        let include_views = filter.map(|f| f.include_views).unwrap_or(true);
        let max_tables = filter.map(|f| f.max_tables).unwrap_or(1000);
        let pattern = filter
            .and_then(|f| f.table_pattern.as_deref())
            .map(str::to_lowercase);

        let table_rows = self
            .run(
                "SELECT name, type FROM sqlite_master \
                 WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name",
                &[],
                30,
            )
            .await
            .map_err(|e| AdapterError::schema_fetch_failed(e.message))?;

        let mut tables = Vec::new();
        for row in table_rows {
            if tables.len() >= max_tables {
                break;
            }
            let name: String = row.try_get("name").unwrap_or_default();
            let kind: String = row.try_get("type").unwrap_or_default();
            let is_view = kind == "view";
            if is_view && !include_views {
                continue;
            }
            if let Some(p) = &pattern {
                // Dataset ids may arrive schema-qualified; match on the last path segment too.
                let last = p.rsplit('.').next().unwrap_or(p.as_str());
                if !name.to_lowercase().contains(last) {
                    continue;
                }
            }

            let column_rows = self
                .run(
                    "SELECT name, type, \"notnull\", pk FROM pragma_table_info(?)",
                    &[serde_json::json!(name)],
                    30,
                )
                .await
                .map_err(|e| AdapterError::schema_fetch_failed(e.message))?;

            let columns = column_rows
                .iter()
                .map(|col| {
                    let col_name: String = col.try_get("name").unwrap_or_default();
                    let native: String = col.try_get("type").unwrap_or_default();
                    let notnull: i64 = col.try_get("notnull").unwrap_or(0);
                    let pk: i64 = col.try_get("pk").unwrap_or(0);
                    let mut column =
                        Column::new(col_name, normalize_type(&native, SourceType::Sqlite), native);
                    column.nullable = notnull == 0;
                    column.is_primary_key = pk > 0;
                    column
                })
                .collect();

            tables.push(Table {
                native_path: name.clone(),
                columns,
                table_type: if is_view { TableType::View } else { TableType::Table },
                native_type: kind,
                row_count: None,
                size_bytes: None,
                last_modified: None,
                description: None,
                name,
            });
        }

        Ok(SchemaResponse {
            source_id: self.source_id.clone(),
            source_type: SourceType::Sqlite,
            source_category: SourceType::Sqlite.category(),
            fetched_at: Utc::now(),
            catalogs: vec![Catalog {
                name: "main".to_string(),
                schemas: vec![SchemaInfo { name: "main".to_string(), tables }],
            }],
        })
    }

    async fn preview(&self, table: &str, n: u64) -> AdapterResult<QueryResult> {
        sql_preview(self, table, n).await
    }

    async fn sample(&self, table: &str, n: u64) -> AdapterResult<QueryResult> {
        let sql = self.build_sample_query(table, n)?;
        self.execute_query(&sql, &[], super::DEFAULT_QUERY_TIMEOUT_SECS, Some(n)).await
    }

    async fn count_rows(&self, table: &str) -> AdapterResult<u64> {
        sql_count_rows(self, table).await
    }
}

#[async_trait]
impl SqlAdapter for SqliteAdapter {
    async fn execute_query(
        &self,
        sql: &str,
        params: &[serde_json::Value],
        timeout_seconds: u64,
        limit: Option<u64>,
    ) -> AdapterResult<QueryResult> {
        let start = Instant::now();
        let rows = self.run(sql, params, timeout_seconds).await?;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        let mut columns: Vec<ResultColumn> = Vec::new();
        let mut json_rows = Vec::with_capacity(rows.len());

        for row in &rows {
            if columns.is_empty() {
                columns = row
                    .columns()
                    .iter()
                    .map(|c| ResultColumn {
                        name: c.name().to_string(),
                        data_type: NormalizedType::Unknown,
                    })
                    .collect();
            }
            let mut record = serde_json::Map::new();
            for (i, col) in row.columns().iter().enumerate() {
                record.insert(col.name().to_string(), sqlite_value_to_json(row, i));
            }
            json_rows.push(record);
        }

        if let Some(first) = json_rows.first() {
            for col in &mut columns {
                if let Some(value) = first.get(&col.name) {
                    col.data_type = match value {
                        serde_json::Value::Bool(_) => NormalizedType::Boolean,
                        serde_json::Value::Number(n) if n.is_i64() => NormalizedType::Integer,
                        serde_json::Value::Number(_) => NormalizedType::Float,
                        serde_json::Value::String(_) => NormalizedType::String,
                        _ => NormalizedType::Unknown,
                    };
                }
            }
        }

        let total = json_rows.len() as u64;
        let truncated = limit.map(|l| total > l).unwrap_or(false);
        if let Some(l) = limit {
            json_rows.truncate(l as usize);
        }

        Ok(QueryResult {
            columns,
            row_count: json_rows.len() as u64,
            rows: json_rows,
            truncated,
            execution_time_ms: Some(execution_time_ms),
        })
    }

    async fn get_column_stats(
        &self,
        table: &str,
        columns: &[String],
    ) -> AdapterResult<HashMap<String, ColumnStats>> {
        sql_column_stats(self, table, columns).await
    }
}

fn sqlite_value_to_json(row: &SqliteRow, i: usize) -> serde_json::Value {
    // SQLite is dynamically typed; decode by attempt, widest last.
    if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
        return v.map(|x| serde_json::json!(x)).unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
        return v.map(|x| serde_json::json!(x)).unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(i) {
        return v.map(serde_json::Value::String).unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(i) {
        return v
            .map(|bytes| serde_json::Value::String(String::from_utf8_lossy(&bytes).to_string()))
            .unwrap_or(serde_json::Value::Null);
    }
    serde_json::Value::Null
}

fn map_sqlx_error(err: sqlx::Error, sql: &str) -> AdapterError {
    match &err {
        sqlx::Error::Database(db) => {
            let message = db.message().to_string();
            let lowered = message.to_lowercase();
            if lowered.contains("syntax error") {
                AdapterError::query_syntax(message, sql, None)
            } else if lowered.contains("no such table") {
                AdapterError::table_not_found(&message)
            } else if lowered.contains("no such column") {
                AdapterError::column_not_found(&message, None)
            } else if lowered.contains("readonly") || lowered.contains("read-only") {
                AdapterError::access_denied(&message)
            } else {
                AdapterError::internal(message)
            }
        }
        sqlx::Error::PoolTimedOut => AdapterError::connection_timeout(30),
        sqlx::Error::Io(io) => AdapterError::connection_failed(io.to_string()),
        _ => AdapterError::internal(err.to_string()),
    }
}
