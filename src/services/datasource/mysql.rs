//! MySQL data-source adapter
//!
//! Pooled `mysql_async` connections, schema discovery through
//! `information_schema`, and query execution with positional parameter
//! binding. Connections are returned to the pool as soon as a call
//! completes.

use async_trait::async_trait;
use chrono::Utc;
use mysql_async::prelude::Queryable;
use mysql_async::{OptsBuilder, Pool};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::{
    AdapterCapabilities, Catalog, Column, ColumnStats, ConfigField, ConfigSchema,
    ConnectionTestResult, FieldGroup, NormalizedType, QueryLanguage, QueryResult, ResultColumn,
    SchemaFilter, SchemaInfo, SchemaResponse, SourceType, SourceTypeDefinition, Table, TableType,
};
use crate::safety::sanitize_identifier;

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
    max_concurrent_queries: 5,
    query_language: QueryLanguage::Sql,
};

/// MySQL adapter over a lazy connection pool
pub struct MySqlAdapter {
    pool: Arc<Pool>,
    source_id: String,
    database: String,
}

impl MySqlAdapter {
    /// Build from a config map: `host`, `port`, `username`, `password`,
    /// `database`.
    pub fn from_config(config: &serde_json::Value) -> AdapterResult<Self> {
        let host = required_str(config, "host")?;
        let database = required_str(config, "database")?;
        let username = required_str(config, "username")?;
        let password = config.get("password").and_then(|v| v.as_str()).unwrap_or_default();
        let port = config.get("port").and_then(|v| v.as_u64()).unwrap_or(3306) as u16;

        let opts = OptsBuilder::default()
            .ip_or_hostname(host.clone())
            .tcp_port(port)
            .user(Some(username))
            .pass(Some(password.to_string()))
            .db_name(Some(database.clone()));

        Ok(Self {
            pool: Arc::new(Pool::new(opts)),
            source_id: format!("mysql://{host}:{port}/{database}"),
            database,
        })
    }

    /// Registry definition, including the connection form schema
    pub fn definition() -> SourceTypeDefinition {
        SourceTypeDefinition {
            source_type: SourceType::Mysql,
            display_name: "MySQL".to_string(),
            category: SourceType::Mysql.category(),
            icon: "mysql".to_string(),
            description: "Connect to MySQL and MySQL-compatible databases".to_string(),
            capabilities: CAPABILITIES,
            config_schema: ConfigSchema {
                field_groups: vec![FieldGroup {
                    id: "connection".to_string(),
                    label: "Connection".to_string(),
                    description: None,
                    collapsed_by_default: false,
                }],
                fields: vec![
                    ConfigField::required_string("host", "Host", "connection"),
                    ConfigField::optional_integer("port", "Port", "connection", 3306),
                    ConfigField::required_string("username", "Username", "connection"),
                    ConfigField::secret("password", "Password", "connection"),
                    ConfigField::required_string("database", "Database", "connection"),
                ],
            },
        }
    }

    async fn run(
        &self,
        sql: &str,
        params: &[serde_json::Value],
        timeout_seconds: u64,
    ) -> AdapterResult<Vec<mysql_async::Row>> {
        let mut conn = self
            .pool
            .get_conn()
            .await
            .map_err(|e| map_mysql_error(e, sql))?;

        let work = async {
            if params.is_empty() {
                conn.query::<mysql_async::Row, _>(sql).await
            } else {
                let bound: Vec<mysql_async::Value> = params.iter().map(json_to_mysql).collect();
                conn.exec::<mysql_async::Row, _, _>(sql, bound).await
            }
        };

        let rows = tokio::time::timeout(Duration::from_secs(timeout_seconds), work)
            .await
            .map_err(|_| AdapterError::query_timeout(timeout_seconds))?
            .map_err(|e| map_mysql_error(e, sql))?;

        drop(conn);
        Ok(rows)
    }
}

#[async_trait]
impl DataSourceAdapter for MySqlAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Mysql
    }

    fn capabilities(&self) -> AdapterCapabilities {
        CAPABILITIES
    }

    async fn connect(&self) -> AdapterResult<()> {
        // The pool itself is lazy; acquiring a connection proves the config.
        let conn = self
            .pool
            .get_conn()
            .await
            .map_err(|e| map_mysql_error(e, "connect"))?;
        drop(conn);
        Ok(())
    }

    async fn disconnect(&self) -> AdapterResult<()> {
        self.pool
            .as_ref()
            .clone()
            .disconnect()
            .await
            .map_err(|e| AdapterError::internal(format!("pool shutdown failed: {e}")))
    }

    async fn test_connection(&self) -> AdapterResult<ConnectionTestResult> {
        let start = Instant::now();
        match self.run("SELECT VERSION() AS version", &[], 10).await {
            Ok(rows) => {
                let version = rows.first().and_then(|row| {
                    row.get::<Option<String>, _>("version").flatten()
                });
                Ok(ConnectionTestResult {
                    success: true,
                    latency_ms: Some(start.elapsed().as_millis() as u64),
                    server_version: version,
                    message: "Connection successful".to_string(),
                    error_code: None,
                })
            }
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
                "SELECT table_name, table_type FROM information_schema.tables \
                 WHERE table_schema = ? ORDER BY table_name",
                &[serde_json::json!(self.database)],
                30,
            )
            .await
            .map_err(|e| AdapterError::schema_fetch_failed(e.message))?;

        let column_rows = self
            .run(
                "SELECT table_name, column_name, data_type, column_type, is_nullable, column_key \
                 FROM information_schema.columns WHERE table_schema = ? \
                 ORDER BY table_name, ordinal_position",
                &[serde_json::json!(self.database)],
                30,
            )
            .await
            .map_err(|e| AdapterError::schema_fetch_failed(e.message))?;

        let mut columns_by_table: HashMap<String, Vec<Column>> = HashMap::new();
        for row in column_rows {
            let table: String = row.get::<Option<String>, _>("table_name").flatten().unwrap_or_default();
            let name: String = row.get::<Option<String>, _>("column_name").flatten().unwrap_or_default();
            let native: String = row
                .get::<Option<String>, _>("column_type")
                .flatten()
                .or_else(|| row.get::<Option<String>, _>("data_type").flatten())
                .unwrap_or_default();
            let nullable = row
                .get::<Option<String>, _>("is_nullable")
                .flatten()
                .map(|v| v.eq_ignore_ascii_case("yes"))
                .unwrap_or(true);
            let is_primary = row
                .get::<Option<String>, _>("column_key")
                .flatten()
                .map(|v| v.eq_ignore_ascii_case("pri"))
                .unwrap_or(false);

            let mut column = Column::new(name, normalize_type(&native, SourceType::Mysql), native);
            column.nullable = nullable;
            column.is_primary_key = is_primary;
            columns_by_table.entry(table).or_default().push(column);
        }

        let mut tables = Vec::new();
        for row in table_rows {
            if tables.len() >= max_tables {
                break;
            }
            let name: String = row.get::<Option<String>, _>("table_name").flatten().unwrap_or_default();
            let native_kind: String =
                row.get::<Option<String>, _>("table_type").flatten().unwrap_or_default();
            let is_view = native_kind.eq_ignore_ascii_case("view");
            if is_view && !include_views {
                continue;
            }
            if let Some(p) = &pattern {
                let native_path = format!("{}.{}", self.database, name).to_lowercase();
                if !native_path.contains(p) && !name.to_lowercase().contains(p) {
                    continue;
                }
            }
            tables.push(Table {
                native_path: format!("{}.{}", self.database, name),
                columns: columns_by_table.remove(&name).unwrap_or_default(),
                table_type: if is_view { TableType::View } else { TableType::Table },
                native_type: native_kind,
                row_count: None,
                size_bytes: None,
                last_modified: None,
                description: None,
                name,
            });
        }

        Ok(SchemaResponse {
            source_id: self.source_id.clone(),
            source_type: SourceType::Mysql,
            source_category: SourceType::Mysql.category(),
            fetched_at: Utc::now(),
            catalogs: vec![Catalog {
                name: "def".to_string(),
                schemas: vec![SchemaInfo { name: self.database.clone(), tables }],
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
impl SqlAdapter for MySqlAdapter {
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

        let mut json_rows = Vec::with_capacity(rows.len());
        let mut columns: Vec<ResultColumn> = Vec::new();

        for row in &rows {
            if columns.is_empty() {
                columns = row
                    .columns_ref()
                    .iter()
                    .map(|c| ResultColumn {
                        name: c.name_str().to_string(),
                        data_type: NormalizedType::Unknown,
                    })
                    .collect();
            }
            let mut record = serde_json::Map::new();
            for (i, col) in row.columns_ref().iter().enumerate() {
                let value = row.as_ref(i).map(mysql_to_json).unwrap_or(serde_json::Value::Null);
                record.insert(col.name_str().to_string(), value);
            }
            json_rows.push(record);
        }

        // Infer result column types from the first row's value shapes.
        if let Some(first) = json_rows.first() {
            for col in &mut columns {
                if let Some(value) = first.get(&col.name) {
                    col.data_type = json_value_type(value);
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

    fn build_sample_query(&self, table: &str, n: u64) -> AdapterResult<String> {
        let table = sanitize_identifier(table)
            .map_err(|e| AdapterError::query_syntax(e.to_string(), table, None))?;
        Ok(format!("SELECT * FROM {table} ORDER BY RAND() LIMIT {n}"))
    }
}

fn required_str(config: &serde_json::Value, field: &str) -> AdapterResult<String> {
    config
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AdapterError::missing_required_field(field))
}

fn map_mysql_error(err: mysql_async::Error, sql: &str) -> AdapterError {
    match &err {
        mysql_async::Error::Server(server) => match server.code {
            1044 | 1045 => AdapterError::authentication_failed(server.message.clone()),
            1142 | 1143 | 1227 => AdapterError::insufficient_permissions(server.message.clone()),
            1064 => AdapterError::query_syntax(server.message.clone(), sql, None),
            1146 => AdapterError::table_not_found(&server.message),
            1054 => AdapterError::column_not_found(&server.message, None),
            1040 | 1203 => AdapterError::resource_exhausted(server.message.clone()),
            _ => AdapterError::internal(format!("MySQL error {}: {}", server.code, server.message)),
        },
        mysql_async::Error::Io(_) => AdapterError::connection_failed(err.to_string()),
        _ => AdapterError::internal(err.to_string()),
    }
}

fn json_to_mysql(value: &serde_json::Value) -> mysql_async::Value {
    match value {
        serde_json::Value::Null => mysql_async::Value::NULL,
        serde_json::Value::Bool(b) => mysql_async::Value::Int(i64::from(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                mysql_async::Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                mysql_async::Value::UInt(u)
            } else {
                mysql_async::Value::Double(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => mysql_async::Value::Bytes(s.clone().into_bytes()),
        other => mysql_async::Value::Bytes(other.to_string().into_bytes()),
    }
}

fn mysql_to_json(value: &mysql_async::Value) -> serde_json::Value {
    match value {
        mysql_async::Value::NULL => serde_json::Value::Null,
        mysql_async::Value::Bytes(bytes) => {
            serde_json::Value::String(String::from_utf8_lossy(bytes).to_string())
        }
        mysql_async::Value::Int(i) => serde_json::json!(i),
        mysql_async::Value::UInt(u) => serde_json::json!(u),
        mysql_async::Value::Float(f) => serde_json::json!(f),
        mysql_async::Value::Double(d) => serde_json::json!(d),
        mysql_async::Value::Date(y, m, d, hh, mm, ss, _) => {
            serde_json::json!(format!("{y:04}-{m:02}-{d:02} {hh:02}:{mm:02}:{ss:02}"))
        }
        mysql_async::Value::Time(neg, days, hh, mm, ss, _) => {
            let sign = if *neg { "-" } else { "" };
            serde_json::json!(format!("{sign}{:02}:{mm:02}:{ss:02}", u32::from(*hh) + days * 24))
        }
    }
}

fn json_value_type(value: &serde_json::Value) -> NormalizedType {
    match value {
        serde_json::Value::Bool(_) => NormalizedType::Boolean,
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => NormalizedType::Integer,
        serde_json::Value::Number(_) => NormalizedType::Float,
        serde_json::Value::String(_) => NormalizedType::String,
        serde_json::Value::Array(_) => NormalizedType::Array,
        serde_json::Value::Object(_) => NormalizedType::Struct,
        serde_json::Value::Null => NormalizedType::Unknown,
    }
}
