//! Local-file data-source adapter
//!
//! Treats a directory of CSV/JSON/JSONL files as a catalog of tables.
//! Schemas are inferred from the records themselves; reads are bounded.
//! Parquet is recognized but not readable here.

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::models::{
    AdapterCapabilities, Catalog, Column, ConfigField, ConfigSchema, ConnectionTestResult,
    FieldGroup, QueryLanguage, QueryResult, ResultColumn, SchemaFilter, SchemaInfo, SchemaResponse,
    SourceType, SourceTypeDefinition, Table, TableType,
};

use super::document::{infer_columns_from_documents, json_shape_of};
use super::{AdapterError, AdapterResult, DataSourceAdapter, FileAdapter, FileFormat};

const CAPABILITIES: AdapterCapabilities = AdapterCapabilities {
    supports_sql: false,
    supports_sampling: false,
    supports_row_count: true,
    supports_column_stats: false,
    supports_preview: true,
    supports_write: false,
    rate_limit_requests_per_minute: None,
    max_concurrent_queries: 1,
    query_language: QueryLanguage::ScanOnly,
};

/// Adapter over a local directory of data files
pub struct LocalFileAdapter {
    root: PathBuf,
    source_id: String,
}

impl LocalFileAdapter {
    /// Build from a config map: `path` (directory root).
    pub fn from_config(config: &serde_json::Value) -> AdapterResult<Self> {
        let path = config
            .get("path")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AdapterError::missing_required_field("path"))?;
        Ok(Self { root: PathBuf::from(path), source_id: format!("file://{path}") })
    }

    pub fn definition() -> SourceTypeDefinition {
        SourceTypeDefinition {
            source_type: SourceType::LocalFile,
            display_name: "Local Files".to_string(),
            category: SourceType::LocalFile.category(),
            icon: "folder".to_string(),
            description: "Query CSV, JSON and JSONL files in a local directory".to_string(),
            capabilities: CAPABILITIES,
            config_schema: ConfigSchema {
                field_groups: vec![FieldGroup {
                    id: "source".to_string(),
                    label: "Data Source".to_string(),
                    description: None,
                    collapsed_by_default: false,
                }],
                fields: vec![ConfigField::required_string("path", "Directory", "source")],
            },
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        }
    }

    async fn read_records(
        &self,
        path: &str,
        fmt: Option<FileFormat>,
        limit: u64,
    ) -> AdapterResult<Vec<serde_json::Map<String, serde_json::Value>>> {
        let fmt = fmt
            .or_else(|| FileFormat::from_path(path))
            .ok_or_else(|| AdapterError::invalid_config(format!("unrecognized file format: {path}")))?;

        if fmt == FileFormat::Parquet {
            return Err(AdapterError::not_implemented("parquet reads", "local_file"));
        }

        let full = self.resolve(path);
        let text = tokio::fs::read_to_string(&full).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AdapterError::table_not_found(path),
            std::io::ErrorKind::PermissionDenied => AdapterError::access_denied(path),
            _ => AdapterError::internal(format!("read {path}: {e}")),
        })?;

        let records = match fmt {
            FileFormat::Csv => parse_csv(&text, limit),
            FileFormat::Json => parse_json(&text, limit)?,
            FileFormat::Jsonl => parse_jsonl(&text, limit),
            FileFormat::Parquet => unreachable!("rejected above"),
        };
        Ok(records)
    }

    fn walk(&self, dir: &Path, recursive: bool, found: &mut Vec<String>) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if recursive {
                    self.walk(&path, recursive, found);
                }
            } else if FileFormat::from_path(&path.to_string_lossy()).is_some() {
                if let Ok(rel) = path.strip_prefix(&self.root) {
                    found.push(rel.to_string_lossy().to_string());
                }
            }
        }
    }
}

#[async_trait]
impl DataSourceAdapter for LocalFileAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::LocalFile
    }

    fn capabilities(&self) -> AdapterCapabilities {
        CAPABILITIES
    }

    async fn connect(&self) -> AdapterResult<()> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(AdapterError::invalid_config(format!(
                "not a directory: {}",
                self.root.display()
            )))
        }
    }

    async fn disconnect(&self) -> AdapterResult<()> {
        Ok(())
    }

    async fn test_connection(&self) -> AdapterResult<ConnectionTestResult> {
        let start = Instant::now();
        let ok = self.root.is_dir();
        Ok(ConnectionTestResult {
            success: ok,
            latency_ms: Some(start.elapsed().as_millis() as u64),
            server_version: None,
            message: if ok {
                "Directory accessible".to_string()
            } else {
                format!("Not a directory: {}", self.root.display())
            },
            error_code: (!ok).then(|| "INVALID_CONFIG".to_string()),
        })
    }

    async fn get_schema(&self, filter: Option<&SchemaFilter>) -> AdapterResult<SchemaResponse> {
        let max_tables = filter.map(|f| f.max_tables).unwrap_or(1000);
        let pattern = filter
            .and_then(|f| f.table_pattern.as_deref())
            .map(str::to_lowercase);

        let files = self.list_files("*", true).await?;
        let mut tables = Vec::new();

        for file in files {
            if tables.len() >= max_tables {
                break;
            }
            if let Some(p) = &pattern {
                let last = p.rsplit('.').next().unwrap_or(p.as_str());
                if !file.to_lowercase().contains(last) {
                    continue;
                }
            }
            let columns = match FileAdapter::infer_schema(self, &file, None).await {
                Ok(columns) => columns,
                Err(e) => {
                    tracing::debug!("schema inference failed for {}: {}", file, e);
                    continue;
                }
            };
            let name = Path::new(&file)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| file.clone());
            tables.push(Table {
                name,
                table_type: TableType::File,
                native_type: "file".to_string(),
                native_path: file,
                columns,
                row_count: None,
                size_bytes: None,
                last_modified: None,
                description: None,
            });
        }

        Ok(SchemaResponse {
            source_id: self.source_id.clone(),
            source_type: SourceType::LocalFile,
            source_category: SourceType::LocalFile.category(),
            fetched_at: Utc::now(),
            catalogs: vec![Catalog {
                name: "files".to_string(),
                schemas: vec![SchemaInfo {
                    name: self.root.to_string_lossy().to_string(),
                    tables,
                }],
            }],
        })
    }

    async fn preview(&self, table: &str, n: u64) -> AdapterResult<QueryResult> {
        self.read_file(table, None, n).await
    }

    async fn sample(&self, table: &str, _n: u64) -> AdapterResult<QueryResult> {
        Err(AdapterError::not_implemented("sampling", "local_file"))
    }

    async fn count_rows(&self, table: &str) -> AdapterResult<u64> {
        let records = self.read_records(table, None, u64::MAX).await?;
        Ok(records.len() as u64)
    }
}

#[async_trait]
impl FileAdapter for LocalFileAdapter {
    async fn list_files(&self, pattern: &str, recursive: bool) -> AdapterResult<Vec<String>> {
        if !self.root.is_dir() {
            return Err(AdapterError::invalid_config(format!(
                "not a directory: {}",
                self.root.display()
            )));
        }
        let mut found = Vec::new();
        self.walk(&self.root, recursive, &mut found);
        found.sort();

        if pattern.is_empty() || pattern == "*" {
            return Ok(found);
        }
        // Glob-lite: "*.csv" matches by suffix, anything else by substring.
        let filtered = if let Some(suffix) = pattern.strip_prefix('*') {
            found.into_iter().filter(|f| f.ends_with(suffix)).collect()
        } else {
            found.into_iter().filter(|f| f.contains(pattern)).collect()
        };
        Ok(filtered)
    }

    async fn read_file(
        &self,
        path: &str,
        fmt: Option<FileFormat>,
        limit: u64,
    ) -> AdapterResult<QueryResult> {
        let records = self.read_records(path, fmt, limit).await?;
        let columns: Vec<ResultColumn> = records
            .first()
            .map(|record| {
                record
                    .iter()
                    .map(|(name, value)| ResultColumn {
                        name: name.clone(),
                        data_type: json_shape_of(value),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(QueryResult {
            columns,
            row_count: records.len() as u64,
            truncated: records.len() as u64 >= limit,
            rows: records,
            execution_time_ms: None,
        })
    }

    async fn infer_schema(&self, path: &str, fmt: Option<FileFormat>) -> AdapterResult<Vec<Column>> {
        let records = self.read_records(path, fmt, 100).await?;
        Ok(infer_columns_from_documents(&records))
    }
}

/// Minimal CSV reader: header row, double-quote escaping, no embedded
/// newlines inside quoted fields.
fn parse_csv(text: &str, limit: u64) -> Vec<serde_json::Map<String, serde_json::Value>> {
    let mut lines = text.lines();
    let header: Vec<String> = match lines.next() {
        Some(line) => split_csv_line(line),
        None => return Vec::new(),
    };

    let mut records = Vec::new();
    for line in lines {
        if records.len() as u64 >= limit {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_csv_line(line);
        let mut record = serde_json::Map::new();
        for (i, name) in header.iter().enumerate() {
            let raw = fields.get(i).cloned().unwrap_or_default();
            record.insert(name.clone(), coerce_scalar(&raw));
        }
        records.push(record);
    }
    records
}

fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Numbers and booleans come back typed; everything else stays a string
fn coerce_scalar(raw: &str) -> serde_json::Value {
    if raw.is_empty() {
        return serde_json::Value::Null;
    }
    if let Ok(i) = raw.parse::<i64>() {
        return serde_json::json!(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return serde_json::json!(f);
    }
    match raw {
        "true" | "TRUE" => serde_json::json!(true),
        "false" | "FALSE" => serde_json::json!(false),
        _ => serde_json::Value::String(raw.to_string()),
    }
}

fn parse_json(
    text: &str,
    limit: u64,
) -> AdapterResult<Vec<serde_json::Map<String, serde_json::Value>>> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| AdapterError::internal(format!("invalid JSON: {e}")))?;
    let records = match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .take(limit as usize)
            .filter_map(|item| match item {
                serde_json::Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        serde_json::Value::Object(map) => vec![map],
        _ => Vec::new(),
    };
    Ok(records)
}

fn parse_jsonl(text: &str, limit: u64) -> Vec<serde_json::Map<String, serde_json::Value>> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .take(limit as usize)
        .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
        .filter_map(|value| match value {
            serde_json::Value::Object(map) => Some(map),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_lines_split_with_quotes() {
        assert_eq!(split_csv_line("a,b,c"), vec!["a", "b", "c"]);
        assert_eq!(split_csv_line(r#""x,y",2"#), vec!["x,y", "2"]);
        assert_eq!(split_csv_line(r#""he said ""hi""",ok"#), vec![r#"he said "hi""#, "ok"]);
    }

    #[test]
    fn csv_values_are_typed() {
        let records = parse_csv("id,name,active\n1,alice,true\n2,bob,false\n", 10);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["id"], serde_json::json!(1));
        assert_eq!(records[0]["name"], serde_json::json!("alice"));
        assert_eq!(records[0]["active"], serde_json::json!(true));
    }

    #[test]
    fn jsonl_skips_blank_and_broken_lines() {
        let records = parse_jsonl("{\"a\":1}\n\nnot json\n{\"a\":2}\n", 10);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn parquet_is_recognized_but_not_readable() {
        assert_eq!(FileFormat::from_path("data/x.parquet"), Some(FileFormat::Parquet));
    }
}
