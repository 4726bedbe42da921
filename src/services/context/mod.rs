//! Context engine
//!
//! Assembles everything the model needs to reason about an anomaly before
//! the first hypothesis is generated: the target schema, lineage around
//! the dataset, related tables sharing join keys, correlation probes,
//! a time-series pattern around the anomaly date, and upstream anomalies.
//!
//! Identifiers that reach probe SQL pass `sanitize_identifier`; date
//! values are validated and bound as parameters, never spliced raw.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::{
    AnomalyAlert, Correlation, DatasetId, InvestigationContext, PatternType, SchemaResponse, Table,
    TimeSeriesPattern, UpstreamAnomaly,
};
use crate::safety::sanitize_identifier;
use crate::services::datasource::SqlAdapter;
use crate::services::lineage::LineageAdapter;
use crate::utils::error::{InvestigationError, InvestigationResult};

/// Tunables for context gathering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEngineConfig {
    /// Days to look back (and forward) for time-series analysis
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    /// Timestamp column used for per-day bucketing
    #[serde(default = "default_time_column")]
    pub time_column: String,
    /// Lineage traversal depth in each direction
    #[serde(default = "default_lineage_depth")]
    pub lineage_depth: usize,
    /// Platform tag used to build lineage dataset ids
    #[serde(default = "default_platform")]
    pub platform: String,
}

fn default_lookback_days() -> i64 {
    7
}
fn default_time_column() -> String {
    "created_at".to_string()
}
fn default_lineage_depth() -> usize {
    3
}
fn default_platform() -> String {
    "postgres".to_string()
}

impl Default for ContextEngineConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            time_column: default_time_column(),
            lineage_depth: default_lineage_depth(),
            platform: default_platform(),
        }
    }
}

/// A related table candidate: shares an id-shaped column with the target
#[derive(Debug, Clone, PartialEq)]
struct RelatedTable {
    table: String,
    join_column: String,
}

/// Builds `InvestigationContext` for the orchestrator
pub struct ContextEngine {
    adapter: Arc<dyn SqlAdapter>,
    lineage: Option<Arc<dyn LineageAdapter>>,
    config: ContextEngineConfig,
}

impl ContextEngine {
    pub fn new(
        adapter: Arc<dyn SqlAdapter>,
        lineage: Option<Arc<dyn LineageAdapter>>,
        config: ContextEngineConfig,
    ) -> Self {
        Self { adapter, lineage, config }
    }

    /// Gather the full context. Fails only when the target dataset cannot
    /// be located; every enrichment step degrades gracefully.
    pub async fn gather(&self, alert: &AnomalyAlert) -> InvestigationResult<InvestigationContext> {
        tracing::info!(
            dataset = %alert.dataset_id,
            date = %alert.anomaly_date,
            "gathering investigation context"
        );

        let schema = self.adapter.get_schema(None).await?;
        if schema.is_empty() {
            return Err(InvestigationError::schema_discovery(format!(
                "source returned no tables while looking for {}",
                alert.dataset_id
            )));
        }

        let target = find_target_table(&schema, &alert.dataset_id).ok_or_else(|| {
            InvestigationError::schema_discovery(format!(
                "dataset {} not found in source schema",
                alert.dataset_id
            ))
        })?;
        let target_path = target.native_path.clone();

        let mut context = InvestigationContext::new(schema.clone());

        // Lineage is an enrichment; a failing provider never fails gathering.
        if let Some(lineage) = &self.lineage {
            let dataset_id = DatasetId::new(self.config.platform.clone(), alert.dataset_id.clone());
            match lineage
                .get_lineage_graph(&dataset_id, self.config.lineage_depth, self.config.lineage_depth)
                .await
            {
                Ok(graph) if !graph.is_empty() => context.lineage = Some(graph),
                Ok(_) => {}
                Err(e) => tracing::warn!("lineage gathering failed: {}", e),
            }
        }

        let related = find_related_tables(&schema, &target_path);
        tracing::debug!(count = related.len(), "related tables identified");

        for candidate in &related {
            match self.analyze_correlation(alert, &target_path, candidate).await {
                Ok(Some(correlation)) if correlation.strength > 0.3 => {
                    context.correlations.push(correlation)
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(table = %candidate.table, "correlation probe failed: {}", e)
                }
            }
        }

        context.pattern = match self.analyze_time_series(alert, &target_path).await {
            Ok(pattern) => pattern,
            Err(e) => {
                tracing::warn!("time-series probe failed: {}", e);
                None
            }
        };

        for candidate in &related {
            match self.check_upstream_anomaly(alert, candidate).await {
                Ok(Some(anomaly)) => context.upstream_anomalies.push(anomaly),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(table = %candidate.table, "upstream check failed: {}", e)
                }
            }
        }

        tracing::info!(
            correlations = context.correlations.len(),
            upstream_anomalies = context.upstream_anomalies.len(),
            pattern = context.pattern.is_some(),
            "context gathered"
        );
        Ok(context)
    }

    /// Probe whether a LEFT JOIN from the target to a related table leaves
    /// a significant share of rows unmatched on the anomaly date.
    async fn analyze_correlation(
        &self,
        alert: &AnomalyAlert,
        target: &str,
        related: &RelatedTable,
    ) -> InvestigationResult<Option<Correlation>> {
        let source = sanitize_identifier(target)?;
        let other = sanitize_identifier(&related.table)?;
        let col = sanitize_identifier(&related.join_column)?;
        let time_col = sanitize_identifier(&self.config.time_column)?;
        let date = alert.anomaly_date.to_string();

        let sql = format!(
            "SELECT COUNT(s.{col}) AS source_count, COUNT(r.{col}) AS matched_count, \
             COUNT(s.{col}) - COUNT(r.{col}) AS unmatched_count, \
             ROUND(100.0 * (COUNT(s.{col}) - COUNT(r.{col})) / NULLIF(COUNT(s.{col}), 0), 2) AS unmatched_rate \
             FROM {source} s LEFT JOIN {other} r ON s.{col} = r.{col} \
             WHERE DATE(s.{time_col}) = ? AND s.{col} IS NOT NULL"
        );

        let result = self
            .adapter
            .execute_query(&sql, &[serde_json::json!(date)], 30, Some(1))
            .await?;
        let Some(unmatched_rate) = result.first_row_f64("unmatched_rate") else {
            return Ok(None);
        };

        // Under 10% unmatched is noise, not a correlation.
        if unmatched_rate < 10.0 {
            return Ok(None);
        }

        let strength = (unmatched_rate / 100.0).min(1.0);
        let evidence_query = sql.replace('?', &format!("'{date}'"));

        Ok(Some(Correlation {
            source_table: target.to_string(),
            related_table: related.table.clone(),
            join_column: related.join_column.clone(),
            correlation_type: "missing_reference".to_string(),
            strength,
            description: format!(
                "{unmatched_rate}% of {target}.{col} values have no matching record in {}",
                related.table
            ),
            evidence_query,
        }))
    }

    /// Per-day totals and null rates over the lookback window, with spike
    /// and drop detection against a baseline of the first days.
    async fn analyze_time_series(
        &self,
        alert: &AnomalyAlert,
        target: &str,
    ) -> InvestigationResult<Option<TimeSeriesPattern>> {
        let table = sanitize_identifier(target)?;
        let time_col = sanitize_identifier(&self.config.time_column)?;

        let metric_column = alert.metric_spec.column.as_deref();
        let (null_expr, analyzed_column) = match metric_column {
            Some(column) => {
                let column = sanitize_identifier(column)?;
                (
                    format!("SUM(CASE WHEN {column} IS NULL THEN 1 ELSE 0 END)"),
                    column.to_string(),
                )
            }
            None => ("0".to_string(), self.config.time_column.clone()),
        };

        let start = alert.anomaly_date - chrono::Duration::days(self.config.lookback_days);
        let end = alert.anomaly_date + chrono::Duration::days(self.config.lookback_days);

        let sql = format!(
            "SELECT DATE({time_col}) AS date, COUNT(*) AS total_count, \
             {null_expr} AS null_count, \
             ROUND(100.0 * {null_expr} / COUNT(*), 2) AS null_rate \
             FROM {table} \
             WHERE DATE({time_col}) >= ? AND DATE({time_col}) <= ? \
             GROUP BY DATE({time_col}) ORDER BY date"
        );

        let result = self
            .adapter
            .execute_query(
                &sql,
                &[serde_json::json!(start.to_string()), serde_json::json!(end.to_string())],
                30,
                None,
            )
            .await?;

        if result.rows.is_empty() {
            return Ok(None);
        }

        // Null-rate anomalies pattern on the rate; everything else on volume.
        let value_key = if metric_column.is_some() { "null_rate" } else { "total_count" };
        let Some(detected) = detect_pattern(&result.rows, value_key) else {
            return Ok(None);
        };

        Ok(Some(TimeSeriesPattern {
            table: target.to_string(),
            column: analyzed_column,
            pattern_type: detected.pattern_type,
            start_date: detected.start_date,
            end_date: detected.end_date,
            severity: detected.severity,
            data_points: result.rows,
        }))
    }

    /// Null-rate check on the join column of a related table on the
    /// anomaly date; above 5% counts as an upstream anomaly.
    async fn check_upstream_anomaly(
        &self,
        alert: &AnomalyAlert,
        related: &RelatedTable,
    ) -> InvestigationResult<Option<UpstreamAnomaly>> {
        let table = sanitize_identifier(&related.table)?;
        let col = sanitize_identifier(&related.join_column)?;
        let time_col = sanitize_identifier(&self.config.time_column)?;

        let sql = format!(
            "SELECT COUNT(*) AS total, \
             SUM(CASE WHEN {col} IS NULL THEN 1 ELSE 0 END) AS null_count, \
             ROUND(100.0 * SUM(CASE WHEN {col} IS NULL THEN 1 ELSE 0 END) / COUNT(*), 2) AS null_rate \
             FROM {table} WHERE DATE({time_col}) = ?"
        );

        let result = self
            .adapter
            .execute_query(
                &sql,
                &[serde_json::json!(alert.anomaly_date.to_string())],
                30,
                Some(1),
            )
            .await?;

        let null_rate = result.first_row_f64("null_rate").unwrap_or(0.0);
        if null_rate <= 5.0 {
            return Ok(None);
        }

        Ok(Some(UpstreamAnomaly {
            table: related.table.clone(),
            column: related.join_column.clone(),
            null_rate,
            total_rows: result.first_row_f64("total").unwrap_or(0.0) as u64,
        }))
    }
}

/// Locate the alert's dataset in the schema: native path or short name,
/// case-insensitively, falling back to the last path segment.
fn find_target_table<'a>(schema: &'a SchemaResponse, dataset_id: &str) -> Option<&'a Table> {
    if let Some(table) = schema.find_table(dataset_id) {
        return Some(table);
    }
    let last = dataset_id.rsplit('.').next()?;
    schema.find_table(last)
}

/// Tables sharing an id-shaped column with the target, one join column each
fn find_related_tables(schema: &SchemaResponse, target_path: &str) -> Vec<RelatedTable> {
    let Some(target) = schema.find_table(target_path) else {
        return Vec::new();
    };
    let target_columns: std::collections::HashSet<&str> =
        target.columns.iter().map(|c| c.name.as_str()).collect();

    let mut related = Vec::new();
    for table in schema.all_tables() {
        if table.native_path == target.native_path {
            continue;
        }
        let shared = table
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .find(|name| target_columns.contains(name) && (name.ends_with("_id") || *name == "id"));
        if let Some(join_column) = shared {
            related.push(RelatedTable {
                table: table.native_path.clone(),
                join_column: join_column.to_string(),
            });
        }
    }
    related
}

struct DetectedPattern {
    pattern_type: PatternType,
    start_date: String,
    end_date: String,
    severity: f64,
}

/// Spike/drop detection over per-day rows.
///
/// Baseline is the median of the first three values. A spike is a value
/// above 3x baseline, extended while neighbors stay above 2x; a drop is a
/// value below half the baseline.
fn detect_pattern(
    rows: &[serde_json::Map<String, serde_json::Value>],
    value_key: &str,
) -> Option<DetectedPattern> {
    if rows.len() < 3 {
        return None;
    }

    let values: Vec<f64> = rows
        .iter()
        .map(|row| {
            row.get(value_key)
                .and_then(|v| match v {
                    serde_json::Value::Number(n) => n.as_f64(),
                    serde_json::Value::String(s) => s.parse().ok(),
                    _ => None,
                })
                .unwrap_or(0.0)
        })
        .collect();
    let dates: Vec<String> = rows
        .iter()
        .map(|row| {
            row.get("date")
                .map(|v| match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_default()
        })
        .collect();

    let mut head: Vec<f64> = values.iter().take(3).copied().collect();
    head.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let baseline = head[head.len() / 2];
    if baseline <= 0.0 {
        return None;
    }

    let (max_idx, max_val) = values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))?;
    if *max_val > baseline * 3.0 {
        let mut start_idx = max_idx;
        let mut end_idx = max_idx;
        while start_idx > 0 && values[start_idx - 1] > baseline * 2.0 {
            start_idx -= 1;
        }
        while end_idx < values.len() - 1 && values[end_idx + 1] > baseline * 2.0 {
            end_idx += 1;
        }
        return Some(DetectedPattern {
            pattern_type: PatternType::Spike,
            start_date: dates[start_idx].clone(),
            end_date: dates[end_idx].clone(),
            severity: ((max_val - baseline) / baseline).min(10.0),
        });
    }

    let (min_idx, min_val) = values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))?;
    if *min_val < baseline * 0.5 {
        return Some(DetectedPattern {
            pattern_type: PatternType::Drop,
            start_date: dates[min_idx].clone(),
            end_date: dates[min_idx].clone(),
            severity: (baseline - min_val) / baseline,
        });
    }

    None
}
