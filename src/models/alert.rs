//! Anomaly alert model
//!
//! An `AnomalyAlert` is the immutable input that starts every investigation:
//! a metric on a dataset deviated from expectation on a given day.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of metric that triggered the alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    RowCount,
    NullRate,
    Freshness,
    Distribution,
    SchemaChange,
    /// Anything the alerting source emits that we do not model explicitly
    #[serde(other)]
    Unknown,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RowCount => "row_count",
            Self::NullRate => "null_rate",
            Self::Freshness => "freshness",
            Self::Distribution => "distribution",
            Self::SchemaChange => "schema_change",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse_type(s: &str) -> Self {
        match s {
            "row_count" => Self::RowCount,
            "null_rate" => Self::NullRate,
            "freshness" => Self::Freshness,
            "distribution" => Self::Distribution,
            "schema_change" => Self::SchemaChange,
            _ => Self::Unknown,
        }
    }
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Structured description of the metric the alert fired on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    /// Metric kind
    pub metric: AnomalyType,
    /// Column the metric is computed over, if column-scoped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Human-readable metric name for reports
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl MetricSpec {
    pub fn new(metric: AnomalyType) -> Self {
        Self { metric, column: None, display_name: None }
    }

    pub fn with_column(metric: AnomalyType, column: impl Into<String>) -> Self {
        Self { metric, column: Some(column.into()), display_name: None }
    }
}

/// Immutable input to an investigation.
///
/// Invariant: `deviation_pct >= 0`. Enforced at the service boundary, not
/// here, so alerts deserialized from historic logs stay readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyAlert {
    /// Fully qualified dataset path as understood by the adapter
    pub dataset_id: String,
    /// Structured metric description
    pub metric_spec: MetricSpec,
    /// Metric kind, duplicated from `metric_spec` for flat consumers
    pub anomaly_type: AnomalyType,
    pub expected_value: f64,
    pub actual_value: f64,
    /// Absolute deviation from expectation, percent
    pub deviation_pct: f64,
    /// Calendar date the anomaly was observed on (ISO)
    pub anomaly_date: NaiveDate,
    pub severity: Severity,
    /// Source-specific context carried through unchanged
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AnomalyAlert {
    pub fn new(
        dataset_id: impl Into<String>,
        metric_spec: MetricSpec,
        expected_value: f64,
        actual_value: f64,
        deviation_pct: f64,
        anomaly_date: NaiveDate,
        severity: Severity,
    ) -> Self {
        let anomaly_type = metric_spec.metric;
        Self {
            dataset_id: dataset_id.into(),
            metric_spec,
            anomaly_type,
            expected_value,
            actual_value,
            deviation_pct,
            anomaly_date,
            severity,
            metadata: HashMap::new(),
        }
    }

    /// One-line summary used in prompts and judge calls
    pub fn summary(&self) -> String {
        format!(
            "{} anomaly on {}: expected {}, observed {} ({:.1}% deviation) on {} [{}]",
            self.anomaly_type.as_str(),
            self.dataset_id,
            self.expected_value,
            self.actual_value,
            self.deviation_pct,
            self.anomaly_date,
            self.severity.as_str(),
        )
    }
}
