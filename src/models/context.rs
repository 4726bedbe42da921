//! Investigation context model
//!
//! What the context engine assembles before any hypothesis work starts:
//! the target schema, lineage, cross-table correlations, a time-series
//! pattern around the anomaly date, and any upstream anomalies.

use serde::{Deserialize, Serialize};

use super::datasource::SchemaResponse;
use super::lineage::LineageGraph;

/// A detected correlation between the target table and a related table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    /// The table under investigation
    pub source_table: String,
    pub related_table: String,
    /// Column both tables share
    pub join_column: String,
    /// Kind of correlation ("missing_reference", ...)
    pub correlation_type: String,
    /// Strength in 0..=1
    pub strength: f64,
    pub description: String,
    /// SQL that reproduces the measurement
    pub evidence_query: String,
}

/// Kind of time-series pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Spike,
    Drop,
}

/// A pattern detected in per-day metrics around the anomaly date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPattern {
    pub table: String,
    pub column: String,
    pub pattern_type: PatternType,
    pub start_date: String,
    pub end_date: String,
    /// Spike: (max-baseline)/baseline capped at 10; drop: (baseline-min)/baseline
    pub severity: f64,
    /// Per-day observations backing the detection
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_points: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// Elevated null rate observed in a related table on the anomaly date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamAnomaly {
    pub table: String,
    pub column: String,
    pub null_rate: f64,
    pub total_rows: u64,
}

/// Everything the orchestrator hands the model as context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationContext {
    pub schema: SchemaResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lineage: Option<LineageGraph>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub correlations: Vec<Correlation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<TimeSeriesPattern>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upstream_anomalies: Vec<UpstreamAnomaly>,
}

impl InvestigationContext {
    pub fn new(schema: SchemaResponse) -> Self {
        Self {
            schema,
            lineage: None,
            correlations: Vec::new(),
            pattern: None,
            upstream_anomalies: Vec::new(),
        }
    }

    /// Render the full context for LLM prompts
    pub fn to_prompt_string(&self) -> String {
        let mut sections = vec![self.schema.to_prompt_string(10, 15)];

        if let Some(lineage) = &self.lineage {
            sections.push(lineage.to_prompt_string(3));
        }

        if !self.correlations.is_empty() {
            let mut lines = vec!["CROSS-TABLE CORRELATIONS:".to_string()];
            for c in &self.correlations {
                lines.push(format!("  - {} (strength {:.2})", c.description, c.strength));
            }
            sections.push(lines.join("\n"));
        }

        if let Some(p) = &self.pattern {
            sections.push(format!(
                "TIME-SERIES PATTERN: {:?} on {}.{} from {} to {} (severity {:.2})",
                p.pattern_type, p.table, p.column, p.start_date, p.end_date, p.severity
            ));
        }

        if !self.upstream_anomalies.is_empty() {
            let mut lines = vec!["UPSTREAM ANOMALIES ON THE SAME DATE:".to_string()];
            for a in &self.upstream_anomalies {
                lines.push(format!(
                    "  - {}.{}: {:.1}% null rate over {} rows",
                    a.table, a.column, a.null_rate, a.total_rows
                ));
            }
            sections.push(lines.join("\n"));
        }

        sections.join("\n\n")
    }
}
