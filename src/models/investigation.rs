//! Investigation domain model
//!
//! Hypotheses, the evidence gathered while probing them, and the terminal
//! finding an investigation emits.

use serde::{Deserialize, Serialize};

/// Closed set of explanation categories a hypothesis may belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisCategory {
    UpstreamDependency,
    TransformationBug,
    DataQuality,
    Infrastructure,
    ExpectedVariance,
}

impl HypothesisCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpstreamDependency => "upstream_dependency",
            Self::TransformationBug => "transformation_bug",
            Self::DataQuality => "data_quality",
            Self::Infrastructure => "infrastructure",
            Self::ExpectedVariance => "expected_variance",
        }
    }

    /// Parse a category string from model output.
    ///
    /// The set is closed and has no unknown member; anything unrecognized
    /// coerces to `DataQuality`, the most neutral reading.
    pub fn parse_category(s: &str) -> Self {
        match s {
            "upstream_dependency" => Self::UpstreamDependency,
            "transformation_bug" => Self::TransformationBug,
            "data_quality" => Self::DataQuality,
            "infrastructure" => Self::Infrastructure,
            "expected_variance" => Self::ExpectedVariance,
            other => {
                tracing::warn!("unknown hypothesis category '{}', coercing to data_quality", other);
                Self::DataQuality
            }
        }
    }
}

/// A candidate explanation for the anomaly. Immutable once generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    /// Stable within one investigation (h001, h002, ...)
    pub id: String,
    pub title: String,
    pub category: HypothesisCategory,
    /// Free-text reasoning from the model
    pub reasoning: String,
    /// Model-drafted SQL. NOT validated; the orchestrator never runs it as-is.
    pub suggested_query: String,
}

/// Whether a probe result supports its hypothesis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportVerdict {
    True,
    False,
    Unknown,
}

impl SupportVerdict {
    pub fn from_optional(v: Option<bool>) -> Self {
        match v {
            Some(true) => Self::True,
            Some(false) => Self::False,
            None => Self::Unknown,
        }
    }

    pub fn is_supporting(&self) -> bool {
        matches!(self, Self::True)
    }
}

/// Outcome of one successful probe+interpret cycle. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub hypothesis_id: String,
    /// The validated SQL that was actually executed
    pub query: String,
    pub result_summary: String,
    pub row_count: u64,
    pub supports_hypothesis: SupportVerdict,
    /// Model confidence in the interpretation, 0..=1
    pub confidence: f64,
    pub interpretation: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causal_chain: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_findings: Vec<String>,
}

impl Evidence {
    /// Stable identifier used to reference this evidence from a finding
    pub fn evidence_id(&self, index: usize) -> String {
        format!("{}-e{:03}", self.hypothesis_id, index)
    }
}

/// Terminal status of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    Completed,
    Inconclusive,
    Failed,
}

impl FindingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Inconclusive => "inconclusive",
            Self::Failed => "failed",
        }
    }
}

/// Immutable output of an investigation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub investigation_id: String,
    pub status: FindingStatus,
    /// Root cause statement, absent when the investigation was inconclusive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causal_chain: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_onset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_scope: Option<String>,
    /// Evidence ids backing the root cause
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supporting_evidence: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<String>,
    pub duration_seconds: f64,
}

impl Finding {
    /// An empty finding for investigations that failed before synthesis
    pub fn failed(investigation_id: impl Into<String>, duration_seconds: f64) -> Self {
        Self {
            investigation_id: investigation_id.into(),
            status: FindingStatus::Failed,
            root_cause: None,
            confidence: 0.0,
            causal_chain: Vec::new(),
            estimated_onset: None,
            affected_scope: None,
            supporting_evidence: Vec::new(),
            recommendations: Vec::new(),
            duration_seconds,
        }
    }
}
