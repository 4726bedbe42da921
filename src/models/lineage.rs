//! Unified lineage model
//!
//! Normalizes the differences between lineage providers: datasets, the jobs
//! that produce them, job runs, and the graph that ties them together.
//! Every provider converts to and from these types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Type of dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetType {
    Table,
    View,
    External,
    Seed,
    Source,
    Model,
    Snapshot,
    File,
    Stream,
    Unknown,
}

/// Type of job/process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    DbtModel,
    AirflowTask,
    DagsterOp,
    SparkJob,
    SqlQuery,
    PythonScript,
    FivetranSync,
    AirbyteSync,
    Unknown,
}

/// Status of a job run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
    Cancelled,
    Skipped,
}

impl RunStatus {
    /// Map a provider status string, case-insensitively
    pub fn parse_status(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "running" | "started" => Self::Running,
            "success" | "complete" | "completed" | "done" => Self::Success,
            "failed" | "fail" | "error" | "failure" => Self::Failed,
            "cancelled" | "canceled" | "aborted" => Self::Cancelled,
            _ => Self::Skipped,
        }
    }
}

/// Kinds of lineage providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineageProviderType {
    Dbt,
    Openlineage,
    Airflow,
    Dagster,
    Datahub,
    StaticSql,
    Composite,
}

impl LineageProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dbt => "dbt",
            Self::Openlineage => "openlineage",
            Self::Airflow => "airflow",
            Self::Dagster => "dagster",
            Self::Datahub => "datahub",
            Self::StaticSql => "static_sql",
            Self::Composite => "composite",
        }
    }
}

/// Unique identifier for a dataset, URN-like across providers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetId {
    /// Data platform ("snowflake", "postgres", "s3", ...)
    pub platform: String,
    /// Fully qualified name ("database.schema.table")
    pub name: String,
}

impl DatasetId {
    pub fn new(platform: impl Into<String>, name: impl Into<String>) -> Self {
        Self { platform: platform.into(), name: name.into() }
    }

    /// Parse from URN string.
    ///
    /// Handles `snowflake://db.schema.table` and the DataHub form
    /// `urn:li:dataset:(urn:li:dataPlatform:snowflake,db.schema.table,PROD)`.
    pub fn from_urn(urn: &str) -> Self {
        if let Some(rest) = urn.strip_prefix("urn:li:dataset:") {
            let parts: Vec<&str> = rest.split(',').collect();
            let platform = parts
                .first()
                .and_then(|p| p.rsplit(':').next())
                .unwrap_or("unknown");
            let name = parts.get(1).copied().unwrap_or("");
            Self::new(platform, name)
        } else if let Some((platform, name)) = urn.split_once("://") {
            Self::new(platform, name)
        } else {
            Self::new("unknown", urn)
        }
    }
}

impl std::fmt::Display for DatasetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.platform, self.name)
    }
}

/// A dataset (table, view, file, ...) in the lineage graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    /// Short name ("orders")
    pub name: String,
    /// Full name ("analytics.public.orders")
    pub qualified_name: String,
    pub dataset_type: DatasetType,
    pub platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owners: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    /// Provider-specific metadata carried through unchanged
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Dataset {
    /// Minimal dataset from an id alone, for providers that only know names
    pub fn from_id(id: DatasetId) -> Self {
        let name = id.name.rsplit('.').next().unwrap_or(&id.name).to_string();
        Self {
            name,
            qualified_name: id.name.clone(),
            dataset_type: DatasetType::Unknown,
            platform: id.platform.clone(),
            database: None,
            schema: None,
            description: None,
            tags: Vec::new(),
            owners: Vec::new(),
            last_modified: None,
            row_count: None,
            extra: serde_json::Map::new(),
            id,
        }
    }
}

/// Lineage for a specific column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnLineage {
    pub target_dataset: DatasetId,
    pub target_column: String,
    pub source_dataset: DatasetId,
    pub source_column: String,
    /// SQL expression if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transformation: Option<String>,
    /// 1.0 = certain, below that = inferred
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

/// A job/process that produces or consumes datasets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub job_type: JobType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<DatasetId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<DatasetId>,
    /// Cron expression if scheduled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owners: Vec<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A single execution of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    pub id: String,
    pub job_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// An edge in the lineage graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageEdge {
    pub source: DatasetId,
    pub target: DatasetId,
    /// Job that creates this edge, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<Job>,
    #[serde(default = "default_edge_type")]
    pub edge_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub column_lineage: Vec<ColumnLineage>,
}

fn default_edge_type() -> String {
    "transforms".to_string()
}

impl LineageEdge {
    pub fn new(source: DatasetId, target: DatasetId) -> Self {
        Self {
            source,
            target,
            job: None,
            edge_type: default_edge_type(),
            column_lineage: Vec::new(),
        }
    }
}

/// A lineage graph centered on a dataset.
///
/// Graphs may be cyclic; every traversal keeps a visited set and a strict
/// depth bound so it terminates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageGraph {
    pub root: DatasetId,
    /// Keyed by the dataset id string form
    #[serde(default)]
    pub datasets: HashMap<String, Dataset>,
    #[serde(default)]
    pub edges: Vec<LineageEdge>,
    /// Keyed by job id
    #[serde(default)]
    pub jobs: HashMap<String, Job>,
}

impl LineageGraph {
    pub fn new(root: DatasetId) -> Self {
        Self {
            root,
            datasets: HashMap::new(),
            edges: Vec::new(),
            jobs: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty() && self.edges.is_empty()
    }

    /// Datasets upstream of `dataset_id`, up to `depth` levels
    pub fn upstream(&self, dataset_id: &DatasetId, depth: usize) -> Vec<&Dataset> {
        self.traverse(dataset_id, depth, Direction::Upstream)
    }

    /// Datasets downstream of `dataset_id`, up to `depth` levels
    pub fn downstream(&self, dataset_id: &DatasetId, depth: usize) -> Vec<&Dataset> {
        self.traverse(dataset_id, depth, Direction::Downstream)
    }

    fn traverse(&self, start: &DatasetId, depth: usize, direction: Direction) -> Vec<&Dataset> {
        let mut found = Vec::new();
        let mut visited: std::collections::HashSet<String> = std::collections::HashSet::new();
        visited.insert(start.to_string());
        let mut current_level = vec![start.clone()];

        for _ in 0..depth {
            let mut next_level = Vec::new();
            for ds_id in &current_level {
                let key = ds_id.to_string();
                for edge in &self.edges {
                    let (near, far) = match direction {
                        Direction::Upstream => (&edge.target, &edge.source),
                        Direction::Downstream => (&edge.source, &edge.target),
                    };
                    if near.to_string() == key && !visited.contains(&far.to_string()) {
                        visited.insert(far.to_string());
                        if let Some(ds) = self.datasets.get(&far.to_string()) {
                            found.push(ds);
                        }
                        next_level.push(far.clone());
                    }
                }
            }
            if next_level.is_empty() {
                break;
            }
            current_level = next_level;
        }

        found
    }

    /// Find a directed path between two datasets via BFS, cycle-safe
    pub fn find_path(&self, source: &DatasetId, target: &DatasetId) -> Option<Vec<&LineageEdge>> {
        if source == target {
            return Some(Vec::new());
        }

        let mut adjacency: HashMap<String, Vec<&LineageEdge>> = HashMap::new();
        for edge in &self.edges {
            adjacency.entry(edge.source.to_string()).or_default().push(edge);
        }

        let target_key = target.to_string();
        let mut queue: VecDeque<(String, Vec<&LineageEdge>)> = VecDeque::new();
        queue.push_back((source.to_string(), Vec::new()));
        let mut visited: std::collections::HashSet<String> = std::collections::HashSet::new();
        visited.insert(source.to_string());

        while let Some((current, path)) = queue.pop_front() {
            for edge in adjacency.get(&current).map(|v| v.as_slice()).unwrap_or(&[]) {
                let next = edge.target.to_string();
                let mut extended = path.clone();
                extended.push(edge);
                if next == target_key {
                    return Some(extended);
                }
                if visited.insert(next.clone()) {
                    queue.push_back((next, extended));
                }
            }
        }

        None
    }

    /// Short textual rendering for LLM prompts
    pub fn to_prompt_string(&self, depth: usize) -> String {
        let up: Vec<String> = self
            .upstream(&self.root, depth)
            .iter()
            .map(|d| d.qualified_name.clone())
            .collect();
        let down: Vec<String> = self
            .downstream(&self.root, depth)
            .iter()
            .map(|d| d.qualified_name.clone())
            .collect();

        let mut lines = vec![format!("LINEAGE for {}:", self.root)];
        lines.push(format!(
            "  upstream: {}",
            if up.is_empty() { "(none)".to_string() } else { up.join(", ") }
        ));
        lines.push(format!(
            "  downstream: {}",
            if down.is_empty() { "(none)".to_string() } else { down.join(", ") }
        ));
        lines.join("\n")
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Upstream,
    Downstream,
}

/// What a lineage provider can do
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineageCapabilities {
    #[serde(default)]
    pub supports_column_lineage: bool,
    #[serde(default)]
    pub supports_job_runs: bool,
    #[serde(default)]
    pub supports_freshness: bool,
    #[serde(default)]
    pub supports_search: bool,
    #[serde(default)]
    pub supports_owners: bool,
    #[serde(default)]
    pub supports_tags: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_upstream_depth: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_downstream_depth: Option<usize>,
    #[serde(default)]
    pub is_realtime: bool,
}

/// Registry-facing information about a lineage provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageProviderInfo {
    pub provider: LineageProviderType,
    pub display_name: String,
    pub description: String,
    pub capabilities: LineageCapabilities,
}
