//! OpenLineage provider
//!
//! Talks to a Marquez-style OpenLineage API over HTTP. The lineage graph
//! endpoint returns nodes and edges keyed by node ids of the form
//! `dataset:namespace:name` and `job:namespace:name`; everything here is a
//! translation of that shape into the unified model.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::models::{
    Dataset, DatasetId, DatasetType, Job, JobRun, JobType, LineageCapabilities, LineageEdge,
    LineageGraph, LineageProviderInfo, LineageProviderType, RunStatus,
};

use super::{LineageAdapter, LineageError, LineageResult};

/// OpenLineage/Marquez HTTP provider
pub struct OpenLineageAdapter {
    http_client: Client,
    base_url: String,
    namespace: String,
    api_key: Option<String>,
}

impl OpenLineageAdapter {
    /// Build from a config map: `base_url`, `namespace`, optional `api_key`.
    pub fn from_config(config: &serde_json::Value) -> Result<Self, LineageError> {
        let base_url = config
            .get("base_url")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| LineageError::Config("base_url is required".to_string()))?
            .trim_end_matches('/')
            .to_string();
        let namespace = config
            .get("namespace")
            .and_then(|v| v.as_str())
            .unwrap_or("default")
            .to_string();
        let api_key = config
            .get("api_key")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LineageError::Config(format!("http client: {e}")))?;

        Ok(Self { http_client, base_url, namespace, api_key })
    }

    async fn get_json(&self, path: &str) -> LineageResult<serde_json::Value> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.http_client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| LineageError::Http(format!("{url}: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(serde_json::Value::Null);
        }
        if !status.is_success() {
            return Err(LineageError::Http(format!("{url}: HTTP {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| LineageError::Parse(e.to_string()))
    }

    fn node_id(&self, dataset_id: &DatasetId) -> String {
        format!("dataset:{}:{}", self.namespace, dataset_id.name)
    }

    async fn fetch_graph(&self, dataset_id: &DatasetId, depth: usize) -> LineageResult<LineageGraph> {
        let body = self
            .get_json(&format!(
                "/api/v1/lineage?nodeId={}&depth={depth}",
                urlencoding::encode(&self.node_id(dataset_id))
            ))
            .await?;

        let mut graph = LineageGraph::new(dataset_id.clone());
        let Some(nodes) = body.get("graph").and_then(|g| g.as_array()) else {
            return Ok(graph);
        };

        for node in nodes {
            let node_id = node.get("id").and_then(|v| v.as_str()).unwrap_or_default();
            let data = node.get("data").cloned().unwrap_or(serde_json::Value::Null);

            if let Some(name) = node_id.strip_prefix("dataset:") {
                let name = name.split_once(':').map(|(_, n)| n).unwrap_or(name);
                let id = DatasetId::new(dataset_id.platform.clone(), name);
                graph
                    .datasets
                    .insert(id.to_string(), parse_dataset(&id, &data));
            } else if let Some(name) = node_id.strip_prefix("job:") {
                let name = name.split_once(':').map(|(_, n)| n).unwrap_or(name);
                let job = parse_job(name, &data, &dataset_id.platform);
                graph.jobs.insert(job.id.clone(), job);
            }

            // Out-edges on dataset nodes feed jobs; job out-edges feed
            // datasets. We keep dataset->dataset edges through the job.
            if let Some(edges) = node.get("outEdges").and_then(|v| v.as_array()) {
                for edge in edges {
                    let origin = edge.get("origin").and_then(|v| v.as_str()).unwrap_or(node_id);
                    let destination =
                        edge.get("destination").and_then(|v| v.as_str()).unwrap_or_default();
                    if let (Some(src), Some(dst)) = (
                        dataset_name_of(origin),
                        dataset_name_of(destination),
                    ) {
                        graph.edges.push(LineageEdge::new(
                            DatasetId::new(dataset_id.platform.clone(), src),
                            DatasetId::new(dataset_id.platform.clone(), dst),
                        ));
                    }
                }
            }
        }

        Ok(graph)
    }
}

fn dataset_name_of(node_id: &str) -> Option<String> {
    let rest = node_id.strip_prefix("dataset:")?;
    Some(rest.split_once(':').map(|(_, n)| n).unwrap_or(rest).to_string())
}

fn parse_dataset(id: &DatasetId, data: &serde_json::Value) -> Dataset {
    let mut dataset = Dataset::from_id(id.clone());
    dataset.dataset_type = match data.get("type").and_then(|v| v.as_str()) {
        Some("DB_TABLE") => DatasetType::Table,
        Some("STREAM") => DatasetType::Stream,
        Some(_) | None => DatasetType::Unknown,
    };
    if let Some(description) = data.get("description").and_then(|v| v.as_str()) {
        dataset.description = Some(description.to_string());
    }
    if let Some(tags) = data.get("tags").and_then(|v| v.as_array()) {
        dataset.tags = tags
            .iter()
            .filter_map(|t| t.as_str().map(str::to_string))
            .collect();
    }
    dataset
}

fn parse_job(name: &str, data: &serde_json::Value, platform: &str) -> Job {
    let inputs = data
        .get("inputs")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.get("name").and_then(|n| n.as_str()))
                .map(|n| DatasetId::new(platform, n))
                .collect()
        })
        .unwrap_or_default();
    let outputs = data
        .get("outputs")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.get("name").and_then(|n| n.as_str()))
                .map(|n| DatasetId::new(platform, n))
                .collect()
        })
        .unwrap_or_default();

    Job {
        id: format!("openlineage:{name}"),
        name: name.to_string(),
        job_type: JobType::Unknown,
        inputs,
        outputs,
        schedule: data
            .get("schedule")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        owners: Vec::new(),
        extra: serde_json::Map::new(),
    }
}

fn parse_run(value: &serde_json::Value, job_id: &str) -> Option<JobRun> {
    let id = value.get("id").and_then(|v| v.as_str())?.to_string();
    let status = value
        .get("state")
        .and_then(|v| v.as_str())
        .map(RunStatus::parse_status)
        .unwrap_or(RunStatus::Skipped);
    let started_at = value
        .get("startedAt")
        .or_else(|| value.get("createdAt"))
        .and_then(|v| v.as_str())
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))?;
    let ended_at = value
        .get("endedAt")
        .and_then(|v| v.as_str())
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc));

    Some(JobRun {
        id,
        job_id: job_id.to_string(),
        status,
        started_at,
        duration_seconds: value
            .get("durationMs")
            .and_then(|v| v.as_f64())
            .map(|ms| ms / 1000.0),
        error_message: value
            .get("facets")
            .and_then(|f| f.get("errorMessage"))
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string),
        ended_at,
    })
}

#[async_trait]
impl LineageAdapter for OpenLineageAdapter {
    fn capabilities(&self) -> LineageCapabilities {
        LineageCapabilities {
            supports_column_lineage: false,
            supports_job_runs: true,
            supports_freshness: true,
            supports_search: true,
            supports_owners: false,
            supports_tags: true,
            max_upstream_depth: Some(10),
            max_downstream_depth: Some(10),
            is_realtime: true,
        }
    }

    fn provider_info(&self) -> LineageProviderInfo {
        LineageProviderInfo {
            provider: LineageProviderType::Openlineage,
            display_name: "OpenLineage".to_string(),
            description: "Lineage from an OpenLineage/Marquez API".to_string(),
            capabilities: self.capabilities(),
        }
    }

    async fn get_dataset(&self, dataset_id: &DatasetId) -> LineageResult<Option<Dataset>> {
        let body = self
            .get_json(&format!(
                "/api/v1/namespaces/{}/datasets/{}",
                urlencoding::encode(&self.namespace),
                urlencoding::encode(&dataset_id.name)
            ))
            .await?;
        if body.is_null() {
            return Ok(None);
        }
        Ok(Some(parse_dataset(dataset_id, &body)))
    }

    async fn get_upstream(
        &self,
        dataset_id: &DatasetId,
        depth: usize,
    ) -> LineageResult<Vec<Dataset>> {
        let graph = self.fetch_graph(dataset_id, depth).await?;
        Ok(graph.upstream(dataset_id, depth).into_iter().cloned().collect())
    }

    async fn get_downstream(
        &self,
        dataset_id: &DatasetId,
        depth: usize,
    ) -> LineageResult<Vec<Dataset>> {
        let graph = self.fetch_graph(dataset_id, depth).await?;
        Ok(graph.downstream(dataset_id, depth).into_iter().cloned().collect())
    }

    async fn get_lineage_graph(
        &self,
        dataset_id: &DatasetId,
        upstream_depth: usize,
        downstream_depth: usize,
    ) -> LineageResult<LineageGraph> {
        self.fetch_graph(dataset_id, upstream_depth.max(downstream_depth)).await
    }

    async fn get_producing_job(&self, dataset_id: &DatasetId) -> LineageResult<Option<Job>> {
        let graph = self.fetch_graph(dataset_id, 1).await?;
        Ok(graph
            .jobs
            .into_values()
            .find(|job| job.outputs.iter().any(|o| o.name == dataset_id.name)))
    }

    async fn get_consuming_jobs(&self, dataset_id: &DatasetId) -> LineageResult<Vec<Job>> {
        let graph = self.fetch_graph(dataset_id, 1).await?;
        Ok(graph
            .jobs
            .into_values()
            .filter(|job| job.inputs.iter().any(|i| i.name == dataset_id.name))
            .collect())
    }

    async fn get_recent_runs(&self, job_id: &str, limit: usize) -> LineageResult<Vec<JobRun>> {
        let job_name = job_id.strip_prefix("openlineage:").unwrap_or(job_id);
        let body = self
            .get_json(&format!(
                "/api/v1/namespaces/{}/jobs/{}/runs?limit={limit}",
                urlencoding::encode(&self.namespace),
                urlencoding::encode(job_name)
            ))
            .await?;
        let runs = body
            .get("runs")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|run| parse_run(run, job_id))
                    .take(limit)
                    .collect()
            })
            .unwrap_or_default();
        Ok(runs)
    }

    async fn search_datasets(&self, query: &str, limit: usize) -> LineageResult<Vec<Dataset>> {
        let body = self
            .get_json(&format!(
                "/api/v1/search?q={}&limit={limit}",
                urlencoding::encode(query)
            ))
            .await?;
        let results = body
            .get("results")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("name").and_then(|n| n.as_str()))
                    .map(|name| {
                        Dataset::from_id(DatasetId::new(self.namespace.clone(), name))
                    })
                    .take(limit)
                    .collect()
            })
            .unwrap_or_default();
        Ok(results)
    }

    async fn list_datasets(
        &self,
        _platform: Option<&str>,
        _database: Option<&str>,
        _schema: Option<&str>,
        limit: usize,
    ) -> LineageResult<Vec<Dataset>> {
        let body = self
            .get_json(&format!(
                "/api/v1/namespaces/{}/datasets?limit={limit}",
                urlencoding::encode(&self.namespace)
            ))
            .await?;
        let datasets = body
            .get("datasets")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("name").and_then(|n| n.as_str()))
                    .map(|name| {
                        Dataset::from_id(DatasetId::new(self.namespace.clone(), name))
                    })
                    .take(limit)
                    .collect()
            })
            .unwrap_or_default();
        Ok(datasets)
    }
}
