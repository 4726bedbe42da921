//! Composite lineage adapter
//!
//! Merges lineage from several providers: dbt-style SQL definitions for
//! model lineage plus an OpenLineage API for orchestration lineage, for
//! example. Higher-priority providers win conflicts; a failing provider is
//! logged and skipped, never fatal.

use async_trait::async_trait;
use std::sync::Arc;

use crate::models::{
    ColumnLineage, Dataset, DatasetId, Job, JobRun, LineageCapabilities, LineageGraph,
    LineageProviderInfo, LineageProviderType,
};
use crate::utils::unique_by_key;

use super::graph::merge_graphs;
use super::{LineageAdapter, LineageResult};

/// Priority-ordered merge over multiple providers
pub struct CompositeLineageAdapter {
    /// Sorted highest priority first at construction
    adapters: Vec<(Arc<dyn LineageAdapter>, i32)>,
}

impl CompositeLineageAdapter {
    pub fn new(mut adapters: Vec<(Arc<dyn LineageAdapter>, i32)>) -> Self {
        adapters.sort_by_key(|(_, priority)| std::cmp::Reverse(*priority));
        Self { adapters }
    }

    fn providers(&self) -> impl Iterator<Item = &Arc<dyn LineageAdapter>> {
        self.adapters.iter().map(|(adapter, _)| adapter)
    }
}

#[async_trait]
impl LineageAdapter for CompositeLineageAdapter {
    fn capabilities(&self) -> LineageCapabilities {
        let mut merged = LineageCapabilities::default();
        for adapter in self.providers() {
            let c = adapter.capabilities();
            merged.supports_column_lineage |= c.supports_column_lineage;
            merged.supports_job_runs |= c.supports_job_runs;
            merged.supports_freshness |= c.supports_freshness;
            merged.supports_search |= c.supports_search;
            merged.supports_owners |= c.supports_owners;
            merged.supports_tags |= c.supports_tags;
            merged.is_realtime |= c.is_realtime;
        }
        merged
    }

    fn provider_info(&self) -> LineageProviderInfo {
        let providers: Vec<&str> = self
            .providers()
            .map(|a| a.provider_info().provider.as_str())
            .collect();
        LineageProviderInfo {
            provider: LineageProviderType::Composite,
            display_name: format!("Composite ({})", providers.join(", ")),
            description: "Merged lineage from multiple sources".to_string(),
            capabilities: self.capabilities(),
        }
    }

    async fn get_dataset(&self, dataset_id: &DatasetId) -> LineageResult<Option<Dataset>> {
        for adapter in self.providers() {
            match adapter.get_dataset(dataset_id).await {
                Ok(Some(dataset)) => return Ok(Some(dataset)),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(
                        "lineage provider {} failed: {}",
                        adapter.provider_info().provider.as_str(),
                        e
                    );
                }
            }
        }
        Ok(None)
    }

    async fn get_upstream(
        &self,
        dataset_id: &DatasetId,
        depth: usize,
    ) -> LineageResult<Vec<Dataset>> {
        let mut collected = Vec::new();
        for adapter in self.providers() {
            match adapter.get_upstream(dataset_id, depth).await {
                Ok(datasets) => collected.extend(datasets),
                Err(e) => {
                    tracing::debug!(
                        "lineage provider {} failed: {}",
                        adapter.provider_info().provider.as_str(),
                        e
                    );
                }
            }
        }
        // First (highest-priority) representation of each dataset wins.
        Ok(unique_by_key(collected, |d| d.id.to_string()))
    }

    async fn get_downstream(
        &self,
        dataset_id: &DatasetId,
        depth: usize,
    ) -> LineageResult<Vec<Dataset>> {
        let mut collected = Vec::new();
        for adapter in self.providers() {
            match adapter.get_downstream(dataset_id, depth).await {
                Ok(datasets) => collected.extend(datasets),
                Err(e) => {
                    tracing::debug!(
                        "lineage provider {} failed: {}",
                        adapter.provider_info().provider.as_str(),
                        e
                    );
                }
            }
        }
        Ok(unique_by_key(collected, |d| d.id.to_string()))
    }

    async fn get_lineage_graph(
        &self,
        dataset_id: &DatasetId,
        upstream_depth: usize,
        downstream_depth: usize,
    ) -> LineageResult<LineageGraph> {
        let mut graphs = Vec::new();
        for adapter in self.providers() {
            match adapter
                .get_lineage_graph(dataset_id, upstream_depth, downstream_depth)
                .await
            {
                Ok(graph) => graphs.push(graph),
                Err(e) => {
                    tracing::debug!(
                        "lineage provider {} failed: {}",
                        adapter.provider_info().provider.as_str(),
                        e
                    );
                }
            }
        }
        if graphs.is_empty() {
            return Ok(LineageGraph::new(dataset_id.clone()));
        }
        Ok(merge_graphs(graphs))
    }

    async fn get_column_lineage(
        &self,
        dataset_id: &DatasetId,
        column_name: &str,
    ) -> LineageResult<Vec<ColumnLineage>> {
        for adapter in self.providers() {
            if !adapter.capabilities().supports_column_lineage {
                continue;
            }
            match adapter.get_column_lineage(dataset_id, column_name).await {
                Ok(lineage) if !lineage.is_empty() => return Ok(lineage),
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(
                        "lineage provider {} failed: {}",
                        adapter.provider_info().provider.as_str(),
                        e
                    );
                }
            }
        }
        Ok(Vec::new())
    }

    async fn get_producing_job(&self, dataset_id: &DatasetId) -> LineageResult<Option<Job>> {
        for adapter in self.providers() {
            match adapter.get_producing_job(dataset_id).await {
                Ok(Some(job)) => return Ok(Some(job)),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(
                        "lineage provider {} failed: {}",
                        adapter.provider_info().provider.as_str(),
                        e
                    );
                }
            }
        }
        Ok(None)
    }

    async fn get_consuming_jobs(&self, dataset_id: &DatasetId) -> LineageResult<Vec<Job>> {
        let mut collected = Vec::new();
        for adapter in self.providers() {
            match adapter.get_consuming_jobs(dataset_id).await {
                Ok(jobs) => collected.extend(jobs),
                Err(e) => {
                    tracing::debug!(
                        "lineage provider {} failed: {}",
                        adapter.provider_info().provider.as_str(),
                        e
                    );
                }
            }
        }
        Ok(unique_by_key(collected, |job| job.id.clone()))
    }

    async fn get_recent_runs(&self, job_id: &str, limit: usize) -> LineageResult<Vec<JobRun>> {
        for adapter in self.providers() {
            match adapter.get_recent_runs(job_id, limit).await {
                Ok(runs) if !runs.is_empty() => return Ok(runs),
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(
                        "lineage provider {} failed: {}",
                        adapter.provider_info().provider.as_str(),
                        e
                    );
                }
            }
        }
        Ok(Vec::new())
    }

    async fn search_datasets(&self, query: &str, limit: usize) -> LineageResult<Vec<Dataset>> {
        let per_adapter = if self.adapters.is_empty() {
            limit
        } else {
            (limit / self.adapters.len()).max(5)
        };
        let mut collected = Vec::new();
        for adapter in self.providers() {
            match adapter.search_datasets(query, per_adapter).await {
                Ok(datasets) => collected.extend(datasets),
                Err(e) => {
                    tracing::debug!(
                        "lineage provider {} failed: {}",
                        adapter.provider_info().provider.as_str(),
                        e
                    );
                }
            }
        }
        let mut merged = unique_by_key(collected, |d| d.id.to_string());
        merged.truncate(limit);
        Ok(merged)
    }

    async fn list_datasets(
        &self,
        platform: Option<&str>,
        database: Option<&str>,
        schema: Option<&str>,
        limit: usize,
    ) -> LineageResult<Vec<Dataset>> {
        let per_adapter = if self.adapters.is_empty() {
            limit
        } else {
            (limit / self.adapters.len()).max(10)
        };
        let mut collected = Vec::new();
        for adapter in self.providers() {
            match adapter.list_datasets(platform, database, schema, per_adapter).await {
                Ok(datasets) => collected.extend(datasets),
                Err(e) => {
                    tracing::debug!(
                        "lineage provider {} failed: {}",
                        adapter.provider_info().provider.as_str(),
                        e
                    );
                }
            }
        }
        let mut merged = unique_by_key(collected, |d| d.id.to_string());
        merged.truncate(limit);
        Ok(merged)
    }
}
